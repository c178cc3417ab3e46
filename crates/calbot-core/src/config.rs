//! Configuration at `~/.calbot/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CalbotError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalbotConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Settings for channels without an override.
    #[serde(default)]
    pub defaults: ChannelSettings,
    /// Per-channel overrides keyed by channel id.
    #[serde(default)]
    pub channels: HashMap<String, ChannelSettings>,
}

/// Bot identity and RSVP glyphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Operator who receives late-delivery alerts.
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub discord_token: String,
    #[serde(default = "default_yes_emoji")]
    pub yes_emoji: String,
    #[serde(default = "default_no_emoji")]
    pub no_emoji: String,
    #[serde(default = "default_clear_emoji")]
    pub clear_emoji: String,
}

fn default_yes_emoji() -> String { "✅".into() }
fn default_no_emoji() -> String { "❌".into() }
fn default_clear_emoji() -> String { "❔".into() }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_id: String::new(),
            discord_token: String::new(),
            yes_emoji: default_yes_emoji(),
            no_emoji: default_no_emoji(),
            clear_emoji: default_clear_emoji(),
        }
    }
}

/// Timing and failure policy of the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Deliveries later than this after their scheduled instant alert the operator.
    #[serde(default = "default_late_grace_secs")]
    pub late_grace_secs: u64,
    /// Driver polling interval.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Entries processed concurrently per tick.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Extra attempts for a display-message fetch that failed transiently.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,
    /// Delete the entry on any fetch failure, transient or not.
    #[serde(default)]
    pub purge_on_transient_fetch_error: bool,
    /// Per-user cooldown between handled reactions.
    #[serde(default = "default_reaction_cooldown_ms")]
    pub reaction_cooldown_ms: u64,
    /// How often idle entries get their countdown display re-rendered.
    #[serde(default = "default_display_refresh_secs")]
    pub display_refresh_secs: u64,
}

fn default_late_grace_secs() -> u64 { 180 }
fn default_tick_secs() -> u64 { 30 }
fn default_max_concurrent() -> usize { 8 }
fn default_fetch_retries() -> u32 { 2 }
fn default_fetch_backoff_ms() -> u64 { 500 }
fn default_reaction_cooldown_ms() -> u64 { 2000 }
fn default_display_refresh_secs() -> u64 { 60 }

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            late_grace_secs: default_late_grace_secs(),
            tick_secs: default_tick_secs(),
            max_concurrent: default_max_concurrent(),
            fetch_retries: default_fetch_retries(),
            fetch_backoff_ms: default_fetch_backoff_ms(),
            purge_on_transient_fetch_error: false,
            reaction_cooldown_ms: default_reaction_cooldown_ms(),
            display_refresh_secs: default_display_refresh_secs(),
        }
    }
}

impl LifecycleConfig {
    pub fn late_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.late_grace_secs as i64)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    pub fn reaction_cooldown(&self) -> Duration {
        Duration::from_millis(self.reaction_cooldown_ms)
    }

    pub fn display_refresh(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.display_refresh_secs as i64)
    }
}

/// Entry database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.calbot/entries.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Per-channel schedule settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Name of the text channels that receive start/end announcements.
    #[serde(default = "default_announce_channel")]
    pub announce_channel: String,
    /// Name of the text channels that receive reminders.
    #[serde(default = "default_announce_channel")]
    pub reminder_channel: String,
    #[serde(default = "default_announce_format")]
    pub announce_format: String,
    #[serde(default = "default_reminder_format")]
    pub reminder_format: String,
    #[serde(default = "default_true")]
    pub rsvp_enabled: bool,
    /// Minutes before each start at which reminders fire.
    #[serde(default = "default_reminder_leads")]
    pub reminder_leads: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_emoji: Option<String>,
}

fn default_announce_channel() -> String { "general".into() }
fn default_announce_format() -> String { "@everyone %a".into() }
fn default_reminder_format() -> String { "@everyone %a".into() }
fn default_true() -> bool { true }
fn default_reminder_leads() -> Vec<u32> { vec![10] }

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            announce_channel: default_announce_channel(),
            reminder_channel: default_announce_channel(),
            announce_format: default_announce_format(),
            reminder_format: default_reminder_format(),
            rsvp_enabled: true,
            reminder_leads: default_reminder_leads(),
            yes_emoji: None,
            no_emoji: None,
            clear_emoji: None,
        }
    }
}

impl CalbotConfig {
    /// Calbot home directory (`~/.calbot`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".calbot")
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from the default path, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CalbotError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.max_concurrent == 0 {
            return Err(CalbotError::config("lifecycle.max_concurrent must be at least 1"));
        }
        for (channel, settings) in std::iter::once(("defaults", &self.defaults))
            .chain(self.channels.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if settings.announce_channel.trim().is_empty() {
                return Err(CalbotError::config(format!("{channel}: announce_channel is empty")));
            }
        }
        Ok(())
    }

    /// Settings for `channel_id`, with emoji left unset filled from `[bot]`.
    pub fn channel_settings(&self, channel_id: &str) -> ChannelSettings {
        let mut settings = self
            .channels
            .get(channel_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone());
        settings.yes_emoji.get_or_insert_with(|| self.bot.yes_emoji.clone());
        settings.no_emoji.get_or_insert_with(|| self.bot.no_emoji.clone());
        settings.clear_emoji.get_or_insert_with(|| self.bot.clear_emoji.clone());
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CalbotConfig::default();
        assert_eq!(config.lifecycle.late_grace_secs, 180);
        assert_eq!(config.lifecycle.reaction_cooldown_ms, 2000);
        assert!(!config.lifecycle.purge_on_transient_fetch_error);
        assert_eq!(config.defaults.announce_channel, "general");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CalbotConfig = toml::from_str(
            r#"
            [bot]
            admin_id = "42"

            [lifecycle]
            tick_secs = 5

            [channels."900"]
            announce_channel = "events"
            rsvp_enabled = false
            no_emoji = "👎"
            "#,
        )
        .expect("parse");
        assert_eq!(config.bot.admin_id, "42");
        assert_eq!(config.bot.yes_emoji, "✅");
        assert_eq!(config.lifecycle.tick_secs, 5);
        assert_eq!(config.lifecycle.fetch_retries, 2);

        let settings = config.channel_settings("900");
        assert_eq!(settings.announce_channel, "events");
        assert_eq!(settings.reminder_channel, "general");
        assert!(!settings.rsvp_enabled);
        assert_eq!(settings.no_emoji.as_deref(), Some("👎"));
        assert_eq!(settings.yes_emoji.as_deref(), Some("✅"));

        let fallback = config.channel_settings("other");
        assert!(fallback.rsvp_enabled);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CalbotConfig::default();
        config.bot.admin_id = "1234".into();
        config.defaults.reminder_leads = vec![60, 15];
        config.save_to(&path).expect("save");

        let loaded = CalbotConfig::load_from(&path).expect("load");
        assert_eq!(loaded.bot.admin_id, "1234");
        assert_eq!(loaded.defaults.reminder_leads, vec![60, 15]);
    }

    #[test]
    fn test_missing_file() {
        let result = CalbotConfig::load_from(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(CalbotError::ConfigNotFound(_))));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = CalbotConfig::default();
        config.lifecycle.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(CalbotError::Config(_))));
    }
}
