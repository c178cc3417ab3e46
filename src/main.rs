//! # Calbot CLI
//!
//! Calendar bot: per-channel event schedules with start/end announcements,
//! reminders and RSVPs.
//!
//! Usage:
//!   calbot run                 # Connect to Discord and drive schedules
//!   calbot config show         # Show configuration
//!   calbot config init         # Write a default config file

use anyhow::{Context, Result};
use calbot_channels::{DiscordGateway, DiscordSink, TextRenderer};
use calbot_core::CalbotConfig;
use calbot_core::traits::{ChannelSettingsProvider, MessageSink, Renderer};
use calbot_scheduler::{ChannelLocks, DisplayOrdering, EngineContext, EventRouter, SchedulerEngine, SystemClock};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "calbot",
    version,
    about = "📅 Calbot: event schedules, reminders and RSVPs for Discord"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and run the schedule engine
    Run,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
        None => CalbotConfig::default_path(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "calbot=debug,calbot_core=debug,calbot_scheduler=debug,calbot_store=debug,calbot_channels=debug"
    } else {
        "calbot=info,calbot_scheduler=info,calbot_store=info,calbot_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);
    match cli.command {
        Commands::Run => {
            let config = if cli.config.is_some() {
                CalbotConfig::load_from(&path)?
            } else {
                CalbotConfig::load()?
            };
            run(config).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut config = CalbotConfig::load_from(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                if !config.bot.discord_token.is_empty() {
                    config.bot.discord_token = "********".into();
                }
                println!("# {}", path.display());
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                CalbotConfig::default().save_to(&path)?;
                println!("✅ Config saved to: {}", path.display());
                Ok(())
            }
        },
    }
}

async fn run(config: CalbotConfig) -> Result<()> {
    if config.bot.discord_token.is_empty() {
        anyhow::bail!("bot.discord_token is not set; run `calbot config init` and fill it in");
    }
    if config.bot.admin_id.is_empty() {
        tracing::warn!("bot.admin_id is not set, late-delivery alerts are disabled");
    }

    let store: Arc<dyn calbot_core::traits::EntryStore> =
        Arc::from(calbot_store::create_store(&config.database)?);
    let discord = DiscordSink::new(&config.bot.discord_token)?;
    let me = discord.get_me().await.context("Discord login failed")?;
    tracing::info!("🤖 Logged in as {} ({})", me.username, me.id);

    let sink: Arc<dyn MessageSink> = Arc::new(discord);
    let renderer: Arc<dyn Renderer> = Arc::new(TextRenderer::new());
    let lifecycle = config.lifecycle.clone();
    let operator_id = config.bot.admin_id.clone();
    let token = config.bot.discord_token.clone();
    let settings: Arc<dyn ChannelSettingsProvider> = Arc::new(config);
    let clock = Arc::new(SystemClock);
    let ordering = Arc::new(DisplayOrdering::new(
        store.clone(),
        sink.clone(),
        renderer.clone(),
        settings.clone(),
        clock.clone(),
    ));
    let ctx = Arc::new(EngineContext {
        store: store.clone(),
        sink,
        renderer,
        settings,
        ordering,
        clock,
        lifecycle,
        operator_id,
        bot_id: me.id.clone(),
        channel_locks: ChannelLocks::default(),
    });
    tracing::info!("📦 Store: {} ({} entries)", store.name(), store.list().await?.len());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = Arc::new(SchedulerEngine::new(ctx.clone()));
    let engine_task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(shutdown_rx).await }
    });

    let router = EventRouter::new(ctx);
    let mut events = DiscordGateway::new(token).start();
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    tracing::warn!("Gateway stream ended");
                    break;
                };
                let kind = event.kind();
                match router.handle(event).await {
                    Ok(outcome) => tracing::debug!("{kind}: {outcome:?}"),
                    Err(e) => tracing::error!("Handling {kind} failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    engine_task.await?;
    Ok(())
}
