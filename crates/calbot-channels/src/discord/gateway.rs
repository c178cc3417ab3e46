//! Discord Gateway WebSocket. Surfaces the events that affect schedules.
//!
//! Auto-reconnects on disconnect with exponential backoff.

use calbot_core::error::{CalbotError, Result};
use calbot_core::types::{MessageRef, PlatformEvent};
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

const GATEWAY_ENDPOINT: &str = "https://discord.com/api/v10/gateway/bot";

/// GUILDS | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 10);

const MIN_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

pub struct DiscordGateway {
    token: String,
    intents: u64,
    client: reqwest::Client,
}

impl DiscordGateway {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: DEFAULT_INTENTS,
            client: reqwest::Client::new(),
        }
    }

    async fn gateway_url(&self) -> Result<String> {
        let response = self
            .client
            .get(GATEWAY_ENDPOINT)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| CalbotError::Http(format!("Gateway request failed: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| CalbotError::channel(format!("Invalid gateway response: {e}")))?;
        body["url"]
            .as_str()
            .map(|s| format!("{s}/?v=10&encoding=json"))
            .ok_or_else(|| CalbotError::channel("No gateway URL"))
    }

    fn identify(&self) -> Value {
        serde_json::json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "calbot",
                    "device": "calbot"
                }
            }
        })
    }

    /// Connect in the background and stream platform events until the
    /// returned stream is dropped.
    pub fn start(self) -> GatewayStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let gateway = self;
            let mut backoff_secs = MIN_BACKOFF_SECS;

            loop {
                tracing::info!("Discord Gateway connecting...");
                let url = match gateway.gateway_url().await {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::error!("Failed to get gateway URL: {e}, retrying in {backoff_secs}s");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = next_backoff(backoff_secs);
                        continue;
                    }
                };
                let mut ws = match tokio_tungstenite::connect_async(&url).await {
                    Ok((ws, _)) => ws,
                    Err(e) => {
                        tracing::error!("Gateway WebSocket failed: {e}, retrying in {backoff_secs}s");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = next_backoff(backoff_secs);
                        continue;
                    }
                };
                backoff_secs = MIN_BACKOFF_SECS;
                tracing::info!("Discord Gateway connected");

                use futures::{SinkExt, StreamExt};
                use tokio_tungstenite::tungstenite::Message as WsMsg;

                let mut heartbeat_ms: u64 = 41250;
                let mut seq: Option<u64> = None;
                let mut identified = false;

                loop {
                    tokio::select! {
                        msg = ws.next() => match msg {
                            Some(Ok(WsMsg::Text(text))) => {
                                let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                                    continue;
                                };
                                if let Some(s) = payload["s"].as_u64() {
                                    seq = Some(s);
                                }
                                match payload["op"].as_u64().unwrap_or(0) {
                                    10 => {
                                        heartbeat_ms = payload["d"]["heartbeat_interval"].as_u64().unwrap_or(41250);
                                        tracing::debug!("Gateway Hello: heartbeat={heartbeat_ms}ms");
                                        if !identified {
                                            if ws.send(WsMsg::Text(gateway.identify().to_string())).await.is_err() {
                                                break;
                                            }
                                            identified = true;
                                        }
                                    }
                                    11 => tracing::trace!("Heartbeat ACK"),
                                    0 => {
                                        let name = payload["t"].as_str().unwrap_or("");
                                        if name == "READY" {
                                            let user = payload["d"]["user"]["username"].as_str().unwrap_or("unknown");
                                            tracing::info!("Discord Gateway READY as {user}");
                                        } else if let Some(event) = parse_event(name, &payload["d"]) {
                                            if tx.send(event).is_err() {
                                                tracing::info!("Gateway stream closed (receiver dropped)");
                                                return;
                                            }
                                        } else {
                                            tracing::trace!("Ignoring event: {name}");
                                        }
                                    }
                                    7 => {
                                        tracing::warn!("Gateway requesting reconnect");
                                        break;
                                    }
                                    9 => {
                                        tracing::warn!("Invalid session, re-identifying");
                                        if ws.send(WsMsg::Text(gateway.identify().to_string())).await.is_err() {
                                            break;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            Some(Ok(WsMsg::Close(_))) => {
                                tracing::warn!("Discord Gateway closed by server");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("Gateway error: {e}");
                                break;
                            }
                            None => break,
                            _ => {}
                        },
                        _ = tokio::time::sleep(Duration::from_millis(heartbeat_ms)) => {
                            let heartbeat = serde_json::json!({ "op": 1, "d": seq });
                            if ws.send(WsMsg::Text(heartbeat.to_string())).await.is_err() {
                                tracing::error!("Heartbeat send failed");
                                break;
                            }
                            tracing::trace!("Heartbeat sent (seq={seq:?})");
                        }
                    }
                }

                if tx.is_closed() {
                    return;
                }
                tracing::info!("Discord Gateway disconnected, reconnecting in {backoff_secs}s");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = next_backoff(backoff_secs);
            }
        });

        GatewayStream { rx }
    }
}

fn next_backoff(secs: u64) -> u64 {
    (secs * 2).min(MAX_BACKOFF_SECS)
}

/// Reaction emoji as the REST API expects it: unicode glyph, or `name:id`
/// for custom emoji.
fn emoji_key(emoji: &Value) -> Option<String> {
    let name = emoji["name"].as_str()?;
    Some(match emoji["id"].as_str() {
        Some(id) => format!("{name}:{id}"),
        None => name.to_string(),
    })
}

/// Translate a dispatch payload into a platform event.
pub fn parse_event(name: &str, d: &Value) -> Option<PlatformEvent> {
    let text = |v: &Value| v.as_str().map(str::to_string);
    match name {
        "MESSAGE_CREATE" => Some(PlatformEvent::MessageCreated {
            message: MessageRef::new(text(&d["guild_id"])?, text(&d["channel_id"])?, text(&d["id"])?),
            author_id: text(&d["author"]["id"])?,
        }),
        "MESSAGE_REACTION_ADD" => {
            if d["member"]["user"]["bot"].as_bool().unwrap_or(false) {
                return None;
            }
            Some(PlatformEvent::ReactionAdded {
                message: MessageRef::new(text(&d["guild_id"])?, text(&d["channel_id"])?, text(&d["message_id"])?),
                user_id: text(&d["user_id"])?,
                emoji: emoji_key(&d["emoji"])?,
            })
        }
        "MESSAGE_DELETE" => Some(PlatformEvent::MessageDeleted {
            channel_id: text(&d["channel_id"])?,
            message_id: text(&d["id"])?,
        }),
        "CHANNEL_DELETE" => Some(PlatformEvent::ChannelDeleted {
            channel_id: text(&d["id"])?,
        }),
        // `unavailable` marks an outage, not a removal
        "GUILD_DELETE" if !d["unavailable"].as_bool().unwrap_or(false) => Some(PlatformEvent::CommunityLeft {
            community_id: text(&d["id"])?,
        }),
        _ => None,
    }
}

/// Stream of platform events from the Gateway.
pub struct GatewayStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<PlatformEvent>,
}

impl Stream for GatewayStream {
    type Item = PlatformEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
