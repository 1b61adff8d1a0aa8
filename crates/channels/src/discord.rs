//! Discord transport — gateway WebSocket plus REST.
//!
//! Connection bring-up: `GET /gateway/bot` yields the gateway URL, the
//! socket handshake is hello → identify → READY (which carries the bot's
//! user id). A heartbeat task keeps the session alive at the interval the
//! hello frame dictates. `MESSAGE_CREATE` dispatches become message events;
//! a missing `guild_id` means a DM. Discord has no per-event ack operation,
//! so envelopes carry no ack handle and `ack` is a no-op.
//!
//! Wire parsing is kept in pure functions so it can be tested against
//! fixture payloads without a connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use kitbot_core::transport::{AckHandle, EventEnvelope, EventKind, LifecyclePhase, RawMessage, Session};
use kitbot_core::{Transport, TransportError};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const EVENT_BUFFER: usize = 64;

// Gateway opcodes.
const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

/// Discord gateway transport.
pub struct DiscordTransport {
    config: kitbot_config::DiscordConfig,
    api_base: String,
    http: reqwest::Client,
}

impl DiscordTransport {
    pub fn new(config: kitbot_config::DiscordConfig) -> Self {
        Self {
            config,
            api_base: DISCORD_API_BASE.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Create with a custom REST base URL (for testing).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    /// `GET /gateway/bot` — resolve the gateway WebSocket URL.
    async fn gateway_url(&self) -> Result<String, TransportError> {
        let resp: GatewayBotResponse = self
            .http
            .get(format!("{}/gateway/bot", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(format!("{}/?v=10&encoding=json", resp.url))
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    fn name(&self) -> &str {
        "discord"
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        let url = self.gateway_url().await?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        // Hello is the first frame and dictates the heartbeat cadence.
        let hello = read_frame(&mut read).await?;
        if hello.op != OP_HELLO {
            return Err(TransportError::Protocol(format!(
                "Expected hello (op 10), got op {}",
                hello.op
            )));
        }
        let heartbeat_interval = hello
            .data
            .get("heartbeat_interval")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| TransportError::Protocol("hello without heartbeat_interval".into()))?;

        // Writer task: identify, heartbeats, everything goes out in order.
        let (writer_tx, mut writer_rx) = mpsc::channel::<WsMessage>(EVENT_BUFFER);
        tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if let Err(e) = write.send(frame).await {
                    warn!(error = %e, "Discord socket write failed");
                    break;
                }
            }
        });

        let identify = serde_json::json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.config.bot_token,
                "intents": GATEWAY_INTENTS,
                "properties": { "os": std::env::consts::OS, "browser": "kitbot", "device": "kitbot" },
            }
        });
        writer_tx
            .send(WsMessage::text(identify.to_string()))
            .await
            .map_err(|_| TransportError::Connect("socket writer closed during identify".into()))?;

        // Read until READY carries our identity; everything else can wait.
        let last_seq = Arc::new(Mutex::new(None::<u64>));
        let bot_id = loop {
            let frame = read_frame(&mut read).await?;
            if let Some(seq) = frame.seq {
                *last_seq.lock().await = Some(seq);
            }
            if frame.op == OP_DISPATCH && frame.event.as_deref() == Some("READY") {
                let ready: ReadyData = serde_json::from_value(frame.data)
                    .map_err(|e| TransportError::Protocol(format!("Malformed READY: {e}")))?;
                break ready.user.id;
            }
        };
        info!(bot_id = %bot_id, "Discord gateway session ready");

        // Heartbeat task at the hello-dictated interval.
        let heartbeat_tx = writer_tx.clone();
        let heartbeat_seq = last_seq.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_interval));
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                let seq = *heartbeat_seq.lock().await;
                let beat = serde_json::json!({ "op": OP_HEARTBEAT, "d": seq });
                if heartbeat_tx.send(WsMessage::text(beat.to_string())).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: dispatches become envelopes.
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let reader_seq = last_seq.clone();
        let reader_writer_tx = writer_tx.clone();
        tokio::spawn(async move {
            let _ = events_tx
                .send(EventEnvelope::new(EventKind::Lifecycle(
                    LifecyclePhase::Connected,
                )))
                .await;

            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(frame) = serde_json::from_str::<GatewayFrame>(text.as_str()) else {
                            warn!("Dropping malformed Discord gateway frame");
                            continue;
                        };
                        if let Some(seq) = frame.seq {
                            *reader_seq.lock().await = Some(seq);
                        }
                        match frame.op {
                            OP_DISPATCH => {
                                if let Some(envelope) = parse_dispatch(&frame) {
                                    if events_tx.send(envelope).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            // The gateway may demand an immediate heartbeat.
                            OP_HEARTBEAT => {
                                let seq = *reader_seq.lock().await;
                                let beat = serde_json::json!({ "op": OP_HEARTBEAT, "d": seq });
                                let _ = reader_writer_tx
                                    .send(WsMessage::text(beat.to_string()))
                                    .await;
                            }
                            OP_HEARTBEAT_ACK => {}
                            other => {
                                debug!(op = other, "Ignoring Discord gateway opcode");
                            }
                        }
                    }
                    Ok(WsMessage::Ping(payload)) => {
                        let _ = reader_writer_tx.send(WsMessage::Pong(payload)).await;
                    }
                    Ok(WsMessage::Close(_)) => {
                        let _ = events_tx
                            .send(EventEnvelope::new(EventKind::Lifecycle(
                                LifecyclePhase::Disconnecting,
                            )))
                            .await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events_tx
                            .send(EventEnvelope::new(EventKind::Lifecycle(
                                LifecyclePhase::ConnectionError(e.to_string()),
                            )))
                            .await;
                        break;
                    }
                }
            }
            debug!("Discord gateway reader finished");
        });

        Ok(Session {
            bot_id,
            events: events_rx,
        })
    }

    /// Discord has no ack operation; events are implicitly consumed.
    async fn ack(&self, _handle: &AckHandle) -> Result<(), TransportError> {
        Ok(())
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let response = self
            .http
            .post(format!(
                "{}/channels/{}/messages",
                self.api_base, conversation_id
            ))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| TransportError::Send {
                conversation_id: conversation_id.into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Send {
                conversation_id: conversation_id.into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}

/// Read and parse a single text frame during the handshake.
async fn read_frame<S>(read: &mut S) -> Result<GatewayFrame, TransportError>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = read
            .next()
            .await
            .ok_or_else(|| TransportError::Connect("gateway closed during handshake".into()))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        match frame {
            WsMessage::Text(text) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| TransportError::Protocol(e.to_string()));
            }
            WsMessage::Close(_) => {
                return Err(TransportError::Connect("gateway closed during handshake".into()));
            }
            _ => {} // Pings etc. during handshake are irrelevant.
        }
    }
}

// --- Wire parsing ---

/// Map a dispatch frame to the tagged event union.
///
/// `MESSAGE_CREATE` is the one dispatch the relay reacts to; every other
/// event name is surfaced as [`EventKind::Unknown`] so the loop can log and
/// ignore it without the transport growing a filter list.
fn parse_dispatch(frame: &GatewayFrame) -> Option<EventEnvelope> {
    let event = frame.event.as_deref()?;

    let kind = match event {
        "MESSAGE_CREATE" => {
            let Ok(msg) = serde_json::from_value::<MessageCreateData>(frame.data.clone()) else {
                warn!("Dropping malformed MESSAGE_CREATE payload");
                return None;
            };
            EventKind::Message(RawMessage {
                text: msg.content,
                author_id: msg.author.id,
                conversation_id: msg.channel_id,
                author_is_bot: msg.author.bot,
                // A message without a guild is a direct message.
                is_direct: msg.guild_id.is_none(),
            })
        }
        "READY" => EventKind::Lifecycle(LifecyclePhase::Connected),
        other => EventKind::Unknown(other.to_string()),
    };

    Some(EventEnvelope::new(kind))
}

// --- Discord API types ---

#[derive(Debug, Deserialize)]
struct GatewayBotResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct GatewayFrame {
    op: u8,
    #[serde(rename = "t", default)]
    event: Option<String>,
    #[serde(rename = "s", default)]
    seq: Option<u64>,
    #[serde(rename = "d", default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ReadyData {
    user: DiscordUser,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MessageCreateData {
    #[serde(default)]
    content: String,
    author: DiscordUser,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> GatewayFrame {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_hello_frame() {
        let f = frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
        assert_eq!(f.op, OP_HELLO);
        assert_eq!(f.data["heartbeat_interval"].as_u64(), Some(41250));
    }

    #[test]
    fn parse_ready_dispatch() {
        let f = frame(
            r#"{"op":0,"t":"READY","s":1,"d":{"user":{"id":"BOT42","bot":true},"session_id":"abc"}}"#,
        );
        let ready: ReadyData = serde_json::from_value(f.data).unwrap();
        assert_eq!(ready.user.id, "BOT42");
    }

    #[test]
    fn guild_message_create_is_not_direct() {
        let f = frame(
            r#"{
                "op": 0, "t": "MESSAGE_CREATE", "s": 7,
                "d": {
                    "content": "<@BOT42> hello",
                    "author": {"id": "U100", "bot": false},
                    "channel_id": "CH9",
                    "guild_id": "G1"
                }
            }"#,
        );
        let env = parse_dispatch(&f).unwrap();
        let EventKind::Message(raw) = env.kind else {
            panic!("expected Message");
        };
        assert_eq!(raw.text, "<@BOT42> hello");
        assert!(!raw.is_direct);
        assert!(!raw.author_is_bot);
        assert!(env.ack.is_none());
    }

    #[test]
    fn dm_message_create_is_direct() {
        let f = frame(
            r#"{
                "op": 0, "t": "MESSAGE_CREATE", "s": 8,
                "d": {
                    "content": "hello",
                    "author": {"id": "U100", "bot": false},
                    "channel_id": "DM5"
                }
            }"#,
        );
        let env = parse_dispatch(&f).unwrap();
        let EventKind::Message(raw) = env.kind else {
            panic!("expected Message");
        };
        assert!(raw.is_direct);
    }

    #[test]
    fn bot_author_carries_marker() {
        let f = frame(
            r#"{
                "op": 0, "t": "MESSAGE_CREATE", "s": 9,
                "d": {
                    "content": "beep",
                    "author": {"id": "B7", "bot": true},
                    "channel_id": "DM5"
                }
            }"#,
        );
        let env = parse_dispatch(&f).unwrap();
        let EventKind::Message(raw) = env.kind else {
            panic!("expected Message");
        };
        assert!(raw.author_is_bot);
    }

    #[test]
    fn other_dispatches_become_unknown() {
        let f = frame(r#"{"op":0,"t":"GUILD_CREATE","s":2,"d":{"id":"G1"}}"#);
        let env = parse_dispatch(&f).unwrap();
        let EventKind::Unknown(kind) = env.kind else {
            panic!("expected Unknown");
        };
        assert_eq!(kind, "GUILD_CREATE");
    }

    #[test]
    fn dispatch_without_event_name_is_dropped() {
        let f = frame(r#"{"op":0,"s":3,"d":{}}"#);
        assert!(parse_dispatch(&f).is_none());
    }

    #[test]
    fn intents_cover_dms_and_message_content() {
        assert_ne!(GATEWAY_INTENTS & (1 << 12), 0, "DIRECT_MESSAGES");
        assert_ne!(GATEWAY_INTENTS & (1 << 15), 0, "MESSAGE_CONTENT");
    }
}
