//! Slack transport — Socket Mode.
//!
//! Connection bring-up: `auth.test` resolves the bot's own user id,
//! `apps.connections.open` (app-level token) yields a WebSocket URL, and the
//! socket then carries enveloped events. Each envelope is acknowledged by
//! sending its `envelope_id` back over the socket. Outbound messages go over
//! the Web API (`chat.postMessage`) with the bot token.
//!
//! Wire parsing is kept in pure functions so it can be tested against
//! fixture payloads without a connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kitbot_core::transport::{
    AckHandle, EventEnvelope, EventKind, LifecyclePhase, RawMessage, Session, SlashCommandEvent,
};
use kitbot_core::{Transport, TransportError};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

const SLACK_API_BASE: &str = "https://slack.com/api";
const EVENT_BUFFER: usize = 64;

/// Slack Socket Mode transport.
pub struct SlackTransport {
    config: kitbot_config::SlackConfig,
    api_base: String,
    http: reqwest::Client,
    /// Writer half of the socket, fed acks (and pong frames) once connected.
    writer_tx: Mutex<Option<mpsc::Sender<WsMessage>>>,
}

impl SlackTransport {
    pub fn new(config: kitbot_config::SlackConfig) -> Self {
        Self {
            config,
            api_base: SLACK_API_BASE.into(),
            http: reqwest::Client::new(),
            writer_tx: Mutex::new(None),
        }
    }

    /// Create with a custom Web API base URL (for testing).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// `auth.test` — resolve the bot's own user id.
    async fn auth_test(&self) -> Result<String, TransportError> {
        let resp: AuthTestResponse = self
            .http
            .post(format!("{}/auth.test", self.api_base))
            .bearer_auth(&self.config.bot_token)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !resp.ok {
            return Err(TransportError::Connect(format!(
                "auth.test failed: {}",
                resp.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        resp.user_id
            .ok_or_else(|| TransportError::Connect("auth.test returned no user_id".into()))
    }

    /// `apps.connections.open` — obtain the Socket Mode WebSocket URL.
    async fn open_socket_url(&self) -> Result<String, TransportError> {
        let resp: ConnectionsOpenResponse = self
            .http
            .post(format!("{}/apps.connections.open", self.api_base))
            .bearer_auth(&self.config.app_token)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !resp.ok {
            return Err(TransportError::Connect(format!(
                "apps.connections.open failed: {}",
                resp.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        resp.url
            .ok_or_else(|| TransportError::Connect("apps.connections.open returned no url".into()))
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn name(&self) -> &str {
        "slack"
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        let bot_id = self.auth_test().await?;
        info!(bot_id = %bot_id, "Authenticated with Slack");

        let url = self.open_socket_url().await?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        // Writer task: acks and pongs queue here and go out in order.
        let (writer_tx, mut writer_rx) = mpsc::channel::<WsMessage>(EVENT_BUFFER);
        tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if let Err(e) = write.send(frame).await {
                    warn!(error = %e, "Slack socket write failed");
                    break;
                }
            }
        });
        *self.writer_tx.lock().await = Some(writer_tx.clone());

        // Reader task: every frame becomes an envelope or a log line.
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match parse_envelope(text.as_str()) {
                        Ok(envelope) => {
                            if events_tx.send(envelope).await.is_err() {
                                break; // Loop dropped the receiver.
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping malformed Slack envelope");
                        }
                    },
                    Ok(WsMessage::Ping(payload)) => {
                        let _ = writer_tx.send(WsMessage::Pong(payload)).await;
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
            debug!("Slack socket reader finished");
        });

        Ok(Session {
            bot_id,
            events: events_rx,
        })
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), TransportError> {
        let payload = serde_json::json!({ "envelope_id": handle.0 }).to_string();
        let guard = self.writer_tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| TransportError::Ack("not connected".into()))?;
        tx.send(WsMessage::text(payload))
            .await
            .map_err(|_| TransportError::Ack("socket writer closed".into()))
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let resp: PostMessageResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.config.bot_token)
            .json(&serde_json::json!({
                "channel": conversation_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| TransportError::Send {
                conversation_id: conversation_id.into(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| TransportError::Send {
                conversation_id: conversation_id.into(),
                reason: e.to_string(),
            })?;

        if !resp.ok {
            return Err(TransportError::Send {
                conversation_id: conversation_id.into(),
                reason: resp.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(())
    }
}

// --- Wire parsing ---

/// Map one Socket Mode envelope to the tagged event union.
///
/// Unrecognized envelope types become [`EventKind::Unknown`] so the loop can
/// acknowledge them; only unparseable JSON is an error (logged and dropped
/// by the reader, never fatal).
fn parse_envelope(text: &str) -> Result<EventEnvelope, TransportError> {
    let envelope: SocketEnvelope =
        serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))?;

    let ack = envelope.envelope_id.map(AckHandle);

    let kind = match envelope.kind.as_str() {
        "hello" => EventKind::Lifecycle(LifecyclePhase::Connected),
        "disconnect" => EventKind::Lifecycle(LifecyclePhase::Disconnecting),
        "events_api" => parse_events_api(envelope.payload.unwrap_or_default()),
        "slash_commands" => parse_slash_command(envelope.payload.unwrap_or_default()),
        "interactive" => EventKind::Interactive,
        other => EventKind::Unknown(other.to_string()),
    };

    Ok(match ack {
        Some(handle) => EventEnvelope::with_ack(kind, handle),
        None => EventEnvelope::new(kind),
    })
}

/// The inner callback event of an `events_api` envelope.
fn parse_events_api(payload: serde_json::Value) -> EventKind {
    let Ok(events_payload) = serde_json::from_value::<EventsApiPayload>(payload) else {
        return EventKind::Unknown("events_api (malformed payload)".into());
    };
    let event = events_payload.event;

    let raw = RawMessage {
        text: event.text.unwrap_or_default(),
        author_id: event.user.unwrap_or_default(),
        // DM conversation ids start with 'D' — a platform convention the
        // transport translates into the is_direct boundary fact.
        is_direct: event.channel.as_deref().is_some_and(|c| c.starts_with('D')),
        conversation_id: event.channel.unwrap_or_default(),
        author_is_bot: event.bot_id.is_some() || event.subtype.as_deref() == Some("bot_message"),
    };

    match event.kind.as_str() {
        "message" => EventKind::Message(raw),
        "app_mention" => EventKind::Mention(raw),
        other => EventKind::Unknown(format!("events_api:{other}")),
    }
}

fn parse_slash_command(payload: serde_json::Value) -> EventKind {
    let Ok(cmd) = serde_json::from_value::<SlashPayload>(payload) else {
        return EventKind::Unknown("slash_commands (malformed payload)".into());
    };

    EventKind::SlashCommand(SlashCommandEvent {
        command: cmd.command,
        text: cmd.text,
        author_id: cmd.user_id,
        conversation_id: cmd.channel_id,
    })
}

// --- Slack API types ---

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    event: InnerEvent,
}

#[derive(Debug, Deserialize)]
struct InnerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlashPayload {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    channel_id: String,
}
