//! Transport trait — the boundary to a chat platform.
//!
//! A transport owns the platform connection (WebSocket plus REST) and
//! surfaces a stream of tagged events. The event union is closed and matched
//! exhaustively by the event loop; kinds the relay does not handle are
//! acknowledged and ignored rather than dropped in the transport, so the
//! loop stays forward-compatible with new platform event types.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Opaque per-event acknowledgement handle.
///
/// Slack Socket Mode requires each envelope to be acked by id; platforms
/// without an ack operation deliver events with no handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle(pub String);

/// Connection lifecycle signals surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    Connecting,
    Connected,
    ConnectionError(String),
    Disconnecting,
}

/// A message as the platform delivered it, before normalization.
///
/// `author_is_bot` and `is_direct` are boundary facts supplied by the
/// transport; the core never re-derives them.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub text: String,
    pub author_id: String,
    pub conversation_id: String,
    pub author_is_bot: bool,
    pub is_direct: bool,
}

/// A structured slash command invocation.
#[derive(Debug, Clone)]
pub struct SlashCommandEvent {
    /// The command itself, e.g. `/kit`.
    pub command: String,
    /// Everything after the command, unparsed.
    pub text: String,
    pub author_id: String,
    pub conversation_id: String,
}

/// The closed union of inbound event kinds.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Connection lifecycle signal (no chat payload).
    Lifecycle(LifecyclePhase),
    /// An ordinary message in a channel or DM.
    Message(RawMessage),
    /// A message that the platform classified as mentioning the bot.
    Mention(RawMessage),
    /// A structured slash command.
    SlashCommand(SlashCommandEvent),
    /// An interactive payload (buttons, modals). Acknowledged and ignored.
    Interactive,
    /// Anything the transport did not recognize. Acknowledged and ignored.
    Unknown(String),
}

/// One inbound event plus its acknowledgement handle, if the platform has one.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub ack: Option<AckHandle>,
}

impl EventEnvelope {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, ack: None }
    }

    pub fn with_ack(kind: EventKind, handle: AckHandle) -> Self {
        Self {
            kind,
            ack: Some(handle),
        }
    }
}

/// An established transport session.
pub struct Session {
    /// The bot's own user id on this platform, learned during the handshake.
    pub bot_id: String,

    /// Inbound events in platform delivery order.
    pub events: mpsc::Receiver<EventEnvelope>,
}

/// The core Transport trait.
///
/// Implementations handle platform-specific connection logic and wire
/// formats. The event loop only ever sees [`EventEnvelope`]s.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Platform name (e.g., "slack", "discord").
    fn name(&self) -> &str;

    /// Establish the realtime connection and start reading events.
    ///
    /// Resolves once the platform has confirmed the session and the bot's
    /// identity is known.
    async fn connect(&self) -> std::result::Result<Session, TransportError>;

    /// Acknowledge receipt of an event to the platform.
    async fn ack(&self, handle: &AckHandle) -> std::result::Result<(), TransportError>;

    /// Post a message to a conversation.
    async fn post_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> std::result::Result<(), TransportError>;
}
