//! Inbound message normalization.
//!
//! The `Normalizer` converts a platform-supplied [`RawMessage`] into the
//! canonical [`InboundMessage`] the event loop works with: it detects
//! self/bot authorship, detects and strips bot-mention tokens, and carries
//! the platform's direct-message flag through unchanged.

use serde::{Deserialize, Serialize};

use crate::transport::RawMessage;

/// A normalized inbound chat message.
///
/// Ephemeral: created per event, discarded after one response cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message text with all bot-mention tokens stripped and whitespace trimmed.
    pub text: String,

    /// Platform-specific author id.
    pub author_id: String,

    /// Opaque conversation id (channel or DM thread), transport-specific.
    pub conversation_id: String,

    /// Authored by this bot or any bot account.
    pub is_self_or_bot: bool,

    /// The conversation is a one-to-one channel. Supplied by the transport.
    pub is_direct: bool,

    /// The raw text mentioned the bot's own id.
    pub is_addressed_to_bot: bool,
}

impl InboundMessage {
    /// Whether this message warrants a response attempt.
    ///
    /// Self/bot messages are never eligible — responding to them would loop
    /// the bot against itself.
    pub fn is_eligible(&self) -> bool {
        !self.is_self_or_bot && (self.is_direct || self.is_addressed_to_bot)
    }
}

/// Converts raw platform events into [`InboundMessage`]s for one bot identity.
#[derive(Debug, Clone)]
pub struct Normalizer {
    bot_id: String,
}

impl Normalizer {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
        }
    }

    /// The bot identity this normalizer matches mentions against.
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Normalize a raw platform message.
    pub fn normalize(&self, raw: RawMessage) -> InboundMessage {
        let is_self_or_bot = raw.author_is_bot || raw.author_id == self.bot_id;
        let is_addressed_to_bot = self.mentions_bot(&raw.text);
        let text = self.strip_mentions(&raw.text);

        InboundMessage {
            text,
            author_id: raw.author_id,
            conversation_id: raw.conversation_id,
            is_self_or_bot,
            is_direct: raw.is_direct,
            is_addressed_to_bot,
        }
    }

    /// Both mention token forms platforms produce for a user id.
    fn mention_tokens(&self) -> [String; 2] {
        [format!("<@{}>", self.bot_id), format!("<@!{}>", self.bot_id)]
    }

    /// Whether `text` contains a mention token for the bot.
    pub fn mentions_bot(&self, text: &str) -> bool {
        self.mention_tokens().iter().any(|t| text.contains(t))
    }

    /// Remove every occurrence of both bot-mention token forms and trim.
    ///
    /// Idempotent: stripping text already free of tokens is a no-op.
    pub fn strip_mentions(&self, text: &str) -> String {
        let mut clean = text.to_string();
        for token in self.mention_tokens() {
            clean = clean.replace(&token, "");
        }
        clean.trim().to_string()
    }
}
