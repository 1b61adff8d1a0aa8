//! ResponseGenerator trait — the abstraction over reply sources.
//!
//! A generator is given cleaned message text and either produces a reply or
//! defers to the next generator in the chain. Implementations: the built-in
//! command handler, AI provider bindings, and the static fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GeneratorError;

/// The outcome of consulting a single generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorReply {
    /// The reply text. Meaningful only when `produced` is true.
    pub text: String,

    /// False means "no opinion, defer to the next generator" — distinct from
    /// a produced-but-empty reply, which the chain also treats as deferral.
    pub produced: bool,
}

impl GeneratorReply {
    /// A produced reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            produced: true,
        }
    }

    /// Defer to the next generator in the chain.
    pub fn pass() -> Self {
        Self {
            text: String::new(),
            produced: false,
        }
    }

    /// Whether the chain can return this reply to the sender.
    ///
    /// A produced reply with blank text is not usable; an AI provider that
    /// returns an empty completion yields its place in the chain.
    pub fn is_usable(&self) -> bool {
        self.produced && !self.text.trim().is_empty()
    }
}

/// The core ResponseGenerator trait.
///
/// The provider chain calls `respond()` on each generator in priority order
/// without knowing which implementation it is talking to.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// A human-readable name for this generator (e.g., "commands", "claude").
    fn name(&self) -> &str;

    /// Consult this generator with cleaned message text.
    async fn respond(&self, text: &str) -> std::result::Result<GeneratorReply, GeneratorError>;
}
