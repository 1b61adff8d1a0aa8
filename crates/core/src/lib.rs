//! # kitbot core
//!
//! Domain types, traits, and error definitions for the kitbot chat relay.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod generator;
pub mod message;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GeneratorError, Result, TransportError};
pub use generator::{GeneratorReply, ResponseGenerator};
pub use message::{InboundMessage, Normalizer};
pub use transport::{
    AckHandle, EventEnvelope, EventKind, LifecyclePhase, RawMessage, SlashCommandEvent, Transport,
};
