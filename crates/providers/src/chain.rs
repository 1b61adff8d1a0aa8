//! Provider chain — ordered fallback over response generators.
//!
//! Generators are consulted in priority order with a per-call timeout. The
//! first usable reply wins and later generators are never invoked. A
//! generator error or timeout is "no opinion", not a failure: the chain
//! logs a warning and moves on. The terminal static fallback is held
//! outside the ordered list, so `respond` is a total function — every
//! eligible inbound message yields exactly one reply.

use std::sync::Arc;
use std::time::Duration;

use kitbot_core::ResponseGenerator;
use tracing::{debug, info, warn};

use crate::fallback::StaticFallback;

/// Default per-generator timeout.
pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// An immutable ordered fallback chain of response generators.
pub struct ProviderChain {
    entries: Vec<ChainEntry>,
    terminal: StaticFallback,
}

/// A single entry in the chain.
struct ChainEntry {
    generator: Arc<dyn ResponseGenerator>,
    timeout: Duration,
}

impl ProviderChain {
    /// Create a chain with no generators and the given terminal fallback.
    pub fn new(terminal: StaticFallback) -> Self {
        Self {
            entries: Vec::new(),
            terminal,
        }
    }

    /// Append a generator with a custom timeout. Insertion order is fallback
    /// priority.
    pub fn add(mut self, generator: Arc<dyn ResponseGenerator>, timeout: Duration) -> Self {
        self.entries.push(ChainEntry { generator, timeout });
        self
    }

    /// Append a generator with the default timeout.
    pub fn add_default(self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.add(generator, DEFAULT_GENERATOR_TIMEOUT)
    }

    /// Number of generators ahead of the terminal fallback.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only the terminal fallback would answer.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generator names in consultation order (terminal excluded).
    pub fn generator_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.generator.name()).collect()
    }

    /// Produce a reply for cleaned message text.
    ///
    /// Total: always returns non-empty text, whatever the generators do.
    pub async fn respond(&self, text: &str) -> String {
        for (i, entry) in self.entries.iter().enumerate() {
            let name = entry.generator.name();
            debug!(
                generator = %name,
                position = i + 1,
                total = self.entries.len(),
                "Consulting generator"
            );

            match tokio::time::timeout(entry.timeout, entry.generator.respond(text)).await {
                Ok(Ok(reply)) if reply.is_usable() => {
                    info!(generator = %name, "Reply produced");
                    return reply.text;
                }
                Ok(Ok(_)) => {
                    debug!(generator = %name, "Generator passed, trying next");
                }
                Ok(Err(e)) => {
                    warn!(generator = %name, error = %e, "Generator failed, trying next");
                }
                Err(_) => {
                    warn!(
                        generator = %name,
                        timeout_secs = entry.timeout.as_secs(),
                        "Generator timed out, trying next"
                    );
                }
            }
        }

        self.terminal.reply(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kitbot_core::{GeneratorError, GeneratorReply};
    use std::sync::Mutex;

    /// A mock generator that always fails.
    struct FailingGenerator {
        name: String,
        error: GeneratorError,
        call_count: Mutex<usize>,
    }

    impl FailingGenerator {
        fn new(name: &str, error: GeneratorError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ResponseGenerator for FailingGenerator {
        fn name(&self) -> &str {
            &self.name
        }

        async fn respond(&self, _text: &str) -> Result<GeneratorReply, GeneratorError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock generator that always succeeds.
    struct SuccessGenerator {
        name: String,
        reply: String,
        call_count: Mutex<usize>,
    }

    impl SuccessGenerator {
        fn new(name: &str, reply: &str) -> Self {
            Self {
                name: name.into(),
                reply: reply.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ResponseGenerator for SuccessGenerator {
        fn name(&self) -> &str {
            &self.name
        }

        async fn respond(&self, _text: &str) -> Result<GeneratorReply, GeneratorError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(GeneratorReply::reply(self.reply.clone()))
        }
    }

    /// A mock generator that produces an empty reply (AI with no text content).
    struct EmptyGenerator;

    #[async_trait]
    impl ResponseGenerator for EmptyGenerator {
        fn name(&self) -> &str {
            "empty"
        }

        async fn respond(&self, _text: &str) -> Result<GeneratorReply, GeneratorError> {
            Ok(GeneratorReply::reply(""))
        }
    }

    /// A mock generator that hangs forever (for timeout testing).
    struct HangingGenerator;

    #[async_trait]
    impl ResponseGenerator for HangingGenerator {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn respond(&self, _text: &str) -> Result<GeneratorReply, GeneratorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let g1 = Arc::new(SuccessGenerator::new("primary", "from primary"));
        let g2 = Arc::new(SuccessGenerator::new("secondary", "from secondary"));

        let chain = ProviderChain::new(StaticFallback::new())
            .add_default(g1.clone())
            .add_default(g2.clone());

        assert_eq!(chain.respond("hello").await, "from primary");
        assert_eq!(g1.calls(), 1);
        assert_eq!(g2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_through_on_error() {
        let g1 = Arc::new(FailingGenerator::new(
            "primary",
            GeneratorError::Api {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let g2 = Arc::new(SuccessGenerator::new("secondary", "from secondary"));

        let chain = ProviderChain::new(StaticFallback::new())
            .add_default(g1.clone())
            .add_default(g2.clone());

        assert_eq!(chain.respond("hello").await, "from secondary");
        assert_eq!(g1.calls(), 1);
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn empty_produced_reply_defers() {
        let g1 = Arc::new(EmptyGenerator);
        let g2 = Arc::new(SuccessGenerator::new("secondary", "real answer"));

        let chain = ProviderChain::new(StaticFallback::new())
            .add_default(g1)
            .add_default(g2.clone());

        assert_eq!(chain.respond("hello").await, "real answer");
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_falls_through() {
        let g2 = Arc::new(SuccessGenerator::new("secondary", "after timeout"));

        let chain = ProviderChain::new(StaticFallback::new())
            .add(Arc::new(HangingGenerator), Duration::from_millis(50))
            .add_default(g2.clone());

        assert_eq!(chain.respond("hello").await, "after timeout");
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn all_generators_failing_still_yields_text() {
        let g1 = Arc::new(FailingGenerator::new(
            "primary",
            GeneratorError::Network("conn refused".into()),
        ));
        let g2 = Arc::new(FailingGenerator::new(
            "secondary",
            GeneratorError::AuthFailed("bad key".into()),
        ));

        let chain = ProviderChain::new(StaticFallback::new())
            .add_default(g1.clone())
            .add_default(g2.clone());

        let reply = chain.respond("anything at all").await;
        assert!(!reply.trim().is_empty());
        assert_eq!(g1.calls(), 1);
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_still_total() {
        let chain = ProviderChain::new(StaticFallback::new());
        assert!(chain.is_empty());
        assert!(!chain.respond("hello").await.trim().is_empty());
    }

    #[test]
    fn chain_length_and_names() {
        let chain = ProviderChain::new(StaticFallback::new())
            .add_default(Arc::new(SuccessGenerator::new("a", "x")))
            .add_default(Arc::new(SuccessGenerator::new("b", "y")));

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.generator_names(), vec!["a", "b"]);
    }
}
