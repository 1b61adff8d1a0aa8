//! Static fallback — the terminal generator that cannot fail.
//!
//! Classifies cleaned text by substring into a small set of canned reply
//! categories, with a catch-all for everything else. Evaluated in table
//! order; first match wins.

use kitbot_core::{GeneratorError, GeneratorReply, ResponseGenerator};

/// (any-of keywords, reply) classification table.
const FALLBACK_TABLE: &[(&[&str], &str)] = &[
    (
        &["hello", "hi", "hey"],
        "Hello there! I'm Kit, your AI assistant.\n\
         Try asking me something, or type `help` for available commands.",
    ),
    (
        &["how are you"],
        "I'm doing great, thanks for asking! How are you doing today? \
         Anything I can help you with?",
    ),
    (
        &["what can you do", "capabilities"],
        "Here's what I can do:\n\
         • Answer questions and explain things\n\
         • Help with coding and technical problems\n\
         • Brainstorm and assist with writing\n\
         • General help with work and daily tasks\n\n\
         Just ask me anything!",
    ),
    (
        &["thank"],
        "You're very welcome! Happy to help anytime — feel free to ask me anything else.",
    ),
    (
        &["what day", "what time", "date"],
        "I don't have access to real-time information, but I can help with \
         time-zone questions, date calculations, and calendar queries. \
         For the current time, check your system clock!",
    ),
];

/// Always produces a reply; the chain's totality guarantee rests here.
#[derive(Debug, Default, Clone)]
pub struct StaticFallback;

impl StaticFallback {
    pub fn new() -> Self {
        Self
    }

    /// Classify and reply. Infallible and non-empty by construction.
    pub fn reply(&self, text: &str) -> String {
        let cleaned = text.trim().to_lowercase();

        for (keywords, reply) in FALLBACK_TABLE {
            if keywords.iter().any(|k| cleaned.contains(k)) {
                return (*reply).to_string();
            }
        }

        format!(
            "I heard you say: \"{}\"\n\n\
             I'm Kit, your AI assistant. I can help with questions, \
             conversations, and various tasks — or type `help` to see \
             available commands.",
            text.trim()
        )
    }
}

#[async_trait::async_trait]
impl ResponseGenerator for StaticFallback {
    fn name(&self) -> &str {
        "static"
    }

    async fn respond(&self, text: &str) -> Result<GeneratorReply, GeneratorError> {
        Ok(GeneratorReply::reply(self.reply(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_classified() {
        let reply = StaticFallback::new().reply("hello!");
        assert!(reply.contains("Kit"));
    }

    #[test]
    fn gratitude_classified() {
        let reply = StaticFallback::new().reply("thanks a lot");
        assert!(reply.contains("welcome"));
    }

    #[test]
    fn capability_question_classified() {
        let reply = StaticFallback::new().reply("so what can you do?");
        assert!(reply.contains("Just ask me anything"));
    }

    #[test]
    fn first_matching_category_wins() {
        // "hi, thanks" hits the greeting row before the gratitude row.
        let reply = StaticFallback::new().reply("hi, thanks");
        assert!(reply.contains("Hello there"));
    }

    #[test]
    fn catch_all_echoes_input() {
        let reply = StaticFallback::new().reply("explain monads");
        assert!(reply.contains("explain monads"));
    }

    #[test]
    fn never_empty() {
        for input in ["", "   ", "x", "hello", "thanks"] {
            assert!(!StaticFallback::new().reply(input).trim().is_empty());
        }
    }

    #[tokio::test]
    async fn generator_impl_always_produces() {
        let reply = StaticFallback::new().respond("anything").await.unwrap();
        assert!(reply.is_usable());
    }
}
