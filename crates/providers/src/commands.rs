//! Built-in command handler.
//!
//! Keyword-exact commands answered locally, before any AI provider is
//! consulted — a command must never turn into a paid external call. The
//! vocabulary is a declarative table of (matcher, reply) pairs evaluated in
//! order: exact matches first, then substring matches, first match wins.

use async_trait::async_trait;
use chrono::Utc;
use kitbot_core::{GeneratorError, GeneratorReply, ResponseGenerator};

/// How a table entry matches cleaned input.
enum Matcher {
    /// The whole (trimmed, lowercased) input equals one of these words.
    Exact(&'static [&'static str]),
    /// The input contains this substring.
    Contains(&'static str),
}

/// Which canned reply a table entry produces.
enum Canned {
    Status,
    Help,
    Version,
}

/// Exact entries precede substring entries; order within the table is the
/// tie-break rule.
const COMMAND_TABLE: &[(Matcher, Canned)] = &[
    (Matcher::Exact(&["status", "health"]), Canned::Status),
    (Matcher::Exact(&["help", "commands"]), Canned::Help),
    (Matcher::Contains("version"), Canned::Version),
];

/// Answers the fixed command vocabulary; defers everything else.
pub struct CommandHandler {
    started_at: String,
    engine_label: String,
}

impl CommandHandler {
    /// `engines` are the AI provider names active in this process, in
    /// chain order; they only affect the status report.
    pub fn new(engines: &[&str]) -> Self {
        let engine_label = if engines.is_empty() {
            "offline (static replies only)".to_string()
        } else {
            format!("online ({})", engines.join(", "))
        };

        Self {
            started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            engine_label,
        }
    }

    pub fn status_text(&self) -> String {
        format!(
            "*Kit Status Report*\n\
             • Bot: online and connected\n\
             • AI engine: {}\n\
             • Started: {}\n\
             • Ready to help!",
            self.engine_label, self.started_at
        )
    }

    pub fn help_text(&self) -> String {
        "*Kit Commands*\n\n\
         Message commands:\n\
         • `status` — check bot health\n\
         • `help` — show this help message\n\
         • `version` — show version info\n\n\
         Slash commands:\n\
         • `/kit status` — check bot health\n\
         • `/kit help` — show help\n\
         • `/kit version` — show version info\n\
         • `/kit ask [question]` — ask Kit anything\n\n\
         Send me a direct message, or mention me in a channel, and I'll answer."
            .to_string()
    }

    pub fn version_text(&self) -> String {
        format!(
            "*Kit v{}*\n\
             • Multi-platform: Slack + Discord\n\
             • AI engine: {}",
            env!("CARGO_PKG_VERSION"),
            self.engine_label
        )
    }

    fn canned_reply(&self, canned: &Canned) -> String {
        match canned {
            Canned::Status => self.status_text(),
            Canned::Help => self.help_text(),
            Canned::Version => self.version_text(),
        }
    }

    /// Look up a command reply without going through the generator trait.
    pub fn lookup(&self, text: &str) -> Option<String> {
        let cleaned = text.trim().to_lowercase();
        if cleaned.is_empty() {
            return None;
        }

        for (matcher, canned) in COMMAND_TABLE {
            let hit = match matcher {
                Matcher::Exact(words) => words.contains(&cleaned.as_str()),
                Matcher::Contains(needle) => cleaned.contains(needle),
            };
            if hit {
                return Some(self.canned_reply(canned));
            }
        }

        None
    }
}

#[async_trait]
impl ResponseGenerator for CommandHandler {
    fn name(&self) -> &str {
        "commands"
    }

    async fn respond(&self, text: &str) -> Result<GeneratorReply, GeneratorError> {
        match self.lookup(text) {
            Some(reply) => Ok(GeneratorReply::reply(reply)),
            None => Ok(GeneratorReply::pass()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CommandHandler {
        CommandHandler::new(&["gemini"])
    }

    #[tokio::test]
    async fn status_and_health_are_equivalent() {
        let h = handler();
        let a = h.respond("status").await.unwrap();
        let b = h.respond("health").await.unwrap();
        assert!(a.is_usable());
        assert_eq!(a.text, b.text);
        assert!(a.text.contains("gemini"));
    }

    #[tokio::test]
    async fn help_and_commands_are_equivalent() {
        let h = handler();
        let a = h.respond("help").await.unwrap();
        let b = h.respond("commands").await.unwrap();
        assert_eq!(a.text, b.text);
        assert!(a.text.contains("/kit ask"));
    }

    #[tokio::test]
    async fn version_matches_as_substring() {
        let h = handler();
        let reply = h.respond("what version are you running?").await.unwrap();
        assert!(reply.is_usable());
        assert!(reply.text.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn matching_is_case_insensitive_and_trimmed() {
        let h = handler();
        assert!(h.respond("  STATUS  ").await.unwrap().is_usable());
    }

    #[tokio::test]
    async fn unrecognized_text_passes() {
        let h = handler();
        let reply = h.respond("tell me a joke").await.unwrap();
        assert!(!reply.produced);
    }

    #[tokio::test]
    async fn empty_text_passes() {
        let h = handler();
        assert!(!h.respond("   ").await.unwrap().produced);
    }

    #[test]
    fn offline_engine_label() {
        let h = CommandHandler::new(&[]);
        assert!(h.status_text().contains("offline"));
    }
}
