//! Slash command parsing — the structured `/kit` command surface.
//!
//! Subcommands: `status`, `help`, `version`, `ask <question>`. Anything
//! else gets usage text. The parser is pure; routing happens in the event
//! loop, where `ask` questions go through the same provider chain as chat
//! messages.

/// A parsed `/kit` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashAction {
    Status,
    Help,
    Version,
    Ask(String),
    /// Bare invocation, or `ask` without a question.
    Usage,
    Unknown(String),
}

/// Parse the text following the command name.
pub fn parse(text: &str) -> SlashAction {
    let mut parts = text.split_whitespace();

    let Some(subcommand) = parts.next() else {
        return SlashAction::Usage;
    };

    match subcommand.to_lowercase().as_str() {
        "status" | "health" => SlashAction::Status,
        "help" => SlashAction::Help,
        "version" => SlashAction::Version,
        "ask" => {
            let question = parts.collect::<Vec<_>>().join(" ");
            if question.is_empty() {
                SlashAction::Usage
            } else {
                SlashAction::Ask(question)
            }
        }
        other => SlashAction::Unknown(other.to_string()),
    }
}

/// Usage text for bare or malformed invocations.
pub fn usage_text() -> String {
    "*Kit Slash Commands*\n\n\
     • `/kit status` — check bot health\n\
     • `/kit help` — show help information\n\
     • `/kit version` — show version info\n\
     • `/kit ask [question]` — ask Kit a question\n\n\
     Example: `/kit ask What is Rust?`"
        .to_string()
}

/// Reply for an unrecognized subcommand.
pub fn unknown_subcommand_text(subcommand: &str) -> String {
    format!(
        "Unknown subcommand: `{subcommand}`\n\n{}",
        usage_text()
    )
}

/// Reply for an unrecognized command name entirely.
pub fn unknown_command_text(command: &str) -> String {
    format!("Unknown command: `{command}`")
}
