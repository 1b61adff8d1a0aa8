//! Response generator implementations for kitbot.
//!
//! All generators implement the `kitbot_core::ResponseGenerator` trait.
//! [`build_chain`] composes the process-wide chain from configuration:
//! built-in commands first (so commands never reach a paid API call), then
//! the configured AI providers in priority order, then the static fallback
//! that cannot fail to produce.

use std::sync::Arc;

use kitbot_config::AppConfig;
use tracing::info;

pub mod anthropic;
pub mod chain;
pub mod commands;
pub mod fallback;
pub mod gemini;

pub use anthropic::AnthropicProvider;
pub use chain::ProviderChain;
pub use commands::CommandHandler;
pub use fallback::StaticFallback;
pub use gemini::GeminiProvider;

/// The single-turn persona sent to every AI backend.
pub const SYSTEM_PERSONA: &str = "You are Kit, a helpful and friendly AI assistant integrated \
into team chat. Keep responses under 300 words and be professional but approachable.";

/// Build the provider chain from configuration.
///
/// Chain composition is a startup-time topology decision: a provider whose
/// credentials are absent is never constructed, and the resulting chain is
/// immutable for the life of the process.
pub fn build_chain(config: &AppConfig) -> ProviderChain {
    let engines = config.usable_providers();
    let commands = CommandHandler::new(&engines);

    let mut chain = ProviderChain::new(StaticFallback::new()).add_default(Arc::new(commands));

    for name in &engines {
        match *name {
            "anthropic" => {
                let provider = config
                    .providers
                    .anthropic
                    .as_ref()
                    .map(|p| AnthropicProvider::new(&p.api_key, p.model_or(anthropic::DEFAULT_MODEL)));
                if let Some(provider) = provider {
                    info!(model = %provider.model(), "Claude provider joined the chain");
                    chain = chain.add_default(Arc::new(provider));
                }
            }
            "gemini" => {
                let provider = config
                    .providers
                    .gemini
                    .as_ref()
                    .map(|p| GeminiProvider::new(&p.api_key, p.model_or(gemini::DEFAULT_MODEL)));
                if let Some(provider) = provider {
                    info!(model = %provider.model(), "Gemini provider joined the chain");
                    chain = chain.add_default(Arc::new(provider));
                }
            }
            // provider_priority entries are validated at config load time
            _ => {}
        }
    }

    if engines.is_empty() {
        info!("No AI provider configured — running with commands and static replies only");
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitbot_config::{ProviderConfig, ProvidersConfig};

    #[test]
    fn empty_config_builds_commands_only_chain() {
        let chain = build_chain(&AppConfig::default());
        assert_eq!(chain.generator_names(), vec!["commands"]);
    }

    #[test]
    fn providers_join_in_priority_order() {
        let config = AppConfig {
            provider_priority: vec!["anthropic".into(), "gemini".into()],
            providers: ProvidersConfig {
                anthropic: Some(ProviderConfig {
                    api_key: "sk-ant-test".into(),
                    model: None,
                }),
                gemini: Some(ProviderConfig {
                    api_key: "gm-test".into(),
                    model: None,
                }),
            },
            ..AppConfig::default()
        };
        let chain = build_chain(&config);
        assert_eq!(
            chain.generator_names(),
            vec!["commands", "claude", "gemini"]
        );
    }

    #[test]
    fn absent_credentials_never_construct_a_provider() {
        let config = AppConfig {
            providers: ProvidersConfig {
                anthropic: None,
                gemini: Some(ProviderConfig {
                    api_key: "gm-test".into(),
                    model: None,
                }),
            },
            ..AppConfig::default()
        };
        let chain = build_chain(&config);
        assert_eq!(chain.generator_names(), vec!["commands", "gemini"]);
    }
}
