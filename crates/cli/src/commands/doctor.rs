//! `kitbot doctor` — report the configured topology without connecting.

use anyhow::Context;
use kitbot_config::AppConfig;
use kitbot_providers::build_chain;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    println!("🩺 kitbot doctor");
    println!();

    println!("Platforms:");
    println!(
        "  slack    {}",
        if config.slack.is_some() { "✅ configured" } else { "— not configured" }
    );
    println!(
        "  discord  {}",
        if config.discord.is_some() { "✅ configured" } else { "— not configured" }
    );

    println!();
    println!("AI providers (priority order):");
    let usable = config.usable_providers();
    if usable.is_empty() {
        println!("  none — replies come from commands and static fallback only");
    } else {
        for name in &usable {
            println!("  ✅ {name}");
        }
    }

    println!();
    let chain = build_chain(&config);
    println!("Response chain: {} → static", chain.generator_names().join(" → "));

    if !config.has_platform() {
        println!();
        println!("⚠️  No chat platform configured — `kitbot run` will refuse to start.");
    }

    Ok(())
}
