//! `kitbot run` — connect the configured platforms and relay chat.

use std::sync::Arc;

use anyhow::{Context, bail};
use kitbot_channels::{DeliveryClient, DiscordTransport, EventLoop, SlackTransport};
use kitbot_config::AppConfig;
use kitbot_core::{Normalizer, Transport};
use kitbot_providers::{ProviderChain, build_chain};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    // The only fatal class: nothing to connect to. A missing AI key is not
    // fatal — the chain degrades to commands + static replies.
    if !config.has_platform() {
        bail!(
            "No chat platform configured. Set SLACK_BOT_TOKEN/SLACK_APP_TOKEN or \
             DISCORD_BOT_TOKEN (or add [slack]/[discord] to ~/.kitbot/config.toml)."
        );
    }

    let chain = Arc::new(build_chain(&config));

    println!("🤖 kitbot — starting chat relay");
    println!(
        "   Slack:   {}",
        if config.slack.is_some() { "configured" } else { "—" }
    );
    println!(
        "   Discord: {}",
        if config.discord.is_some() { "configured" } else { "—" }
    );
    println!("   Chain:   {} → static", chain_label(&chain));

    let shutdown = CancellationToken::new();
    let mut loops = Vec::new();

    if let Some(slack_config) = config.slack.clone() {
        let transport: Arc<dyn Transport> = Arc::new(SlackTransport::new(slack_config));
        loops.push(start_platform(transport, &chain, &shutdown).await?);
    }

    if let Some(discord_config) = config.discord.clone() {
        let transport: Arc<dyn Transport> = Arc::new(DiscordTransport::new(discord_config));
        loops.push(start_platform(transport, &chain, &shutdown).await?);
    }

    info!("All platforms connected; relaying");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Ctrl-C received, shutting down");
    shutdown.cancel();

    for handle in loops {
        let _ = handle.await;
    }

    Ok(())
}

/// Connect one platform and spawn its event loop.
///
/// A connect failure here is fatal by design: bad credentials or an
/// unreachable platform should stop the process before it pretends to run.
async fn start_platform(
    transport: Arc<dyn Transport>,
    chain: &Arc<ProviderChain>,
    shutdown: &CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let platform = transport.name().to_string();
    let session = transport
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {platform}"))?;
    info!(platform = %platform, bot_id = %session.bot_id, "Platform connected");

    let normalizer = Normalizer::new(session.bot_id.clone());
    let delivery = DeliveryClient::new(transport.clone());
    let event_loop = EventLoop::new(
        transport,
        chain.clone(),
        delivery,
        normalizer,
        shutdown.clone(),
    );

    Ok(tokio::spawn(event_loop.run(session.events)))
}

fn chain_label(chain: &ProviderChain) -> String {
    chain.generator_names().join(" → ")
}
