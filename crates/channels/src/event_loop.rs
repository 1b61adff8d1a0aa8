//! The event loop — one long-lived dispatcher per platform.
//!
//! Reads tagged events from a transport, acknowledges each one immediately
//! upon dispatch (acknowledgement is independent of processing outcome),
//! normalizes and filters chat messages, consults the provider chain, and
//! hands replies to the delivery client. Events are handled to completion,
//! one at a time, in platform delivery order.
//!
//! The loop must never die to an event: unknown kinds are acknowledged and
//! ignored, generator problems end in the static fallback, and delivery
//! problems end in a log line. The only way out is the process-wide
//! cancellation token (or the transport closing the stream).

use std::sync::Arc;

use kitbot_core::transport::{EventEnvelope, EventKind, LifecyclePhase, SlashCommandEvent};
use kitbot_core::{Normalizer, RawMessage, Transport};
use kitbot_providers::ProviderChain;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::DeliveryClient;
use crate::slash::{self, SlashAction};

/// Where the loop currently is. Tracked for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Connected,
    Processing,
    ShuttingDown,
}

/// A long-running dispatcher for one platform connection.
pub struct EventLoop {
    platform: String,
    transport: Arc<dyn Transport>,
    chain: Arc<ProviderChain>,
    delivery: DeliveryClient,
    normalizer: Normalizer,
    shutdown: CancellationToken,
    state: LoopState,
}

impl EventLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        chain: Arc<ProviderChain>,
        delivery: DeliveryClient,
        normalizer: Normalizer,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            platform: transport.name().to_string(),
            transport,
            chain,
            delivery,
            normalizer,
            shutdown,
            state: LoopState::Idle,
        }
    }

    /// Consume events until cancellation or stream end.
    ///
    /// Cancellation is only observed between events, so whatever is
    /// in-flight finishes before the loop winds down.
    pub async fn run(mut self, mut events: mpsc::Receiver<EventEnvelope>) {
        self.transition(LoopState::Connecting);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(platform = %self.platform, "Shutdown requested, stopping event loop");
                    break;
                }
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(envelope) => self.handle(envelope).await,
                        None => {
                            warn!(platform = %self.platform, "Event stream closed");
                            break;
                        }
                    }
                }
            }
        }

        self.transition(LoopState::ShuttingDown);
    }

    fn transition(&mut self, to: LoopState) {
        debug!(platform = %self.platform, from = ?self.state, to = ?to, "Loop state change");
        self.state = to;
    }

    async fn handle(&mut self, envelope: EventEnvelope) {
        // Ack first, whatever the event turns out to be. The platform must
        // not redeliver just because processing is slow or fails.
        if let Some(handle) = &envelope.ack {
            if let Err(e) = self.transport.ack(handle).await {
                warn!(platform = %self.platform, error = %e, "Failed to ack event");
            }
        }

        match envelope.kind {
            EventKind::Lifecycle(phase) => self.handle_lifecycle(phase),
            EventKind::Message(raw) | EventKind::Mention(raw) => {
                self.transition(LoopState::Processing);
                self.handle_message(raw).await;
                self.transition(LoopState::Connected);
            }
            EventKind::SlashCommand(cmd) => {
                self.transition(LoopState::Processing);
                self.handle_slash_command(cmd).await;
                self.transition(LoopState::Connected);
            }
            EventKind::Interactive => {
                debug!(platform = %self.platform, "Interactive event acknowledged and ignored");
            }
            EventKind::Unknown(kind) => {
                debug!(
                    platform = %self.platform,
                    kind = %kind,
                    "Unhandled event kind acknowledged and ignored"
                );
            }
        }
    }

    fn handle_lifecycle(&mut self, phase: LifecyclePhase) {
        match phase {
            LifecyclePhase::Connecting => self.transition(LoopState::Connecting),
            LifecyclePhase::Connected => {
                info!(platform = %self.platform, "Connected");
                self.transition(LoopState::Connected);
            }
            LifecyclePhase::ConnectionError(reason) => {
                warn!(platform = %self.platform, reason = %reason, "Connection error");
            }
            LifecyclePhase::Disconnecting => {
                info!(platform = %self.platform, "Platform requested disconnect");
            }
        }
    }

    async fn handle_message(&self, raw: RawMessage) {
        let msg = self.normalizer.normalize(raw);

        if !msg.is_eligible() {
            debug!(
                platform = %self.platform,
                conversation_id = %msg.conversation_id,
                is_self_or_bot = msg.is_self_or_bot,
                is_direct = msg.is_direct,
                is_addressed = msg.is_addressed_to_bot,
                "Message not eligible, skipping"
            );
            return;
        }

        debug!(
            platform = %self.platform,
            conversation_id = %msg.conversation_id,
            "Generating reply"
        );
        let reply = self.chain.respond(&msg.text).await;
        self.delivery.deliver(&msg.conversation_id, &reply).await;
    }

    async fn handle_slash_command(&self, cmd: SlashCommandEvent) {
        info!(
            platform = %self.platform,
            command = %cmd.command,
            conversation_id = %cmd.conversation_id,
            "Slash command received"
        );

        let reply = if cmd.command != "/kit" {
            slash::unknown_command_text(&cmd.command)
        } else {
            match slash::parse(&cmd.text) {
                // The keyword subcommands ride the chain so they share the
                // command handler's canned replies.
                SlashAction::Status => self.chain.respond("status").await,
                SlashAction::Help => self.chain.respond("help").await,
                SlashAction::Version => self.chain.respond("version").await,
                SlashAction::Ask(question) => self.chain.respond(&question).await,
                SlashAction::Usage => slash::usage_text(),
                SlashAction::Unknown(sub) => slash::unknown_subcommand_text(&sub),
            }
        };

        self.delivery.deliver(&cmd.conversation_id, &reply).await;
    }
}
