//! Outbound delivery with bounded retry.
//!
//! Best-effort: failures are retried a fixed number of times with linear
//! backoff, then logged and dropped. No error ever propagates back to the
//! event loop, and nothing is ever sent to the conversation about the
//! failure.
//!
//! Every attempt resends the identical payload with no deduplication token;
//! if the platform delivers-then-times-out, a retry can produce a visible
//! duplicate message. Accepted limitation.

use std::sync::Arc;
use std::time::Duration;

use kitbot_core::Transport;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Sends replies to a conversation, retrying transient failures.
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    /// Override the retry policy (tests use a short backoff unit).
    pub fn with_retry(mut self, max_attempts: u32, backoff_unit: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_unit = backoff_unit;
        self
    }

    /// Deliver `text` to a conversation, best-effort.
    ///
    /// Attempt n (n > 1) is preceded by a sleep of (n-1) backoff units:
    /// linear 0, 1, 2 — deliberately not exponential.
    pub async fn deliver(&self, conversation_id: &str, text: &str) {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff_unit * (attempt - 1)).await;
            }

            match self.transport.post_message(conversation_id, text).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            conversation_id = %conversation_id,
                            attempt,
                            "Message sent after retry"
                        );
                    } else {
                        debug!(conversation_id = %conversation_id, "Message sent");
                    }
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        conversation_id = %conversation_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Failed to send message, retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        conversation_id = %conversation_id,
                        attempts = self.max_attempts,
                        error = %e,
                        "Giving up on message delivery"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kitbot_core::transport::Session;
    use kitbot_core::{AckHandle, TransportError};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Transport stub recording post attempts and their (virtual) times.
    struct FlakyTransport {
        attempts: Mutex<Vec<Instant>>,
        succeed_on: Option<u32>,
    }

    impl FlakyTransport {
        fn failing() -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                succeed_on: None,
            }
        }

        fn succeeding_on(attempt: u32) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                succeed_on: Some(attempt),
            }
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn connect(&self) -> Result<Session, TransportError> {
            Err(TransportError::Connect("not used in tests".into()))
        }

        async fn ack(&self, _handle: &AckHandle) -> Result<(), TransportError> {
            Ok(())
        }

        async fn post_message(
            &self,
            conversation_id: &str,
            _text: &str,
        ) -> Result<(), TransportError> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            let n = attempts.len() as u32;
            if self.succeed_on.is_some_and(|target| n >= target) {
                Ok(())
            } else {
                Err(TransportError::Send {
                    conversation_id: conversation_id.into(),
                    reason: "simulated failure".into(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_exactly_max_attempts_with_linear_backoff() {
        let transport = Arc::new(FlakyTransport::failing());
        let client = DeliveryClient::new(transport.clone())
            .with_retry(3, Duration::from_secs(1));

        let start = Instant::now();
        client.deliver("C1", "hello").await;

        let times = transport.attempt_times();
        assert_eq!(times.len(), 3);
        // Attempts spaced 0, 1, 2 backoff units from each other.
        assert_eq!(times[0] - start, Duration::ZERO);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_after_success() {
        let transport = Arc::new(FlakyTransport::succeeding_on(2));
        let client = DeliveryClient::new(transport.clone())
            .with_retry(3, Duration::from_secs(1));

        client.deliver("C1", "hello").await;
        assert_eq!(transport.attempt_times().len(), 2);
    }

    #[tokio::test]
    async fn first_attempt_success_sends_once() {
        let transport = Arc::new(FlakyTransport::succeeding_on(1));
        let client = DeliveryClient::new(transport.clone());

        client.deliver("C1", "hello").await;
        assert_eq!(transport.attempt_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_does_not_panic_or_propagate() {
        let transport = Arc::new(FlakyTransport::failing());
        let client = DeliveryClient::new(transport).with_retry(3, Duration::from_millis(1));
        // Returns unit; nothing to assert beyond not panicking.
        client.deliver("C1", "hello").await;
    }
}
