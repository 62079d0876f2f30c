//! Retry policy layered on top of [`MessagingClient`].
//!
//! The client itself never retries. A [`ReconnectSupervisor`] watches the
//! connection-change channel and calls `connect` again after an unrequested
//! disconnect, waiting an exponentially growing, jittered delay.

use std::time::Duration;

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{DisconnectReason, MessagingClient};
use crate::registry::Subscription;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay that may be shaved off at random, `0.0..=1.0`.
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: 0.2,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms.max(self.initial_delay_ms));
        Duration::from_millis(millis)
    }

    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        base.mul_f64(1.0 - jitter * rng.gen::<f64>()).min(base)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Background task reconnecting a client with a fixed token. Supervision
/// ends when the supervisor is stopped or dropped.
#[must_use = "dropping the supervisor stops it immediately"]
pub struct ReconnectSupervisor {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Starts supervising `client`. Must be called inside a Tokio runtime.
    ///
    /// Only `Closed` and `ConnectFailed` disconnects are retried; an explicit
    /// `disconnect()` is respected. The attempt counter resets whenever the
    /// connection comes up.
    pub fn spawn(client: MessagingClient, token: String, policy: ReconnectPolicy) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
        let subscription = client.on_connection_change(move |connected| {
            let _ = tx.send(*connected);
        });

        let task = tokio::spawn(async move {
            let mut attempts = 0u32;
            while let Some(connected) = rx.recv().await {
                if connected {
                    attempts = 0;
                    continue;
                }
                if !retryable(client.last_disconnect()) {
                    continue;
                }
                if policy.exhausted(attempts) {
                    warn!("Giving up reconnecting after {} attempts", attempts);
                    continue;
                }

                let delay = policy.delay(attempts, &mut rand::thread_rng());
                attempts += 1;
                info!("Reconnecting in {:?} (attempt {})", delay, attempts);
                tokio::time::sleep(delay).await;

                if retryable(client.last_disconnect()) {
                    client.connect(&token);
                }
            }
        });

        Self { subscription, task }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        self.task.abort();
    }
}

fn retryable(reason: Option<DisconnectReason>) -> bool {
    matches!(
        reason,
        Some(DisconnectReason::Closed | DisconnectReason::ConnectFailed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    #[test]
    fn base_delay_doubles_then_caps() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: 0.0,
            max_attempts: None,
        };
        let delays: Vec<u64> = (0..6)
            .map(|n| policy.base_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn attempts_cap() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(!policy.exhausted(1));
        assert!(policy.exhausted(2));
        assert!(!ReconnectPolicy {
            max_attempts: None,
            ..ReconnectPolicy::default()
        }
        .exhausted(u32::MAX));
    }

    #[test]
    fn only_unrequested_disconnects_retry() {
        assert!(retryable(Some(DisconnectReason::Closed)));
        assert!(retryable(Some(DisconnectReason::ConnectFailed)));
        assert!(!retryable(Some(DisconnectReason::Requested)));
        assert!(!retryable(None));
    }

    proptest! {
        #[test]
        fn prop_jittered_delay_stays_within_bounds(
            seed in any::<u64>(),
            attempt in 0u32..64,
            initial in 1u64..5_000,
            max in 1u64..120_000,
            jitter in 0.0f64..=1.0,
        ) {
            let policy = ReconnectPolicy {
                initial_delay_ms: initial,
                max_delay_ms: max,
                jitter,
                max_attempts: None,
            };
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let base = policy.base_delay(attempt);
            let delay = policy.delay(attempt, &mut rng);

            prop_assert!(delay <= base);
            let floor = base.mul_f64(1.0 - jitter).saturating_sub(Duration::from_millis(1));
            prop_assert!(delay >= floor);
            prop_assert!(base <= Duration::from_millis(max.max(initial)));
        }
    }
}
