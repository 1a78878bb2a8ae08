//! Tiered fallback controller.
//!
//! Drives one logical operation across the provider tier table. Escalatable
//! failures move to the next tier without consuming the attempt budget;
//! everything else retries in place until the budget (3 attempts total) runs
//! out. Tier escalation is monotonic within one call and every escalation
//! emits a tracing event for diagnostics.
//!
//! Backoff sleeps are plain delays, not exponential: a fixed pause on
//! escalation and a pause proportional to consumed attempts on same-tier
//! retries. Both race the caller's cancellation token; a cancellation is
//! surfaced as [`FallbackError::Cancelled`], never treated as retryable.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::TierConfig;
use crate::ports::ModelError;

use super::failure::FailureKind;

/// Retry/escalation budget knobs.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    /// Total consumed attempts across all tiers (escalations are free).
    pub max_attempts: u32,
    /// Fixed pause before trying the next tier.
    pub escalation_backoff: Duration,
    /// Base pause before a same-tier retry, multiplied by consumed attempts.
    pub retry_backoff: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            escalation_backoff: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Terminal failure of a fallback run.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// Every tier and attempt was spent; the caller should degrade.
    #[error(
        "all providers exhausted after {attempts} attempts (last tier {tier}, {kind:?}): {source}"
    )]
    Exhausted {
        /// Last tier tried.
        tier: u8,
        /// Consumed attempts.
        attempts: u32,
        /// Classification of the last failure.
        kind: FailureKind,
        /// The last underlying error.
        #[source]
        source: ModelError,
    },

    /// The caller cancelled the run.
    #[error("cancelled")]
    Cancelled,
}

/// State machine over (tier, consumed attempts).
#[derive(Debug, Clone)]
pub struct TieredFallback {
    tiers: Vec<TierConfig>,
    policy: FallbackPolicy,
}

impl TieredFallback {
    /// Creates a controller over an ordered tier table with the default
    /// policy.
    ///
    /// # Panics
    ///
    /// Panics if `tiers` is empty; a controller with nothing to dispatch to
    /// is a configuration error.
    pub fn new(tiers: Vec<TierConfig>) -> Self {
        assert!(!tiers.is_empty(), "tier table must not be empty");
        Self {
            tiers,
            policy: FallbackPolicy::default(),
        }
    }

    /// Overrides the retry/escalation policy.
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured tier table.
    pub fn tiers(&self) -> &[TierConfig] {
        &self.tiers
    }

    /// Runs `op` against tiers in order until success, cancellation, or an
    /// exhausted budget.
    pub async fn run<'a, T>(
        &'a self,
        cancel: &CancellationToken,
        mut op: impl FnMut(&'a TierConfig) -> BoxFuture<'a, Result<T, ModelError>>,
    ) -> Result<T, FallbackError> {
        let mut tier_idx = 0usize;
        let mut attempts_used = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FallbackError::Cancelled);
            }

            let tier = &self.tiers[tier_idx];
            match op(tier).await {
                Ok(value) => return Ok(value),
                Err(ModelError::Cancelled) => return Err(FallbackError::Cancelled),
                Err(err) => {
                    let kind = FailureKind::of(&err);

                    if kind.should_escalate() && tier_idx + 1 < self.tiers.len() {
                        // Escalations never consume an attempt.
                        tracing::warn!(
                            tier = tier.tier,
                            next_tier = self.tiers[tier_idx + 1].tier,
                            kind = ?kind,
                            error = %err,
                            "escalating to fallback tier"
                        );
                        tier_idx += 1;
                        self.backoff(self.policy.escalation_backoff, cancel).await?;
                    } else {
                        attempts_used += 1;
                        if attempts_used >= self.policy.max_attempts {
                            tracing::error!(
                                tier = tier.tier,
                                kind = ?kind,
                                attempts = attempts_used,
                                error = %err,
                                "all providers exhausted"
                            );
                            return Err(FallbackError::Exhausted {
                                tier: tier.tier,
                                attempts: attempts_used,
                                kind,
                                source: err,
                            });
                        }
                        tracing::debug!(
                            tier = tier.tier,
                            kind = ?kind,
                            attempt = attempts_used,
                            "retrying at same tier"
                        );
                        self.backoff(self.policy.retry_backoff * attempts_used, cancel)
                            .await?;
                    }
                }
            }
        }
    }

    /// Sleeps unless the caller cancels first.
    async fn backoff(
        &self,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), FallbackError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FallbackError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_tier_table, ProviderId};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn rate_limited() -> ModelError {
        ModelError::upstream(429, "rate limit exceeded")
    }

    #[test]
    #[should_panic(expected = "tier table must not be empty")]
    fn empty_tier_table_is_rejected_at_construction() {
        TieredFallback::new(Vec::new());
    }

    #[tokio::test(start_paused = true)]
    async fn escalates_through_tiers_without_consuming_attempts() {
        let controller = TieredFallback::new(default_tier_table());
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let tiers_seen = Mutex::new(Vec::new());

        let result = controller
            .run(&cancel, |tier| {
                calls.fetch_add(1, Ordering::SeqCst);
                tiers_seen.lock().unwrap().push(tier.tier);
                async move {
                    if tier.tier < 2 {
                        Err(rate_limited())
                    } else {
                        Ok(format!("answer from {}", tier.model))
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(result, "answer from llama-3.1-8b-instant");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*tiers_seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_errors_retry_in_place_then_surface() {
        let controller = TieredFallback::new(default_tier_table());
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let tiers_seen = Mutex::new(Vec::new());

        let result: Result<(), _> = controller
            .run(&cancel, |tier| {
                calls.fetch_add(1, Ordering::SeqCst);
                tiers_seen.lock().unwrap().push(tier.tier);
                async { Err(ModelError::parse("something odd")) }.boxed()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*tiers_seen.lock().unwrap(), vec![0, 0, 0]);
        match result.unwrap_err() {
            FallbackError::Exhausted {
                tier,
                attempts,
                kind,
                ..
            } => {
                assert_eq!(tier, 0);
                assert_eq!(attempts, 3);
                assert_eq!(kind, FailureKind::Unknown);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn escalatable_error_at_top_tier_consumes_attempts() {
        let table = vec![crate::config::TierConfig::new(
            0,
            ProviderId::Gateway,
            "llama-3.1-8b-instant",
            2048,
        )];
        let controller = TieredFallback::new(table);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = controller
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }.boxed()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            FallbackError::Exhausted { kind, .. } => assert_eq!(kind, FailureKind::RateLimited),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_makes_no_calls() {
        let controller = TieredFallback::new(default_tier_table());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = controller
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }.boxed()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result.unwrap_err(), FallbackError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_operation_is_never_retried() {
        let controller = TieredFallback::new(default_tier_table());
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = controller
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ModelError::Cancelled) }.boxed()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), FallbackError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts_the_run() {
        let controller = TieredFallback::new(default_tier_table());
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let cancel_clone = cancel.clone();
        let run = controller.run(&cancel, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // Cancel while the controller sits in the escalation backoff.
                cancel_clone.cancel();
            }
            async { Err::<(), _>(rate_limited()) }.boxed()
        });

        let result = run.await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), FallbackError::Cancelled));
    }
}
