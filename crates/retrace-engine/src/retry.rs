//! Re-running a whole chain when the target has not appeared yet.

use crate::config::RetryConfig;
use crate::decision::{DecisionEngine, ExecutionOptions};
use crate::session::PageHandle;
use async_trait::async_trait;
use retrace_common::{FailureReason, RecordedStep, StepExecutionResult};
use std::time::Duration;
use tokio::time::Instant;

/// Time source for retry loops. Tests pause tokio time instead of waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total chain runs, including the first. Zero behaves as one.
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

/// Whether another chain run could change the outcome.
fn is_retryable(result: &StepExecutionResult) -> bool {
    match &result.failure {
        None => false,
        Some(FailureReason::Exhausted | FailureReason::DeadlineExceeded) => true,
        // The action may already have had side effects; higher layers decide.
        Some(FailureReason::ActionFailed { .. }) => false,
        Some(FailureReason::Cancelled) => false,
    }
}

/// Run `step` until it succeeds, its action fails, the run is cancelled, or
/// `policy.max_attempts` runs have been made. Each run gets a fresh
/// `step_timeout` deadline. Returns the result of the last run.
pub async fn execute_with_retry(
    engine: &DecisionEngine,
    step: &RecordedStep,
    page: &PageHandle,
    policy: RetryPolicy,
    clock: &dyn Clock,
    step_timeout: Duration,
    options: &ExecutionOptions,
) -> StepExecutionResult {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let deadline = clock.now() + step_timeout;
        let result = engine
            .execute_step_with(&step.chain, &step.action, page, deadline, options)
            .await;

        if attempt >= max_attempts || !is_retryable(&result) {
            return result;
        }

        tracing::info!(
            "Step {} not located (run {}/{}), retrying in {:?}",
            step.id,
            attempt,
            max_attempts,
            policy.delay
        );

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                return StepExecutionResult::not_located(FailureReason::Cancelled, result.per_attempt_log);
            }
            _ = clock.sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_common::StrategyKind;

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 4,
            delay_ms: 250,
        });
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_millis(250));
        assert_eq!(RetryPolicy::default().max_attempts, 1);
    }

    #[test]
    fn test_only_location_failures_are_retried() {
        let exhausted = StepExecutionResult::not_located(FailureReason::Exhausted, vec![]);
        let late = StepExecutionResult::not_located(FailureReason::DeadlineExceeded, vec![]);
        let cancelled = StepExecutionResult::not_located(FailureReason::Cancelled, vec![]);
        let action = StepExecutionResult::action_failed(
            StrategyKind::CssSelector,
            0,
            "no effect".into(),
            vec![],
        );
        let ok = StepExecutionResult::success(StrategyKind::CssSelector, 0, vec![]);

        assert!(is_retryable(&exhausted));
        assert!(is_retryable(&late));
        assert!(!is_retryable(&cancelled));
        assert!(!is_retryable(&action));
        assert!(!is_retryable(&ok));
    }
}
