//! Playback: walk a fallback chain until one strategy locates the target,
//! then perform the recorded action exactly once.

use crate::config::{EvaluationMode, PlaybackConfig};
use crate::evaluators::{EvaluationOutcome, EvaluatorSet, ResolvedTarget};
use crate::session::PageHandle;
use futures::FutureExt;
use futures::future::join_all;
use retrace_common::{
    AttemptRecord, FailureReason, FallbackChain, StepAction, StepExecutionResult, Strategy,
    StrategyKind,
};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Evaluating(usize),
    Succeeded,
    Exhausted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Succeeded | EngineState::Exhausted)
    }

    /// Evaluation only moves forward through the chain; terminal states are final.
    pub fn can_transition_to(&self, next: EngineState) -> bool {
        match (*self, next) {
            (EngineState::Idle, EngineState::Evaluating(_)) => true,
            (EngineState::Idle, EngineState::Exhausted) => true,
            (EngineState::Evaluating(from), EngineState::Evaluating(to)) => to > from,
            (EngineState::Evaluating(_), EngineState::Succeeded | EngineState::Exhausted) => true,
            _ => false,
        }
    }
}

/// Live progress of one step, for callers that display attempts as they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptEvent {
    Started { index: usize, kind: StrategyKind },
    Finished(AttemptRecord),
    ActionDispatched { kind: StrategyKind },
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Aborts the step; in-flight evaluators are dropped.
    pub cancel: CancellationToken,
    pub progress: Option<UnboundedSender<AttemptEvent>>,
}

impl ExecutionOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: UnboundedSender<AttemptEvent>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Bookkeeping for one call to [`DecisionEngine::execute_step_with`].
struct StepRun<'a> {
    state: EngineState,
    log: Vec<AttemptRecord>,
    progress: Option<&'a UnboundedSender<AttemptEvent>>,
}

impl<'a> StepRun<'a> {
    fn new(progress: Option<&'a UnboundedSender<AttemptEvent>>) -> Self {
        Self {
            state: EngineState::Idle,
            log: Vec::new(),
            progress,
        }
    }

    fn transition(&mut self, next: EngineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!("engine state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn emit(&self, event: AttemptEvent) {
        if let Some(tx) = self.progress {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn record(&mut self, record: AttemptRecord) {
        self.emit(AttemptEvent::Finished(record.clone()));
        self.log.push(record);
    }

    fn stop(mut self, reason: FailureReason) -> StepExecutionResult {
        if !self.state.is_terminal() {
            self.transition(EngineState::Exhausted);
        }
        StepExecutionResult::not_located(reason, self.log)
    }
}

/// Result of one bounded evaluator call.
struct Attempt {
    outcome: EvaluationOutcome,
    elapsed: Duration,
}

impl Attempt {
    fn to_record(&self, kind: StrategyKind, speculative: bool) -> AttemptRecord {
        AttemptRecord {
            kind,
            outcome: self.outcome.attempt_outcome(),
            duration_ms: self.elapsed.as_millis() as u64,
            ambiguous: matches!(&self.outcome, EvaluationOutcome::Found(t) if t.ambiguous),
            speculative,
            reason: self.outcome.reason().map(str::to_string),
        }
    }
}

pub struct DecisionEngine {
    evaluators: EvaluatorSet,
    config: PlaybackConfig,
}

impl DecisionEngine {
    pub fn new(evaluators: EvaluatorSet, config: PlaybackConfig) -> Self {
        Self { evaluators, config }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Deadline for a step starting now.
    pub fn deadline_from_now(&self) -> Instant {
        Instant::now() + self.config.step_timeout()
    }

    pub async fn execute_step(
        &self,
        chain: &FallbackChain,
        action: &StepAction,
        page: &PageHandle,
        deadline: Instant,
    ) -> StepExecutionResult {
        self.execute_step_with(chain, action, page, deadline, &ExecutionOptions::default())
            .await
    }

    /// Evaluate `chain` in order and perform `action` through the first
    /// strategy that locates an actionable target.
    ///
    /// Never fails: every outcome, including timeouts and cancellation, is
    /// reported through the returned [`StepExecutionResult`].
    pub async fn execute_step_with(
        &self,
        chain: &FallbackChain,
        action: &StepAction,
        page: &PageHandle,
        deadline: Instant,
        options: &ExecutionOptions,
    ) -> StepExecutionResult {
        let mut run = StepRun::new(options.progress.as_ref());
        let strategies = chain.strategies();
        let mut index = 0;

        while index < strategies.len() {
            if options.cancel.is_cancelled() {
                return run.stop(FailureReason::Cancelled);
            }
            if Instant::now() >= deadline {
                tracing::warn!("Step deadline passed before strategy #{}", index);
                return run.stop(FailureReason::DeadlineExceeded);
            }

            let window = self.window_at(strategies, index);
            run.transition(EngineState::Evaluating(index));
            for (offset, strategy) in strategies[index..index + window].iter().enumerate() {
                run.emit(AttemptEvent::Started {
                    index: index + offset,
                    kind: strategy.kind(),
                });
            }

            let attempts = join_all(
                strategies[index..index + window]
                    .iter()
                    .map(|s| self.attempt(s, page, deadline, &options.cancel)),
            )
            .await;

            let mut winner: Option<(usize, ResolvedTarget)> = None;
            for (offset, attempt) in attempts.into_iter().enumerate() {
                let Some(attempt) = attempt else {
                    tracing::info!("Step cancelled while evaluating strategy #{}", index + offset);
                    return run.stop(FailureReason::Cancelled);
                };
                let kind = strategies[index + offset].kind();
                let record = attempt.to_record(kind, winner.is_some());
                tracing::debug!(
                    "Strategy #{} [{}] -> {} in {}ms",
                    index + offset,
                    kind,
                    record.outcome.as_str(),
                    record.duration_ms
                );
                run.record(record);
                if winner.is_none()
                    && let EvaluationOutcome::Found(target) = attempt.outcome
                {
                    winner = Some((index + offset, target));
                }
            }

            if let Some((win_index, target)) = winner {
                if win_index > index {
                    run.transition(EngineState::Evaluating(win_index));
                }
                return self
                    .finish_located(run, &strategies[win_index], win_index, action, page, &target)
                    .await;
            }

            index += window;
            // Also covers the last window: its budget was cut to the deadline.
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Step deadline exceeded after {} of {} strategies",
                    index,
                    strategies.len()
                );
                return run.stop(FailureReason::DeadlineExceeded);
            }
        }

        tracing::warn!("All {} strategies failed", strategies.len());
        run.stop(FailureReason::Exhausted)
    }

    /// How many strategies starting at `index` are evaluated together.
    fn window_at(&self, strategies: &[Strategy], index: usize) -> usize {
        let EvaluationMode::Speculative { window } = self.config.mode else {
            return 1;
        };
        // OCR holds the screenshot lock and is slow; never run it ahead.
        strategies[index..]
            .iter()
            .take(window.max(1))
            .take_while(|s| s.kind() != StrategyKind::TextOcr)
            .count()
            .max(1)
    }

    /// Run one evaluator under `min(per-kind timeout, remaining deadline)`.
    /// `None` means the step was cancelled.
    async fn attempt(
        &self,
        strategy: &Strategy,
        page: &PageHandle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<Attempt> {
        let kind = strategy.kind();
        let started = Instant::now();
        let Some(evaluator) = self.evaluators.get(kind) else {
            return Some(Attempt {
                outcome: EvaluationOutcome::Error(format!("no evaluator registered for {}", kind)),
                elapsed: Duration::ZERO,
            });
        };

        let budget = self
            .config
            .attempt_timeout(kind)
            .min(deadline.saturating_duration_since(started));
        let evaluation = AssertUnwindSafe(evaluator.evaluate(page, &strategy.locator)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            res = tokio::time::timeout(budget, evaluation) => match res {
                Ok(Ok(Ok(outcome))) => outcome,
                Ok(Ok(Err(e))) => EvaluationOutcome::from(e),
                Ok(Err(_)) => EvaluationOutcome::Error(format!("{} evaluator panicked", kind)),
                Err(_) => EvaluationOutcome::Error(format!("timeout after {}ms", budget.as_millis())),
            },
        };

        Some(Attempt {
            outcome,
            elapsed: started.elapsed(),
        })
    }

    async fn finish_located(
        &self,
        mut run: StepRun<'_>,
        strategy: &Strategy,
        index: usize,
        action: &StepAction,
        page: &PageHandle,
        target: &ResolvedTarget,
    ) -> StepExecutionResult {
        let kind = strategy.kind();
        run.emit(AttemptEvent::ActionDispatched { kind });

        match self.perform(action, page, target, kind).await {
            Ok(()) => {
                tracing::info!(
                    "{} via [{}] at ({:.0},{:.0}) after {} fallback(s)",
                    action.name(),
                    kind,
                    target.point.x,
                    target.point.y,
                    index
                );
                run.transition(EngineState::Succeeded);
                StepExecutionResult::success(kind, index, run.log)
            }
            Err(reason) => {
                tracing::warn!("{} via [{}] failed: {}", action.name(), kind, reason);
                run.transition(EngineState::Exhausted);
                StepExecutionResult::action_failed(kind, index, reason, run.log)
            }
        }
    }

    /// Dispatch the action once. Bounded by the per-kind attempt timeout but
    /// not by the step deadline or cancellation, so input is never cut short
    /// halfway.
    async fn perform(
        &self,
        action: &StepAction,
        page: &PageHandle,
        target: &ResolvedTarget,
        kind: StrategyKind,
    ) -> Result<(), String> {
        let session = page.session();
        let budget = self.config.attempt_timeout(kind);

        let dispatch = async {
            let dispatched = match action {
                StepAction::Click => session.dispatch_click(target.point).await,
                StepAction::Type { text } => {
                    let Some(element) = target.element else {
                        return Err("no element under target to type into".to_string());
                    };
                    session.dispatch_type(element, text).await
                }
                StepAction::Select { value } => {
                    let Some(element) = target.element else {
                        return Err("no element under target to select from".to_string());
                    };
                    session.dispatch_select(element, value).await
                }
            };
            if let Err(e) = dispatched {
                return Err(e.to_string());
            }

            match session.confirm_effect().await {
                Ok(true) => Ok(()),
                Ok(false) => Err("action had no observable effect".to_string()),
                Err(e) => Err(e.to_string()),
            }
        };

        tokio::time::timeout(budget, dispatch)
            .await
            .unwrap_or_else(|_| Err(format!("action timed out after {}ms", budget.as_millis())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use EngineState::*;
        assert!(Idle.can_transition_to(Evaluating(0)));
        assert!(Evaluating(0).can_transition_to(Evaluating(2)));
        assert!(Evaluating(2).can_transition_to(Succeeded));
        assert!(Evaluating(2).can_transition_to(Exhausted));
        assert!(Idle.can_transition_to(Exhausted));

        assert!(!Evaluating(2).can_transition_to(Evaluating(1)));
        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Evaluating(0)));
        assert!(!Exhausted.can_transition_to(Exhausted));
    }

    #[test]
    fn test_terminal_states() {
        assert!(EngineState::Succeeded.is_terminal());
        assert!(EngineState::Exhausted.is_terminal());
        assert!(!EngineState::Evaluating(3).is_terminal());
        assert!(!EngineState::Idle.is_terminal());
    }
}
