use crate::strategy::StrategyKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found,
    NotFound,
    NotActionable,
    EvaluatorError,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Found => "found",
            AttemptOutcome::NotFound => "not_found",
            AttemptOutcome::NotActionable => "not_actionable",
            AttemptOutcome::EvaluatorError => "evaluator_error",
        }
    }
}

/// One evaluated strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub kind: StrategyKind,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
    /// More than one candidate matched and the first/closest was taken.
    #[serde(default)]
    pub ambiguous: bool,
    /// Evaluated ahead of time and discarded because an earlier entry won.
    #[serde(default)]
    pub speculative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Why a step did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every strategy was evaluated and none located an actionable target.
    Exhausted,
    /// The step deadline passed before a strategy succeeded.
    DeadlineExceeded,
    /// The enclosing run was aborted.
    Cancelled,
    /// A target was located but the action did not take.
    ActionFailed { reason: String },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Exhausted => "exhausted",
            FailureReason::DeadlineExceeded => "deadline_exceeded",
            FailureReason::Cancelled => "cancelled",
            FailureReason::ActionFailed { .. } => "action_failed",
        }
    }
}

/// Outcome of evaluating one chain at playback. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub succeeded: bool,
    #[serde(default)]
    pub strategy_used: Option<StrategyKind>,
    #[serde(default)]
    pub attempts_before_success: usize,
    #[serde(default)]
    pub per_attempt_log: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl StepExecutionResult {
    pub fn success(kind: StrategyKind, index: usize, log: Vec<AttemptRecord>) -> Self {
        Self {
            succeeded: true,
            strategy_used: Some(kind),
            attempts_before_success: index,
            per_attempt_log: log,
            failure: None,
        }
    }

    /// Location failed for every strategy tried.
    pub fn not_located(reason: FailureReason, log: Vec<AttemptRecord>) -> Self {
        Self {
            succeeded: false,
            strategy_used: None,
            attempts_before_success: 0,
            per_attempt_log: log,
            failure: Some(reason),
        }
    }

    /// Location succeeded through `kind` but the action did not take.
    pub fn action_failed(
        kind: StrategyKind,
        index: usize,
        reason: String,
        log: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            succeeded: false,
            strategy_used: Some(kind),
            attempts_before_success: index,
            per_attempt_log: log,
            failure: Some(FailureReason::ActionFailed { reason }),
        }
    }

    /// True when a strategy located the target, whether or not the action took.
    pub fn located(&self) -> bool {
        self.strategy_used.is_some()
    }
}

/// One immutable telemetry record: the attempt log of a single playback of
/// a single step, keyed by run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub run_id: String,
    pub recording_id: String,
    pub step_id: String,
    pub timestamp_ms: u64,
    pub result: StepExecutionResult,
}
