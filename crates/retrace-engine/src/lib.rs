//! Fallback chain decision engine: turns recorded evidence into ranked
//! relocation strategies and replays them against a live page.

pub mod capture;
pub mod config;
pub mod decision;
pub mod evaluators;
pub mod retry;
pub mod scoring;
pub mod session;
pub mod telemetry;

pub use capture::{ActionContext, CaptureCoordinator, CaptureLayer, EvidenceFragment, record_step};
pub use config::{ConfigLoader, EvaluationMode, PlaybackConfig, RetraceConfig};
pub use decision::{AttemptEvent, DecisionEngine, EngineState, ExecutionOptions};
pub use evaluators::{EvaluationOutcome, Evaluator, EvaluatorSet, ResolvedTarget};
pub use retry::{Clock, RetryPolicy, TokioClock, execute_with_retry};
pub use scoring::{
    ChainBuilder, MAX_CHAIN_LEN, StrategyScorer, WeightTable, build_fallback_chain,
    build_fallback_chain_with,
};
pub use session::{PageHandle, PageSession, SessionError, TextDetector};
pub use telemetry::{
    JsonlTelemetryLog, MemoryTelemetry, RunId, TelemetryReport, TelemetrySink,
};

pub use retrace_common as common;
