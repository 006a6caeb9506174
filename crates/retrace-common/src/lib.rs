pub mod evidence;
pub mod formatter;
pub mod geometry;
pub mod result;
pub mod strategy;

pub use evidence::{
    AccessibilitySnapshot, DomSnapshot, EvidenceRecord, NetworkContext, PointerTrail,
    TestIdAttribute, TrailSample, VisibleText,
};
pub use geometry::{Point, Rect};
pub use result::{AttemptOutcome, AttemptRecord, FailureReason, StepExecutionResult, TelemetryBatch};
pub use strategy::{
    AxQuery, ChainError, EvidenceProfile, FallbackChain, Locator, PointTarget, RecordedStep,
    SelectorTarget, StepAction, Strategy, StrategyKind, TextTarget,
};
