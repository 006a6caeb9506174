//! Strategy evaluators: resolve one stored strategy against the live page.

pub mod accessibility;
pub mod actionability;
pub mod coordinates;
pub mod evidence;
pub mod selector;
pub mod text_ocr;

use crate::session::{ElementRef, PageHandle, SessionError, TextDetector};
use async_trait::async_trait;
use retrace_common::{AttemptOutcome, Locator, Point, StrategyKind};
use std::collections::HashMap;
use std::sync::Arc;

pub use accessibility::AccessibilityEvaluator;
pub use coordinates::CoordinatesEvaluator;
pub use evidence::EvidenceScoringEvaluator;
pub use selector::SelectorEvaluator;
pub use text_ocr::TextOcrEvaluator;

/// A concrete, actionable target.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub point: Point,
    pub element: Option<ElementRef>,
    /// Several candidates matched; the first/closest one was taken.
    pub ambiguous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Found(ResolvedTarget),
    NotFound,
    NotActionable(String),
    Error(String),
}

impl EvaluationOutcome {
    pub fn attempt_outcome(&self) -> AttemptOutcome {
        match self {
            EvaluationOutcome::Found(_) => AttemptOutcome::Found,
            EvaluationOutcome::NotFound => AttemptOutcome::NotFound,
            EvaluationOutcome::NotActionable(_) => AttemptOutcome::NotActionable,
            EvaluationOutcome::Error(_) => AttemptOutcome::EvaluatorError,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            EvaluationOutcome::NotActionable(r) | EvaluationOutcome::Error(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, EvaluationOutcome::Found(_))
    }
}

impl From<SessionError> for EvaluationOutcome {
    fn from(e: SessionError) -> Self {
        EvaluationOutcome::Error(e.to_string())
    }
}

/// Resolves one kind of [`Locator`].
///
/// Implementations return `Err` for page failures; the decision engine turns
/// those, and timeouts, into [`EvaluationOutcome::Error`].
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError>;
}

/// Evaluator per strategy kind.
#[derive(Clone, Default)]
pub struct EvaluatorSet {
    evaluators: HashMap<StrategyKind, Arc<dyn Evaluator>>,
}

impl EvaluatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in evaluator for every kind.
    pub fn standard(detector: Arc<dyn TextDetector>) -> Self {
        let selector: Arc<dyn Evaluator> = Arc::new(SelectorEvaluator);
        Self::new()
            .with(StrategyKind::DomSelector, selector.clone())
            .with(StrategyKind::CssSelector, selector)
            .with(
                StrategyKind::AccessibilitySemantic,
                Arc::new(AccessibilityEvaluator::semantic()),
            )
            .with(
                StrategyKind::AccessibilityLocator,
                Arc::new(AccessibilityEvaluator::locator()),
            )
            .with(
                StrategyKind::EvidenceScoring,
                Arc::new(EvidenceScoringEvaluator::default()),
            )
            .with(
                StrategyKind::TextOcr,
                Arc::new(TextOcrEvaluator::new(detector)),
            )
            .with(StrategyKind::Coordinates, Arc::new(CoordinatesEvaluator))
    }

    /// Register or replace the evaluator for `kind`.
    pub fn with(mut self, kind: StrategyKind, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.insert(kind, evaluator);
        self
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(&kind).cloned()
    }
}

/// Lowercase and collapse runs of whitespace.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Sign\n  In  "), "sign in");
        assert_eq!(normalize_text("SUBMIT"), "submit");
        assert_eq!(normalize_text("   "), "");
    }
}
