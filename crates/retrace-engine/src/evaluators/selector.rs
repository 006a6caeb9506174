use super::actionability::{self, Actionability};
use super::{EvaluationOutcome, Evaluator, ResolvedTarget};
use crate::session::{PageHandle, SessionError};
use async_trait::async_trait;
use retrace_common::Locator;

/// Resolves `dom_selector` and `css_selector` strategies.
///
/// Multiple matches take the first in document order and flag the ambiguity.
pub struct SelectorEvaluator;

#[async_trait]
impl Evaluator for SelectorEvaluator {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        let target = match locator {
            Locator::DomSelector(t) | Locator::CssSelector(t) => t,
            other => {
                return Ok(EvaluationOutcome::Error(format!(
                    "selector evaluator cannot handle {}",
                    other.kind()
                )));
            }
        };

        let session = page.session();
        let matches = match session.query_selector(&target.selector).await {
            Ok(m) => m,
            Err(SessionError::InvalidSelector(reason)) => {
                return Ok(EvaluationOutcome::Error(format!(
                    "invalid selector {:?}: {}",
                    target.selector, reason
                )));
            }
            Err(e) => return Err(e),
        };

        let Some(first) = matches.first().copied() else {
            return Ok(EvaluationOutcome::NotFound);
        };
        let ambiguous = matches.len() > 1;
        if ambiguous {
            tracing::debug!(
                "Selector {:?} matched {} elements, taking the first",
                target.selector,
                matches.len()
            );
        }

        Ok(match actionability::check(session, first).await? {
            Actionability::Actionable(point) => EvaluationOutcome::Found(ResolvedTarget {
                point,
                element: Some(first),
                ambiguous,
            }),
            Actionability::Blocked(reason) => EvaluationOutcome::NotActionable(reason),
        })
    }
}
