use super::{EvaluationOutcome, Evaluator, ResolvedTarget};
use crate::session::{PageHandle, SessionError};
use async_trait::async_trait;
use retrace_common::Locator;

/// Last resort: the recorded point itself. Only checks that the point still
/// lies inside the viewport.
pub struct CoordinatesEvaluator;

#[async_trait]
impl Evaluator for CoordinatesEvaluator {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        let Locator::Coordinates(target) = locator else {
            return Ok(EvaluationOutcome::Error(format!(
                "coordinates evaluator cannot handle {}",
                locator.kind()
            )));
        };

        let session = page.session();
        let viewport = session.viewport().await?;
        if !viewport.contains(&target.point) {
            return Ok(EvaluationOutcome::NotActionable(format!(
                "point ({:.0},{:.0}) outside viewport {:.0}x{:.0}",
                target.point.x, target.point.y, viewport.width, viewport.height
            )));
        }

        // Best effort: typing and selecting need an element under the point.
        let element = session.element_at_point(target.point).await.unwrap_or(None);

        Ok(EvaluationOutcome::Found(ResolvedTarget {
            point: target.point,
            element,
            ambiguous: false,
        }))
    }
}
