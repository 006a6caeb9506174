use super::layers::{AccessibilityLayer, DomLayer, PointerTrailLayer, ScreenTextLayer};
use super::{ActionContext, CaptureLayer};
use crate::config::CaptureConfig;
use crate::scoring::{WeightTable, build_fallback_chain_with};
use crate::session::{PageHandle, TextDetector};
use futures::future::join_all;
use retrace_common::{EvidenceRecord, RecordedStep, StepAction};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fans one action out to every capture layer and assembles whatever came
/// back in time.
pub struct CaptureCoordinator {
    layers: Vec<Arc<dyn CaptureLayer>>,
    default_timeout: Duration,
}

impl CaptureCoordinator {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            layers: Vec::new(),
            default_timeout,
        }
    }

    /// DOM, accessibility, screen text and pointer trail layers over `page`.
    pub fn standard(
        page: PageHandle,
        detector: Arc<dyn TextDetector>,
        config: &CaptureConfig,
    ) -> Self {
        Self::new(Duration::from_millis(config.layer_timeout_ms))
            .with_layer(Arc::new(DomLayer::new(page.clone())))
            .with_layer(Arc::new(AccessibilityLayer::new(page.clone())))
            .with_layer(Arc::new(ScreenTextLayer::new(
                page.clone(),
                detector,
                config.text_region_px,
                Duration::from_millis(config.ocr_layer_timeout_ms),
            )))
            .with_layer(Arc::new(PointerTrailLayer::new(page)))
    }

    pub fn with_layer(mut self, layer: Arc<dyn CaptureLayer>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Run every layer concurrently, each under its own timeout. A failed or
    /// slow layer only leaves its field empty; `raw_point` is always set.
    pub async fn capture(&self, ctx: &ActionContext) -> EvidenceRecord {
        let runs = self.layers.iter().map(|layer| async move {
            let budget = layer.timeout_hint().unwrap_or(self.default_timeout);
            (layer.name(), budget, tokio::time::timeout(budget, layer.capture(ctx)).await)
        });

        let mut record = EvidenceRecord::at(ctx.point);
        record.captured_at_ms = now_ms();

        for (name, budget, outcome) in join_all(runs).await {
            match outcome {
                Ok(Ok(Some(fragment))) => {
                    tracing::debug!("Capture layer {} contributed evidence", name);
                    fragment.merge_into(&mut record);
                }
                Ok(Ok(None)) => tracing::debug!("Capture layer {} had nothing", name),
                Ok(Err(e)) => tracing::warn!("Capture layer {} failed: {}", name, e),
                Err(_) => tracing::warn!(
                    "Capture layer {} timed out after {}ms",
                    name,
                    budget.as_millis()
                ),
            }
        }

        record
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Capture evidence for one action and build its fallback chain.
pub async fn record_step(
    coordinator: &CaptureCoordinator,
    weights: WeightTable,
    action: StepAction,
    ctx: &ActionContext,
) -> (EvidenceRecord, RecordedStep) {
    let evidence = coordinator.capture(ctx).await;
    let chain = build_fallback_chain_with(&evidence, weights);
    let field_name = evidence.dom.as_ref().and_then(|d| d.name.clone());

    tracing::info!(
        "Recorded {} at ({:.0},{:.0}) with {} strategies",
        action.name(),
        ctx.point.x,
        ctx.point.y,
        chain.len()
    );

    let step = RecordedStep {
        id: uuid::Uuid::new_v4().to_string(),
        action,
        chain,
        field_name,
    };
    (evidence, step)
}
