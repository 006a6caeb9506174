//! Record time: gather evidence about one user action from independent
//! layers and turn it into a recorded step.

pub mod coordinator;
pub mod layers;

use crate::session::{DetectError, ElementRef, SessionError};
use async_trait::async_trait;
use retrace_common::{
    AccessibilitySnapshot, DomSnapshot, EvidenceRecord, NetworkContext, Point, PointerTrail,
    TrailSample, VisibleText,
};
use std::time::Duration;
use thiserror::Error;

pub use coordinator::{CaptureCoordinator, record_step};
pub use layers::{AccessibilityLayer, DomLayer, PointerTrailLayer, ScreenTextLayer};

/// What the recorder knows at the moment of the action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionContext {
    pub point: Point,
    /// Pointer samples leading up to the action, oldest first.
    pub trail: Vec<TrailSample>,
    /// The element the recorder saw receive the event, if any.
    pub element: Option<ElementRef>,
}

impl ActionContext {
    pub fn at(point: Point) -> Self {
        Self {
            point,
            trail: Vec::new(),
            element: None,
        }
    }
}

/// One layer's contribution to an [`EvidenceRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceFragment {
    Dom(DomSnapshot),
    Accessibility(AccessibilitySnapshot),
    VisibleText(VisibleText),
    PointerTrail(PointerTrail),
    Network(NetworkContext),
}

impl EvidenceFragment {
    pub fn merge_into(self, record: &mut EvidenceRecord) {
        match self {
            EvidenceFragment::Dom(dom) => record.dom = Some(dom),
            EvidenceFragment::Accessibility(ax) => record.accessibility = Some(ax),
            EvidenceFragment::VisibleText(text) => record.visible_text = Some(text),
            EvidenceFragment::PointerTrail(trail) => record.pointer_trail = Some(trail),
            EvidenceFragment::Network(net) => record.network = Some(net),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error("Capture failed: {0}")]
    Other(String),
}

/// One independent source of evidence.
///
/// `Ok(None)` means the layer ran but had nothing to say (no element under
/// the point, no text nearby).
#[async_trait]
pub trait CaptureLayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Layer-specific timeout; the coordinator default applies when `None`.
    fn timeout_hint(&self) -> Option<Duration> {
        None
    }

    async fn capture(&self, ctx: &ActionContext) -> Result<Option<EvidenceFragment>, CaptureError>;
}
