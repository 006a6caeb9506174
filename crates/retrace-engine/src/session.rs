//! Capabilities the engine needs from the live page.
//!
//! The browser control surface and text detection live outside this crate.
//! Backends implement [`PageSession`]; OCR providers implement
//! [`TextDetector`]. Tests construct fakes per case.

use async_trait::async_trait;
use retrace_common::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Opaque handle to an element in the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub u32);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Page session not ready")]
    NotReady,
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Element {0:?} is no longer attached")]
    Detached(ElementRef),
    #[error("Script error: {0}")]
    Script(String),
    #[error("Input dispatch failed: {0}")]
    Dispatch(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("Session error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Script(e.to_string())
    }
}

/// One node of the accessibility tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxNode {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub element: Option<ElementRef>,
    #[serde(default)]
    pub bounds: Option<Rect>,
}

/// What the DOM knows about one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescription {
    pub element: ElementRef,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub rect: Rect,
    /// A selector generated to address this element, if the backend can.
    #[serde(default)]
    pub css_selector: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn contains(&self, point: &Point) -> bool {
        Rect::new(0.0, 0.0, self.width, self.height).contains(point)
    }
}

/// A viewport capture. `scale` is device pixels per CSS pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// One run of detected text, bounds in screenshot (device) pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedText {
    pub text: String,
    pub bounds: Rect,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The live page, as seen by evaluators and capture layers.
///
/// Reads take `&self` and may run concurrently. Screenshots go through
/// [`PageHandle`], which serializes them per page.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Elements matching `selector`, in document order.
    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementRef>, SessionError>;

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>, SessionError>;

    async fn capture_screenshot(&self) -> Result<Screenshot, SessionError>;

    async fn viewport(&self) -> Result<Viewport, SessionError>;

    /// `None` when the element is no longer in the document.
    async fn bounding_box(&self, element: ElementRef) -> Result<Option<Rect>, SessionError>;

    async fn element_state(&self, element: ElementRef) -> Result<ElementState, SessionError>;

    /// Whether `element` (or one of its descendants) is the topmost element
    /// at `point`.
    async fn hit_test(&self, element: ElementRef, point: Point) -> Result<bool, SessionError>;

    async fn element_at_point(&self, point: Point) -> Result<Option<ElementRef>, SessionError>;

    async fn describe_element(
        &self,
        element: ElementRef,
    ) -> Result<Option<ElementDescription>, SessionError>;

    /// Elements whose bounding box center lies within `radius` of `point`.
    async fn elements_near(
        &self,
        point: Point,
        radius: f64,
    ) -> Result<Vec<ElementDescription>, SessionError>;

    async fn dispatch_click(&self, point: Point) -> Result<(), SessionError>;

    async fn dispatch_type(&self, element: ElementRef, text: &str) -> Result<(), SessionError>;

    async fn dispatch_select(&self, element: ElementRef, value: &str) -> Result<(), SessionError> {
        let _ = (element, value);
        Err(SessionError::NotSupported("dispatch_select".into()))
    }

    /// Whether the last dispatched action had an observable effect.
    /// Backends that cannot tell report `true`.
    async fn confirm_effect(&self) -> Result<bool, SessionError> {
        Ok(true)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectError {
    #[error("No text detector configured")]
    Unavailable,
    #[error("Text detection failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect(&self, image: &Screenshot) -> Result<Vec<DetectedText>, DetectError>;
}

/// Detector used when no OCR provider is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDetector;

#[async_trait]
impl TextDetector for UnavailableDetector {
    async fn detect(&self, _image: &Screenshot) -> Result<Vec<DetectedText>, DetectError> {
        Err(DetectError::Unavailable)
    }
}

/// Shared handle to one page: the session plus a lock that keeps screenshot
/// captures from overlapping.
#[derive(Clone)]
pub struct PageHandle {
    session: Arc<dyn PageSession>,
    screenshot_lock: Arc<Mutex<()>>,
}

impl PageHandle {
    pub fn new(session: Arc<dyn PageSession>) -> Self {
        Self {
            session,
            screenshot_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn session(&self) -> &dyn PageSession {
        self.session.as_ref()
    }

    pub async fn screenshot(&self) -> Result<Screenshot, SessionError> {
        let _guard = self.screenshot_lock.lock().await;
        self.session.capture_screenshot().await
    }
}
