#![allow(dead_code)]

use async_trait::async_trait;
use retrace_common::{
    AccessibilitySnapshot, DomSnapshot, EvidenceRecord, NetworkContext, Point, PointerTrail, Rect,
    TestIdAttribute, TrailSample, VisibleText,
};
use retrace_engine::evaluators::{EvaluationOutcome, Evaluator, ResolvedTarget};
use retrace_engine::session::{
    AxNode, DetectError, DetectedText, ElementDescription, ElementRef, ElementState, PageHandle,
    PageSession, Screenshot, SessionError, TextDetector, Viewport,
};
use retrace_common::Locator;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory page. Tests fill in exactly what they need.
pub struct FakePage {
    pub viewport: Viewport,
    pub elements: HashMap<ElementRef, ElementDescription>,
    pub states: HashMap<ElementRef, ElementState>,
    pub selectors: HashMap<String, Vec<ElementRef>>,
    pub ax_tree: Vec<AxNode>,
    /// Element covering everything else, for obstruction tests.
    pub overlay: Option<ElementRef>,
    pub effect: bool,
    pub dispatch_error: Option<String>,
    pub screenshot_scale: f64,
    pub clicks: Mutex<Vec<Point>>,
    pub typed: Mutex<Vec<(ElementRef, String)>>,
    pub selected: Mutex<Vec<(ElementRef, String)>>,
    pub screenshots: AtomicUsize,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            viewport: Viewport {
                width: 1280.0,
                height: 800.0,
            },
            elements: HashMap::new(),
            states: HashMap::new(),
            selectors: HashMap::new(),
            ax_tree: Vec::new(),
            overlay: None,
            effect: true,
            dispatch_error: None,
            screenshot_scale: 1.0,
            clicks: Mutex::new(Vec::new()),
            typed: Mutex::new(Vec::new()),
            selected: Mutex::new(Vec::new()),
            screenshots: AtomicUsize::new(0),
        }
    }
}

impl FakePage {
    pub fn with_element(
        mut self,
        id: u32,
        tag: &str,
        rect: Rect,
        attrs: &[(&str, &str)],
    ) -> Self {
        let element = ElementRef(id);
        self.elements.insert(
            element,
            ElementDescription {
                element,
                tag: tag.to_string(),
                attributes: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
                rect,
                css_selector: None,
                xpath: None,
            },
        );
        self
    }

    pub fn with_selector(mut self, selector: &str, ids: &[u32]) -> Self {
        self.selectors
            .insert(selector.to_string(), ids.iter().map(|i| ElementRef(*i)).collect());
        self
    }

    pub fn with_ax(mut self, role: &str, name: &str, id: u32) -> Self {
        self.ax_tree.push(AxNode {
            role: Some(role.to_string()),
            name: Some(name.to_string()),
            description: None,
            element: Some(ElementRef(id)),
            bounds: self.elements.get(&ElementRef(id)).map(|d| d.rect),
        });
        self
    }

    pub fn with_state(mut self, id: u32, state: ElementState) -> Self {
        self.states.insert(ElementRef(id), state);
        self
    }

    pub fn handle(self) -> (Arc<FakePage>, PageHandle) {
        let page = Arc::new(self);
        let handle = PageHandle::new(page.clone());
        (page, handle)
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn typed(&self) -> Vec<(ElementRef, String)> {
        self.typed.lock().unwrap().clone()
    }

    fn topmost_at(&self, point: Point) -> Option<ElementRef> {
        if let Some(overlay) = self.overlay {
            return Some(overlay);
        }
        self.elements
            .values()
            .filter(|d| d.rect.contains(&point))
            .min_by(|a, b| a.rect.area().partial_cmp(&b.rect.area()).unwrap())
            .map(|d| d.element)
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementRef>, SessionError> {
        if selector.starts_with('!') {
            return Err(SessionError::InvalidSelector(selector.to_string()));
        }
        Ok(self.selectors.get(selector).cloned().unwrap_or_default())
    }

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>, SessionError> {
        Ok(self.ax_tree.clone())
    }

    async fn capture_screenshot(&self) -> Result<Screenshot, SessionError> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(Screenshot {
            png: Vec::new(),
            width: (self.viewport.width * self.screenshot_scale) as u32,
            height: (self.viewport.height * self.screenshot_scale) as u32,
            scale: self.screenshot_scale,
        })
    }

    async fn viewport(&self) -> Result<Viewport, SessionError> {
        Ok(self.viewport)
    }

    async fn bounding_box(&self, element: ElementRef) -> Result<Option<Rect>, SessionError> {
        Ok(self.elements.get(&element).map(|d| d.rect))
    }

    async fn element_state(&self, element: ElementRef) -> Result<ElementState, SessionError> {
        Ok(self.states.get(&element).copied().unwrap_or(ElementState {
            attached: self.elements.contains_key(&element),
            visible: true,
            enabled: true,
        }))
    }

    async fn hit_test(&self, element: ElementRef, point: Point) -> Result<bool, SessionError> {
        Ok(self.topmost_at(point) == Some(element))
    }

    async fn element_at_point(&self, point: Point) -> Result<Option<ElementRef>, SessionError> {
        Ok(self.topmost_at(point))
    }

    async fn describe_element(
        &self,
        element: ElementRef,
    ) -> Result<Option<ElementDescription>, SessionError> {
        Ok(self.elements.get(&element).cloned())
    }

    async fn elements_near(
        &self,
        point: Point,
        radius: f64,
    ) -> Result<Vec<ElementDescription>, SessionError> {
        let mut near: Vec<ElementDescription> = self
            .elements
            .values()
            .filter(|d| d.rect.distance_to(&point) <= radius)
            .cloned()
            .collect();
        near.sort_by_key(|d| d.element.0);
        Ok(near)
    }

    async fn dispatch_click(&self, point: Point) -> Result<(), SessionError> {
        if let Some(e) = &self.dispatch_error {
            return Err(SessionError::Dispatch(e.clone()));
        }
        self.clicks.lock().unwrap().push(point);
        Ok(())
    }

    async fn dispatch_type(&self, element: ElementRef, text: &str) -> Result<(), SessionError> {
        if let Some(e) = &self.dispatch_error {
            return Err(SessionError::Dispatch(e.clone()));
        }
        self.typed.lock().unwrap().push((element, text.to_string()));
        Ok(())
    }

    async fn dispatch_select(&self, element: ElementRef, value: &str) -> Result<(), SessionError> {
        self.selected.lock().unwrap().push((element, value.to_string()));
        Ok(())
    }

    async fn confirm_effect(&self) -> Result<bool, SessionError> {
        Ok(self.effect)
    }
}

/// Returns a fixed outcome after an optional delay, counting calls.
pub struct ScriptedEvaluator {
    outcome: EvaluationOutcome,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEvaluator {
    pub fn new(outcome: EvaluationOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn found_at(x: f64, y: f64) -> Self {
        Self::new(EvaluationOutcome::Found(ResolvedTarget {
            point: Point::new(x, y),
            element: Some(ElementRef(1)),
            ambiguous: false,
        }))
    }

    pub fn not_found() -> Self {
        Self::new(EvaluationOutcome::NotFound)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _page: &PageHandle,
        _locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.outcome.clone())
    }
}

/// Detector returning fixed boxes.
pub struct FixedDetector(pub Vec<DetectedText>);

#[async_trait]
impl TextDetector for FixedDetector {
    async fn detect(&self, _image: &Screenshot) -> Result<Vec<DetectedText>, DetectError> {
        Ok(self.0.clone())
    }
}

pub fn text(s: &str, x: f64, y: f64, w: f64, h: f64) -> DetectedText {
    DetectedText {
        text: s.to_string(),
        bounds: Rect::new(x, y, w, h),
        confidence: Some(0.9),
    }
}

/// Evidence with every optional field populated, recorded at (120, 340).
pub fn full_evidence() -> EvidenceRecord {
    let raw_point = Point::new(120.0, 340.0);
    let mut evidence = EvidenceRecord::at(raw_point);
    evidence.dom = Some(DomSnapshot {
        tag: "button".into(),
        id: Some("checkout".into()),
        classes: vec!["btn".into(), "btn-primary".into()],
        name: None,
        test_id: Some(TestIdAttribute {
            attribute: "data-testid".into(),
            value: "checkout".into(),
        }),
        css_selector: Some("#checkout".into()),
        css_selector_unique: true,
        xpath: Some("/html/body/form/button".into()),
        attributes: BTreeMap::from([("type".to_string(), "submit".to_string())]),
    });
    evidence.accessibility = Some(AccessibilitySnapshot {
        role: Some("button".into()),
        name: Some("Checkout".into()),
        description: None,
    });
    evidence.visible_text = Some(VisibleText {
        text: "Checkout".into(),
        bounds: Some(Rect::new(90.0, 330.0, 60.0, 20.0)),
    });
    evidence.pointer_trail = Some(PointerTrail {
        samples: vec![
            TrailSample {
                x: 80.0,
                y: 300.0,
                timestamp_ms: 1000,
            },
            TrailSample {
                x: 118.0,
                y: 338.0,
                timestamp_ms: 1120,
            },
        ],
        end_tag: Some("button".into()),
    });
    evidence.network = Some(NetworkContext {
        url: Some("https://shop.test/cart".into()),
        pending_requests: 0,
        idle: true,
    });
    evidence.captured_at_ms = 1_700_000_000_000;
    evidence
}
