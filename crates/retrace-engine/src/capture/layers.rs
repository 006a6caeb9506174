use super::{ActionContext, CaptureError, CaptureLayer, EvidenceFragment};
use crate::evaluators::normalize_text;
use crate::session::{AxNode, ElementDescription, PageHandle, TextDetector};
use async_trait::async_trait;
use retrace_common::{
    AccessibilitySnapshot, DomSnapshot, Point, PointerTrail, Rect, TestIdAttribute, VisibleText,
};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Test-id attributes, in order of preference.
pub const TEST_ID_ATTRIBUTES: &[&str] = &[
    "data-testid",
    "data-test-id",
    "data-test",
    "data-qa",
    "data-cy",
];

/// Element under the action: tag, identifying attributes, and a selector
/// checked for uniqueness at capture time.
pub struct DomLayer {
    page: PageHandle,
}

impl DomLayer {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }
}

#[async_trait]
impl CaptureLayer for DomLayer {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn capture(&self, ctx: &ActionContext) -> Result<Option<EvidenceFragment>, CaptureError> {
        let session = self.page.session();
        let element = match ctx.element {
            Some(el) => Some(el),
            None => session.element_at_point(ctx.point).await?,
        };
        let Some(element) = element else {
            return Ok(None);
        };
        let Some(desc) = session.describe_element(element).await? else {
            return Ok(None);
        };

        let mut snapshot = dom_snapshot(&desc);
        if let Some(selector) = snapshot.css_selector.as_deref() {
            // An invalid generated selector is simply not unique.
            snapshot.css_selector_unique = session
                .query_selector(selector)
                .await
                .map(|matches| matches.len() == 1)
                .unwrap_or(false);
        }

        Ok(Some(EvidenceFragment::Dom(snapshot)))
    }
}

/// Map a live element description onto a snapshot. `css_selector_unique` is
/// left false; the layer checks it against the page.
pub fn dom_snapshot(desc: &ElementDescription) -> DomSnapshot {
    let attr = |key: &str| {
        desc.attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let test_id = TEST_ID_ATTRIBUTES.iter().find_map(|name| {
        attr(name).map(|value| TestIdAttribute {
            attribute: name.to_string(),
            value,
        })
    });
    let classes: Vec<String> = desc
        .attributes
        .get("class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let tag = desc.tag.to_lowercase();
    let id = attr("id");

    let css_selector = desc
        .css_selector
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| generate_selector(&tag, id.as_deref(), &classes));

    DomSnapshot {
        tag,
        id,
        classes,
        name: attr("name"),
        test_id,
        css_selector,
        css_selector_unique: false,
        xpath: desc.xpath.clone(),
        attributes: desc.attributes.clone(),
    }
}

/// `#id` when the id is a plain identifier, otherwise `tag.class1.class2`.
fn generate_selector(tag: &str, id: Option<&str>, classes: &[String]) -> Option<String> {
    if let Some(id) = id
        && is_plain_identifier(id)
    {
        return Some(format!("#{}", id));
    }
    if tag.is_empty() {
        return None;
    }
    let plain: Vec<&str> = classes
        .iter()
        .map(String::as_str)
        .filter(|c| is_plain_identifier(c))
        .collect();
    if plain.is_empty() {
        return Some(tag.to_string());
    }
    Some(format!("{}.{}", tag, plain.join(".")))
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Deepest accessibility node whose bounds contain the action point.
pub struct AccessibilityLayer {
    page: PageHandle,
}

impl AccessibilityLayer {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }
}

#[async_trait]
impl CaptureLayer for AccessibilityLayer {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    async fn capture(&self, ctx: &ActionContext) -> Result<Option<EvidenceFragment>, CaptureError> {
        let tree = self.page.session().accessibility_tree().await?;

        let labelled = |n: &&AxNode| n.role.is_some() || n.name.is_some();

        // Prefer the node the recorder saw. Otherwise nested nodes have
        // smaller boxes, so the smallest container is the deepest one.
        let exact = ctx
            .element
            .and_then(|el| tree.iter().filter(labelled).find(|n| n.element == Some(el)));
        let node = exact.or_else(|| {
            tree.iter()
                .filter(labelled)
                .filter(|n| n.bounds.is_some_and(|b| b.contains(&ctx.point)))
                .min_by(|a, b| {
                    area(a.bounds)
                        .partial_cmp(&area(b.bounds))
                        .unwrap_or(Ordering::Equal)
                })
        });

        Ok(node.map(|n| {
            EvidenceFragment::Accessibility(AccessibilitySnapshot {
                role: n.role.clone(),
                name: n.name.clone(),
                description: n.description.clone(),
            })
        }))
    }
}

fn area(bounds: Option<Rect>) -> f64 {
    bounds.map(|b| b.area()).unwrap_or(f64::INFINITY)
}

/// Visible text near the action, read from a screenshot.
pub struct ScreenTextLayer {
    page: PageHandle,
    detector: Arc<dyn TextDetector>,
    region_px: f64,
    timeout: Duration,
}

impl ScreenTextLayer {
    pub fn new(
        page: PageHandle,
        detector: Arc<dyn TextDetector>,
        region_px: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            page,
            detector,
            region_px,
            timeout,
        }
    }
}

#[async_trait]
impl CaptureLayer for ScreenTextLayer {
    fn name(&self) -> &'static str {
        "screen_text"
    }

    fn timeout_hint(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn capture(&self, ctx: &ActionContext) -> Result<Option<EvidenceFragment>, CaptureError> {
        let shot = self.page.screenshot().await?;
        let detections = self.detector.detect(&shot).await?;

        let scale = if shot.scale > 0.0 { shot.scale } else { 1.0 };
        let region = Rect::new(
            ctx.point.x - self.region_px,
            ctx.point.y - self.region_px,
            self.region_px * 2.0,
            self.region_px * 2.0,
        );

        let mut nearby: Vec<(f64, String, Rect)> = detections
            .iter()
            .filter(|d| !normalize_text(&d.text).is_empty())
            .map(|d| (d.bounds.scaled(1.0 / scale), d))
            .filter(|(bounds, _)| region.contains(&bounds.center()))
            .map(|(bounds, d)| (bounds.distance_to(&ctx.point), d.text.trim().to_string(), bounds))
            .collect();
        nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        Ok(nearby.into_iter().next().map(|(_, text, bounds)| {
            EvidenceFragment::VisibleText(VisibleText {
                text,
                bounds: Some(bounds),
            })
        }))
    }
}

/// The pointer trail the recorder collected, plus the tag at its end.
pub struct PointerTrailLayer {
    page: PageHandle,
}

impl PointerTrailLayer {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }
}

#[async_trait]
impl CaptureLayer for PointerTrailLayer {
    fn name(&self) -> &'static str {
        "pointer_trail"
    }

    async fn capture(&self, ctx: &ActionContext) -> Result<Option<EvidenceFragment>, CaptureError> {
        let Some(last) = ctx.trail.last() else {
            return Ok(None);
        };
        let end: Point = last.point();

        let session = self.page.session();
        let end_tag = match session.element_at_point(end).await? {
            Some(element) => session
                .describe_element(element)
                .await?
                .map(|d| d.tag.to_lowercase()),
            None => None,
        };

        Ok(Some(EvidenceFragment::PointerTrail(PointerTrail {
            samples: ctx.trail.clone(),
            end_tag,
        })))
    }
}
