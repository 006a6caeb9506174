use crate::geometry::{Point, Rect};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Attribute maps coming from the page may carry `null` for attributes that
/// were looked up but absent. Those entries are dropped.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: BTreeMap<String, Option<String>> = BTreeMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

/// Everything captured about one user action at record time.
///
/// Only `raw_point` is guaranteed. Every other field is best-effort and is
/// absent when its capture layer failed or timed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub raw_point: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<DomSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilitySnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_text: Option<VisibleText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_trail: Option<PointerTrail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkContext>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub captured_at_ms: u64,
}

impl EvidenceRecord {
    pub fn at(raw_point: Point) -> Self {
        Self {
            raw_point,
            dom: None,
            accessibility: None,
            visible_text: None,
            pointer_trail: None,
            network: None,
            captured_at_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DomSnapshot {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestIdAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    /// Whether `css_selector` matched exactly one element when it was captured.
    #[serde(default)]
    pub css_selector_unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_nullable_string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attributes: BTreeMap<String, String>,
}

/// A `data-testid`-style attribute, e.g. `data-testid`, `data-test`, `data-qa`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestIdAttribute {
    pub attribute: String,
    pub value: String,
}

impl TestIdAttribute {
    pub fn selector(&self) -> String {
        let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("[{}=\"{}\"]", self.attribute, escaped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AccessibilitySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailSample {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

impl TrailSample {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PointerTrail {
    pub samples: Vec<TrailSample>,
    /// Tag name of the element under the final sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_tag: Option<String>,
}

impl PointerTrail {
    pub fn end_point(&self) -> Option<Point> {
        self.samples.last().map(TrailSample::point)
    }
}

/// Network state around the action. Recorded for diagnostics; not scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub pending_requests: u32,
    #[serde(default)]
    pub idle: bool,
}
