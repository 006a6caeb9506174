//! Evidence → candidate strategies.

use super::weights::WeightTable;
use retrace_common::{
    AccessibilitySnapshot, AxQuery, DomSnapshot, EvidenceProfile, EvidenceRecord, Locator,
    PointTarget, SelectorTarget, Strategy, StrategyKind, TextTarget,
};
use std::collections::BTreeMap;

/// DOM attributes that survive into the evidence-scoring fingerprint.
/// Volatile attributes (style, generated ids of frameworks) are left out.
const PROFILE_ATTRIBUTES: &[&str] = &[
    "type",
    "role",
    "aria-label",
    "placeholder",
    "href",
    "title",
    "alt",
    "value",
];

/// Form controls whose `value` is edited by the very step being recorded.
const EDITABLE_TAGS: &[&str] = &["input", "select", "textarea"];

/// Pure mapping from one evidence record to candidate strategies.
///
/// Emission order follows declaration order: accessibility, DOM selectors,
/// evidence scoring, screen text, coordinates. The chain builder's stable
/// sort uses that order to break weight ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyScorer {
    weights: WeightTable,
}

impl StrategyScorer {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn score(&self, evidence: &EvidenceRecord) -> Vec<Strategy> {
        let mut out = Vec::new();

        if let Some(ax) = &evidence.accessibility {
            self.score_accessibility(ax, evidence, &mut out);
        }

        if let Some(dom) = &evidence.dom {
            self.score_dom(dom, &mut out);
        }

        if let Some(trail) = &evidence.pointer_trail {
            let anchor = trail.end_point().unwrap_or(evidence.raw_point);
            let tag = evidence
                .dom
                .as_ref()
                .map(|d| d.tag.clone())
                .filter(|t| !t.is_empty())
                .or_else(|| trail.end_tag.clone());
            let attributes = evidence
                .dom
                .as_ref()
                .map(profile_attributes)
                .unwrap_or_default();
            out.push(self.strategy(Locator::EvidenceScoring(EvidenceProfile {
                anchor,
                tag: tag.map(|t| t.to_lowercase()),
                attributes,
            })));
        }

        if let Some(visible) = &evidence.visible_text {
            let text = visible.text.trim();
            if !text.is_empty() {
                out.push(self.strategy(Locator::TextOcr(TextTarget {
                    text: text.to_string(),
                    recorded_point: evidence.raw_point,
                })));
            }
        }

        out.push(self.strategy(Locator::Coordinates(PointTarget {
            point: evidence.raw_point,
        })));

        out
    }

    fn score_accessibility(
        &self,
        ax: &AccessibilitySnapshot,
        evidence: &EvidenceRecord,
        out: &mut Vec<Strategy>,
    ) {
        let role = non_blank(ax.role.as_deref());
        let name = non_blank(ax.name.as_deref());

        let query = |role: Option<&str>, name: Option<&str>| AxQuery {
            role: role.map(str::to_string),
            name: name.map(str::to_string),
            recorded_point: evidence.raw_point,
        };

        match (role, name) {
            (Some(role), Some(name)) => out.push(self.strategy(Locator::AccessibilitySemantic(
                query(Some(role), Some(name)),
            ))),
            (None, None) => {}
            (role, name) => out.push(self.strategy(Locator::AccessibilityLocator(query(role, name)))),
        }
    }

    fn score_dom(&self, dom: &DomSnapshot, out: &mut Vec<Strategy>) {
        if let Some(test_id) = &dom.test_id
            && !test_id.value.trim().is_empty()
        {
            out.push(self.strategy(Locator::DomSelector(SelectorTarget {
                selector: test_id.selector(),
            })));
        }

        if let Some(css) = non_blank(dom.css_selector.as_deref())
            && dom.css_selector_unique
        {
            out.push(self.strategy(Locator::CssSelector(SelectorTarget {
                selector: css.to_string(),
            })));
        }
    }

    fn strategy(&self, locator: Locator) -> Strategy {
        let kind: StrategyKind = locator.kind();
        Strategy {
            weight: self.weights.weight(kind),
            locator,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The attribute fingerprint the evidence-scoring evaluator compares against.
fn profile_attributes(dom: &DomSnapshot) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();

    if let Some(id) = non_blank(dom.id.as_deref()) {
        attrs.insert("id".to_string(), id.to_string());
    }
    if let Some(name) = non_blank(dom.name.as_deref()) {
        attrs.insert("name".to_string(), name.to_string());
    }
    if !dom.classes.is_empty() {
        let mut classes = dom.classes.clone();
        classes.sort();
        attrs.insert("class".to_string(), classes.join(" "));
    }
    if let Some(test_id) = &dom.test_id {
        attrs.insert(test_id.attribute.clone(), test_id.value.clone());
    }
    let editable = EDITABLE_TAGS.contains(&dom.tag.to_ascii_lowercase().as_str());
    for key in PROFILE_ATTRIBUTES {
        if editable && *key == "value" {
            continue;
        }
        if let Some(value) = dom.attributes.get(*key)
            && !value.trim().is_empty()
        {
            attrs.insert((*key).to_string(), value.clone());
        }
    }

    attrs
}
