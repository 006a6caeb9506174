use super::actionability::{self, Actionability};
use super::{EvaluationOutcome, Evaluator, ResolvedTarget, normalize_text};
use crate::session::{AxNode, ElementRef, PageHandle, SessionError};
use async_trait::async_trait;
use retrace_common::{AxQuery, Locator, Rect};
use std::cmp::Ordering;

/// Resolves accessibility strategies against the accessibility tree.
///
/// Strict mode (`accessibility_semantic`) requires role AND name to match.
/// Loose mode (`accessibility_locator`) matches on name, or on role when no
/// node carries the name. Comparison is case-insensitive with whitespace
/// collapsed. Among several matches the one closest to the recorded point
/// wins.
pub struct AccessibilityEvaluator {
    strict: bool,
}

impl AccessibilityEvaluator {
    pub fn semantic() -> Self {
        Self { strict: true }
    }

    pub fn locator() -> Self {
        Self { strict: false }
    }

    fn matches<'a>(&self, query: &AxQuery, nodes: &'a [AxNode]) -> Vec<&'a AxNode> {
        let role = query.role.as_deref().map(normalize_text);
        let name = query.name.as_deref().map(normalize_text);

        let role_eq = |node: &AxNode, role: &str| {
            node.role.as_deref().map(normalize_text).as_deref() == Some(role)
        };
        let name_eq = |node: &AxNode, name: &str| {
            node.name.as_deref().map(normalize_text).as_deref() == Some(name)
        };

        let with_element = nodes.iter().filter(|n| n.element.is_some());

        if self.strict {
            let (Some(role), Some(name)) = (role, name) else {
                return Vec::new();
            };
            return with_element
                .filter(|n| role_eq(n, &role) && name_eq(n, &name))
                .collect();
        }

        if let Some(name) = &name {
            let by_name: Vec<&AxNode> = with_element.clone().filter(|n| name_eq(n, name)).collect();
            if !by_name.is_empty() {
                return by_name;
            }
        }
        match &role {
            Some(role) => with_element.filter(|n| role_eq(n, role)).collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl Evaluator for AccessibilityEvaluator {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        let query = match locator {
            Locator::AccessibilitySemantic(q) | Locator::AccessibilityLocator(q) => q,
            other => {
                return Ok(EvaluationOutcome::Error(format!(
                    "accessibility evaluator cannot handle {}",
                    other.kind()
                )));
            }
        };
        if self.strict && (query.role.is_none() || query.name.is_none()) {
            return Ok(EvaluationOutcome::Error(
                "semantic lookup needs both role and name".into(),
            ));
        }

        let session = page.session();
        let tree = session.accessibility_tree().await?;
        let matches = self.matches(query, &tree);
        if matches.is_empty() {
            return Ok(EvaluationOutcome::NotFound);
        }

        let mut candidates: Vec<(ElementRef, Option<Rect>)> = Vec::with_capacity(matches.len());
        for node in &matches {
            let Some(element) = node.element else {
                continue;
            };
            let bounds = match node.bounds {
                Some(b) => Some(b),
                None => session.bounding_box(element).await?,
            };
            candidates.push((element, bounds));
        }

        let recorded = query.recorded_point;
        let distance = |b: &Option<Rect>| b.map_or(f64::INFINITY, |r| r.distance_to(&recorded));
        candidates.sort_by(|a, b| {
            distance(&a.1)
                .partial_cmp(&distance(&b.1))
                .unwrap_or(Ordering::Equal)
        });

        let ambiguous = candidates.len() > 1;
        let Some((element, _)) = candidates.first().copied() else {
            return Ok(EvaluationOutcome::NotFound);
        };

        Ok(match actionability::check(session, element).await? {
            Actionability::Actionable(point) => EvaluationOutcome::Found(ResolvedTarget {
                point,
                element: Some(element),
                ambiguous,
            }),
            Actionability::Blocked(reason) => EvaluationOutcome::NotActionable(reason),
        })
    }
}
