use super::actionability::{self, Actionability};
use super::{EvaluationOutcome, Evaluator, ResolvedTarget};
use crate::session::{ElementDescription, PageHandle, SessionError};
use async_trait::async_trait;
use retrace_common::{EvidenceProfile, Locator};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Search radius around the trail endpoint, in CSS pixels.
pub const EVIDENCE_RADIUS_PX: f64 = 150.0;

/// Minimum fraction of the original features a candidate must still carry.
pub const MIN_SIMILARITY: f64 = 0.5;

/// Re-ranks elements near the end of the recorded pointer trail by how much
/// of the original element's fingerprint they still carry.
pub struct EvidenceScoringEvaluator {
    radius: f64,
    min_similarity: f64,
}

impl Default for EvidenceScoringEvaluator {
    fn default() -> Self {
        Self {
            radius: EVIDENCE_RADIUS_PX,
            min_similarity: MIN_SIMILARITY,
        }
    }
}

impl EvidenceScoringEvaluator {
    pub fn new(radius: f64, min_similarity: f64) -> Self {
        Self {
            radius,
            min_similarity,
        }
    }
}

/// Fraction of `profile` features present on `candidate`, in [0, 1].
///
/// The tag counts as one feature. `class` compares as a token set and earns
/// partial credit for the share of original classes still present.
pub fn similarity(profile: &EvidenceProfile, candidate: &ElementDescription) -> f64 {
    let total = profile.feature_count();
    if total == 0 {
        return 0.0;
    }

    let mut score = 0.0;
    if let Some(tag) = &profile.tag
        && tag.eq_ignore_ascii_case(&candidate.tag)
    {
        score += 1.0;
    }

    for (key, expected) in &profile.attributes {
        let Some(actual) = candidate.attributes.get(key) else {
            continue;
        };
        if key == "class" {
            let wanted: BTreeSet<&str> = expected.split_whitespace().collect();
            let present: BTreeSet<&str> = actual.split_whitespace().collect();
            if !wanted.is_empty() {
                score += wanted.intersection(&present).count() as f64 / wanted.len() as f64;
            }
        } else if actual == expected {
            score += 1.0;
        }
    }

    score / total as f64
}

#[async_trait]
impl Evaluator for EvidenceScoringEvaluator {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        let Locator::EvidenceScoring(profile) = locator else {
            return Ok(EvaluationOutcome::Error(format!(
                "evidence evaluator cannot handle {}",
                locator.kind()
            )));
        };
        if profile.feature_count() == 0 {
            return Ok(EvaluationOutcome::NotFound);
        }

        let session = page.session();
        let nearby = session.elements_near(profile.anchor, self.radius).await?;

        let mut scored: Vec<(f64, f64, &ElementDescription)> = nearby
            .iter()
            .map(|c| {
                (
                    similarity(profile, c),
                    c.rect.distance_to(&profile.anchor),
                    c,
                )
            })
            .filter(|(score, _, _)| *score >= self.min_similarity)
            .collect();

        // Highest similarity first, nearest to the anchor on ties.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        });

        let Some((best_score, _, best)) = scored.first() else {
            return Ok(EvaluationOutcome::NotFound);
        };
        let ambiguous = scored
            .get(1)
            .is_some_and(|(second, _, _)| (best_score - second).abs() < f64::EPSILON);

        tracing::debug!(
            "Evidence scoring picked {:?} <{}> with similarity {:.2} ({} candidates)",
            best.element,
            best.tag,
            best_score,
            scored.len()
        );

        Ok(match actionability::check(session, best.element).await? {
            Actionability::Actionable(point) => EvaluationOutcome::Found(ResolvedTarget {
                point,
                element: Some(best.element),
                ambiguous,
            }),
            Actionability::Blocked(reason) => EvaluationOutcome::NotActionable(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ElementRef;
    use retrace_common::{Point, Rect};
    use std::collections::BTreeMap;

    fn candidate(tag: &str, attrs: &[(&str, &str)]) -> ElementDescription {
        ElementDescription {
            element: ElementRef(1),
            tag: tag.into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            css_selector: None,
            xpath: None,
        }
    }

    #[test]
    fn test_similarity_counts_tag_and_attributes() {
        let profile = EvidenceProfile {
            anchor: Point::new(0.0, 0.0),
            tag: Some("button".into()),
            attributes: BTreeMap::from([
                ("id".to_string(), "buy".to_string()),
                ("class".to_string(), "btn primary".to_string()),
                ("name".to_string(), "buy".to_string()),
            ]),
        };

        let same = candidate("BUTTON", &[("id", "buy"), ("class", "primary btn"), ("name", "buy")]);
        assert_eq!(similarity(&profile, &same), 1.0);

        // id changed, one of two classes left
        let drifted = candidate("button", &[("id", "buy-v2"), ("class", "btn"), ("name", "buy")]);
        assert_eq!(similarity(&profile, &drifted), 2.5 / 4.0);

        assert_eq!(similarity(&profile, &candidate("div", &[])), 0.0);
    }
}
