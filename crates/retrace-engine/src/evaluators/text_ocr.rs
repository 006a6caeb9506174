use super::{EvaluationOutcome, Evaluator, ResolvedTarget, normalize_text};
use crate::session::{DetectedText, PageHandle, SessionError, TextDetector};
use async_trait::async_trait;
use retrace_common::{Locator, Rect};
use std::cmp::Ordering;
use std::sync::Arc;

/// Resolves `text_ocr` strategies from a fresh screenshot.
///
/// Whole-word matches are preferred; substring matches are used only when no
/// whole-word match exists. Several matches resolve to the first in reading
/// order and are flagged as ambiguous.
pub struct TextOcrEvaluator {
    detector: Arc<dyn TextDetector>,
}

impl TextOcrEvaluator {
    pub fn new(detector: Arc<dyn TextDetector>) -> Self {
        Self { detector }
    }
}

/// A contiguous run of detections on one row, read as a phrase.
#[derive(Debug, Clone)]
struct Phrase {
    text: String,
    bounds: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchQuality {
    Word,
    Substring,
}

#[async_trait]
impl Evaluator for TextOcrEvaluator {
    async fn evaluate(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<EvaluationOutcome, SessionError> {
        let Locator::TextOcr(target) = locator else {
            return Ok(EvaluationOutcome::Error(format!(
                "text evaluator cannot handle {}",
                locator.kind()
            )));
        };
        let wanted = normalize_text(&target.text);
        if wanted.is_empty() {
            return Ok(EvaluationOutcome::NotFound);
        }

        let shot = page.screenshot().await?;
        let detections = match self.detector.detect(&shot).await {
            Ok(d) => d,
            Err(e) => return Ok(EvaluationOutcome::Error(e.to_string())),
        };

        let rows = reading_order(&detections);
        let matches = find_matches(&rows, &wanted);
        let Some((quality, first)) = matches.first() else {
            return Ok(EvaluationOutcome::NotFound);
        };
        let ambiguous = matches.len() > 1;
        if *quality == MatchQuality::Substring {
            tracing::debug!("No whole-word match for {:?}, using substring match", wanted);
        }

        let scale = if shot.scale > 0.0 { shot.scale } else { 1.0 };
        let point = first.bounds.scaled(1.0 / scale).center();

        let session = page.session();
        let viewport = session.viewport().await?;
        if !viewport.contains(&point) {
            return Ok(EvaluationOutcome::NotActionable(format!(
                "text found at ({:.0},{:.0}) outside viewport",
                point.x, point.y
            )));
        }
        let element = session.element_at_point(point).await.unwrap_or(None);

        Ok(EvaluationOutcome::Found(ResolvedTarget {
            point,
            element,
            ambiguous,
        }))
    }
}

/// Group detections into rows (top to bottom), each row left to right.
fn reading_order(detections: &[DetectedText]) -> Vec<Vec<&DetectedText>> {
    let mut sorted: Vec<&DetectedText> = detections
        .iter()
        .filter(|d| !d.text.trim().is_empty())
        .collect();
    sorted.sort_by(|a, b| a.bounds.y.partial_cmp(&b.bounds.y).unwrap_or(Ordering::Equal));

    let mut rows: Vec<Vec<&DetectedText>> = Vec::new();
    for det in sorted {
        let center_y = det.bounds.center().y;
        let same_row = rows
            .last()
            .and_then(|row| row.first())
            .is_some_and(|head| center_y < head.bounds.y + head.bounds.height);
        match rows.last_mut() {
            Some(row) if same_row => row.push(det),
            _ => rows.push(vec![det]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.bounds.x.partial_cmp(&b.bounds.x).unwrap_or(Ordering::Equal));
    }
    rows
}

/// Every phrase that matches `wanted`, best quality first, then reading order.
fn find_matches(rows: &[Vec<&DetectedText>], wanted: &str) -> Vec<(MatchQuality, Phrase)> {
    let wanted_words = words(wanted).len();
    let mut found: Vec<(MatchQuality, usize, Phrase)> = Vec::new();
    let mut order = 0usize;

    for row in rows {
        for start in 0..row.len() {
            // Single detections may hold a whole line; runs of detections
            // cover detectors that emit one box per word.
            let max_len = wanted_words.max(1).min(row.len() - start);
            for len in 1..=max_len {
                let run = &row[start..start + len];
                let phrase = join_run(run);
                let quality = if contains_words(&phrase.text, wanted) {
                    Some(MatchQuality::Word)
                } else if len == 1 && phrase.text.contains(wanted) {
                    Some(MatchQuality::Substring)
                } else {
                    None
                };
                if let Some(q) = quality {
                    found.push((q, order, phrase));
                    order += 1;
                    break;
                }
            }
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let best = found.first().map(|f| f.0);
    found
        .into_iter()
        .filter(|f| Some(f.0) == best)
        .map(|(q, _, p)| (q, p))
        .collect()
}

fn join_run(run: &[&DetectedText]) -> Phrase {
    let text = run
        .iter()
        .map(|d| normalize_text(&d.text))
        .collect::<Vec<_>>()
        .join(" ");

    let left = run.iter().map(|d| d.bounds.x).fold(f64::INFINITY, f64::min);
    let top = run.iter().map(|d| d.bounds.y).fold(f64::INFINITY, f64::min);
    let right = run
        .iter()
        .map(|d| d.bounds.x + d.bounds.width)
        .fold(f64::NEG_INFINITY, f64::max);
    let bottom = run
        .iter()
        .map(|d| d.bounds.y + d.bounds.height)
        .fold(f64::NEG_INFINITY, f64::max);

    Phrase {
        text,
        bounds: Rect::new(left, top, right - left, bottom - top),
    }
}

/// Split on whitespace and punctuation, keeping apostrophes and hyphens
/// inside words.
fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\'' && c != '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word containment: `wanted` appears in `text` on word boundaries.
fn contains_words(text: &str, wanted: &str) -> bool {
    let words_in_text = words(text);
    let target = words(wanted);
    if target.is_empty() || words_in_text.len() < target.len() {
        return false;
    }
    words_in_text
        .windows(target.len())
        .any(|w| w == target.as_slice())
}
