//! Candidate strategies → ordered fallback chain.

use super::scorer::StrategyScorer;
use super::weights::WeightTable;
use retrace_common::{EvidenceRecord, FallbackChain, Locator, Point, PointTarget, Strategy};
use std::cmp::Ordering;

/// One slot per distinct strategy kind.
pub const MAX_CHAIN_LEN: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChainBuilder {
    weights: WeightTable,
}

impl ChainBuilder {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    /// Order candidates into a chain.
    ///
    /// Stable sort by weight (descending), exact duplicates dropped, capped
    /// at [`MAX_CHAIN_LEN`]. The coordinates strategy always occupies the last
    /// slot; if the candidates carry none, one is built from `raw_point`.
    pub fn build(&self, candidates: Vec<Strategy>, raw_point: Point) -> FallbackChain {
        let mut unique: Vec<Strategy> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.iter().any(|s| s.locator == candidate.locator) {
                unique.push(candidate);
            }
        }

        unique.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));

        let mut head = Vec::new();
        let mut points: Vec<(f64, PointTarget)> = Vec::new();
        for strategy in unique {
            if let Locator::Coordinates(target) = &strategy.locator {
                points.push((strategy.weight, target.clone()));
            } else {
                head.push(strategy);
            }
        }

        let (weight, target) = if points.is_empty() {
            (self.weights.coordinates, PointTarget { point: raw_point })
        } else {
            points.remove(0)
        };

        // Extra coordinates candidates (other points) sit just before the
        // terminal entry and only fill slots the head leaves free.
        head.truncate(MAX_CHAIN_LEN - 1);
        points.truncate(MAX_CHAIN_LEN - 1 - head.len());
        head.extend(points.into_iter().map(|(weight, target)| Strategy {
            weight,
            locator: Locator::Coordinates(target),
        }));

        FallbackChain::terminated(head, target, weight)
    }
}

/// Build the fallback chain for one recorded action with the default weights.
pub fn build_fallback_chain(evidence: &EvidenceRecord) -> FallbackChain {
    build_fallback_chain_with(evidence, WeightTable::DEFAULT)
}

pub fn build_fallback_chain_with(evidence: &EvidenceRecord, weights: WeightTable) -> FallbackChain {
    let candidates = StrategyScorer::new(weights).score(evidence);
    ChainBuilder::new(weights).build(candidates, evidence.raw_point)
}
