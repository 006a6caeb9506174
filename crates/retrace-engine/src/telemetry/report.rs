use retrace_common::{AttemptOutcome, StrategyKind, TelemetryBatch};
use serde::Serialize;
use std::collections::BTreeMap;

/// How one strategy kind fared across a set of batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    pub attempts: usize,
    /// Attempts that located a target, including discarded speculative ones.
    pub found: usize,
    /// Steps that succeeded through this kind.
    pub wins: usize,
    pub total_duration_ms: u64,
}

impl KindStats {
    pub fn mean_duration_ms(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.attempts as f64
    }
}

/// Aggregate view over recorded telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryReport {
    pub steps: usize,
    pub succeeded: usize,
    pub per_kind: BTreeMap<StrategyKind, KindStats>,
}

impl TelemetryReport {
    pub fn from_batches<'a>(batches: impl IntoIterator<Item = &'a TelemetryBatch>) -> Self {
        let mut report = Self::default();

        for batch in batches {
            let result = &batch.result;
            report.steps += 1;
            if result.succeeded {
                report.succeeded += 1;
                if let Some(kind) = result.strategy_used {
                    report.per_kind.entry(kind).or_default().wins += 1;
                }
            }
            for attempt in &result.per_attempt_log {
                let stats = report.per_kind.entry(attempt.kind).or_default();
                stats.attempts += 1;
                stats.total_duration_ms += attempt.duration_ms;
                if attempt.outcome == AttemptOutcome::Found {
                    stats.found += 1;
                }
            }
        }

        report
    }

    pub fn step_success_rate(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.steps as f64
    }

    pub fn render(&self) -> String {
        let mut output = format!(
            "{} steps, {} succeeded ({:.1}%)\n",
            self.steps,
            self.succeeded,
            self.step_success_rate() * 100.0
        );
        for (kind, stats) in &self.per_kind {
            output.push_str(&format!(
                "  {:<24} attempts {:>5}  found {:>5}  wins {:>5}  mean {:.1}ms\n",
                kind.as_str(),
                stats.attempts,
                stats.found,
                stats.wins,
                stats.mean_duration_ms()
            ));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_common::{AttemptRecord, FailureReason, StepExecutionResult};

    fn attempt(kind: StrategyKind, outcome: AttemptOutcome, ms: u64) -> AttemptRecord {
        AttemptRecord {
            kind,
            outcome,
            duration_ms: ms,
            ambiguous: false,
            speculative: false,
            reason: None,
        }
    }

    fn batch(step: &str, result: StepExecutionResult) -> TelemetryBatch {
        TelemetryBatch {
            run_id: "run".into(),
            recording_id: "rec".into(),
            step_id: step.into(),
            timestamp_ms: 0,
            result,
        }
    }

    #[test]
    fn test_report_counts_per_kind() {
        let drifted = StepExecutionResult::success(
            StrategyKind::EvidenceScoring,
            1,
            vec![
                attempt(StrategyKind::DomSelector, AttemptOutcome::NotFound, 2),
                attempt(StrategyKind::EvidenceScoring, AttemptOutcome::Found, 6),
            ],
        );
        let direct = StepExecutionResult::success(
            StrategyKind::DomSelector,
            0,
            vec![attempt(StrategyKind::DomSelector, AttemptOutcome::Found, 4)],
        );
        let failed = StepExecutionResult::not_located(
            FailureReason::Exhausted,
            vec![attempt(StrategyKind::Coordinates, AttemptOutcome::NotActionable, 0)],
        );
        let batches = vec![batch("a", drifted), batch("b", direct), batch("c", failed)];

        let report = TelemetryReport::from_batches(&batches);
        assert_eq!(report.steps, 3);
        assert_eq!(report.succeeded, 2);

        let dom = &report.per_kind[&StrategyKind::DomSelector];
        assert_eq!((dom.attempts, dom.found, dom.wins), (2, 1, 1));
        assert_eq!(dom.mean_duration_ms(), 3.0);

        let evidence = &report.per_kind[&StrategyKind::EvidenceScoring];
        assert_eq!((evidence.attempts, evidence.found, evidence.wins), (1, 1, 1));

        let coords = &report.per_kind[&StrategyKind::Coordinates];
        assert_eq!((coords.attempts, coords.found, coords.wins), (1, 0, 0));
        assert!(report.render().starts_with("3 steps, 2 succeeded (66.7%)"));
    }

    #[test]
    fn test_empty_report() {
        let report = TelemetryReport::from_batches(&[]);
        assert_eq!(report.step_success_rate(), 0.0);
        assert!(report.per_kind.is_empty());
    }
}
