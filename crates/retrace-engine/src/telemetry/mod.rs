//! Append-only record of every playback attempt, keyed by run.

pub mod jsonl;
pub mod report;

use async_trait::async_trait;
use retrace_common::{StepExecutionResult, TelemetryBatch};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

pub use jsonl::JsonlTelemetryLog;
pub use report::{KindStats, TelemetryReport};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Telemetry encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid run id: {0}")]
    InvalidRunId(String),
}

/// Identifies one playback run across all of its steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Run ids become file names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn parse(s: &str) -> Result<Self, TelemetryError> {
        let valid = !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(TelemetryError::InvalidRunId(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// One immutable batch for `result`, stamped now.
    pub fn batch(
        &self,
        recording_id: &str,
        step_id: &str,
        result: StepExecutionResult,
    ) -> TelemetryBatch {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        TelemetryBatch {
            run_id: self.0.clone(),
            recording_id: recording_id.to_string(),
            step_id: step_id.to_string(),
            timestamp_ms,
            result,
        }
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for telemetry batches. Each batch is written once and never
/// modified; concurrent appends from different steps need no coordination.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn append(&self, batch: &TelemetryBatch) -> Result<(), TelemetryError>;
}

/// Append `batch`, logging instead of failing. Playback results never depend
/// on telemetry.
pub async fn record(sink: &dyn TelemetrySink, batch: &TelemetryBatch) {
    if let Err(e) = sink.append(batch).await {
        tracing::warn!(
            "Failed to record telemetry for step {} of run {}: {}",
            batch.step_id,
            batch.run_id,
            e
        );
    }
}

/// In-process sink for tests and embedders that ship batches elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    batches: Arc<Mutex<Vec<TelemetryBatch>>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<TelemetryBatch> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn append(&self, batch: &TelemetryBatch) -> Result<(), TelemetryError> {
        self.batches.lock().await.push(batch.clone());
        Ok(())
    }
}
