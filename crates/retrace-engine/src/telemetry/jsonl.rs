use super::{RunId, TelemetryError, TelemetrySink};
use async_trait::async_trait;
use retrace_common::TelemetryBatch;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// One `<run_id>.jsonl` file per run under `dir`, one JSON line per batch.
///
/// Each batch is written with a single append, so concurrent steps of the
/// same run never interleave within a line.
#[derive(Debug, Clone)]
pub struct JsonlTelemetryLog {
    dir: PathBuf,
}

impl JsonlTelemetryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run_path(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", run_id.as_str()))
    }

    pub async fn load_run(&self, run_id: &RunId) -> Result<Vec<TelemetryBatch>, TelemetryError> {
        let path = self.run_path(run_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        read_batches(&path).await
    }

    /// Every batch of every run, ordered by run file name then line.
    pub async fn load_all(&self) -> Result<Vec<TelemetryBatch>, TelemetryError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut batches = Vec::new();
        for path in paths {
            batches.extend(read_batches(&path).await?);
        }
        Ok(batches)
    }
}

/// Lines that fail to parse (a torn write after a crash) are skipped.
async fn read_batches(path: &Path) -> Result<Vec<TelemetryBatch>, TelemetryError> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut batches = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TelemetryBatch>(line) {
            Ok(batch) => batches.push(batch),
            Err(e) => tracing::warn!(
                "Skipping unreadable telemetry line {}:{}: {}",
                path.display(),
                lineno + 1,
                e
            ),
        }
    }
    Ok(batches)
}

#[async_trait]
impl TelemetrySink for JsonlTelemetryLog {
    async fn append(&self, batch: &TelemetryBatch) -> Result<(), TelemetryError> {
        let run_id = RunId::parse(&batch.run_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_path(&run_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!(
            "Appended telemetry for step {} to run {}",
            batch.step_id,
            batch.run_id
        );
        Ok(())
    }
}
