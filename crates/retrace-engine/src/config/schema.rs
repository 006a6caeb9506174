use retrace_common::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Confidence weights are intentionally absent: they are a code constant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetraceConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum EvaluationMode {
    /// One strategy at a time, stopping at the first success.
    Sequential,
    /// Locate up to `window` consecutive strategies concurrently, then act on
    /// the earliest one that was found.
    Speculative {
        #[serde(default = "default_window")]
        window: usize,
    },
}

impl Default for EvaluationMode {
    fn default() -> Self {
        EvaluationMode::Sequential
    }
}

fn default_window() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_ocr_attempt_timeout_ms")]
    pub ocr_attempt_timeout_ms: u64,
    #[serde(default)]
    pub mode: EvaluationMode,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            ocr_attempt_timeout_ms: default_ocr_attempt_timeout_ms(),
            mode: EvaluationMode::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl PlaybackConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Per-attempt timeout for one evaluator of `kind`.
    pub fn attempt_timeout(&self, kind: StrategyKind) -> Duration {
        match kind {
            StrategyKind::TextOcr => Duration::from_millis(self.ocr_attempt_timeout_ms),
            _ => Duration::from_millis(self.attempt_timeout_ms),
        }
    }
}

fn default_step_timeout_ms() -> u64 {
    10000
}

fn default_attempt_timeout_ms() -> u64 {
    2000
}

fn default_ocr_attempt_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    1
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_layer_timeout_ms")]
    pub layer_timeout_ms: u64,
    #[serde(default = "default_ocr_layer_timeout_ms")]
    pub ocr_layer_timeout_ms: u64,
    /// Half-size of the screen region searched for text around the action.
    #[serde(default = "default_text_region_px")]
    pub text_region_px: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            layer_timeout_ms: default_layer_timeout_ms(),
            ocr_layer_timeout_ms: default_ocr_layer_timeout_ms(),
            text_region_px: default_text_region_px(),
        }
    }
}

fn default_layer_timeout_ms() -> u64 {
    300
}

fn default_ocr_layer_timeout_ms() -> u64 {
    1500
}

fn default_text_region_px() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_telemetry_dir")]
    pub dir: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            dir: default_telemetry_dir(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".retrace")
        .join("telemetry")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sensitive_fields: default_sensitive_fields(),
        }
    }
}

fn default_sensitive_fields() -> Vec<String> {
    vec![
        "password".to_string(),
        "token".to_string(),
        "card_number".to_string(),
        "cvv".to_string(),
        "ssn".to_string(),
        "secret".to_string(),
    ]
}
