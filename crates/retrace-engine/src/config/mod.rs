pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    CaptureConfig, EvaluationMode, PlaybackConfig, RetraceConfig, RetryConfig, SecurityConfig,
    TelemetryConfig,
};
