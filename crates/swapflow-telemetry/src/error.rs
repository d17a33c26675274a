//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Sink rejected event {event}: {reason}")]
    SinkRejected { event: String, reason: String },
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
