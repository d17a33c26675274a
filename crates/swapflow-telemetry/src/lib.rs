//! Prometheus metrics, structured logging and analytics for swapflow.
//!
//! - Prometheus metrics for quotes, gas, rap execution and submissions
//! - Structured logging with tracing (JSON in production)
//! - Fire-and-forget analytics sink contract

pub mod error;
pub mod logging;
pub mod metrics;
pub mod sink;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use sink::{EventProperties, RecordingSink, Telemetry, TelemetrySink, TracingSink};
