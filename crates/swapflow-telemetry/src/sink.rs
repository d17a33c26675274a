//! Analytics sink contract.
//!
//! Events are fire-and-forget: a sink failure is logged and counted, never
//! returned to the caller.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::TelemetryResult;
use crate::metrics::Metrics;

/// Event properties, serialized in insertion order.
pub type EventProperties = Map<String, Value>;

/// Destination for analytics events.
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event. Must not block.
    fn track(&self, event: &str, properties: &EventProperties) -> TelemetryResult<()>;
}

/// Sink that writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn track(&self, event: &str, properties: &EventProperties) -> TelemetryResult<()> {
        let properties = Value::Object(properties.clone());
        info!(event, properties = %properties, "analytics event");
        Ok(())
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, EventProperties)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in delivery order.
    pub fn events(&self) -> Vec<(String, EventProperties)> {
        self.events.lock().clone()
    }

    /// Names of recorded events in delivery order.
    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn track(&self, event: &str, properties: &EventProperties) -> TelemetryResult<()> {
        self.events
            .lock()
            .push((event.to_string(), properties.clone()));
        Ok(())
    }
}

/// Facade the orchestration code talks to.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Telemetry backed by [`TracingSink`].
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Deliver an event, swallowing sink errors.
    pub fn track(&self, event: &str, properties: EventProperties) {
        match self.sink.track(event, &properties) {
            Ok(()) => Metrics::event(event, "delivered"),
            Err(e) => {
                warn!(event, error = %e, "analytics sink failed, event dropped");
                Metrics::event(event, "dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Sink {}
        impl TelemetrySink for Sink {
            fn track(&self, event: &str, properties: &EventProperties) -> TelemetryResult<()>;
        }
    }

    fn props() -> EventProperties {
        let mut map = Map::new();
        map.insert("network".to_string(), json!("mainnet"));
        map
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = Arc::new(RecordingSink::new());
        let telemetry = Telemetry::new(sink.clone());

        telemetry.track("Submitted swap", props());
        telemetry.track("Completed swap", props());

        assert_eq!(sink.event_names(), vec!["Submitted swap", "Completed swap"]);
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let mut sink = MockSink::new();
        sink.expect_track().times(1).returning(|event, _| {
            Err(TelemetryError::SinkRejected {
                event: event.to_string(),
                reason: "offline".to_string(),
            })
        });

        let telemetry = Telemetry::new(Arc::new(sink));
        telemetry.track("Completed swap", props());
    }

    #[test]
    fn test_sink_receives_properties() {
        let mut sink = MockSink::new();
        sink.expect_track()
            .withf(|event, properties| {
                event == "Failed deposit" && properties.get("network") == Some(&json!("mainnet"))
            })
            .times(1)
            .returning(|_, _| Ok(()));

        Telemetry::new(Arc::new(sink)).track("Failed deposit", props());
    }

    #[test]
    fn test_tracing_sink_accepts_events() {
        let sink = TracingSink;

        assert!(sink.track("Submitted swap", &props()).is_ok());
        assert!(sink.track("Completed swap", &EventProperties::new()).is_ok());
    }
}
