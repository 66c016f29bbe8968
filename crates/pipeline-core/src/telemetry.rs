// crates/pipeline-core/src/telemetry.rs
// ============================================================================
// Module: Telemetry
// Description: Dependency-light observability seam for pipeline components.
// Purpose: Let every component report structured events without committing
//          the workspace to a specific metrics or tracing backend.
// Dependencies: crate::identifiers, crate::time
// ============================================================================

//! ## Overview
//! This module is intentionally dependency-light: it defines an event enum
//! and a [`TelemetrySink`] trait rather than pulling in a tracing or metrics
//! crate, so that downstream deployments can plug in Prometheus,
//! OpenTelemetry, or a plain log file without redesigning every component
//! that reports events. [`NullSink`] is the default no-op implementation
//! used wherever a host does not configure telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::identifiers::ExecutionId;
use crate::identifiers::RepositoryId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Events
// ============================================================================

/// A structured event reported by a pipeline component.
///
/// # Invariants
/// - `recorded_at` is stamped by the reporting component, not by the sink,
///   so sinks stay free of wall-clock reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    /// Component-defined event name, for example `"decision.evaluated"`.
    pub name: &'static str,
    /// Execution the event pertains to, when applicable.
    pub execution_id: Option<ExecutionId>,
    /// Repository the event pertains to, when applicable.
    pub repository_id: Option<RepositoryId>,
    /// Free-form key/value fields for the event, already stringified by the
    /// reporting component.
    pub fields: Vec<(&'static str, String)>,
    /// When the event occurred.
    pub recorded_at: Timestamp,
}

impl TelemetryEvent {
    /// Builds an event with no execution or repository context.
    #[must_use]
    pub fn new(name: &'static str, recorded_at: Timestamp) -> Self {
        Self { name, execution_id: None, repository_id: None, fields: Vec::new(), recorded_at }
    }

    /// Attaches an execution id to the event.
    #[must_use]
    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    /// Attaches a repository id to the event.
    #[must_use]
    pub fn with_repository(mut self, repository_id: RepositoryId) -> Self {
        self.repository_id = Some(repository_id);
        self
    }

    /// Appends one free-form field to the event.
    #[must_use]
    pub fn with_field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Receiver for telemetry events.
///
/// Implementations must not block the caller for longer than a metrics
/// client normally would; components call `record` synchronously on their
/// hot path.
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    fn record(&self, event: TelemetryEvent);
}

/// A sink that discards every event. Used as the default when a host does
/// not configure telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: TelemetryEvent) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::NullSink;
    use super::TelemetryEvent;
    use super::TelemetrySink;
    use crate::time::Timestamp;

    struct CollectingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetrySink for CollectingSink {
        fn record(&self, event: TelemetryEvent) {
            let mut events = self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            events.push(event);
        }
    }

    #[test]
    fn null_sink_discards_events() {
        let sink = NullSink;
        sink.record(TelemetryEvent::new("test.event", Timestamp::from_unix_millis(0)));
    }

    #[test]
    fn collecting_sink_retains_fields() {
        let sink = CollectingSink { events: Mutex::new(Vec::new()) };
        let event = TelemetryEvent::new("decision.evaluated", Timestamp::from_unix_millis(0))
            .with_field("decision", "approve");
        sink.record(event);
        let events = sink.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields[0], ("decision", "approve".to_string()));
    }
}
