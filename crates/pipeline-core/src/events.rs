// crates/pipeline-core/src/events.rs
// ============================================================================
// Module: Event Topics and Envelope
// Description: Typed topic names and the envelope carried across the Event
//              Bus Adapter (C2).
// Purpose: Keep publishers and subscribers agreeing on topic names and on
//          the idempotency key used for at-least-once dedupe.
// Dependencies: crate::identifiers, crate::time, serde_json
// ============================================================================

//! ## Overview
//! Topic names are plain string constants rather than an enum so that
//! `pipeline_bus` can remain generic over payload shape; handlers match on
//! [`Topic`] constants when subscribing. Every event carries an
//! [`EventEnvelope`] whose `idempotency_key` is `(execution_id, event_name,
//! iteration_number)`, matching the at-least-once delivery contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ExecutionId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Topics
// ============================================================================

/// Topic name constants for every event consumed or emitted by the pipeline.
pub mod topic {
    /// A new feature request was accepted and should be checked out.
    pub const EXECUTION_REQUESTED: &str = "execution.requested";
    /// Checkout of the target repository completed.
    pub const CHECKOUT_COMPLETED: &str = "checkout.completed";
    /// Checkout of the target repository failed.
    pub const CHECKOUT_FAILED: &str = "checkout.failed";
    /// Patch generation completed and produced a candidate diff.
    pub const PATCH_GENERATED: &str = "patch.generated";
    /// Patch generation failed.
    pub const PATCH_GENERATION_FAILED: &str = "patch.generation_failed";
    /// A test run was requested for a generated patch.
    pub const TEST_REQUESTED: &str = "test.requested";
    /// A test run completed, successfully or not.
    pub const TEST_COMPLETED: &str = "test.completed";
    /// A review was requested for a generated patch.
    pub const REVIEW_REQUESTED: &str = "review.requested";
    /// A review completed with a decision.
    pub const REVIEW_COMPLETED: &str = "review.completed";
    /// The orchestrator decided to begin another iteration.
    pub const ITERATION_STARTED: &str = "iteration.started";
    /// The feature branch was pushed and the execution completed.
    pub const DELIVERY_COMPLETED: &str = "delivery.completed";
    /// The execution failed and was classified.
    pub const EXECUTION_FAILED: &str = "execution.failed";
    /// The execution was aborted by a decision or the kill switch.
    pub const EXECUTION_ABORTED: &str = "execution.aborted";
    /// A kill switch was activated.
    pub const KILL_SWITCH_ACTIVATED: &str = "killswitch.activated";
    /// A kill switch was deactivated.
    pub const KILL_SWITCH_DEACTIVATED: &str = "killswitch.deactivated";
}

// ============================================================================
// SECTION: Idempotency Key
// ============================================================================

/// Deduplication key for at-least-once delivery.
///
/// # Invariants
/// - Two envelopes with equal keys are treated as the same logical event by
///   every consumer; a consumer that already recorded a key discards the
///   redelivered envelope without reprocessing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Execution the event belongs to.
    pub execution_id: ExecutionId,
    /// Event topic name.
    pub event_name: String,
    /// Iteration the event was produced during.
    pub iteration_number: u32,
}

impl IdempotencyKey {
    /// Builds an idempotency key from its three components.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        event_name: impl Into<String>,
        iteration_number: u32,
    ) -> Self {
        Self { execution_id, event_name: event_name.into(), iteration_number }
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Transport envelope wrapping every payload that crosses the event bus.
///
/// # Invariants
/// - `attempt` starts at `1` and increments on each redelivery; a consumer
///   that observes `attempt` past the configured retry cap dead-letters the
///   envelope instead of invoking its handler again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Deduplication key for this event.
    pub idempotency_key: IdempotencyKey,
    /// Topic this event was published to.
    pub topic: String,
    /// Serialized payload, shaped per `topic`.
    pub payload: Value,
    /// When the event was published.
    pub published_at: Timestamp,
    /// Delivery attempt counter, starting at one.
    pub attempt: u32,
}

impl EventEnvelope {
    /// Builds the first-attempt envelope for a new event.
    #[must_use]
    pub fn new(
        idempotency_key: IdempotencyKey,
        topic: impl Into<String>,
        payload: Value,
        published_at: Timestamp,
    ) -> Self {
        Self { idempotency_key, topic: topic.into(), payload, published_at, attempt: 1 }
    }

    /// Returns a copy of this envelope with the attempt counter incremented,
    /// used when the bus redelivers after a handler failure.
    #[must_use]
    pub fn redelivered(&self) -> Self {
        Self { attempt: self.attempt + 1, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::EventEnvelope;
    use super::IdempotencyKey;
    use crate::identifiers::ExecutionId;
    use crate::time::Timestamp;

    #[test]
    fn redelivered_increments_attempt_only() {
        let key = IdempotencyKey::new(ExecutionId::new("e1"), "test.completed", 0);
        let first = EventEnvelope::new(key, "test.completed", json!({"ok": true}), Timestamp::now());
        let second = first.redelivered();
        assert_eq!(first.attempt, 1);
        assert_eq!(second.attempt, 2);
        assert_eq!(first.idempotency_key, second.idempotency_key);
        assert_eq!(first.payload, second.payload);
    }
}
