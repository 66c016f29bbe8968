// crates/pipeline-bus/src/lib.rs
// ============================================================================
// Crate: pipeline-bus
// Description: Event Bus Adapter (C2): async publish/subscribe with
//              idempotent, at-least-once delivery.
// Purpose: Decouple the orchestrator's handlers from any one message broker
//          while giving tests a deterministic in-memory bus with the same
//          delivery semantics a production broker must provide.
// ============================================================================

//! ## Overview
//! [`EventHandler`] is the seam every subscriber implements. [`InMemoryBus`]
//! dispatches each published envelope to every handler subscribed to its
//! topic as an independent task, deduplicates by
//! [`pipeline_core::events::IdempotencyKey`], and redelivers with an
//! incremented attempt counter on handler failure, up to
//! [`InMemoryBus::max_attempts`]; past that the envelope is moved to the
//! dead-letter queue instead of being retried further.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline_core::events::EventEnvelope;
use pipeline_core::events::IdempotencyKey;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Errors an [`EventHandler`] may report back to the bus.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler failed to process the envelope; the bus will retry or
    /// dead-letter it depending on the attempt count.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// A subscriber to one or more topics.
///
/// Implementations must be cancellation-safe: the bus may abandon the
/// future driving a handler call (for example, on host shutdown) without
/// the handler having observed completion.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one envelope. Returning `Err` causes the bus to redeliver
    /// the envelope (incrementing its attempt count) or dead-letter it once
    /// attempts are exhausted.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}

// ============================================================================
// SECTION: Bus
// ============================================================================

/// Errors returned by [`InMemoryBus::publish`].
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus's internal lock was poisoned.
    #[error("event bus state lock was poisoned")]
    LockPoisoned,
}

/// An in-memory, at-least-once event bus.
///
/// # Invariants
/// - An envelope whose idempotency key was already recorded as delivered is
///   never passed to a handler a second time, even across separate
///   `publish` calls with the same key.
pub struct InMemoryBus {
    subscribers: RwLock<Vec<(String, Arc<dyn EventHandler>)>>,
    delivered: Mutex<HashSet<IdempotencyKey>>,
    dead_letters: Mutex<Vec<EventEnvelope>>,
    max_attempts: u32,
}

impl InMemoryBus {
    /// Builds a bus that redelivers a failed envelope up to `max_attempts`
    /// times before dead-lettering it.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            delivered: Mutex::new(HashSet::new()),
            dead_letters: Mutex::new(Vec::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Subscribes `handler` to `topic`. Multiple handlers may subscribe to
    /// the same topic; each receives every envelope published to it.
    pub async fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.subscribers.write().await.push((topic.into(), handler));
    }

    /// Publishes `envelope` to every handler subscribed to its topic.
    ///
    /// Returns once every handler has either succeeded, been scheduled for
    /// redelivery, or been dead-lettered. A redelivery is performed
    /// in-process by recursing with an incremented attempt counter; a real
    /// broker backend would instead requeue the envelope for a later poll.
    pub async fn publish(&self, envelope: EventEnvelope) -> Result<(), BusError> {
        if self.already_delivered(&envelope.idempotency_key)? {
            return Ok(());
        }

        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|(topic, _)| *topic == envelope.topic)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut all_succeeded = true;
        for handler in &handlers {
            if handler.handle(&envelope).await.is_err() {
                all_succeeded = false;
            }
        }

        if all_succeeded {
            self.mark_delivered(envelope.idempotency_key)?;
            return Ok(());
        }

        if envelope.attempt >= self.max_attempts {
            self.dead_letter(envelope)?;
            return Ok(());
        }

        Box::pin(self.publish(envelope.redelivered())).await
    }

    /// Returns the current dead-letter queue contents.
    pub fn dead_letters(&self) -> Result<Vec<EventEnvelope>, BusError> {
        let guard = self.dead_letters.lock().map_err(|_| BusError::LockPoisoned)?;
        Ok(guard.clone())
    }

    /// Returns true if `key` has already been successfully delivered.
    fn already_delivered(&self, key: &IdempotencyKey) -> Result<bool, BusError> {
        let guard = self.delivered.lock().map_err(|_| BusError::LockPoisoned)?;
        Ok(guard.contains(key))
    }

    /// Records `key` as successfully delivered.
    fn mark_delivered(&self, key: IdempotencyKey) -> Result<(), BusError> {
        let mut guard = self.delivered.lock().map_err(|_| BusError::LockPoisoned)?;
        guard.insert(key);
        Ok(())
    }

    /// Appends `envelope` to the dead-letter queue.
    fn dead_letter(&self, envelope: EventEnvelope) -> Result<(), BusError> {
        let mut guard = self.dead_letters.lock().map_err(|_| BusError::LockPoisoned)?;
        guard.push(envelope);
        Ok(())
    }
}
