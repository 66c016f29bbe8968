// crates/pipeline-core/src/execution.rs
// ============================================================================
// Module: Execution Record
// Description: The per-run record tracked by the Execution Store (C1).
// Purpose: Capture execution identity, lifecycle status, and iteration count.
// Dependencies: crate::identifiers, crate::time
// ============================================================================

//! ## Overview
//! An [`Execution`] is the durable record of one feature run, from ingestion
//! through a terminal state. The orchestrator and kill-switch never mutate
//! this type directly; they ask an `ExecutionStore` implementation
//! (`pipeline_store`) to apply transitions so the terminal-state invariant is
//! enforced once, at the storage boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ExecutionId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Execution Request
// ============================================================================

/// Ingress payload that creates a new execution.
///
/// # Invariants
/// - `repository_url` and `target_branch` are non-empty, validated by the
///   ingress handler before construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Feature execution identifier assigned by the ingress handler.
    pub execution_id: ExecutionId,
    /// Git remote URL of the target repository.
    pub repository_url: String,
    /// Branch the generated feature branch is based on and delivered toward.
    pub target_branch: String,
    /// Short human title for the requested feature.
    pub title: String,
    /// Full natural-language feature description.
    pub description: String,
    /// Identity of the requester (user, service account, or agent).
    pub requested_by: String,
}

// ============================================================================
// SECTION: Execution Status
// ============================================================================

/// Execution lifecycle status.
///
/// # Invariants
/// - `Completed`, `Failed`, and `Aborted` are terminal; no further transition
///   is valid once a row reaches one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created by the ingress handler, not yet checked out.
    Pending,
    /// Checkout has started; the execution is actively progressing.
    Running,
    /// Delivered: the feature branch was pushed successfully.
    Completed,
    /// Terminated by a classified failure.
    Failed,
    /// Terminated by the kill switch or an `abort` decision.
    Aborted,
}

impl ExecutionStatus {
    /// Returns true when the status is terminal (no further transitions are
    /// valid).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Durable per-execution record owned exclusively by the Execution Store.
///
/// # Invariants
/// - `iteration_count <= thresholds.max_iterations` for the thresholds in
///   effect when the execution was reviewed.
/// - Once `status.is_terminal()` is true, no further field on this record
///   changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Git remote URL of the target repository.
    pub repository_url: String,
    /// Target branch for delivery.
    pub target_branch: String,
    /// Short human title for the requested feature.
    pub title: String,
    /// Full natural-language feature description.
    pub description: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Number of generate/test/review iterations consumed so far.
    pub iteration_count: u32,
    /// Identity of the requester.
    pub requested_by: String,
    /// Timestamp the execution was requested.
    pub requested_at: Timestamp,
    /// Timestamp of the first transition to `running`, if any.
    pub started_at: Option<Timestamp>,
    /// Timestamp of the transition to a terminal status, if any.
    pub completed_at: Option<Timestamp>,
    /// Error message recorded on the transition to `failed`, if any.
    pub error_message: Option<String>,
}

impl Execution {
    /// Creates a new execution row in the `pending` status from an ingress
    /// request.
    #[must_use]
    pub fn new(request: ExecutionRequest, requested_at: Timestamp) -> Self {
        Self {
            execution_id: request.execution_id,
            repository_url: request.repository_url,
            target_branch: request.target_branch,
            title: request.title,
            description: request.description,
            status: ExecutionStatus::Pending,
            iteration_count: 0,
            requested_by: request.requested_by,
            requested_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionStatus;

    #[test]
    fn terminal_statuses_are_exactly_completed_failed_aborted() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Aborted.is_terminal());
    }
}
