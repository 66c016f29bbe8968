// crates/pipeline-core/src/killswitch.rs
// ============================================================================
// Module: Kill-Switch Data Model
// Description: Scopes, reasons, state, and audit records for the Kill-Switch
//              Service (C3).
// Purpose: Give C3, C4, and C6 a shared vocabulary for activation state
//          without committing to a storage or concurrency strategy here.
// Dependencies: crate::identifiers, crate::time, serde
// ============================================================================

//! ## Overview
//! The kill switch has three independent scopes that combine with strict
//! priority: `Global` overrides `Repository`, which overrides `Execution`.
//! [`KillSwitchState`] is the read model returned by the service; the
//! service itself (with its `RwLock`-guarded storage) lives in
//! `pipeline_killswitch`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ExecutionId;
use crate::identifiers::RepositoryId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Scope a kill-switch activation applies to.
///
/// # Invariants
/// - Ordered by priority for resolution: `Global > Repository > Execution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSwitchScope {
    /// Halts every execution across every repository.
    Global,
    /// Halts every execution for one repository.
    Repository(RepositoryId),
    /// Halts one execution.
    Execution(ExecutionId),
}

impl KillSwitchScope {
    /// Returns the scope's priority rank; lower sorts first when resolving
    /// the effective activation (global wins ties).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Repository(_) => 1,
            Self::Execution(_) => 2,
        }
    }
}

// ============================================================================
// SECTION: Reason
// ============================================================================

/// Why a kill switch was activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KillSwitchReason {
    /// A human or external system requested an immediate halt.
    ManualOverride {
        /// Free-text justification supplied by the operator.
        justification: String,
    },
    /// An automatic trigger (consecutive failures or an overall error rate)
    /// detected a broad failure surge and halted every execution until an
    /// operator investigates.
    SystemOverload {
        /// Human-readable detail, e.g. "consecutive failures threshold
        /// exceeded" or "error rate threshold exceeded".
        details: String,
    },
    /// A repeated, specific failure category triggered an automatic halt.
    RepeatedFailureCategory {
        /// The failure category (see `pipeline_core::failure`) that
        /// repeated.
        category: String,
        /// Number of consecutive occurrences observed.
        occurrences: u32,
    },
}

// ============================================================================
// SECTION: Activation Record
// ============================================================================

/// One entry in the kill switch's append-only activation history.
///
/// # Invariants
/// - Activation records are never mutated or removed once appended;
///   deactivation appends a new record rather than editing the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Scope this record applies to.
    pub scope: KillSwitchScope,
    /// Reason the switch was toggled.
    pub reason: KillSwitchReason,
    /// True when this record activates the switch; false when it
    /// deactivates a previously active scope.
    pub active: bool,
    /// Identity that caused this transition (operator id, or `"system"` for
    /// automatic triggers).
    pub actor: String,
    /// When this transition was recorded.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Failure Metrics
// ============================================================================

/// Rolling, system-wide failure counters used for automatic kill-switch
/// triggering. A failure surge is ambient rather than tied to one
/// repository, so these counters are global.
///
/// # Invariants
/// - `failed_count <= total_count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureMetrics {
    /// Total outcomes recorded since the last reset.
    pub total_count: u32,
    /// Failures observed within the window.
    pub failed_count: u32,
    /// Failures observed back-to-back since the last success.
    pub consecutive_failures: u32,
}

impl FailureMetrics {
    /// Returns an empty metrics window.
    #[must_use]
    pub const fn new() -> Self {
        Self { total_count: 0, failed_count: 0, consecutive_failures: 0 }
    }

    /// Returns the observed failure rate, or `0.0` when no samples have been
    /// recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "counts are bounded well under f64's exact integer range")]
    pub fn failure_rate(self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            f64::from(self.failed_count) / f64::from(self.total_count)
        }
    }
}

impl Default for FailureMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Effective kill-switch state for a given execution, after applying scope
/// priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchState {
    /// Whether any scope covering the queried execution is active.
    pub active: bool,
    /// The highest-priority active record covering the queried execution,
    /// when `active` is true.
    pub effective_record: Option<ActivationRecord>,
}

impl KillSwitchState {
    /// Returns the inactive state.
    #[must_use]
    pub const fn inactive() -> Self {
        Self { active: false, effective_record: None }
    }
}

#[cfg(test)]
mod tests {
    use super::FailureMetrics;
    use super::KillSwitchScope;

    #[test]
    fn scope_priority_orders_global_first() {
        assert!(KillSwitchScope::Global.priority() < KillSwitchScope::Repository(
            crate::identifiers::RepositoryId::new("r")
        ).priority());
        assert!(
            KillSwitchScope::Repository(crate::identifiers::RepositoryId::new("r")).priority()
                < KillSwitchScope::Execution(crate::identifiers::ExecutionId::new("e")).priority()
        );
    }

    #[test]
    fn failure_rate_is_zero_with_no_samples() {
        assert_eq!(FailureMetrics::new().failure_rate(), 0.0);
    }

    #[test]
    fn failure_rate_computes_ratio() {
        let metrics = FailureMetrics { total_count: 4, failed_count: 3, consecutive_failures: 3 };
        assert!((metrics.failure_rate() - 0.75).abs() < f64::EPSILON);
    }
}
