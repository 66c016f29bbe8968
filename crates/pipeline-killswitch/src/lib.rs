// crates/pipeline-killswitch/src/lib.rs
// ============================================================================
// Crate: pipeline-killswitch
// Description: Kill-Switch Service (C3): scoped activation state with
//              strict priority resolution, automatic failure-rate
//              triggering, and an append-only audit history.
// Purpose: Give every other component one authority to ask "is this
//          execution allowed to proceed" without coupling them to the
//          locking strategy behind that answer.
// ============================================================================

//! ## Overview
//! [`KillSwitchService`] guards its state behind a single [`RwLock`]. Every
//! method that needs to emit something (an activation or deactivation
//! notice) takes a snapshot inside the lock and returns it to the caller to
//! emit after the lock is released; the service itself never holds the lock
//! across an emission, since emission can be arbitrarily slow and would
//! otherwise stall every concurrent query against the switch.

use std::collections::HashMap;
use std::sync::RwLock;

use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::RepositoryId;
use pipeline_core::killswitch::ActivationRecord;
use pipeline_core::killswitch::FailureMetrics;
use pipeline_core::killswitch::KillSwitchReason;
use pipeline_core::killswitch::KillSwitchScope;
use pipeline_core::killswitch::KillSwitchState;
use pipeline_core::time::Timestamp;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Automatic-triggering configuration for the kill switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoTriggerConfig {
    /// Failure rate, `0.0..=1.0`, that activates a global kill switch
    /// automatically.
    pub failure_rate_threshold: f64,
    /// Minimum number of samples required before the failure rate is
    /// considered significant.
    pub minimum_sample_size: u32,
    /// Consecutive failures, with no intervening success, that activate a
    /// global kill switch automatically.
    pub max_consecutive_failures: u32,
}

impl Default for AutoTriggerConfig {
    fn default() -> Self {
        Self { failure_rate_threshold: 0.5, minimum_sample_size: 5, max_consecutive_failures: 5 }
    }
}

// ============================================================================
// SECTION: Internal State
// ============================================================================

/// Guarded state held behind the service's single lock.
struct State {
    /// Whether the global scope is currently active.
    global_active: Option<ActivationRecord>,
    /// Active repository-scoped switches, keyed by repository.
    repository_active: HashMap<RepositoryId, ActivationRecord>,
    /// Active execution-scoped switches, keyed by execution.
    execution_active: HashMap<ExecutionId, ActivationRecord>,
    /// Append-only audit history, oldest first.
    history: Vec<ActivationRecord>,
    /// Rolling, system-wide failure metrics used for automatic triggering.
    /// A failure surge is ambient, not repository-specific, so this is one
    /// counter rather than one per repository.
    metrics: FailureMetrics,
}

impl State {
    fn new() -> Self {
        Self {
            global_active: None,
            repository_active: HashMap::new(),
            execution_active: HashMap::new(),
            history: Vec::new(),
            metrics: FailureMetrics::new(),
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Errors returned while interacting with the kill switch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KillSwitchError {
    /// The in-memory lock was poisoned by a panicking holder.
    #[error("kill switch state lock was poisoned")]
    LockPoisoned,
}

/// Scoped kill-switch authority shared across the orchestrator, decision
/// engine, and an operator-facing status endpoint.
pub struct KillSwitchService {
    state: RwLock<State>,
    auto_trigger: AutoTriggerConfig,
}

impl KillSwitchService {
    /// Builds a new service with no active scopes and the given automatic
    /// triggering configuration.
    #[must_use]
    pub fn new(auto_trigger: AutoTriggerConfig) -> Self {
        Self { state: RwLock::new(State::new()), auto_trigger }
    }

    /// Activates `scope` for `reason`, attributed to `actor`, at
    /// `recorded_at`.
    ///
    /// Returns the activation record the caller should emit to the event
    /// bus; the lock is released before this method returns.
    pub fn activate(
        &self,
        scope: KillSwitchScope,
        reason: KillSwitchReason,
        actor: impl Into<String>,
        recorded_at: Timestamp,
    ) -> Result<ActivationRecord, KillSwitchError> {
        let record = ActivationRecord { scope, reason, active: true, actor: actor.into(), recorded_at };
        let mut state = self.state.write().map_err(|_| KillSwitchError::LockPoisoned)?;
        apply_activation(&mut state, record.clone());
        Ok(record)
    }

    /// Deactivates `scope`, attributed to `actor`, at `recorded_at`.
    ///
    /// Returns the deactivation record the caller should emit; a no-op
    /// deactivation (the scope was already inactive) still returns a
    /// record so callers have a consistent audit trail.
    pub fn deactivate(
        &self,
        scope: KillSwitchScope,
        actor: impl Into<String>,
        recorded_at: Timestamp,
    ) -> Result<ActivationRecord, KillSwitchError> {
        let reason = KillSwitchReason::ManualOverride { justification: "deactivated".to_string() };
        let record = ActivationRecord { scope, reason, active: false, actor: actor.into(), recorded_at };
        let mut state = self.state.write().map_err(|_| KillSwitchError::LockPoisoned)?;
        apply_deactivation(&mut state, record.clone());
        Ok(record)
    }

    /// Returns the effective kill-switch state covering `execution_id`
    /// within `repository_id`, resolving global, repository, and execution
    /// scopes by priority.
    pub fn query(
        &self,
        repository_id: &RepositoryId,
        execution_id: &ExecutionId,
    ) -> Result<KillSwitchState, KillSwitchError> {
        let state = self.state.read().map_err(|_| KillSwitchError::LockPoisoned)?;
        if let Some(record) = &state.global_active {
            return Ok(KillSwitchState { active: true, effective_record: Some(record.clone()) });
        }
        if let Some(record) = state.repository_active.get(repository_id) {
            return Ok(KillSwitchState { active: true, effective_record: Some(record.clone()) });
        }
        if let Some(record) = state.execution_active.get(execution_id) {
            return Ok(KillSwitchState { active: true, effective_record: Some(record.clone()) });
        }
        Ok(KillSwitchState::inactive())
    }

    /// Returns the full append-only activation history, oldest first.
    pub fn history(&self) -> Result<Vec<ActivationRecord>, KillSwitchError> {
        let state = self.state.read().map_err(|_| KillSwitchError::LockPoisoned)?;
        Ok(state.history.clone())
    }

    /// Records one execution outcome and, if either automatic trigger fires
    /// — a consecutive-failure streak or an overall error rate over a
    /// minimum sample size — activates a global kill switch.
    ///
    /// The consecutive-failure rule is checked first: it alone should never
    /// be masked by an already-healthy overall rate. Returns the activation
    /// record when this call triggered one.
    pub fn record_outcome(&self, failed: bool, recorded_at: Timestamp) -> Result<Option<ActivationRecord>, KillSwitchError> {
        let mut state = self.state.write().map_err(|_| KillSwitchError::LockPoisoned)?;

        state.metrics.total_count += 1;
        if failed {
            state.metrics.failed_count += 1;
            state.metrics.consecutive_failures += 1;
        } else {
            state.metrics.consecutive_failures = 0;
        }
        let metrics = state.metrics;

        if state.global_active.is_some() {
            return Ok(None);
        }

        if metrics.consecutive_failures >= self.auto_trigger.max_consecutive_failures {
            let record = system_overload_record("consecutive failures threshold exceeded", recorded_at);
            apply_activation(&mut state, record.clone());
            return Ok(Some(record));
        }

        if metrics.total_count >= self.auto_trigger.minimum_sample_size
            && metrics.failure_rate() >= self.auto_trigger.failure_rate_threshold
        {
            let record = system_overload_record("error rate threshold exceeded", recorded_at);
            apply_activation(&mut state, record.clone());
            return Ok(Some(record));
        }

        Ok(None)
    }

    /// Zeroes the rolling failure counters without touching any active
    /// scope or the activation history.
    pub fn reset_metrics(&self) -> Result<(), KillSwitchError> {
        let mut state = self.state.write().map_err(|_| KillSwitchError::LockPoisoned)?;
        state.metrics = FailureMetrics::new();
        Ok(())
    }

    /// Returns a snapshot of every currently active scope, for an
    /// operator-facing status surface.
    pub fn scope_snapshot(&self) -> Result<ScopeSnapshot, KillSwitchError> {
        let state = self.state.read().map_err(|_| KillSwitchError::LockPoisoned)?;
        Ok(ScopeSnapshot {
            global: state.global_active.clone(),
            repository_active: state.repository_active.clone(),
            execution_active: state.execution_active.clone(),
        })
    }
}

/// Every currently active kill-switch scope, read out of the guarded state
/// in one lock acquisition.
#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    /// The active global record, when the global scope is active.
    pub global: Option<ActivationRecord>,
    /// Active repository-scoped switches, keyed by repository.
    pub repository_active: HashMap<RepositoryId, ActivationRecord>,
    /// Active execution-scoped switches, keyed by execution.
    pub execution_active: HashMap<ExecutionId, ActivationRecord>,
}

/// Builds the global, `system_overload` activation record an automatic
/// trigger emits.
fn system_overload_record(details: &str, recorded_at: Timestamp) -> ActivationRecord {
    ActivationRecord {
        scope: KillSwitchScope::Global,
        reason: KillSwitchReason::SystemOverload { details: details.to_string() },
        active: true,
        actor: "system".to_string(),
        recorded_at,
    }
}

/// Applies an activation record to guarded state, updating the relevant
/// scope map and appending to history.
fn apply_activation(state: &mut State, record: ActivationRecord) {
    match &record.scope {
        KillSwitchScope::Global => state.global_active = Some(record.clone()),
        KillSwitchScope::Repository(id) => {
            state.repository_active.insert(id.clone(), record.clone());
        }
        KillSwitchScope::Execution(id) => {
            state.execution_active.insert(id.clone(), record.clone());
        }
    }
    state.history.push(record);
}

/// Applies a deactivation record to guarded state, clearing the relevant
/// scope map and appending to history.
fn apply_deactivation(state: &mut State, record: ActivationRecord) {
    match &record.scope {
        KillSwitchScope::Global => state.global_active = None,
        KillSwitchScope::Repository(id) => {
            state.repository_active.remove(id);
        }
        KillSwitchScope::Execution(id) => {
            state.execution_active.remove(id);
        }
    }
    state.history.push(record);
}
