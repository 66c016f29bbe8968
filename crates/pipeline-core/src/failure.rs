// crates/pipeline-core/src/failure.rs
// ============================================================================
// Module: Failure Classifier (C7)
// Description: Pure classification of a raised failure into a category and
//              a retry disposition.
// Purpose: Give the orchestrator one place to decide whether a failure
//          should trigger another iteration, an abort, or a kill-switch
//          escalation, independent of which stage raised it.
// Dependencies: none beyond serde
// ============================================================================

//! ## Overview
//! [`classify`] is a pure function, mirroring the Decision Engine's own
//! purity requirement: given a [`FailureInput`] it always returns the same
//! [`FailureClassification`]. Stage-specific error types (see
//! `crate::interfaces`) are mapped into a [`FailureStage`] by their callers
//! before reaching this module, so the classifier itself stays independent
//! of any one collaborator trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Stage
// ============================================================================

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Repository checkout.
    Checkout,
    /// Patch generation.
    Generation,
    /// Patch application to the workspace.
    PatchApply,
    /// Test execution.
    Test,
    /// Security or architecture analysis.
    Analysis,
    /// Push to the remote.
    Push,
}

// ============================================================================
// SECTION: Category
// ============================================================================

/// Category a failure is classified into.
///
/// # Invariants
/// - `Transient` failures are the only category the orchestrator retries
///   automatically without consuming an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Network, timeout, or other condition expected to clear on its own.
    Transient,
    /// The requested repository, branch, or credentials are invalid; will
    /// not succeed on retry without operator intervention.
    Configuration,
    /// The generator, analyzer, or test executor itself misbehaved
    /// (malformed output, crash) rather than the change being rejected.
    ToolFailure,
    /// The change was correctly evaluated and rejected (test failures,
    /// review issues); expected to be resolved by iterating.
    ContentRejection,
    /// Repeated failures of the same category for the same repository,
    /// warranting kill-switch escalation.
    Systemic,
}

// ============================================================================
// SECTION: Input / Output
// ============================================================================

/// Input to [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInput {
    /// Stage the failure originated in.
    pub stage: FailureStage,
    /// Lowercase, implementation-reported error message.
    pub message: String,
    /// Number of consecutive failures of the same `(stage, category)`
    /// observed for this repository before this one.
    pub consecutive_same_category: u32,
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureClassification {
    /// Assigned category.
    pub category: FailureCategory,
    /// Whether the orchestrator should retry without consuming an
    /// iteration.
    pub retryable: bool,
    /// Whether this classification should be reported to the kill-switch
    /// service as a candidate for automatic activation.
    pub escalate_to_kill_switch: bool,
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Number of consecutive same-category failures that escalates to the kill
/// switch regardless of category.
const SYSTEMIC_ESCALATION_THRESHOLD: u32 = 3;

/// Classifies a failure into a category and retry disposition.
///
/// The message is matched by substring against a small set of known
/// transient and configuration markers; anything unmatched defaults to
/// [`FailureCategory::ToolFailure`] for tooling stages and
/// [`FailureCategory::ContentRejection`] for test and analysis stages, since
/// those stages only fail after successfully producing a verdict.
#[must_use]
pub fn classify(input: &FailureInput) -> FailureClassification {
    let message = input.message.to_ascii_lowercase();

    let category = if is_transient(&message) {
        FailureCategory::Transient
    } else if is_configuration(&message) {
        FailureCategory::Configuration
    } else {
        match input.stage {
            FailureStage::Test | FailureStage::Analysis => FailureCategory::ContentRejection,
            FailureStage::Checkout
            | FailureStage::Generation
            | FailureStage::PatchApply
            | FailureStage::Push => FailureCategory::ToolFailure,
        }
    };

    let escalate = input.consecutive_same_category + 1 >= SYSTEMIC_ESCALATION_THRESHOLD
        && !matches!(category, FailureCategory::ContentRejection);

    let category = if escalate { FailureCategory::Systemic } else { category };

    FailureClassification {
        category,
        retryable: matches!(category, FailureCategory::Transient),
        escalate_to_kill_switch: escalate,
    }
}

/// Returns true when `message` (already lowercased) indicates a transient
/// condition.
fn is_transient(message: &str) -> bool {
    const MARKERS: [&str; 5] = ["timeout", "timed out", "network", "unreachable", "connection reset"];
    MARKERS.iter().any(|marker| message.contains(marker))
}

/// Returns true when `message` (already lowercased) indicates a
/// configuration problem.
fn is_configuration(message: &str) -> bool {
    const MARKERS: [&str; 4] = ["authentication failed", "not found", "permission denied", "invalid branch"];
    MARKERS.iter().any(|marker| message.contains(marker))
}
