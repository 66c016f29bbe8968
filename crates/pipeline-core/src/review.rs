// crates/pipeline-core/src/review.rs
// ============================================================================
// Module: Review Data Model
// Description: Inputs and outputs of the Decision Engine (C4): assessments,
//              thresholds, decisions, and iteration guidance.
// Purpose: Give the decision engine, review dispatcher, and orchestrator a
//          shared, serializable vocabulary for review outcomes.
// Dependencies: crate::identifiers, serde
// ============================================================================

//! ## Overview
//! These types are produced by external analyzers (security, architecture)
//! and the external test executor, and consumed by `pipeline_decision`'s
//! `make_decision`. None of the types in this module carry behavior beyond
//! simple constructors; the decision logic itself lives in `pipeline_decision`
//! so it can stay a pure, independently testable function.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ExecutionId;

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Severity shared by vulnerabilities, breaking changes, and blocking issues.
///
/// # Invariants
/// - Variants are stable for serialization and ordering (`Critical` is
///   greatest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational or cosmetic.
    Low,
    /// Should be addressed but does not block on its own.
    Medium,
    /// Blocks approval once over the configured cap.
    High,
    /// Always blocks approval unless already counted as a critical overage.
    Critical,
}

// ============================================================================
// SECTION: Review Thresholds
// ============================================================================

/// Numeric and policy limits that govern decision outcomes.
///
/// # Invariants
/// - `max_iterations == 0` disables the iteration cap check entirely.
/// - `min_test_coverage` is only enforced when `Some` and greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewThresholds {
    /// Upper bound for overall risk to remain acceptable for production.
    pub max_risk_score: u32,
    /// Security-specific risk upper bound.
    pub max_security_risk_score: u32,
    /// Architecture-specific risk upper bound.
    pub max_architecture_risk_score: u32,
    /// Maximum critical issues tolerated before an automatic abort.
    pub max_critical_issues: u32,
    /// Maximum high-severity issues tolerated before iteration is forced.
    pub max_high_issues: u32,
    /// Maximum breaking changes tolerated when breaking changes are allowed.
    pub max_breaking_changes: u32,
    /// Hard cap on generate/test/review iterations. Zero disables the cap.
    pub max_iterations: u32,
    /// Minimum test coverage percentage, enforced only when set.
    pub min_test_coverage: Option<f64>,
    /// Diverts security-blocking outcomes to manual review instead of
    /// automatic iteration.
    pub require_security_approval: bool,
    /// Treats every detected secret as a critical blocking issue.
    pub block_on_secrets: bool,
    /// Allows breaking changes up to `max_breaking_changes` without
    /// blocking.
    pub allow_breaking_changes: bool,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            max_risk_score: 50,
            max_security_risk_score: 30,
            max_architecture_risk_score: 40,
            max_critical_issues: 0,
            max_high_issues: 2,
            max_breaking_changes: 0,
            max_iterations: 3,
            min_test_coverage: None,
            require_security_approval: true,
            block_on_secrets: true,
            allow_breaking_changes: false,
        }
    }
}

// ============================================================================
// SECTION: Security Assessment
// ============================================================================

/// Vulnerability finding reported by the external security analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Finding severity.
    pub severity: Severity,
    /// Repository-relative file path.
    pub file_path: String,
    /// First affected line (1-based).
    pub line_start: u32,
    /// Last affected line (1-based, inclusive).
    pub line_end: u32,
    /// Short finding title.
    pub title: String,
    /// Full finding description.
    pub description: String,
    /// Suggested remediation.
    pub remediation: String,
    /// Common Weakness Enumeration identifier, when known.
    pub cwe: Option<String>,
    /// OWASP category identifier, when known.
    pub owasp_id: Option<String>,
}

/// Secret detected by the external security analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSecret {
    /// Secret type label (for example `api_key`).
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Repository-relative file path.
    pub file_path: String,
    /// Line number (1-based).
    pub line_number: u32,
    /// Human-readable description.
    pub description: String,
    /// Redacted representation safe for display.
    pub redacted: String,
}

/// Security assessment produced by the external analyzer.
///
/// # Invariants
/// - `overall_security_score` is in `0..=100`; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    /// Overall security score, `0..=100`; higher is better.
    pub overall_security_score: u32,
    /// Vulnerabilities found in the patch.
    pub vulnerabilities_found: Vec<Vulnerability>,
    /// Secrets detected in the patch.
    pub secrets_detected: Vec<DetectedSecret>,
    /// Insecure pattern matches, surfaced as warnings only.
    pub insecure_patterns: Vec<String>,
    /// Analyzer-declared need for a mandatory human security review.
    pub requires_security_review: bool,
    /// Reason the analyzer requested security review.
    pub security_review_reason: Option<String>,
}

// ============================================================================
// SECTION: Architecture Assessment
// ============================================================================

/// Architecture compliance status reported by the external analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureStatus {
    /// No violations or warnings.
    Compliant,
    /// Non-blocking warnings present.
    Warnings,
    /// Policy violations present.
    Violations,
    /// Analyzer refuses to approve regardless of other signals.
    Blocked,
}

/// A single breaking API change reported by the external analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    /// Kind of breaking change (for example `removed_api`).
    pub change_type: String,
    /// Repository-relative file path.
    pub file_path: String,
    /// Affected symbol name.
    pub symbol: String,
    /// Finding severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Suggested migration path for downstream consumers.
    pub migration_path: Option<String>,
}

/// Architecture assessment produced by the external analyzer.
///
/// # Invariants
/// - `overall_architecture_score` is in `0..=100`; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureAssessment {
    /// Overall architecture score, `0..=100`; higher is better.
    pub overall_architecture_score: u32,
    /// Breaking changes found in the patch.
    pub breaking_changes: Vec<BreakingChange>,
    /// Overall architecture compliance status.
    pub architecture_status: ArchitectureStatus,
    /// Analyzer-declared need for a mandatory human architecture review.
    pub requires_architecture_review: bool,
    /// Dependency rule violations, surfaced as warnings only.
    pub dependency_violations: Vec<String>,
    /// Layering rule violations, surfaced as warnings only.
    pub layering_violations: Vec<String>,
}

// ============================================================================
// SECTION: Test Result
// ============================================================================

/// Outcome of the external test executor.
///
/// # Invariants
/// - `passed_tests + failed_tests + skipped_tests <= total_tests`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Total tests selected for the run.
    pub total_tests: u32,
    /// Tests that passed.
    pub passed_tests: u32,
    /// Tests that failed.
    pub failed_tests: u32,
    /// Tests that were skipped.
    pub skipped_tests: u32,
    /// Whether the overall test run succeeded.
    pub success: bool,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: u64,
    /// Measured coverage percentage, `0.0..=100.0`.
    pub coverage: f64,
}

// ============================================================================
// SECTION: Decision Request / Response
// ============================================================================

/// Phase label carried through for traceability; not interpreted by the
/// decision engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPhase(pub String);

/// Input to the Decision Engine's pure `make_decision` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Execution under review.
    pub execution_id: ExecutionId,
    /// Review phase label.
    pub review_phase: ReviewPhase,
    /// Security assessment, when a security analyzer ran.
    pub security_assessment: Option<SecurityAssessment>,
    /// Architecture assessment, when an architecture analyzer ran.
    pub architecture_assessment: Option<ArchitectureAssessment>,
    /// Test result, when tests ran before this review.
    pub test_result: Option<TestResult>,
    /// 0-based iteration number this review corresponds to.
    pub iteration_number: u32,
    /// Effective thresholds for this execution.
    pub thresholds: ReviewThresholds,
    /// Kill-switch state observed at dispatch time.
    pub kill_switch_active: bool,
}

/// Final decision emitted by the Decision Engine.
///
/// # Invariants
/// - Exactly one of the variants documented in the component design's
///   decision-synthesis table is produced per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No blocking issues and no warnings.
    Approve,
    /// No blocking issues, but warnings were recorded.
    ApproveWithWarnings,
    /// Blocking issues require another generate/test/review cycle.
    Iterate,
    /// Security requires human sign-off; execution pauses.
    ManualReview,
    /// Execution is terminated without delivery.
    Abort,
    /// Already-pushed commits should be rolled back. Reserved for callers
    /// outside the core; the engine itself never emits this variant
    /// (see the Non-goals: no rollback of pushed commits).
    Rollback,
    /// Execution is marked complete without a further push step.
    MarkComplete,
}

/// Qualitative risk bucket derived from `overall_risk_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// `overall_risk_score < 30`.
    Low,
    /// `30 <= overall_risk_score < 60`.
    Medium,
    /// `60 <= overall_risk_score < 80`.
    High,
    /// `overall_risk_score >= 80`.
    Critical,
}

impl RiskLevel {
    /// Computes the risk level for a score using the `{80, 60, 30}`
    /// thresholds.
    #[must_use]
    pub const fn from_score(overall_risk_score: u32) -> Self {
        if overall_risk_score >= 80 {
            Self::Critical
        } else if overall_risk_score >= 60 {
            Self::High
        } else if overall_risk_score >= 30 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Aggregated risk assessment attached to every [`DecisionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Security-derived risk contribution, `0..=100`.
    pub security_risk_score: Option<u32>,
    /// Architecture-derived risk contribution, `0..=100`.
    pub architecture_risk_score: Option<u32>,
    /// Test-derived risk contribution, `0..=100`.
    pub test_risk_score: Option<u32>,
    /// Weighted overall risk score, `0..=100`.
    pub overall_risk_score: u32,
    /// Qualitative bucket derived from `overall_risk_score`.
    pub risk_level: RiskLevel,
    /// True when `overall_risk_score <= acceptance_threshold`.
    pub acceptable_for_production: bool,
    /// Threshold used to compute `acceptable_for_production`
    /// (`thresholds.max_risk_score`).
    pub acceptance_threshold: u32,
    /// Human-readable contributing factors.
    pub risk_factors: Vec<String>,
    /// Human-readable mitigations already applied or suggested.
    pub mitigations: Vec<String>,
}

/// Provenance and severity of one item that prevented approval or warranted
/// a warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingIssue {
    /// Issue severity.
    pub severity: Severity,
    /// Short title, formatted per signal kind (see `pipeline_decision`).
    pub title: String,
    /// Repository-relative file path the issue is anchored to, if any.
    pub file_path: Option<String>,
    /// Suggested remediation or next step.
    pub suggestion: Option<String>,
}

/// Priority of a suggested next action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    /// Must happen before anything else proceeds.
    Immediate,
    /// Should happen soon.
    High,
}

/// One action the orchestrator should take in response to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextActionKind {
    /// Mark the execution complete.
    MarkComplete,
    /// Re-enter generation with feedback.
    Iterate,
    /// Roll back and abort.
    Rollback,
    /// Pause for human review.
    ManualReview,
}

/// A single next action with its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    /// Action kind.
    pub kind: NextActionKind,
    /// Action priority.
    pub priority: ActionPriority,
}

/// Guidance for the next generation iteration, populated only when
/// `decision == Decision::Iterate`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IterationGuidance {
    /// Issues that must be fixed before the next review.
    pub must_fix: Vec<String>,
    /// Issues that should be fixed but will not block approval alone.
    pub should_fix: Vec<String>,
    /// Issues that may be deferred.
    pub may_ignore: Vec<String>,
    /// Ordered list of priority tags (for example `tests`, or an issue id).
    pub priority: Vec<String>,
    /// Human-readable iteration context, e.g. "Iteration 1 of 3. 3
    /// iterations remaining."
    pub context: String,
}

/// Output of the Decision Engine's pure `make_decision` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// The synthesized decision.
    pub decision: Decision,
    /// Aggregated risk assessment.
    pub risk_assessment: RiskAssessment,
    /// Ordered blocking issues (security secrets, then vulnerabilities, then
    /// breaking changes — see `pipeline_decision` for the exact ordering
    /// guarantee).
    pub blocking_issues: Vec<BlockingIssue>,
    /// Human-readable rationale for the decision.
    pub rationale: String,
    /// Suggested next actions.
    pub next_actions: Vec<NextAction>,
    /// Non-blocking warnings recorded during evaluation.
    pub warnings: Vec<String>,
    /// Iteration guidance, present only for `Decision::Iterate`.
    pub iteration_guidance: Option<IterationGuidance>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::ProptestConfig;
    use proptest::prelude::any;
    use proptest::prop_assert;
    use proptest::proptest;

    use super::RiskLevel;

    #[test]
    fn risk_level_thresholds_are_monotone() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// A higher score never maps to a lower risk level than a lower one.
        #[test]
        fn risk_level_is_monotone_over_arbitrary_scores(a in any::<u32>(), b in any::<u32>()) {
            let (lower, higher) = if a <= b { (a, b) } else { (b, a) };
            let lower_level = RiskLevel::from_score(lower);
            let higher_level = RiskLevel::from_score(higher);
            prop_assert!(level_rank(lower_level) <= level_rank(higher_level));
        }
    }

    /// Maps a risk level to an integer rank for ordering comparisons in
    /// property tests.
    const fn level_rank(level: RiskLevel) -> u8 {
        match level {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }
}
