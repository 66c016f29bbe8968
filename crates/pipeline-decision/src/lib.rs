// crates/pipeline-decision/src/lib.rs
// ============================================================================
// Crate: pipeline-decision
// Description: Decision Engine (C4): synthesizes a single decision from
//              review signals.
// Purpose: Isolate the pipeline's policy logic in one pure, deterministic
//          function so it can be tested exhaustively without a bus, store,
//          or network collaborator.
// ============================================================================

//! ## Overview
//! [`make_decision`] takes a [`DecisionRequest`] and returns a
//! [`DecisionResult`] with no I/O, no shared state, and no dependency on
//! wall-clock time. The evaluation proceeds in a fixed order: kill-switch
//! gate, iteration cap, signal collection, risk computation, decision
//! synthesis, next actions, and iteration guidance. Each stage is a private
//! function so the ordering itself is visible at a glance from `make_decision`.

use pipeline_core::review::ActionPriority;
use pipeline_core::review::ArchitectureAssessment;
use pipeline_core::review::ArchitectureStatus;
use pipeline_core::review::BlockingIssue;
use pipeline_core::review::Decision;
use pipeline_core::review::DecisionRequest;
use pipeline_core::review::DecisionResult;
use pipeline_core::review::IterationGuidance;
use pipeline_core::review::NextAction;
use pipeline_core::review::NextActionKind;
use pipeline_core::review::ReviewThresholds;
use pipeline_core::review::RiskAssessment;
use pipeline_core::review::RiskLevel;
use pipeline_core::review::SecurityAssessment;
use pipeline_core::review::Severity;
use pipeline_core::review::TestResult;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Evaluates a review request and synthesizes a decision.
///
/// # Invariants
/// - Calling this function twice with equal requests returns equal results.
#[must_use]
pub fn make_decision(request: &DecisionRequest) -> DecisionResult {
    if request.kill_switch_active {
        return kill_switch_result();
    }

    if request.thresholds.max_iterations > 0 && request.iteration_number >= request.thresholds.max_iterations {
        return iteration_cap_result(request.iteration_number, request.thresholds.max_iterations);
    }

    let mut blocking_issues = Vec::new();
    let mut warnings = Vec::new();
    let mut criticals = 0u32;
    let mut highs = 0u32;

    let mut security_blocking = false;
    let security_risk = request.security_assessment.as_ref().map(|assessment| {
        let outcome = collect_security_signals(assessment, &request.thresholds, &mut blocking_issues, &mut warnings);
        criticals += outcome.criticals;
        highs += outcome.highs;
        security_blocking = outcome.blocking;
        outcome.risk_score
    });

    let mut architecture_blocking = false;
    let architecture_risk = request.architecture_assessment.as_ref().map(|assessment| {
        let outcome = collect_architecture_signals(assessment, &request.thresholds, &mut blocking_issues, &mut warnings);
        criticals += outcome.criticals;
        highs += outcome.highs;
        architecture_blocking = outcome.blocking;
        outcome.risk_score
    });

    let mut tests_not_passing = false;
    let test_risk = request.test_result.as_ref().map(|result| {
        let outcome = collect_test_signals(result, &request.thresholds, &mut blocking_issues, &mut warnings);
        tests_not_passing = outcome.blocking;
        outcome.risk_score
    });

    let risk_assessment = compute_risk(security_risk, architecture_risk, test_risk, &request.thresholds);

    let decision = synthesize_decision(
        criticals,
        highs,
        &request.thresholds,
        security_blocking,
        architecture_blocking,
        tests_not_passing,
        &warnings,
        &risk_assessment,
    );

    let next_actions = next_actions_for(decision);
    let iteration_guidance = (decision == Decision::Iterate).then(|| {
        build_iteration_guidance(&blocking_issues, request.iteration_number, request.thresholds.max_iterations)
    });

    DecisionResult {
        decision,
        rationale: rationale_for(decision, criticals, request.thresholds.max_critical_issues, &blocking_issues, &risk_assessment),
        risk_assessment,
        blocking_issues,
        next_actions,
        warnings,
        iteration_guidance,
    }
}

// ============================================================================
// SECTION: Signal Outcomes
// ============================================================================

/// Result of evaluating one signal group (security, architecture, or test):
/// its contribution to the overall risk score, whether it blocks approval on
/// its own, and how many critical/high-severity issues it raised.
struct SignalOutcome {
    /// Contribution to the weighted overall risk score.
    risk_score: u32,
    /// Whether this signal group blocks approval independent of severity
    /// counts (used by the "any other blocking condition" decision row).
    blocking: bool,
    /// Critical-severity issues raised by this signal group.
    criticals: u32,
    /// High-severity issues raised by this signal group.
    highs: u32,
}

// ============================================================================
// SECTION: Gate Results
// ============================================================================

/// Builds the fixed result returned whenever the kill switch is active.
fn kill_switch_result() -> DecisionResult {
    DecisionResult {
        decision: Decision::Abort,
        risk_assessment: RiskAssessment {
            security_risk_score: None,
            architecture_risk_score: None,
            test_risk_score: None,
            overall_risk_score: 100,
            risk_level: RiskLevel::Critical,
            acceptable_for_production: false,
            acceptance_threshold: 0,
            risk_factors: vec!["kill switch active".to_string()],
            mitigations: Vec::new(),
        },
        blocking_issues: Vec::new(),
        rationale: "execution halted because an active kill switch covers this execution".to_string(),
        next_actions: vec![NextAction { kind: NextActionKind::Rollback, priority: ActionPriority::Immediate }],
        warnings: Vec::new(),
        iteration_guidance: None,
    }
}

/// Builds the fixed result returned whenever the iteration cap is reached.
fn iteration_cap_result(iteration_number: u32, max_iterations: u32) -> DecisionResult {
    DecisionResult {
        decision: Decision::Abort,
        risk_assessment: RiskAssessment {
            security_risk_score: None,
            architecture_risk_score: None,
            test_risk_score: None,
            overall_risk_score: 100,
            risk_level: RiskLevel::Critical,
            acceptable_for_production: false,
            acceptance_threshold: 0,
            risk_factors: vec!["iteration cap reached".to_string()],
            mitigations: Vec::new(),
        },
        blocking_issues: Vec::new(),
        rationale: format!(
            "iteration {iteration_number} reached the configured cap of {max_iterations} without approval"
        ),
        next_actions: vec![NextAction { kind: NextActionKind::Rollback, priority: ActionPriority::Immediate }],
        warnings: Vec::new(),
        iteration_guidance: None,
    }
}

// ============================================================================
// SECTION: Signal Collection
// ============================================================================

/// Collects security blocking issues and warnings, returning this group's
/// risk contribution, whether it blocks approval, and its critical/high
/// vulnerability counts.
///
/// Secrets are not added to the returned critical count: they drive
/// `blocking` (and, through it, the manual-review branch) rather than the
/// criticals-over-cap abort gate, so a lone secret with `require_security_approval`
/// set routes to manual review instead of an automatic abort.
fn collect_security_signals(
    assessment: &SecurityAssessment,
    thresholds: &ReviewThresholds,
    blocking_issues: &mut Vec<BlockingIssue>,
    warnings: &mut Vec<String>,
) -> SignalOutcome {
    let mut blocking = false;

    if thresholds.block_on_secrets && !assessment.secrets_detected.is_empty() {
        blocking = true;
        for secret in &assessment.secrets_detected {
            blocking_issues.push(BlockingIssue {
                severity: Severity::Critical,
                title: format!("Secret detected: {}", secret.secret_type),
                file_path: Some(secret.file_path.clone()),
                suggestion: Some(
                    "Remove the secret and use environment variables or a secrets manager".to_string(),
                ),
            });
        }
    }

    let mut criticals = 0u32;
    let mut highs = 0u32;
    for vulnerability in &assessment.vulnerabilities_found {
        match vulnerability.severity {
            Severity::Critical => criticals += 1,
            Severity::High => highs += 1,
            Severity::Medium | Severity::Low => {}
        }
        if matches!(vulnerability.severity, Severity::Critical | Severity::High) {
            blocking_issues.push(BlockingIssue {
                severity: vulnerability.severity,
                title: vulnerability.title.clone(),
                file_path: Some(vulnerability.file_path.clone()),
                suggestion: Some(vulnerability.remediation.clone()),
            });
        } else {
            warnings.push(format!("{}: {}", vulnerability.file_path, vulnerability.title));
        }
    }
    if criticals > 0 {
        blocking = true;
    }

    let risk_score = 100 - assessment.overall_security_score;
    if risk_score > thresholds.max_security_risk_score {
        warnings.push(format!("security risk {risk_score} exceeds threshold {}", thresholds.max_security_risk_score));
        blocking = true;
    }

    if assessment.requires_security_review && thresholds.require_security_approval {
        warnings.push(
            assessment
                .security_review_reason
                .clone()
                .unwrap_or_else(|| "security analysis flagged this change for manual review".to_string()),
        );
        blocking = true;
    }

    if highs > thresholds.max_high_issues {
        warnings.push(format!(
            "{highs} high-severity vulnerabilities exceed the configured limit of {}",
            thresholds.max_high_issues
        ));
    }

    warnings.extend(assessment.insecure_patterns.iter().cloned());

    SignalOutcome { risk_score, blocking, criticals, highs }
}

/// Collects architecture blocking issues and warnings, returning this
/// group's risk contribution, whether it blocks approval, and its
/// critical/high breaking-change counts.
fn collect_architecture_signals(
    assessment: &ArchitectureAssessment,
    thresholds: &ReviewThresholds,
    blocking_issues: &mut Vec<BlockingIssue>,
    warnings: &mut Vec<String>,
) -> SignalOutcome {
    let mut blocking = false;
    let mut criticals = 0u32;
    let mut highs = 0u32;

    let breaking_count = u32::try_from(assessment.breaking_changes.len()).unwrap_or(u32::MAX);
    if !thresholds.allow_breaking_changes && breaking_count > thresholds.max_breaking_changes {
        blocking = true;
        for change in &assessment.breaking_changes {
            match change.severity {
                Severity::Critical => criticals += 1,
                Severity::High => highs += 1,
                Severity::Medium | Severity::Low => {}
            }
            blocking_issues.push(BlockingIssue {
                severity: change.severity,
                title: format!("Breaking change: {} in {}", change.symbol, change.file_path),
                file_path: Some(change.file_path.clone()),
                suggestion: change.migration_path.clone(),
            });
        }
    } else if breaking_count > thresholds.max_breaking_changes {
        warnings.push(format!(
            "{breaking_count} breaking changes exceed the configured limit of {}",
            thresholds.max_breaking_changes
        ));
    }

    let risk_score = 100 - assessment.overall_architecture_score;
    if risk_score > thresholds.max_architecture_risk_score {
        warnings.push(format!(
            "architecture risk {risk_score} exceeds threshold {}",
            thresholds.max_architecture_risk_score
        ));
        blocking = true;
    }

    if assessment.requires_architecture_review {
        blocking = true;
    }

    if matches!(assessment.architecture_status, ArchitectureStatus::Blocked) {
        blocking = true;
        blocking_issues.push(BlockingIssue {
            severity: Severity::Critical,
            title: "architecture analyzer blocked this change".to_string(),
            file_path: None,
            suggestion: None,
        });
    }

    if matches!(assessment.architecture_status, ArchitectureStatus::Violations) {
        blocking = true;
        for violation in &assessment.dependency_violations {
            blocking_issues.push(BlockingIssue {
                severity: Severity::High,
                title: format!("dependency violation: {violation}"),
                file_path: None,
                suggestion: None,
            });
        }
    }
    warnings.extend(assessment.layering_violations.iter().cloned());

    SignalOutcome { risk_score, blocking, criticals, highs }
}

/// Collects test blocking issues and warnings, returning this group's risk
/// contribution and whether it blocks approval.
///
/// Risk is the discrete rule: 100 if any test failed, else the coverage gap
/// below the configured minimum (0 if coverage meets it or none is set).
#[allow(clippy::cast_possible_truncation, reason = "coverage gap is bounded to 0..=100 before casting")]
#[allow(clippy::cast_sign_loss, reason = "coverage gap is clamped to non-negative before casting")]
fn collect_test_signals(
    result: &TestResult,
    thresholds: &ReviewThresholds,
    blocking_issues: &mut Vec<BlockingIssue>,
    warnings: &mut Vec<String>,
) -> SignalOutcome {
    let mut blocking = false;

    if !result.success || result.failed_tests > 0 {
        blocking = true;
        blocking_issues.push(BlockingIssue {
            severity: Severity::High,
            title: format!("{} of {} tests failed", result.failed_tests, result.total_tests),
            file_path: None,
            suggestion: Some("fix the failing tests before requesting another review".to_string()),
        });
    }

    let mut coverage_gap = 0.0;
    if let Some(minimum) = thresholds.min_test_coverage {
        if result.coverage < minimum {
            blocking = true;
            coverage_gap = minimum - result.coverage;
            blocking_issues.push(BlockingIssue {
                severity: Severity::Medium,
                title: format!("coverage {:.1}% is below the required {minimum:.1}%", result.coverage),
                file_path: None,
                suggestion: Some("add tests to cover the remaining branches".to_string()),
            });
        }
    }

    if result.skipped_tests > 0 {
        warnings.push(format!("{} tests were skipped", result.skipped_tests));
    }

    let risk_score = if !result.success { 100 } else { coverage_gap.max(0.0).round() as u32 };

    SignalOutcome { risk_score, blocking, criticals: 0, highs: 0 }
}

// ============================================================================
// SECTION: Risk Computation
// ============================================================================

/// Relative weight given to the security signal in the overall risk score.
const SECURITY_WEIGHT: f64 = 0.5;
/// Relative weight given to the architecture signal in the overall risk
/// score.
const ARCHITECTURE_WEIGHT: f64 = 0.3;
/// Relative weight given to the test signal in the overall risk score.
const TEST_WEIGHT: f64 = 0.2;

/// Combines per-signal risk contributions into an overall, weighted risk
/// score and level.
#[allow(clippy::cast_possible_truncation, reason = "weighted sum of 0..=100 inputs stays within u32 range")]
#[allow(clippy::cast_sign_loss, reason = "weighted sum of non-negative inputs is never negative")]
fn compute_risk(
    security: Option<u32>,
    architecture: Option<u32>,
    test: Option<u32>,
    thresholds: &ReviewThresholds,
) -> RiskAssessment {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut risk_factors = Vec::new();

    if let Some(score) = security {
        weighted_sum += f64::from(score) * SECURITY_WEIGHT;
        weight_total += SECURITY_WEIGHT;
        if score > thresholds.max_security_risk_score {
            risk_factors.push(format!("security risk {score} exceeds threshold {}", thresholds.max_security_risk_score));
        }
    }
    if let Some(score) = architecture {
        weighted_sum += f64::from(score) * ARCHITECTURE_WEIGHT;
        weight_total += ARCHITECTURE_WEIGHT;
        if score > thresholds.max_architecture_risk_score {
            risk_factors.push(format!(
                "architecture risk {score} exceeds threshold {}",
                thresholds.max_architecture_risk_score
            ));
        }
    }
    if let Some(score) = test {
        weighted_sum += f64::from(score) * TEST_WEIGHT;
        weight_total += TEST_WEIGHT;
    }

    let overall_risk_score = if weight_total > 0.0 { (weighted_sum / weight_total).round() as u32 } else { 0 };
    let risk_level = RiskLevel::from_score(overall_risk_score);
    let acceptable_for_production = overall_risk_score <= thresholds.max_risk_score;

    if !acceptable_for_production {
        risk_factors.push(format!(
            "overall risk {overall_risk_score} exceeds acceptance threshold {}",
            thresholds.max_risk_score
        ));
    }

    RiskAssessment {
        security_risk_score: security,
        architecture_risk_score: architecture,
        test_risk_score: test,
        overall_risk_score,
        risk_level,
        acceptable_for_production,
        acceptance_threshold: thresholds.max_risk_score,
        risk_factors,
        mitigations: Vec::new(),
    }
}

// ============================================================================
// SECTION: Decision Synthesis
// ============================================================================

/// Synthesizes the final decision from the signal groups' outcomes,
/// following the decision table's first-match-wins order: criticals over
/// the configured cap abort outright; otherwise a security-blocking
/// condition combined with `require_security_approval` routes to manual
/// review; otherwise any other blocking condition (highs over cap, risk
/// over cap, a blocking security/architecture signal, or failing tests)
/// routes to iterate; a clean review with warnings approves with warnings;
/// otherwise it approves outright.
fn synthesize_decision(
    criticals: u32,
    highs: u32,
    thresholds: &ReviewThresholds,
    security_blocking: bool,
    architecture_blocking: bool,
    tests_not_passing: bool,
    warnings: &[String],
    risk_assessment: &RiskAssessment,
) -> Decision {
    if criticals > thresholds.max_critical_issues {
        return Decision::Abort;
    }

    if security_blocking && thresholds.require_security_approval {
        return Decision::ManualReview;
    }

    let other_blocking = highs > thresholds.max_high_issues
        || !risk_assessment.acceptable_for_production
        || security_blocking
        || architecture_blocking
        || tests_not_passing;
    if other_blocking {
        return Decision::Iterate;
    }

    if warnings.is_empty() { Decision::Approve } else { Decision::ApproveWithWarnings }
}

/// Builds the human-readable rationale accompanying a decision.
fn rationale_for(
    decision: Decision,
    criticals: u32,
    max_critical_issues: u32,
    blocking_issues: &[BlockingIssue],
    risk: &RiskAssessment,
) -> String {
    match decision {
        Decision::Approve => "All checks passed".to_string(),
        Decision::ApproveWithWarnings => "no blocking issues were raised, but warnings require attention".to_string(),
        Decision::Iterate => format!("{} blocking issue(s) must be resolved before approval", blocking_issues.len()),
        Decision::ManualReview => {
            "Manual review required: security analysis flagged this change for human review".to_string()
        }
        Decision::Abort if criticals > max_critical_issues => format!(
            "Critical issues exceed threshold: {criticals} critical issue(s) exceed the configured limit of {max_critical_issues}"
        ),
        Decision::Abort => format!(
            "overall risk score {} exceeded the acceptance threshold of {}",
            risk.overall_risk_score, risk.acceptance_threshold
        ),
        Decision::Rollback => "already-delivered commits must be rolled back".to_string(),
        Decision::MarkComplete => "the execution is complete".to_string(),
    }
}

/// Builds the next actions the orchestrator should take for a decision.
fn next_actions_for(decision: Decision) -> Vec<NextAction> {
    match decision {
        Decision::Approve | Decision::ApproveWithWarnings => {
            vec![NextAction { kind: NextActionKind::MarkComplete, priority: ActionPriority::High }]
        }
        Decision::Iterate => vec![NextAction { kind: NextActionKind::Iterate, priority: ActionPriority::High }],
        Decision::ManualReview => {
            vec![NextAction { kind: NextActionKind::ManualReview, priority: ActionPriority::Immediate }]
        }
        Decision::Abort | Decision::Rollback => {
            vec![NextAction { kind: NextActionKind::Rollback, priority: ActionPriority::Immediate }]
        }
        Decision::MarkComplete => vec![NextAction { kind: NextActionKind::MarkComplete, priority: ActionPriority::High }],
    }
}

/// Builds iteration guidance from the collected blocking issues, bucketed by
/// severity into must-fix, should-fix, and may-ignore.
fn build_iteration_guidance(
    blocking_issues: &[BlockingIssue],
    iteration_number: u32,
    max_iterations: u32,
) -> IterationGuidance {
    let mut guidance = IterationGuidance::default();
    for issue in blocking_issues {
        match issue.severity {
            Severity::Critical | Severity::High => guidance.must_fix.push(issue.title.clone()),
            Severity::Medium => guidance.should_fix.push(issue.title.clone()),
            Severity::Low => guidance.may_ignore.push(issue.title.clone()),
        }
    }
    guidance.priority = guidance.must_fix.clone();
    let remaining = max_iterations.saturating_sub(iteration_number + 1);
    guidance.context = format!("iteration {iteration_number} of {max_iterations}. {remaining} iterations remaining.");
    guidance
}
