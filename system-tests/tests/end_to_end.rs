//! End-to-end tests driving a full execution through checkout, generation,
//! test, review, and delivery against stub external collaborators.
// system-tests/tests/end_to_end.rs
// ============================================================================
// Module: End-to-End Pipeline Tests
// Description: Exercises the orchestrator against stub collaborators across
//              the approve, iterate, manual-review, and kill-switch paths.
// Purpose: Catch regressions in how the crates compose that no single
//          crate's unit tests can see.
// ============================================================================

#![allow(clippy::unwrap_used, reason = "test assertions read more clearly than propagating Result")]

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use pipeline_core::execution::ExecutionRequest;
use pipeline_core::execution::ExecutionStatus;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::interfaces::ArchitectureAnalysisError;
use pipeline_core::interfaces::ArchitectureAnalyzer;
use pipeline_core::interfaces::CheckoutResult;
use pipeline_core::interfaces::CodeGenerationError;
use pipeline_core::interfaces::CodeGenerator;
use pipeline_core::interfaces::GeneratedPatch;
use pipeline_core::interfaces::GenerationFeedback;
use pipeline_core::interfaces::PushResult;
use pipeline_core::interfaces::SecurityAnalysisError;
use pipeline_core::interfaces::SecurityAnalyzer;
use pipeline_core::interfaces::TestExecutionError;
use pipeline_core::interfaces::TestExecutor;
use pipeline_core::interfaces::VcsError;
use pipeline_core::interfaces::VcsExecutor;
use pipeline_core::killswitch::KillSwitchReason;
use pipeline_core::killswitch::KillSwitchScope;
use pipeline_core::review::ArchitectureAssessment;
use pipeline_core::review::ArchitectureStatus;
use pipeline_core::review::Decision;
use pipeline_core::review::DetectedSecret;
use pipeline_core::review::ReviewThresholds;
use pipeline_core::review::SecurityAssessment;
use pipeline_core::review::Severity;
use pipeline_core::review::TestResult;
use pipeline_core::review::Vulnerability;
use pipeline_core::time::Timestamp;
use pipeline_killswitch::AutoTriggerConfig;
use pipeline_killswitch::KillSwitchService;
use pipeline_orchestrator::Orchestrator;
use pipeline_store::ExecutionStore;
use pipeline_store::SqliteExecutionStore;

/// Stub VCS that records how many times [`VcsExecutor::push`] was called, so
/// tests can confirm an approval actually delivered instead of merely
/// reaching a terminal status through some other path.
#[derive(Default)]
struct StubVcs {
    push_count: AtomicU32,
}

#[async_trait]
impl VcsExecutor for StubVcs {
    async fn checkout(&self, _: &ExecutionId, _: &str, _: &str) -> Result<CheckoutResult, VcsError> {
        Ok(CheckoutResult { workspace_path: "/tmp/ws".to_string(), base_commit_sha: "base123".to_string() })
    }
    async fn apply_patch(&self, _: &str, _: &str) -> Result<(), VcsError> {
        Ok(())
    }
    async fn push(&self, _: &str, branch_name: &str, _: &str) -> Result<PushResult, VcsError> {
        self.push_count.fetch_add(1, Ordering::SeqCst);
        Ok(PushResult { branch_name: branch_name.to_string(), commit_sha: "finalsha456".to_string() })
    }
}

struct StubGenerator;
#[async_trait]
impl CodeGenerator for StubGenerator {
    async fn generate(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: Option<&GenerationFeedback>,
    ) -> Result<GeneratedPatch, CodeGenerationError> {
        Ok(GeneratedPatch { diff: "--- a\n+++ b\n".to_string(), summary: "implement feature".to_string() })
    }
}

struct CleanSecurity;
#[async_trait]
impl SecurityAnalyzer for CleanSecurity {
    async fn analyze(&self, _: &str, _: &str) -> Result<SecurityAssessment, SecurityAnalysisError> {
        Ok(SecurityAssessment {
            overall_security_score: 100,
            vulnerabilities_found: Vec::new(),
            secrets_detected: Vec::new(),
            insecure_patterns: Vec::new(),
            requires_security_review: false,
            security_review_reason: None,
        })
    }
}

struct SecretLeakingSecurity;
#[async_trait]
impl SecurityAnalyzer for SecretLeakingSecurity {
    async fn analyze(&self, _: &str, _: &str) -> Result<SecurityAssessment, SecurityAnalysisError> {
        Ok(SecurityAssessment {
            overall_security_score: 40,
            vulnerabilities_found: Vec::new(),
            secrets_detected: vec![DetectedSecret {
                secret_type: "api_key".to_string(),
                file_path: "src/config.rs".to_string(),
                line_number: 3,
                description: "hardcoded api key".to_string(),
                redacted: "sk-***".to_string(),
            }],
            insecure_patterns: Vec::new(),
            requires_security_review: false,
            security_review_reason: None,
        })
    }
}

struct CriticalVulnerabilitySecurity;
#[async_trait]
impl SecurityAnalyzer for CriticalVulnerabilitySecurity {
    async fn analyze(&self, _: &str, _: &str) -> Result<SecurityAssessment, SecurityAnalysisError> {
        Ok(SecurityAssessment {
            overall_security_score: 20,
            vulnerabilities_found: vec![Vulnerability {
                severity: Severity::Critical,
                file_path: "src/auth.rs".to_string(),
                line_start: 40,
                line_end: 52,
                title: "SQL injection in session lookup".to_string(),
                description: "user input is interpolated directly into a query".to_string(),
                remediation: "use a parameterized query".to_string(),
                cwe: Some("CWE-89".to_string()),
                owasp_id: None,
            }],
            secrets_detected: Vec::new(),
            insecure_patterns: Vec::new(),
            requires_security_review: false,
            security_review_reason: None,
        })
    }
}

struct ManualReviewSecurity;
#[async_trait]
impl SecurityAnalyzer for ManualReviewSecurity {
    async fn analyze(&self, _: &str, _: &str) -> Result<SecurityAssessment, SecurityAnalysisError> {
        Ok(SecurityAssessment {
            overall_security_score: 70,
            vulnerabilities_found: Vec::new(),
            secrets_detected: Vec::new(),
            insecure_patterns: Vec::new(),
            requires_security_review: true,
            security_review_reason: Some("novel authentication flow".to_string()),
        })
    }
}

struct CleanArchitecture;
#[async_trait]
impl ArchitectureAnalyzer for CleanArchitecture {
    async fn analyze(&self, _: &str, _: &str) -> Result<ArchitectureAssessment, ArchitectureAnalysisError> {
        Ok(ArchitectureAssessment {
            overall_architecture_score: 100,
            breaking_changes: Vec::new(),
            architecture_status: ArchitectureStatus::Compliant,
            requires_architecture_review: false,
            dependency_violations: Vec::new(),
            layering_violations: Vec::new(),
        })
    }
}

struct PassingTests;
#[async_trait]
impl TestExecutor for PassingTests {
    async fn run_tests(&self, _: &str) -> Result<TestResult, TestExecutionError> {
        Ok(TestResult { total_tests: 12, passed_tests: 12, failed_tests: 0, skipped_tests: 0, success: true, duration_ms: 200, coverage: 92.0 })
    }
}

/// Fails its first `fail_count` runs, then passes, simulating an iteration
/// that eventually fixes a failing test.
struct FlakyThenPassingTests {
    calls: AtomicU32,
    fail_count: u32,
}

#[async_trait]
impl TestExecutor for FlakyThenPassingTests {
    async fn run_tests(&self, _: &str) -> Result<TestResult, TestExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_count {
            Ok(TestResult { total_tests: 10, passed_tests: 8, failed_tests: 2, skipped_tests: 0, success: false, duration_ms: 100, coverage: 80.0 })
        } else {
            Ok(TestResult { total_tests: 10, passed_tests: 10, failed_tests: 0, skipped_tests: 0, success: true, duration_ms: 100, coverage: 88.0 })
        }
    }
}

fn sample_request(id: &str) -> ExecutionRequest {
    ExecutionRequest {
        execution_id: ExecutionId::new(id),
        repository_url: "https://example.com/acme/widgets.git".to_string(),
        target_branch: "main".to_string(),
        title: "add retry logic".to_string(),
        description: "add retry logic to the upload client".to_string(),
        requested_by: "alice".to_string(),
    }
}

/// S1: a clean change with no issues is approved, and the approval itself
/// pushes the delivered branch rather than leaving delivery to a separate,
/// never-triggered call.
#[tokio::test]
async fn clean_change_is_approved_and_delivered() {
    let store = Arc::new(SqliteExecutionStore::open_in_memory().unwrap());
    let vcs = Arc::new(StubVcs::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
        vcs.clone(),
        Arc::new(StubGenerator),
        Arc::new(CleanSecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    let execution = orchestrator.accept(sample_request("s1"), Timestamp::from_unix_millis(0)).await.unwrap();
    let decision = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1)).await.unwrap();
    assert_eq!(decision, Decision::Approve);

    assert_eq!(vcs.push_count.load(Ordering::SeqCst), 1, "approval should push exactly once");
    let stored = store.get(&execution.execution_id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
}

/// S2: failing tests route to iterate; a second iteration that passes is
/// approved, and the iteration count reflects exactly one iterate cycle.
#[tokio::test]
async fn failing_tests_iterate_then_approve_on_retry() {
    let tests = Arc::new(FlakyThenPassingTests { calls: AtomicU32::new(0), fail_count: 1 });
    let orchestrator = Orchestrator::new(
        Arc::new(SqliteExecutionStore::open_in_memory().unwrap()),
        Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
        Arc::new(StubVcs::default()),
        Arc::new(StubGenerator),
        Arc::new(CleanSecurity),
        Arc::new(CleanArchitecture),
        tests,
        ReviewThresholds::default(),
    );

    let execution = orchestrator.accept(sample_request("s2"), Timestamp::from_unix_millis(0)).await.unwrap();

    let first = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1)).await.unwrap();
    assert_eq!(first, Decision::Iterate);

    let second = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(2)).await.unwrap();
    assert_eq!(second, Decision::Approve);
}

/// S3: a critical vulnerability exceeds the default zero-tolerance cap and
/// aborts the execution outright rather than requesting another iteration.
#[tokio::test]
async fn critical_vulnerability_aborts_the_execution() {
    let orchestrator = Orchestrator::new(
        Arc::new(SqliteExecutionStore::open_in_memory().unwrap()),
        Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
        Arc::new(StubVcs::default()),
        Arc::new(StubGenerator),
        Arc::new(CriticalVulnerabilitySecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    let execution = orchestrator.accept(sample_request("s3"), Timestamp::from_unix_millis(0)).await.unwrap();
    let decision = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1)).await.unwrap();
    assert_eq!(decision, Decision::Abort);
}

/// A detected secret, with the default thresholds requiring security
/// approval, routes to manual review rather than an automatic abort.
#[tokio::test]
async fn detected_secret_routes_to_manual_review() {
    let store = Arc::new(SqliteExecutionStore::open_in_memory().unwrap());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
        Arc::new(StubVcs::default()),
        Arc::new(StubGenerator),
        Arc::new(SecretLeakingSecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    let execution = orchestrator.accept(sample_request("s3b"), Timestamp::from_unix_millis(0)).await.unwrap();
    let decision = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1)).await.unwrap();
    assert_eq!(decision, Decision::ManualReview);

    let stored = store.get(&execution.execution_id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Running);
}

/// S4: a security analyzer requesting human sign-off routes to manual
/// review and the execution stays in `running` rather than moving to a
/// terminal status.
#[tokio::test]
async fn security_review_requirement_routes_to_manual_review() {
    let store = Arc::new(SqliteExecutionStore::open_in_memory().unwrap());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
        Arc::new(StubVcs::default()),
        Arc::new(StubGenerator),
        Arc::new(ManualReviewSecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    let execution = orchestrator.accept(sample_request("s4"), Timestamp::from_unix_millis(0)).await.unwrap();
    let decision = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1)).await.unwrap();
    assert_eq!(decision, Decision::ManualReview);

    let stored = store.get(&execution.execution_id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Running);
}

/// S7: an execution-scoped kill switch halts only that execution, leaving a
/// second execution against the same repository unaffected until the
/// repository itself is halted.
#[tokio::test]
async fn execution_scoped_kill_switch_does_not_affect_other_executions() {
    let kill_switch = Arc::new(KillSwitchService::new(AutoTriggerConfig::default()));
    let orchestrator = Orchestrator::new(
        Arc::new(SqliteExecutionStore::open_in_memory().unwrap()),
        kill_switch.clone(),
        Arc::new(StubVcs::default()),
        Arc::new(StubGenerator),
        Arc::new(CleanSecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    let halted = orchestrator.accept(sample_request("s7-halted"), Timestamp::from_unix_millis(0)).await.unwrap();
    let unaffected = orchestrator.accept(sample_request("s7-unaffected"), Timestamp::from_unix_millis(1)).await.unwrap();

    kill_switch
        .activate(
            KillSwitchScope::Execution(halted.execution_id.clone()),
            KillSwitchReason::ManualOverride { justification: "suspicious diff".to_string() },
            "operator",
            Timestamp::from_unix_millis(2),
        )
        .unwrap();

    let halted_result = orchestrator.run_iteration(&halted.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(3)).await;
    assert!(halted_result.is_err());

    let unaffected_decision = orchestrator
        .run_iteration(&unaffected.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(4))
        .await
        .unwrap();
    assert_eq!(unaffected_decision, Decision::Approve);
}

/// S8: repeated failures trigger an automatic global kill switch, with
/// reason `system_overload`, that then halts a fresh execution regardless
/// of which repository it targets.
#[tokio::test]
async fn repeated_failures_automatically_halt_every_execution() {
    struct AlwaysFailingVcs;
    #[async_trait]
    impl VcsExecutor for AlwaysFailingVcs {
        async fn checkout(&self, _: &ExecutionId, _: &str, _: &str) -> Result<CheckoutResult, VcsError> {
            Ok(CheckoutResult { workspace_path: "/tmp/ws".to_string(), base_commit_sha: "base".to_string() })
        }
        async fn apply_patch(&self, _: &str, _: &str) -> Result<(), VcsError> {
            Err(VcsError::PatchApplyFailed { reason: "merge conflict".to_string() })
        }
        async fn push(&self, _: &str, branch_name: &str, _: &str) -> Result<PushResult, VcsError> {
            Ok(PushResult { branch_name: branch_name.to_string(), commit_sha: "unused".to_string() })
        }
    }

    let kill_switch = Arc::new(KillSwitchService::new(AutoTriggerConfig {
        failure_rate_threshold: 0.5,
        minimum_sample_size: 2,
        max_consecutive_failures: 2,
    }));
    let orchestrator = Orchestrator::new(
        Arc::new(SqliteExecutionStore::open_in_memory().unwrap()),
        kill_switch.clone(),
        Arc::new(AlwaysFailingVcs),
        Arc::new(StubGenerator),
        Arc::new(CleanSecurity),
        Arc::new(CleanArchitecture),
        Arc::new(PassingTests),
        ReviewThresholds::default(),
    );

    for i in 0..2 {
        let execution = orchestrator.accept(sample_request(&format!("s8-{i}")), Timestamp::from_unix_millis(i)).await.unwrap();
        let result = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(i + 10)).await;
        assert!(result.is_err());
    }

    let fresh = orchestrator.accept(sample_request("s8-fresh"), Timestamp::from_unix_millis(20)).await;
    assert!(fresh.is_err(), "the global kill switch should have activated automatically");

    let history = kill_switch.history().unwrap();
    assert!(history.iter().any(|record| record.scope == KillSwitchScope::Global
        && matches!(&record.reason, KillSwitchReason::SystemOverload { .. })));
}
