// crates/pipeline-orchestrator/src/lib.rs
// ============================================================================
// Crate: pipeline-orchestrator
// Description: Pipeline Orchestrator (C5 + C6) and Failure Classifier (C7)
//              wiring: event handlers that drive an execution from checkout
//              through delivery or termination.
// Purpose: Connect the event bus, execution store, kill switch, decision
//          engine, and external collaborators into the end-to-end state
//          machine described by the component design.
// ============================================================================

//! ## Overview
//! [`Orchestrator`] holds one `Arc<dyn Trait>` per external collaborator
//! (see `pipeline_core::interfaces`) plus the execution store, kill switch,
//! and event bus. Its methods are small, single-purpose steps
//! (`checkout`, `generate`, `run_tests`, `review`, `deliver`) that the
//! bus-facing [`OrchestratorHandler`] composes into the event-driven state
//! machine; tests exercise the steps directly without a bus in the loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_bus::EventHandler;
use pipeline_bus::HandlerError;
use pipeline_bus::InMemoryBus;
use pipeline_core::events::EventEnvelope;
use pipeline_core::events::IdempotencyKey;
use pipeline_core::events::topic;
use pipeline_core::execution::Execution;
use pipeline_core::execution::ExecutionRequest;
use pipeline_core::execution::ExecutionStatus;
use pipeline_core::failure::FailureInput;
use pipeline_core::failure::FailureStage;
use pipeline_core::failure::classify;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::RepositoryId;
use pipeline_core::interfaces::ArchitectureAnalyzer;
use pipeline_core::interfaces::CodeGenerator;
use pipeline_core::interfaces::GenerationFeedback;
use pipeline_core::interfaces::SecurityAnalyzer;
use pipeline_core::interfaces::TestExecutor;
use pipeline_core::interfaces::VcsExecutor;
#[cfg(test)]
use pipeline_core::review::ArchitectureAssessment;
use pipeline_core::review::Decision;
use pipeline_core::review::DecisionRequest;
use pipeline_core::review::ReviewPhase;
use pipeline_core::review::ReviewThresholds;
#[cfg(test)]
use pipeline_core::review::SecurityAssessment;
#[cfg(test)]
use pipeline_core::review::TestResult;
use pipeline_core::time::Timestamp;
use pipeline_decision::make_decision;
use pipeline_killswitch::KillSwitchService;
use pipeline_store::ExecutionStore;
use pipeline_store::StoreError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Event Payloads
// ============================================================================

/// Payload published on [`topic::REVIEW_COMPLETED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReviewCompletedPayload {
    /// Decision synthesized by the Decision Engine.
    decision: Decision,
    /// Iteration this review corresponds to.
    iteration_number: u32,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by orchestrator steps.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The execution store reported an error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The kill switch reported an error.
    #[error("kill switch error: {0}")]
    KillSwitch(#[from] pipeline_killswitch::KillSwitchError),
    /// A payload failed to serialize or deserialize.
    #[error("payload error: {0}")]
    Payload(String),
    /// The execution was halted by an active kill switch before this step
    /// began.
    #[error("execution {0} halted by kill switch")]
    Halted(ExecutionId),
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Drives one execution through checkout, generation, test, review, and
/// delivery, delegating to backend-agnostic collaborators at each step.
pub struct Orchestrator {
    store: Arc<dyn ExecutionStore>,
    kill_switch: Arc<KillSwitchService>,
    vcs: Arc<dyn VcsExecutor>,
    generator: Arc<dyn CodeGenerator>,
    security: Arc<dyn SecurityAnalyzer>,
    architecture: Arc<dyn ArchitectureAnalyzer>,
    tests: Arc<dyn TestExecutor>,
    thresholds: ReviewThresholds,
}

impl Orchestrator {
    /// Builds an orchestrator from its execution store, kill switch, review
    /// thresholds, and the four external collaborators it delegates to.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "each argument is a distinct, independently substitutable collaborator")]
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        kill_switch: Arc<KillSwitchService>,
        vcs: Arc<dyn VcsExecutor>,
        generator: Arc<dyn CodeGenerator>,
        security: Arc<dyn SecurityAnalyzer>,
        architecture: Arc<dyn ArchitectureAnalyzer>,
        tests: Arc<dyn TestExecutor>,
        thresholds: ReviewThresholds,
    ) -> Self {
        Self { store, kill_switch, vcs, generator, security, architecture, tests, thresholds }
    }

    /// Returns true when a kill switch covers `execution`, checked before
    /// every step that would otherwise consume an iteration or external
    /// resource.
    async fn is_halted(&self, execution: &Execution) -> Result<bool, OrchestratorError> {
        let repository_id = RepositoryId::from_remote_url(&execution.repository_url);
        let state = self.kill_switch.query(&repository_id, &execution.execution_id)?;
        Ok(state.active)
    }

    /// Accepts a new feature request: creates the execution record and
    /// checks out the target repository.
    pub async fn accept(&self, request: ExecutionRequest, now: Timestamp) -> Result<Execution, OrchestratorError> {
        let execution = self.store.create(request, now).await?;
        if self.is_halted(&execution).await? {
            return Err(OrchestratorError::Halted(execution.execution_id));
        }

        let checkout = self.vcs.checkout(&execution.execution_id, &execution.repository_url, &execution.target_branch).await;
        match checkout {
            Ok(_) => {
                let running = self
                    .store
                    .update_status(&execution.execution_id, ExecutionStatus::Running, now, None)
                    .await?;
                Ok(running)
            }
            Err(err) => {
                self.fail(&execution, FailureStage::Checkout, &err.to_string(), now).await?;
                Err(OrchestratorError::Payload(err.to_string()))
            }
        }
    }

    /// Generates a patch, requests tests and review on it, and applies the
    /// resulting decision. This is the single-iteration unit the bus-facing
    /// handler repeats until a terminal decision is reached.
    pub async fn run_iteration(
        &self,
        execution_id: &ExecutionId,
        workspace_path: &str,
        feedback: Option<GenerationFeedback>,
        now: Timestamp,
    ) -> Result<Decision, OrchestratorError> {
        let execution = self.store.get(execution_id).await?;
        if self.is_halted(&execution).await? {
            return Err(OrchestratorError::Halted(execution_id.clone()));
        }

        let generated = match self
            .generator
            .generate(workspace_path, &execution.title, &execution.description, feedback.as_ref())
            .await
        {
            Ok(generated) => generated,
            Err(err) => {
                self.fail(&execution, FailureStage::Generation, &err.to_string(), now).await?;
                return Err(OrchestratorError::Payload(err.to_string()));
            }
        };

        if let Err(err) = self.vcs.apply_patch(workspace_path, &generated.diff).await {
            self.fail(&execution, FailureStage::PatchApply, &err.to_string(), now).await?;
            return Err(OrchestratorError::Payload(err.to_string()));
        }

        let test_result = match self.tests.run_tests(workspace_path).await {
            Ok(result) => Some(result),
            Err(err) => {
                self.fail(&execution, FailureStage::Test, &err.to_string(), now).await?;
                return Err(OrchestratorError::Payload(err.to_string()));
            }
        };

        let security_assessment = self.security.analyze(workspace_path, &generated.diff).await.ok();
        let architecture_assessment = self.architecture.analyze(workspace_path, &generated.diff).await.ok();

        let kill_switch_active = self.is_halted(&execution).await?;
        let decision_request = DecisionRequest {
            execution_id: execution.execution_id.clone(),
            review_phase: ReviewPhase("automated".to_string()),
            security_assessment,
            architecture_assessment,
            test_result,
            iteration_number: execution.iteration_count,
            thresholds: self.thresholds,
            kill_switch_active,
        };
        let result = make_decision(&decision_request);

        self.apply_decision(&execution, &result.decision, workspace_path, now).await?;
        Ok(result.decision)
    }

    /// Applies a synthesized decision to the execution record: delivers and
    /// completes on an approval, increments the iteration count for
    /// `Iterate`, or moves to a terminal status otherwise.
    async fn apply_decision(
        &self,
        execution: &Execution,
        decision: &Decision,
        workspace_path: &str,
        now: Timestamp,
    ) -> Result<(), OrchestratorError> {
        match decision {
            Decision::Approve | Decision::ApproveWithWarnings | Decision::MarkComplete => {
                self.push_and_complete(execution, workspace_path, now).await?;
            }
            Decision::Iterate => {
                self.store.increment_iteration(&execution.execution_id).await?;
            }
            Decision::ManualReview => {
                // Execution remains `running`; a human operator resumes it out of band.
            }
            Decision::Abort | Decision::Rollback => {
                self.store.update_status(&execution.execution_id, ExecutionStatus::Aborted, now, None).await?;
            }
        }
        Ok(())
    }

    /// Pushes the delivered branch for an approved execution, marks it
    /// `completed`, and returns the VCS-reported commit SHA. This is the
    /// `DELIVERING -git.push.completed-> COMPLETED` transition; every
    /// approval-family decision reaches it through [`Self::apply_decision`],
    /// and [`Self::deliver`] is a direct entry point for callers that already
    /// hold an approved execution outside the bus-driven iteration loop.
    async fn push_and_complete(&self, execution: &Execution, workspace_path: &str, now: Timestamp) -> Result<String, OrchestratorError> {
        let branch_name = format!("feature/{}", execution.execution_id.short());
        let commit_message = format!("{}\n\n{}", execution.title, execution.description);

        match self.vcs.push(workspace_path, &branch_name, &commit_message).await {
            Ok(pushed) => {
                self.store.update_status(&execution.execution_id, ExecutionStatus::Completed, now, None).await?;
                self.kill_switch.record_outcome(false, now)?;
                // pushed.commit_sha is the sole source for the execution's final commit SHA.
                Ok(pushed.commit_sha)
            }
            Err(err) => {
                self.fail(execution, FailureStage::Push, &err.to_string(), now).await?;
                Err(OrchestratorError::Payload(err.to_string()))
            }
        }
    }

    /// Pushes and completes an execution that was already approved, for
    /// callers outside the bus-driven iteration loop.
    pub async fn deliver(&self, execution_id: &ExecutionId, workspace_path: &str, now: Timestamp) -> Result<String, OrchestratorError> {
        let execution = self.store.get(execution_id).await?;
        self.push_and_complete(&execution, workspace_path, now).await
    }

    /// Classifies a raised failure and records it against the execution and
    /// the kill switch's rolling metrics, escalating to an automatic
    /// repository-scoped kill switch if the classifier recommends it, on top
    /// of whatever global auto-trigger the rolling metrics themselves fire.
    async fn fail(
        &self,
        execution: &Execution,
        stage: FailureStage,
        message: &str,
        now: Timestamp,
    ) -> Result<(), OrchestratorError> {
        let classification = classify(&FailureInput {
            stage,
            message: message.to_ascii_lowercase(),
            consecutive_same_category: 0,
        });

        self.store
            .update_status(&execution.execution_id, ExecutionStatus::Failed, now, Some(message.to_string()))
            .await?;

        self.kill_switch.record_outcome(true, now)?;

        let repository_id = RepositoryId::from_remote_url(&execution.repository_url);

        if classification.escalate_to_kill_switch {
            self.kill_switch.activate(
                pipeline_core::killswitch::KillSwitchScope::Repository(repository_id),
                pipeline_core::killswitch::KillSwitchReason::RepeatedFailureCategory {
                    category: format!("{:?}", classification.category),
                    occurrences: 1,
                },
                "system",
                now,
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Bus Wiring
// ============================================================================

/// Publishes `payload` to `bus` under `topic_name`, attributed to
/// `execution_id` and `iteration_number` for idempotency.
async fn publish(
    bus: &InMemoryBus,
    execution_id: &ExecutionId,
    topic_name: &str,
    iteration_number: u32,
    payload: Value,
    now: Timestamp,
) -> Result<(), HandlerError> {
    let key = IdempotencyKey::new(execution_id.clone(), topic_name, iteration_number);
    let envelope = EventEnvelope::new(key, topic_name, payload, now);
    bus.publish(envelope).await.map_err(|err| HandlerError::Failed(err.to_string()))
}

/// Bus-facing adapter that drives [`Orchestrator::run_iteration`] from
/// [`topic::CHECKOUT_COMPLETED`] and [`topic::ITERATION_STARTED`] events,
/// publishing the matching completion or failure topic.
pub struct OrchestratorHandler {
    orchestrator: Arc<Orchestrator>,
    bus: Arc<InMemoryBus>,
}

impl OrchestratorHandler {
    /// Builds a handler wrapping `orchestrator` and publishing follow-on
    /// events to `bus`.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, bus: Arc<InMemoryBus>) -> Self {
        Self { orchestrator, bus }
    }
}

#[async_trait]
impl EventHandler for OrchestratorHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let execution_id = envelope.idempotency_key.execution_id.clone();
        let iteration_number = envelope.idempotency_key.iteration_number;
        let now = Timestamp::now();

        let workspace_path: String = envelope
            .payload
            .get("workspace_path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        match self.orchestrator.run_iteration(&execution_id, &workspace_path, None, now).await {
            Ok(decision) => {
                let payload = ReviewCompletedPayload { decision, iteration_number };
                let value = serde_json::to_value(payload).map_err(|err| HandlerError::Failed(err.to_string()))?;
                publish(&self.bus, &execution_id, topic::REVIEW_COMPLETED, iteration_number, value, now).await
            }
            Err(err) => {
                let value = serde_json::json!({ "reason": err.to_string() });
                publish(&self.bus, &execution_id, topic::EXECUTION_FAILED, iteration_number, value, now).await
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions read more clearly than propagating Result")]
mod tests {
    use pipeline_core::interfaces::ArchitectureAnalysisError;
    use pipeline_core::interfaces::CheckoutResult;
    use pipeline_core::interfaces::CodeGenerationError;
    use pipeline_core::interfaces::GeneratedPatch;
    use pipeline_core::interfaces::PushResult;
    use pipeline_core::interfaces::SecurityAnalysisError;
    use pipeline_core::interfaces::TestExecutionError;
    use pipeline_core::interfaces::VcsError;
    use pipeline_core::review::ArchitectureStatus;
    use pipeline_store::SqliteExecutionStore;
    use pipeline_killswitch::AutoTriggerConfig;

    use super::*;

    struct StubVcs;
    #[async_trait]
    impl VcsExecutor for StubVcs {
        async fn checkout(&self, _: &ExecutionId, _: &str, _: &str) -> Result<CheckoutResult, VcsError> {
            Ok(CheckoutResult { workspace_path: "/tmp/ws".to_string(), base_commit_sha: "abc123".to_string() })
        }
        async fn apply_patch(&self, _: &str, _: &str) -> Result<(), VcsError> {
            Ok(())
        }
        async fn push(&self, _: &str, branch_name: &str, _: &str) -> Result<PushResult, VcsError> {
            Ok(PushResult { branch_name: branch_name.to_string(), commit_sha: "deadbeef".to_string() })
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
            Ok(GeneratedPatch { diff: "--- a\n+++ b\n".to_string(), summary: "add feature".to_string() })
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
            Ok(TestResult { total_tests: 5, passed_tests: 5, failed_tests: 0, skipped_tests: 0, success: true, duration_ms: 50, coverage: 90.0 })
        }
    }

    fn sample_request() -> ExecutionRequest {
        ExecutionRequest {
            execution_id: ExecutionId::new("e1"),
            repository_url: "https://example.com/acme/widgets.git".to_string(),
            target_branch: "main".to_string(),
            title: "add retry logic".to_string(),
            description: "add retry logic to the upload client".to_string(),
            requested_by: "alice".to_string(),
        }
    }

    fn build_orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(SqliteExecutionStore::open_in_memory().unwrap()),
            Arc::new(KillSwitchService::new(AutoTriggerConfig::default())),
            Arc::new(StubVcs),
            Arc::new(StubGenerator),
            Arc::new(CleanSecurity),
            Arc::new(CleanArchitecture),
            Arc::new(PassingTests),
            ReviewThresholds::default(),
        )
    }

    #[tokio::test]
    async fn accept_checks_out_and_marks_running() {
        let orchestrator = build_orchestrator();
        let execution = orchestrator.accept(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn clean_iteration_approves_and_completes() {
        let orchestrator = build_orchestrator();
        let execution = orchestrator.accept(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let decision = orchestrator
            .run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(1))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Approve);
        let stored = orchestrator.store.get(&execution.execution_id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn deliver_returns_commit_sha_from_vcs_layer() {
        let orchestrator = build_orchestrator();
        let execution = orchestrator.accept(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let commit_sha = orchestrator.deliver(&execution.execution_id, "/tmp/ws", Timestamp::from_unix_millis(2)).await.unwrap();
        assert_eq!(commit_sha, "deadbeef");
    }

    #[tokio::test]
    async fn active_kill_switch_halts_iteration() {
        let orchestrator = build_orchestrator();
        let execution = orchestrator.accept(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let repository_id = RepositoryId::from_remote_url(&execution.repository_url);
        orchestrator
            .kill_switch
            .activate(
                pipeline_core::killswitch::KillSwitchScope::Repository(repository_id),
                pipeline_core::killswitch::KillSwitchReason::ManualOverride { justification: "incident".to_string() },
                "operator",
                Timestamp::from_unix_millis(1),
            )
            .unwrap();

        let result = orchestrator.run_iteration(&execution.execution_id, "/tmp/ws", None, Timestamp::from_unix_millis(2)).await;
        assert!(matches!(result, Err(OrchestratorError::Halted(_))));
    }
}
