// crates/pipeline-core/src/interfaces.rs
// ============================================================================
// Module: External Collaborator Interfaces
// Description: Backend-agnostic traits for the systems the orchestrator
//              delegates to: version control, code generation, analysis,
//              and test execution.
// Purpose: Let `pipeline_orchestrator` depend on behavior, not on a specific
//          VCS, model provider, or CI system, so hosts can supply their own
//          implementations.
// Dependencies: crate::execution, crate::review, async-trait, thiserror
// ============================================================================

//! ## Overview
//! Every trait in this module models one external system the pipeline
//! relies on but does not implement itself (see the Non-goals: this crate
//! defines the seam, not the backend). Each has an associated `thiserror`
//! error enum so callers can match on failure kind without downcasting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use crate::identifiers::ExecutionId;
use crate::review::ArchitectureAssessment;
use crate::review::SecurityAssessment;
use crate::review::TestResult;

// ============================================================================
// SECTION: VCS Executor
// ============================================================================

/// Errors a [`VcsExecutor`] implementation may report.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The repository could not be cloned or checked out.
    #[error("checkout failed for {repository_url}: {reason}")]
    CheckoutFailed {
        /// Remote URL that failed to check out.
        repository_url: String,
        /// Implementation-reported reason.
        reason: String,
    },
    /// A patch could not be applied to the checked-out tree.
    #[error("patch application failed: {reason}")]
    PatchApplyFailed {
        /// Implementation-reported reason.
        reason: String,
    },
    /// The push to the remote was rejected or failed.
    #[error("push failed for branch {branch}: {reason}")]
    PushFailed {
        /// Branch that failed to push.
        branch: String,
        /// Implementation-reported reason.
        reason: String,
    },
    /// Authentication with the remote failed.
    #[error("authentication failed for {repository_url}")]
    AuthenticationFailed {
        /// Remote URL authentication was attempted against.
        repository_url: String,
    },
    /// The remote or network was unreachable.
    #[error("network unreachable: {reason}")]
    NetworkUnreachable {
        /// Implementation-reported reason.
        reason: String,
    },
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResult {
    /// Local working-copy path the orchestrator should operate against.
    pub workspace_path: String,
    /// Commit SHA checked out at `target_branch`'s tip.
    pub base_commit_sha: String,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    /// Name of the branch that was pushed.
    pub branch_name: String,
    /// Commit SHA the VCS layer reports as the tip of the pushed branch.
    ///
    /// The orchestrator populates `Execution::final_commit_sha`-equivalent
    /// state exclusively from this field; it never derives a commit SHA by
    /// any other means.
    pub commit_sha: String,
}

/// Version control operations the orchestrator delegates to a backend.
#[async_trait]
pub trait VcsExecutor: Send + Sync {
    /// Checks out `target_branch` of `repository_url` into a fresh
    /// workspace.
    async fn checkout(
        &self,
        execution_id: &ExecutionId,
        repository_url: &str,
        target_branch: &str,
    ) -> Result<CheckoutResult, VcsError>;

    /// Applies `patch` (a unified diff) to the workspace at `workspace_path`.
    async fn apply_patch(&self, workspace_path: &str, patch: &str) -> Result<(), VcsError>;

    /// Commits the working tree and pushes `branch_name` to the remote.
    async fn push(
        &self,
        workspace_path: &str,
        branch_name: &str,
        commit_message: &str,
    ) -> Result<PushResult, VcsError>;
}

// ============================================================================
// SECTION: Code Generator
// ============================================================================

/// Errors a [`CodeGenerator`] implementation may report.
#[derive(Debug, Error)]
pub enum CodeGenerationError {
    /// The generator could not produce a patch for the given request.
    #[error("generation failed: {reason}")]
    GenerationFailed {
        /// Implementation-reported reason.
        reason: String,
    },
    /// The generator's upstream provider timed out.
    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before timing out.
        elapsed_ms: u64,
    },
    /// The generator's upstream provider rejected the request (for example,
    /// a content policy violation).
    #[error("generation rejected: {reason}")]
    Rejected {
        /// Implementation-reported reason.
        reason: String,
    },
}

/// A candidate patch produced by a [`CodeGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPatch {
    /// Unified diff to apply to the checked-out workspace.
    pub diff: String,
    /// Human-readable summary of the change, used for the commit message.
    pub summary: String,
}

/// Feedback from a prior iteration, supplied back into generation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationFeedback {
    /// Issues the previous iteration must fix.
    pub must_fix: Vec<String>,
    /// Issues the previous iteration should fix.
    pub should_fix: Vec<String>,
}

/// Code generation operations the orchestrator delegates to a backend.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Produces a patch implementing `title`/`description` against the
    /// workspace at `workspace_path`, optionally informed by feedback from a
    /// previous iteration.
    async fn generate(
        &self,
        workspace_path: &str,
        title: &str,
        description: &str,
        feedback: Option<&GenerationFeedback>,
    ) -> Result<GeneratedPatch, CodeGenerationError>;
}

// ============================================================================
// SECTION: Security Analyzer
// ============================================================================

/// Errors a [`SecurityAnalyzer`] implementation may report.
#[derive(Debug, Error)]
pub enum SecurityAnalysisError {
    /// The analyzer could not complete its scan.
    #[error("security analysis failed: {reason}")]
    AnalysisFailed {
        /// Implementation-reported reason.
        reason: String,
    },
    /// The analyzer's upstream provider timed out.
    #[error("security analysis timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before timing out.
        elapsed_ms: u64,
    },
}

/// Security analysis operations the orchestrator delegates to a backend.
#[async_trait]
pub trait SecurityAnalyzer: Send + Sync {
    /// Scans `diff` for vulnerabilities, secrets, and insecure patterns.
    async fn analyze(&self, workspace_path: &str, diff: &str) -> Result<SecurityAssessment, SecurityAnalysisError>;
}

// ============================================================================
// SECTION: Architecture Analyzer
// ============================================================================

/// Errors an [`ArchitectureAnalyzer`] implementation may report.
#[derive(Debug, Error)]
pub enum ArchitectureAnalysisError {
    /// The analyzer could not complete its evaluation.
    #[error("architecture analysis failed: {reason}")]
    AnalysisFailed {
        /// Implementation-reported reason.
        reason: String,
    },
    /// The analyzer's upstream provider timed out.
    #[error("architecture analysis timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before timing out.
        elapsed_ms: u64,
    },
}

/// Architecture compliance operations the orchestrator delegates to a
/// backend.
#[async_trait]
pub trait ArchitectureAnalyzer: Send + Sync {
    /// Evaluates `diff` for breaking changes and architecture policy
    /// violations.
    async fn analyze(
        &self,
        workspace_path: &str,
        diff: &str,
    ) -> Result<ArchitectureAssessment, ArchitectureAnalysisError>;
}

// ============================================================================
// SECTION: Test Executor
// ============================================================================

/// Errors a [`TestExecutor`] implementation may report.
#[derive(Debug, Error)]
pub enum TestExecutionError {
    /// The test run could not be started or completed.
    #[error("test execution failed: {reason}")]
    ExecutionFailed {
        /// Implementation-reported reason.
        reason: String,
    },
    /// The test run exceeded its configured time budget.
    #[error("test execution timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before timing out.
        elapsed_ms: u64,
    },
    /// The test environment itself failed to provision.
    #[error("test environment unavailable: {reason}")]
    EnvironmentUnavailable {
        /// Implementation-reported reason.
        reason: String,
    },
}

/// Test execution operations the orchestrator delegates to a backend.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Runs the workspace's test suite and reports the outcome.
    async fn run_tests(&self, workspace_path: &str) -> Result<TestResult, TestExecutionError>;
}
