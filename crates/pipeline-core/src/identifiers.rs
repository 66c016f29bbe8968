// crates/pipeline-core/src/identifiers.rs
// ============================================================================
// Module: Pipeline Identifiers
// Description: Canonical opaque identifiers for executions and repositories.
// Purpose: Provide strongly typed, serializable identifiers with stable wire
//          forms and a short, log-safe display form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings on the wire. [`ExecutionId`] additionally
//! exposes a deterministic short form (its first eight characters) used for
//! branch names and log lines, matching the derivation the orchestrator uses
//! when naming feature branches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Execution Identifier
// ============================================================================

/// Opaque identifier for a single feature execution.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this
///   type. Ingress handlers are responsible for rejecting empty identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Creates a new execution identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the short, log-safe form (first 8 characters, or the full
    /// identifier when shorter) used for branch names and display.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Repository Identifier
// ============================================================================

/// Opaque identifier scoping kill-switch and metrics state to one repository.
///
/// # Invariants
/// - Opaque UTF-8 string; two repositories with the same remote URL share the
///   same identifier once normalized through [`RepositoryId::from_remote_url`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Creates a new repository identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a repository identifier from a remote URL by normalizing case
    /// and trimming a trailing `.git` suffix.
    #[must_use]
    pub fn from_remote_url(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/').trim_end_matches(".git");
        Self(trimmed.to_ascii_lowercase())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionId;
    use super::RepositoryId;

    #[test]
    fn short_truncates_to_eight_chars() {
        let id = ExecutionId::new("abcdefghijklmnop");
        assert_eq!(id.short(), "abcdefgh");
    }

    #[test]
    fn short_returns_full_id_when_shorter_than_eight() {
        let id = ExecutionId::new("abc");
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn repository_id_from_remote_url_normalizes() {
        let a = RepositoryId::from_remote_url("https://github.com/Acme/Widgets.git");
        let b = RepositoryId::from_remote_url("https://github.com/acme/widgets/");
        assert_eq!(a, b);
    }
}
