// crates/pipeline-core/src/time.rs
// ============================================================================
// Module: Pipeline Time Model
// Description: Canonical timestamp representation for execution and
//              activation records.
// Purpose: Keep the decision engine free of wall-clock reads while giving
//          hosts a single serializable timestamp type.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The decision engine (see `pipeline_decision`) never reads wall-clock time;
//! hosts stamp [`Timestamp`] values when they construct records. This keeps
//! `make_decision` a pure function of its inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used across execution, kill-switch, and event records.
///
/// # Invariants
/// - Wraps Unix epoch milliseconds; no timezone is implied beyond UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from Unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    ///
    /// This is the only place in the workspace permitted to read the system
    /// clock directly; every other component receives timestamps as
    /// explicit arguments so decisions and orchestrator transitions stay
    /// replayable from recorded events.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "nanos/1_000_000 fits i64 until year 292277026596")]
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        Self((now.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    /// Returns the timestamp as Unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Formats the timestamp as an RFC 3339 string, falling back to the raw
    /// millisecond value if the offset cannot be represented.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }

    /// Returns the duration between this timestamp and a later one, in
    /// milliseconds. Returns zero when `other` is earlier than `self`.
    #[must_use]
    #[allow(clippy::cast_sign_loss, reason = "max(0) guarantees the value is non-negative")]
    pub fn elapsed_millis_until(self, other: Self) -> u64 {
        other.0.saturating_sub(self.0).max(0) as u64
    }
}
