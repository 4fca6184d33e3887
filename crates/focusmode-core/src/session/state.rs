//! Session identity, phases and the read-only views handed to callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::classifier::Classification;
use crate::error::SubmissionError;
use crate::timer::AccrualState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Top-level session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Running,
    /// Finalize in progress; user input is disabled.
    Ending,
    Terminated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Running => "running",
            SessionPhase::Ending => "ending",
            SessionPhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Display view of the session, published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub phase: SessionPhase,
    pub elapsed_seconds: u64,
    pub accrued_points: u64,
    pub accrual: AccrualState,
    /// Classification of the excursion in progress, if the app is away.
    pub excursion: Option<Classification>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            phase: SessionPhase::Idle,
            elapsed_seconds: 0,
            accrued_points: 0,
            accrual: AccrualState::Paused,
            excursion: None,
        }
    }

    /// True when the focus screen would show the same thing: same session,
    /// phase, elapsed time and points.
    pub fn same_display(&self, other: &SessionSnapshot) -> bool {
        self.session_id == other.session_id
            && self.phase == other.phase
            && self.elapsed_seconds == other.elapsed_seconds
            && self.accrued_points == other.accrued_points
    }

    /// `MM:SS`, rolling into `H:MM:SS` past the hour.
    pub fn formatted_elapsed(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Everything the finalize sequence needs to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub session_id: SessionId,
    pub points: u64,
    pub elapsed_seconds: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of one of the two finalize calls. Serialize-only: errors are
/// rendered as their display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Not attempted (no points earned, or the session was dropped).
    Skipped,
    Submitted,
    Failed(#[serde(serialize_with = "error_text")] SubmissionError),
}

impl SubmissionStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SubmissionStatus::Failed(_))
    }
}

/// Result of the finalize sequence. Failures here are warnings: the
/// session is torn down regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub request: FinalizeRequest,
    pub points: SubmissionStatus,
    pub session: SubmissionStatus,
}

impl FinalizeReport {
    pub fn warnings(&self) -> Vec<&SubmissionError> {
        [&self.points, &self.session]
            .into_iter()
            .filter_map(|status| match status {
                SubmissionStatus::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// True when nothing failed.
    pub fn is_synced(&self) -> bool {
        !self.points.is_failed() && !self.session.is_failed()
    }
}

/// What is left of a session once it terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub accrued_points: u64,
    /// `None` when the session was torn down without finalizing.
    pub report: Option<FinalizeReport>,
}

fn error_text<S: Serializer>(err: &SubmissionError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}
