use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{Classification, ClassificationBasis, ExcursionId};
use crate::lifecycle::PlatformFamily;
use crate::session::SessionId;
use crate::timer::Reconciliation;

/// Every state change in a focus session produces an Event.
/// The UI subscribes to them; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: SessionId,
        platform: PlatformFamily,
        reward_rate: u64,
        at: DateTime<Utc>,
    },
    ExcursionOpened {
        session_id: SessionId,
        excursion: ExcursionId,
        at: DateTime<Utc>,
    },
    ExcursionClassified {
        session_id: SessionId,
        excursion: ExcursionId,
        classification: Classification,
        basis: ClassificationBasis,
    },
    /// The app is back in the foreground and the excursion was reconciled.
    ExcursionClosed {
        session_id: SessionId,
        reconciliation: Reconciliation,
        at: DateTime<Utc>,
    },
    /// Message for the focus screen after returning to the foreground.
    ReturnNotice {
        session_id: SessionId,
        notice: ReturnNotice,
    },
    AccrualPaused {
        session_id: SessionId,
        elapsed_seconds: u64,
        accrued_points: u64,
    },
    AccrualResumed {
        session_id: SessionId,
        elapsed_seconds: u64,
        accrued_points: u64,
    },
    /// Give-up accepted; counters are frozen and finalize is running.
    SessionEnding {
        session_id: SessionId,
        elapsed_seconds: u64,
        accrued_points: u64,
        at: DateTime<Utc>,
    },
    SessionTerminated {
        session_id: SessionId,
        elapsed_seconds: u64,
        accrued_points: u64,
        synced: bool,
    },
    /// Torn down without finalizing; the record was not submitted.
    SessionDropped {
        session_id: SessionId,
        elapsed_seconds: u64,
        accrued_points: u64,
    },
}

impl Event {
    pub fn session_id(&self) -> SessionId {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::ExcursionOpened { session_id, .. }
            | Event::ExcursionClassified { session_id, .. }
            | Event::ExcursionClosed { session_id, .. }
            | Event::ReturnNotice { session_id, .. }
            | Event::AccrualPaused { session_id, .. }
            | Event::AccrualResumed { session_id, .. }
            | Event::SessionEnding { session_id, .. }
            | Event::SessionTerminated { session_id, .. }
            | Event::SessionDropped { session_id, .. } => *session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnNotice {
    /// Locked excursion: the time away was credited.
    CountedWhileAsleep,
    /// Switched excursion: the timer stood still.
    StoppedWhileAway,
}

impl ReturnNotice {
    pub fn for_classification(classification: Classification) -> Option<Self> {
        match classification {
            Classification::Locked => Some(ReturnNotice::CountedWhileAsleep),
            Classification::Switched => Some(ReturnNotice::StoppedWhileAway),
            Classification::Unclassified => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ReturnNotice::CountedWhileAsleep => "Timer was counting while your phone was asleep",
            ReturnNotice::StoppedWhileAway => "Timer was stopped while you lost focus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let id = SessionId::new();
        let event = Event::AccrualPaused {
            session_id: id,
            elapsed_seconds: 3,
            accrued_points: 150,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AccrualPaused");
        assert_eq!(event.session_id(), id);
    }

    #[test]
    fn notice_follows_classification() {
        assert_eq!(
            ReturnNotice::for_classification(Classification::Locked),
            Some(ReturnNotice::CountedWhileAsleep)
        );
        assert_eq!(ReturnNotice::for_classification(Classification::Unclassified), None);
    }
}
