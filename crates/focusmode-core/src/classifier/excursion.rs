//! Background excursions and their classification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one excursion. Monotonic per classifier instance, so a late
/// brightness sample can be matched against the excursion it was taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcursionId(pub u64);

impl fmt::Display for ExcursionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interpretation of a background excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Unclassified,
    /// Screen turned off; the user is presumed still focusing.
    Locked,
    /// The user left the app; focus credit pauses.
    Switched,
}

impl Classification {
    pub fn is_resolved(self) -> bool {
        self != Classification::Unclassified
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Unclassified => "unclassified",
            Classification::Locked => "locked",
            Classification::Switched => "switched",
        };
        f.write_str(s)
    }
}

/// What a classification was decided on. Carried into events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationBasis {
    /// Inactive -> background handoff fell inside the lock window.
    HandoffTiming { handoff_ms: i64 },
    /// Delayed brightness sample compared against the lock threshold.
    Brightness { reading: f64, threshold: f64 },
    /// Brightness could not be read.
    SensorUnavailable,
    /// The app returned to the foreground before any signal resolved it.
    ForegroundReturn,
}

/// One continuous interval during which the app was not active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundExcursion {
    pub id: ExcursionId,
    pub entered_at: DateTime<Utc>,
    pub inactive_at: Option<DateTime<Utc>>,
    pub background_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    pub classification: Classification,
}

impl BackgroundExcursion {
    pub fn new(id: ExcursionId, entered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            entered_at,
            inactive_at: None,
            background_at: None,
            exited_at: None,
            classification: Classification::Unclassified,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }

    /// Milliseconds between entering inactive and entering background.
    /// `None` unless both were observed in that order.
    pub fn handoff_ms(&self) -> Option<i64> {
        match (self.inactive_at, self.background_at) {
            (Some(inactive), Some(background)) if background >= inactive => {
                Some((background - inactive).num_milliseconds())
            }
            _ => None,
        }
    }

    /// Whole seconds between entering and leaving. Zero while open or if
    /// the timestamps arrive out of order.
    pub fn whole_seconds(&self) -> u64 {
        self.exited_at
            .map(|exited| (exited - self.entered_at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Writes the classification once. Returns false if it was already set.
    pub(crate) fn classify(&mut self, classification: Classification) -> bool {
        if self.classification.is_resolved() || !classification.is_resolved() {
            return false;
        }
        self.classification = classification;
        true
    }
}
