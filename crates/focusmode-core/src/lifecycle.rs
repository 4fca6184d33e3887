//! Device lifecycle vocabulary.
//!
//! The lifecycle source only ever reports which coarse state the app moved
//! into and when. Everything else (excursions, classification) is derived.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse app lifecycle state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// App is in the foreground and receiving input.
    Active,
    /// App is visible but not receiving input (overlay, lock in progress).
    Inactive,
    /// App is not visible.
    Background,
}

impl LifecycleState {
    pub fn is_foreground(self) -> bool {
        self == LifecycleState::Active
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Background => "background",
        };
        f.write_str(s)
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(LifecycleState::Active),
            "inactive" => Ok(LifecycleState::Inactive),
            "background" => Ok(LifecycleState::Background),
            other => Err(format!("unknown lifecycle state: {other}")),
        }
    }
}

/// Device family, which decides how much the lifecycle tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    /// Reports `Inactive` as a distinct pre-background state (iOS-like).
    /// A near-instant inactive -> background handoff signals a screen lock.
    #[serde(alias = "ios")]
    FineGrained,
    /// A single `Background` signal covers both minimize and lock
    /// (Android-like). Only brightness can tell them apart.
    #[default]
    #[serde(alias = "android")]
    Coarse,
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::FineGrained => f.write_str("fine_grained"),
            PlatformFamily::Coarse => f.write_str("coarse"),
        }
    }
}

impl FromStr for PlatformFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fine_grained" | "fine-grained" | "ios" => Ok(PlatformFamily::FineGrained),
            "coarse" | "android" => Ok(PlatformFamily::Coarse),
            other => Err(format!("unknown platform family: {other}")),
        }
    }
}

/// One raw signal from the lifecycle source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSignal {
    pub state: LifecycleState,
    pub at: DateTime<Utc>,
}

impl LifecycleSignal {
    pub fn new(state: LifecycleState, at: DateTime<Utc>) -> Self {
        Self { state, at }
    }
}
