//! Lock/switch classifier.
//!
//! Turns raw lifecycle transitions into background excursions and decides,
//! once per excursion, whether the screen was locked (credit keeps flowing)
//! or the user switched away (credit pauses).
//!
//! ## Heuristics
//!
//! - Fine-grained platforms: an inactive -> background handoff inside
//!   `lock_handoff_window_ms` is a system-initiated lock. Slower handoffs,
//!   or background without a preceding inactive, fall back to brightness.
//! - Coarse platforms: a brightness sample is taken `sample_delay_ms` after
//!   the excursion opens and compared against a fraction of the baseline
//!   brightness captured when the classifier was armed.
//!
//! The classifier never blocks. Samples are requested from the caller and
//! fed back with [`LockSwitchClassifier::on_sample`]; returning to the
//! foreground first resolves the excursion from whatever is known.
//!
//! The thresholds are empirical and live in [`ClassifierConfig`].

mod excursion;

pub use excursion::{BackgroundExcursion, Classification, ClassificationBasis, ExcursionId};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SensorError;
use crate::lifecycle::{LifecycleSignal, LifecycleState, PlatformFamily};

/// Tuning parameters for the lock/switch heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub platform: PlatformFamily,
    /// Inactive -> background handoffs at or below this are screen locks.
    #[serde(default = "default_lock_handoff_window_ms")]
    pub lock_handoff_window_ms: u64,
    /// Delay between needing a brightness sample and taking it.
    #[serde(default = "default_sample_delay_ms")]
    pub sample_delay_ms: u64,
    /// Readings below `baseline * ratio` count as a dark (locked) screen.
    #[serde(default = "default_relative_brightness_ratio")]
    pub relative_brightness_ratio: f64,
    /// Threshold used when no baseline could be captured.
    #[serde(default = "default_absolute_brightness_floor")]
    pub absolute_brightness_floor: f64,
}

fn default_lock_handoff_window_ms() -> u64 {
    25
}
fn default_sample_delay_ms() -> u64 {
    500
}
fn default_relative_brightness_ratio() -> f64 {
    0.2
}
fn default_absolute_brightness_floor() -> f64 {
    0.05
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            platform: PlatformFamily::default(),
            lock_handoff_window_ms: default_lock_handoff_window_ms(),
            sample_delay_ms: default_sample_delay_ms(),
            relative_brightness_ratio: default_relative_brightness_ratio(),
            absolute_brightness_floor: default_absolute_brightness_floor(),
        }
    }
}

impl ClassifierConfig {
    pub fn for_platform(platform: PlatformFamily) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}

/// Brightness captured when the classifier was armed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Baseline {
    Pending,
    Captured(f64),
    Unavailable,
}

/// Request for the caller to read brightness after `delay` and report it
/// back tagged with `excursion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub excursion: ExcursionId,
    pub delay: Duration,
}

/// Everything the classifier can tell its owner about one input.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutput {
    /// A new excursion started.
    Opened(ExcursionId),
    /// Take a brightness sample for the open excursion.
    SampleRequested(SampleRequest),
    /// The open excursion got its (final) classification.
    Classified {
        excursion: ExcursionId,
        classification: Classification,
        basis: ClassificationBasis,
    },
    /// The app returned to the foreground; the excursion is handed over
    /// for reconciliation and forgotten.
    Closed(BackgroundExcursion),
}

/// Stateful classifier. One instance per armed session.
#[derive(Debug, Clone)]
pub struct LockSwitchClassifier {
    config: ClassifierConfig,
    baseline: Baseline,
    last_state: LifecycleState,
    open: Option<BackgroundExcursion>,
    next_id: u64,
}

impl LockSwitchClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            baseline: Baseline::Pending,
            last_state: LifecycleState::Active,
            open: None,
            next_id: 1,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn platform(&self) -> PlatformFamily {
        self.config.platform
    }

    pub fn last_state(&self) -> LifecycleState {
        self.last_state
    }

    pub fn open_excursion(&self) -> Option<&BackgroundExcursion> {
        self.open.as_ref()
    }

    pub fn baseline(&self) -> Option<f64> {
        match self.baseline {
            Baseline::Captured(b) => Some(b),
            _ => None,
        }
    }

    /// Brightness below this value means the screen is dark.
    pub fn lock_threshold(&self) -> f64 {
        match self.baseline {
            Baseline::Captured(b) if b > 0.0 => b * self.config.relative_brightness_ratio,
            _ => self.config.absolute_brightness_floor,
        }
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Record the baseline brightness. Only the first call has an effect.
    pub fn set_baseline(&mut self, reading: Result<f64, SensorError>) {
        if self.baseline != Baseline::Pending {
            return;
        }
        self.baseline = match normalize(reading) {
            Some(value) => {
                debug!(baseline = value, "captured baseline brightness");
                Baseline::Captured(value)
            }
            None => {
                warn!("baseline brightness unavailable, using absolute floor");
                Baseline::Unavailable
            }
        };
    }

    /// Feed one lifecycle transition.
    pub fn on_transition(&mut self, signal: LifecycleSignal) -> Vec<ClassifierOutput> {
        let prev = self.last_state;
        let next = signal.state;
        if prev == next {
            debug!(state = %next, "ignoring duplicate lifecycle signal");
            return Vec::new();
        }
        self.last_state = next;
        debug!(from = %prev, to = %next, "lifecycle transition");

        match (prev.is_foreground(), next.is_foreground()) {
            (true, false) => self.open_excursion_at(next, signal.at),
            (false, false) => self.advance_excursion(next, signal.at),
            (false, true) => self.close_excursion(signal.at),
            (true, true) => Vec::new(),
        }
    }

    /// Feed a brightness sample taken for `excursion`. Returns `None` when
    /// the excursion already closed or was already classified.
    pub fn on_sample(
        &mut self,
        excursion: ExcursionId,
        reading: Result<f64, SensorError>,
    ) -> Option<ClassifierOutput> {
        let threshold = self.lock_threshold();
        let open = match self.open.as_mut() {
            Some(open) if open.id == excursion => open,
            _ => {
                debug!(%excursion, "dropping brightness sample for closed excursion");
                return None;
            }
        };
        if open.classification.is_resolved() {
            return None;
        }

        let (classification, basis) = match normalize(reading) {
            Some(value) if value < threshold => (
                Classification::Locked,
                ClassificationBasis::Brightness {
                    reading: value,
                    threshold,
                },
            ),
            Some(value) => (
                Classification::Switched,
                ClassificationBasis::Brightness {
                    reading: value,
                    threshold,
                },
            ),
            None => {
                warn!(%excursion, "brightness unavailable, assuming app switch");
                (Classification::Switched, ClassificationBasis::SensorUnavailable)
            }
        };
        open.classify(classification);
        debug!(%excursion, %classification, ?basis, "classified excursion");
        Some(ClassifierOutput::Classified {
            excursion,
            classification,
            basis,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn open_excursion_at(&mut self, state: LifecycleState, at: DateTime<Utc>) -> Vec<ClassifierOutput> {
        let id = ExcursionId(self.next_id);
        self.next_id += 1;

        let mut excursion = BackgroundExcursion::new(id, at);
        match state {
            LifecycleState::Inactive => excursion.inactive_at = Some(at),
            _ => excursion.background_at = Some(at),
        }
        self.open = Some(excursion);

        let mut out = vec![ClassifierOutput::Opened(id)];
        let needs_sample = match self.config.platform {
            PlatformFamily::Coarse => true,
            // Wait for the background signal to measure the handoff.
            PlatformFamily::FineGrained => state == LifecycleState::Background,
        };
        if needs_sample {
            out.push(self.sample_request(id));
        }
        out
    }

    fn advance_excursion(&mut self, state: LifecycleState, at: DateTime<Utc>) -> Vec<ClassifierOutput> {
        let platform = self.config.platform;
        let window = i64::try_from(self.config.lock_handoff_window_ms).unwrap_or(i64::MAX);
        let Some(open) = self.open.as_mut() else {
            return Vec::new();
        };

        match state {
            LifecycleState::Inactive => {
                if open.inactive_at.is_none() {
                    open.inactive_at = Some(at);
                }
                Vec::new()
            }
            LifecycleState::Background => {
                if open.background_at.is_some() {
                    return Vec::new();
                }
                open.background_at = Some(at);
                if platform != PlatformFamily::FineGrained || open.classification.is_resolved() {
                    return Vec::new();
                }

                let id = open.id;
                match open.handoff_ms() {
                    Some(handoff_ms) if handoff_ms <= window => {
                        open.classify(Classification::Locked);
                        debug!(excursion = %id, handoff_ms, "fast handoff, screen locked");
                        vec![ClassifierOutput::Classified {
                            excursion: id,
                            classification: Classification::Locked,
                            basis: ClassificationBasis::HandoffTiming { handoff_ms },
                        }]
                    }
                    handoff => {
                        debug!(excursion = %id, ?handoff, "slow handoff, checking brightness");
                        vec![self.sample_request(id)]
                    }
                }
            }
            LifecycleState::Active => Vec::new(),
        }
    }

    fn close_excursion(&mut self, at: DateTime<Utc>) -> Vec<ClassifierOutput> {
        let Some(mut excursion) = self.open.take() else {
            return Vec::new();
        };
        excursion.exited_at = Some(at);

        let mut out = Vec::with_capacity(2);
        if !excursion.classification.is_resolved() {
            let classification = match self.config.platform {
                // Never left the screen: overlay or call banner.
                PlatformFamily::FineGrained if excursion.background_at.is_none() => {
                    Classification::Locked
                }
                _ => Classification::Switched,
            };
            excursion.classify(classification);
            debug!(excursion = %excursion.id, %classification, "resolved on foreground return");
            out.push(ClassifierOutput::Classified {
                excursion: excursion.id,
                classification,
                basis: ClassificationBasis::ForegroundReturn,
            });
        }
        out.push(ClassifierOutput::Closed(excursion));
        out
    }

    fn sample_request(&self, excursion: ExcursionId) -> ClassifierOutput {
        ClassifierOutput::SampleRequested(SampleRequest {
            excursion,
            delay: self.config.sample_delay(),
        })
    }
}

/// Valid readings are finite and clamped into [0, 1].
fn normalize(reading: Result<f64, SensorError>) -> Option<f64> {
    match reading {
        Ok(value) if value.is_finite() => Some(value.clamp(0.0, 1.0)),
        _ => None,
    }
}
