//! Accrual engine implementation.
//!
//! The engine owns the two session counters. It has no internal thread:
//! the owner calls `tick()` once per wall-clock second and reports
//! excursion progress as the classifier produces it.
//!
//! ## State Transitions
//!
//! ```text
//! Paused -> Running -> (Paused on SWITCHED | Running on LOCKED) -> Frozen
//! ```
//!
//! Points are derived from the count of applied ticks, so the elapsed
//! counter and the points counter advance from the same tick source.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{BackgroundExcursion, Classification, ExcursionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccrualState {
    Running,
    Paused,
}

/// What happened to one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Both counters advanced.
    Applied,
    /// The open excursion is not classified yet; the tick is withheld.
    Held,
    /// The engine is paused or frozen.
    Ignored,
}

/// Ledger for the excursion currently in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExcursionLedger {
    id: ExcursionId,
    classification: Classification,
    /// Ticks applied while the excursion was classified LOCKED.
    applied_ticks: u64,
    /// Ticks withheld while the excursion was unclassified.
    held_ticks: u64,
}

/// Result of closing an excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub excursion: ExcursionId,
    pub classification: Classification,
    /// Whole seconds between leaving and returning to the foreground.
    pub excursion_seconds: u64,
    /// Seconds added to `elapsed_seconds` in the one-shot adjustment.
    pub credited_seconds: u64,
}

/// Core accrual engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualEngine {
    elapsed_seconds: u64,
    /// Ticks applied through the live per-second path.
    ticked_seconds: u64,
    reward_rate: u64,
    /// Set while the session phase is running.
    armed: bool,
    /// Set by give-up; nothing moves the counters afterwards.
    frozen: bool,
    excursion: Option<ExcursionLedger>,
}

impl AccrualEngine {
    /// Create an idle engine granting `reward_rate` points per applied tick.
    pub fn new(reward_rate: u64) -> Self {
        Self {
            elapsed_seconds: 0,
            ticked_seconds: 0,
            reward_rate,
            armed: false,
            frozen: false,
            excursion: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn accrued_points(&self) -> u64 {
        self.ticked_seconds.saturating_mul(self.reward_rate)
    }

    pub fn ticked_seconds(&self) -> u64 {
        self.ticked_seconds
    }

    pub fn reward_rate(&self) -> u64 {
        self.reward_rate
    }

    /// Classification of the excursion in progress, if any.
    pub fn excursion_classification(&self) -> Option<Classification> {
        self.excursion.as_ref().map(|e| e.classification)
    }

    pub fn state(&self) -> AccrualState {
        if !self.armed || self.frozen {
            return AccrualState::Paused;
        }
        match self.excursion_classification() {
            Some(Classification::Switched) => AccrualState::Paused,
            _ => AccrualState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == AccrualState::Running
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start accruing. No effect once frozen.
    pub fn arm(&mut self) {
        if !self.frozen {
            self.armed = true;
        }
    }

    /// Stop permanently; counters keep their final values.
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.armed = false;
    }

    /// Advance by one wall-clock second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Ignored;
        }
        match self.excursion.as_mut() {
            Some(ledger) if ledger.classification == Classification::Unclassified => {
                ledger.held_ticks += 1;
                TickOutcome::Held
            }
            Some(ledger) => {
                ledger.applied_ticks += 1;
                self.apply_tick();
                TickOutcome::Applied
            }
            None => {
                self.apply_tick();
                TickOutcome::Applied
            }
        }
    }

    pub fn excursion_opened(&mut self, id: ExcursionId) {
        self.excursion = Some(ExcursionLedger {
            id,
            classification: Classification::Unclassified,
            applied_ticks: 0,
            held_ticks: 0,
        });
    }

    /// Record the classification of the excursion in progress. Withheld
    /// ticks are dropped either way: LOCKED time is credited on close and
    /// SWITCHED time is not credited at all.
    pub fn excursion_classified(&mut self, id: ExcursionId, classification: Classification) {
        let Some(ledger) = self.excursion.as_mut() else {
            return;
        };
        if ledger.id != id || ledger.classification.is_resolved() {
            return;
        }
        ledger.classification = classification;
        if ledger.held_ticks > 0 {
            debug!(excursion = %id, held = ledger.held_ticks, "discarding held ticks");
            ledger.held_ticks = 0;
        }
    }

    /// Close the excursion and reconcile. For LOCKED excursions the
    /// elapsed counter gains the excursion's whole seconds minus what the
    /// live ticker already applied during it. Points are never adjusted.
    pub fn excursion_closed(&mut self, excursion: &BackgroundExcursion) -> Reconciliation {
        let applied = match self.excursion.take() {
            Some(ledger) if ledger.id == excursion.id => ledger.applied_ticks,
            _ => 0,
        };
        let excursion_seconds = excursion.whole_seconds();
        let credited_seconds = match excursion.classification {
            Classification::Locked if !self.frozen && self.armed => {
                excursion_seconds.saturating_sub(applied)
            }
            _ => 0,
        };
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(credited_seconds);
        debug!(
            excursion = %excursion.id,
            classification = %excursion.classification,
            excursion_seconds,
            credited_seconds,
            "reconciled excursion"
        );
        Reconciliation {
            excursion: excursion.id,
            classification: excursion.classification,
            excursion_seconds,
            credited_seconds,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply_tick(&mut self) {
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        self.ticked_seconds = self.ticked_seconds.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn closed(id: u64, secs: i64, classification: Classification) -> BackgroundExcursion {
        let entered = DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut exc = BackgroundExcursion::new(ExcursionId(id), entered);
        exc.exited_at = Some(entered + Duration::seconds(secs));
        exc.classification = classification;
        exc
    }

    fn running(rate: u64) -> AccrualEngine {
        let mut engine = AccrualEngine::new(rate);
        engine.arm();
        engine
    }

    #[test]
    fn idle_engine_ignores_ticks() {
        let mut engine = AccrualEngine::new(50);
        assert_eq!(engine.tick(), TickOutcome::Ignored);
        assert_eq!(engine.elapsed_seconds(), 0);
        assert_eq!(engine.state(), AccrualState::Paused);
    }

    #[test]
    fn ticks_advance_both_counters() {
        let mut engine = running(50);
        for _ in 0..3 {
            assert_eq!(engine.tick(), TickOutcome::Applied);
        }
        assert_eq!(engine.elapsed_seconds(), 3);
        assert_eq!(engine.accrued_points(), 150);
    }

    #[test]
    fn locked_excursion_credits_gap_without_points() {
        let mut engine = running(50);
        for _ in 0..10 {
            engine.tick();
        }
        engine.excursion_opened(ExcursionId(1));
        engine.excursion_classified(ExcursionId(1), Classification::Locked);
        let rec = engine.excursion_closed(&closed(1, 30, Classification::Locked));
        assert_eq!(rec.credited_seconds, 30);
        assert_eq!(engine.elapsed_seconds(), 40);
        assert_eq!(engine.accrued_points(), 500);
    }

    #[test]
    fn locked_excursion_does_not_double_count_live_ticks() {
        let mut engine = running(1);
        engine.excursion_opened(ExcursionId(1));
        engine.excursion_classified(ExcursionId(1), Classification::Locked);
        for _ in 0..12 {
            assert_eq!(engine.tick(), TickOutcome::Applied);
        }
        let rec = engine.excursion_closed(&closed(1, 30, Classification::Locked));
        assert_eq!(rec.credited_seconds, 18);
        assert_eq!(engine.elapsed_seconds(), 30);
    }

    #[test]
    fn switched_excursion_pauses_everything() {
        let mut engine = running(50);
        engine.tick();
        engine.excursion_opened(ExcursionId(1));
        assert_eq!(engine.tick(), TickOutcome::Held);
        engine.excursion_classified(ExcursionId(1), Classification::Switched);
        assert_eq!(engine.state(), AccrualState::Paused);
        assert_eq!(engine.tick(), TickOutcome::Ignored);
        let rec = engine.excursion_closed(&closed(1, 30, Classification::Switched));
        assert_eq!(rec.credited_seconds, 0);
        assert_eq!(engine.elapsed_seconds(), 1);
        assert_eq!(engine.accrued_points(), 50);
        assert_eq!(engine.state(), AccrualState::Running);
    }

    #[test]
    fn frozen_engine_never_moves() {
        let mut engine = running(50);
        engine.tick();
        engine.freeze();
        engine.arm();
        assert_eq!(engine.tick(), TickOutcome::Ignored);
        engine.excursion_opened(ExcursionId(1));
        engine.excursion_classified(ExcursionId(1), Classification::Locked);
        engine.excursion_closed(&closed(1, 30, Classification::Locked));
        assert_eq!(engine.elapsed_seconds(), 1);
    }

    #[test]
    fn classification_for_other_excursion_is_ignored() {
        let mut engine = running(50);
        engine.excursion_opened(ExcursionId(2));
        engine.excursion_classified(ExcursionId(1), Classification::Switched);
        assert_eq!(engine.excursion_classification(), Some(Classification::Unclassified));
    }
}
