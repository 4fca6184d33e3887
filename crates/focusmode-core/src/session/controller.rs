//! Session controller.
//!
//! One explicit state machine with a single intake function. Every input
//! (user commands, lifecycle signals, brightness samples, ticks, finalize
//! results) goes through [`SessionController::handle`], which mutates the
//! session and returns the side effects the runtime must perform. The
//! controller itself never touches timers, sensors or the network.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Ending -> Terminated -> (reset) Idle
//!            \__________________/
//!              teardown (dropped)
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::state::{
    FinalizeReport, FinalizeRequest, SessionId, SessionPhase, SessionSnapshot, SessionSummary,
};
use crate::classifier::{
    ClassifierConfig, ClassifierOutput, ExcursionId, LockSwitchClassifier, SampleRequest,
};
use crate::error::{SensorError, SessionError};
use crate::events::{Event, ReturnNotice};
use crate::lifecycle::LifecycleSignal;
use crate::timer::{AccrualEngine, AccrualState, TickOutcome};

/// Default reward per applied tick.
pub const DEFAULT_POINTS_PER_SECOND: u64 = 50;

/// Per-session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub classifier: ClassifierConfig,
    pub points_per_second: u64,
    /// Hold the screen awake while a session runs.
    pub keep_awake: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            points_per_second: DEFAULT_POINTS_PER_SECOND,
            keep_awake: true,
        }
    }
}

/// Everything the controller reacts to.
#[derive(Debug, Clone)]
pub enum Input {
    Start { at: DateTime<Utc> },
    GiveUp { at: DateTime<Utc> },
    Lifecycle(LifecycleSignal),
    /// Baseline read for `session`. Reads for any other session are dropped.
    BaselineCaptured {
        session: SessionId,
        reading: Result<f64, SensorError>,
    },
    BrightnessSampled {
        excursion: ExcursionId,
        reading: Result<f64, SensorError>,
    },
    Tick,
    FinalizeCompleted(FinalizeReport),
    Reset,
    /// Abnormal shutdown: release everything, submit nothing.
    Teardown,
}

/// Work the runtime performs on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SubscribeLifecycle,
    UnsubscribeLifecycle,
    CaptureBaseline(SessionId),
    CancelBaseline,
    StartTicker,
    StopTicker,
    ScheduleSample(SampleRequest),
    CancelSample,
    AcquireKeepAwake,
    ReleaseKeepAwake,
    Finalize(FinalizeRequest),
    Publish(Event),
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: SessionId,
    started_at: DateTime<Utc>,
    classifier: LockSwitchClassifier,
    engine: AccrualEngine,
    ticker_running: bool,
}

impl ActiveSession {
    fn summary(&self, report: Option<FinalizeReport>) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            started_at: self.started_at,
            elapsed_seconds: self.engine.elapsed_seconds(),
            accrued_points: self.engine.accrued_points(),
            report,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Running(ActiveSession),
    Ending(ActiveSession),
    Terminated(SessionSummary),
}

/// Top-level focus session state machine.
#[derive(Debug, Clone)]
pub struct SessionController {
    config: SessionConfig,
    phase: Phase,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        match self.phase {
            Phase::Idle => SessionPhase::Idle,
            Phase::Running(_) => SessionPhase::Running,
            Phase::Ending(_) => SessionPhase::Ending,
            Phase::Terminated(_) => SessionPhase::Terminated,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Running(s) | Phase::Ending(s) => Some(s.id),
            Phase::Terminated(summary) => Some(summary.session_id),
        }
    }

    /// Summary of the last terminated session.
    pub fn summary(&self) -> Option<&SessionSummary> {
        match &self.phase {
            Phase::Terminated(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.phase();
        match &self.phase {
            Phase::Idle => SessionSnapshot::idle(),
            Phase::Running(s) | Phase::Ending(s) => SessionSnapshot {
                session_id: Some(s.id),
                phase,
                elapsed_seconds: s.engine.elapsed_seconds(),
                accrued_points: s.engine.accrued_points(),
                accrual: s.engine.state(),
                excursion: s.engine.excursion_classification(),
            },
            Phase::Terminated(summary) => SessionSnapshot {
                session_id: Some(summary.session_id),
                phase,
                elapsed_seconds: summary.elapsed_seconds,
                accrued_points: summary.accrued_points,
                accrual: AccrualState::Paused,
                excursion: None,
            },
        }
    }

    // ── Intake ───────────────────────────────────────────────────────

    /// Apply one input. Invalid commands are rejected without touching
    /// any state.
    pub fn handle(&mut self, input: Input) -> Result<Vec<Effect>, SessionError> {
        match input {
            Input::Start { at } => self.start(at),
            Input::GiveUp { at } => self.give_up(at),
            Input::Reset => self.reset(),
            Input::Teardown => Ok(self.teardown()),
            Input::FinalizeCompleted(report) => Ok(self.finalize_completed(report)),
            Input::Lifecycle(signal) => Ok(self.with_running(|s| s.lifecycle(signal))),
            Input::BaselineCaptured { session, reading } => Ok(self.with_running(|s| {
                if s.id == session {
                    s.classifier.set_baseline(reading);
                } else {
                    debug!(session = %s.id, stale = %session, "baseline from another session, ignoring");
                }
                Vec::new()
            })),
            Input::BrightnessSampled { excursion, reading } => {
                Ok(self.with_running(|s| s.sample(excursion, reading)))
            }
            Input::Tick => Ok(self.with_running(|s| {
                if s.engine.tick() == TickOutcome::Held {
                    debug!(session = %s.id, "tick held until excursion is classified");
                }
                Vec::new()
            })),
        }
    }

    fn with_running(&mut self, f: impl FnOnce(&mut ActiveSession) -> Vec<Effect>) -> Vec<Effect> {
        match &mut self.phase {
            Phase::Running(session) => {
                let mut effects = f(session);
                session.sync_ticker(&mut effects);
                effects
            }
            _ => Vec::new(),
        }
    }

    fn start(&mut self, at: DateTime<Utc>) -> Result<Vec<Effect>, SessionError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(SessionError::InvalidTransition {
                from: self.phase(),
                action: "start",
            });
        }

        let mut engine = AccrualEngine::new(self.config.points_per_second);
        engine.arm();
        let session = ActiveSession {
            id: SessionId::new(),
            started_at: at,
            classifier: LockSwitchClassifier::new(self.config.classifier.clone()),
            engine,
            ticker_running: true,
        };
        info!(session = %session.id, platform = %self.config.classifier.platform, "focus session started");

        let mut effects = vec![Effect::SubscribeLifecycle, Effect::CaptureBaseline(session.id)];
        if self.config.keep_awake {
            effects.push(Effect::AcquireKeepAwake);
        }
        effects.push(Effect::StartTicker);
        effects.push(Effect::Publish(Event::SessionStarted {
            session_id: session.id,
            platform: self.config.classifier.platform,
            reward_rate: self.config.points_per_second,
            at,
        }));
        self.phase = Phase::Running(session);
        Ok(effects)
    }

    fn give_up(&mut self, at: DateTime<Utc>) -> Result<Vec<Effect>, SessionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Running(mut session) => {
                session.engine.freeze();
                session.ticker_running = false;
                let request = FinalizeRequest {
                    session_id: session.id,
                    points: session.engine.accrued_points(),
                    elapsed_seconds: session.engine.elapsed_seconds(),
                    occurred_at: at,
                };
                info!(
                    session = %session.id,
                    elapsed_seconds = request.elapsed_seconds,
                    points = request.points,
                    "giving up, finalizing session"
                );
                let effects = vec![
                    Effect::StopTicker,
                    Effect::CancelSample,
                    Effect::CancelBaseline,
                    Effect::Publish(Event::SessionEnding {
                        session_id: session.id,
                        elapsed_seconds: request.elapsed_seconds,
                        accrued_points: request.points,
                        at,
                    }),
                    Effect::Finalize(request),
                ];
                self.phase = Phase::Ending(session);
                Ok(effects)
            }
            phase @ (Phase::Ending(_) | Phase::Terminated(_)) => {
                self.phase = phase;
                debug!(phase = %self.phase(), "give up already handled, ignoring");
                Ok(Vec::new())
            }
            Phase::Idle => Err(SessionError::InvalidTransition {
                from: SessionPhase::Idle,
                action: "give up",
            }),
        }
    }

    fn finalize_completed(&mut self, report: FinalizeReport) -> Vec<Effect> {
        let session = match &self.phase {
            Phase::Ending(session) if session.id == report.request.session_id => session,
            _ => {
                debug!("finalize result for a session that is not ending, ignoring");
                return Vec::new();
            }
        };

        let synced = report.is_synced();
        for warning in report.warnings() {
            warn!(session = %session.id, %warning, "finalize submission failed");
        }
        if !synced {
            warn!(
                session = %session.id,
                elapsed_seconds = report.request.elapsed_seconds,
                points = report.request.points,
                "dropping unsynced focus session record"
            );
        }

        let summary = session.summary(Some(report));
        let mut effects = vec![Effect::UnsubscribeLifecycle];
        if self.config.keep_awake {
            effects.push(Effect::ReleaseKeepAwake);
        }
        effects.push(Effect::Publish(Event::SessionTerminated {
            session_id: summary.session_id,
            elapsed_seconds: summary.elapsed_seconds,
            accrued_points: summary.accrued_points,
            synced,
        }));
        info!(session = %summary.session_id, synced, "focus session terminated");
        self.phase = Phase::Terminated(summary);
        effects
    }

    fn reset(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.phase {
            Phase::Terminated(_) => {
                self.phase = Phase::Idle;
                Ok(Vec::new())
            }
            _ => Err(SessionError::InvalidTransition {
                from: self.phase(),
                action: "reset",
            }),
        }
    }

    fn teardown(&mut self) -> Vec<Effect> {
        let session = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Running(session) | Phase::Ending(session) => session,
            other => {
                self.phase = other;
                return Vec::new();
            }
        };

        warn!(
            session = %session.id,
            elapsed_seconds = session.engine.elapsed_seconds(),
            points = session.engine.accrued_points(),
            "session torn down before finalize, record dropped"
        );
        let summary = session.summary(None);
        let mut effects = vec![
            Effect::StopTicker,
            Effect::CancelSample,
            Effect::CancelBaseline,
            Effect::UnsubscribeLifecycle,
        ];
        if self.config.keep_awake {
            effects.push(Effect::ReleaseKeepAwake);
        }
        effects.push(Effect::Publish(Event::SessionDropped {
            session_id: summary.session_id,
            elapsed_seconds: summary.elapsed_seconds,
            accrued_points: summary.accrued_points,
        }));
        self.phase = Phase::Terminated(summary);
        effects
    }
}

impl ActiveSession {
    fn lifecycle(&mut self, signal: LifecycleSignal) -> Vec<Effect> {
        let outputs = self.classifier.on_transition(signal);
        let mut effects = Vec::new();
        for output in outputs {
            self.apply(output, signal.at, &mut effects);
        }
        effects
    }

    fn sample(&mut self, excursion: ExcursionId, reading: Result<f64, SensorError>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(output) = self.classifier.on_sample(excursion, reading) {
            // Samples carry no timestamp of their own.
            self.apply(output, self.started_at, &mut effects);
        }
        effects
    }

    fn apply(&mut self, output: ClassifierOutput, at: DateTime<Utc>, effects: &mut Vec<Effect>) {
        match output {
            ClassifierOutput::Opened(excursion) => {
                self.engine.excursion_opened(excursion);
                effects.push(Effect::Publish(Event::ExcursionOpened {
                    session_id: self.id,
                    excursion,
                    at,
                }));
            }
            ClassifierOutput::SampleRequested(request) => {
                effects.push(Effect::ScheduleSample(request));
            }
            ClassifierOutput::Classified {
                excursion,
                classification,
                basis,
            } => {
                self.engine.excursion_classified(excursion, classification);
                effects.push(Effect::Publish(Event::ExcursionClassified {
                    session_id: self.id,
                    excursion,
                    classification,
                    basis,
                }));
            }
            ClassifierOutput::Closed(excursion) => {
                let reconciliation = self.engine.excursion_closed(&excursion);
                effects.push(Effect::CancelSample);
                effects.push(Effect::Publish(Event::ExcursionClosed {
                    session_id: self.id,
                    reconciliation,
                    at,
                }));
                if let Some(notice) = ReturnNotice::for_classification(excursion.classification) {
                    effects.push(Effect::Publish(Event::ReturnNotice {
                        session_id: self.id,
                        notice,
                    }));
                }
            }
        }
    }

    /// Start or stop the ticker to match the engine's sub-state. Runs after
    /// every classification so the engine never acts on a stale one.
    fn sync_ticker(&mut self, effects: &mut Vec<Effect>) {
        let running = self.engine.is_running();
        if running == self.ticker_running {
            return;
        }
        self.ticker_running = running;
        let elapsed_seconds = self.engine.elapsed_seconds();
        let accrued_points = self.engine.accrued_points();
        if running {
            debug!(session = %self.id, "accrual resumed");
            effects.push(Effect::StartTicker);
            effects.push(Effect::Publish(Event::AccrualResumed {
                session_id: self.id,
                elapsed_seconds,
                accrued_points,
            }));
        } else {
            debug!(session = %self.id, "accrual paused");
            effects.push(Effect::StopTicker);
            effects.push(Effect::Publish(Event::AccrualPaused {
                session_id: self.id,
                elapsed_seconds,
                accrued_points,
            }));
        }
    }
}
