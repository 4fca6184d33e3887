//! Async driver for [`SessionController`].
//!
//! The controller is pure; this module owns everything with side effects.
//! A single tokio task holds the controller, executes its [`Effect`]s and
//! feeds the results back in as [`Input`]s. Commands, lifecycle signals,
//! brightness samples and ticks are all serialized through that task, so
//! no two inputs are ever applied concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::SampleRequest;
use crate::error::SessionError;
use crate::events::Event;
use crate::integrations::{
    BrightnessSensor, Clock, KeepAwake, LifecycleSource, RewardSink, StatisticsSink, Subscription,
};
use crate::lifecycle::LifecycleSignal;
use crate::session::{
    finalize, Effect, FinalizeReport, Input, SessionConfig, SessionController, SessionId,
    SessionSnapshot, SessionSummary,
};

const TICK_PERIOD: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

/// External collaborators the runtime drives.
#[derive(Clone)]
pub struct Collaborators {
    pub lifecycle: Arc<dyn LifecycleSource>,
    pub sensor: Arc<dyn BrightnessSensor>,
    pub keep_awake: Arc<dyn KeepAwake>,
    pub rewards: Arc<dyn RewardSink>,
    pub statistics: Arc<dyn StatisticsSink>,
    pub clock: Arc<dyn Clock>,
}

/// Result of a give-up request.
#[derive(Debug, Clone, PartialEq)]
pub enum GiveUpOutcome {
    /// This call ended the session; both submissions were attempted.
    Finalized(FinalizeReport),
    /// The session had already been given up.
    AlreadyEnded,
}

enum Command {
    Start {
        reply: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    GiveUp {
        reply: oneshot::Sender<Result<GiveUpOutcome, SessionError>>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
}

/// Handle to a running session task.
///
/// Dropping the handle tears the session down without submitting anything.
pub struct SessionRuntime {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<Event>,
    task: Option<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Spawn the driver task on the current tokio runtime.
    pub fn spawn(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots_tx, snapshots_rx) = watch::channel(SessionSnapshot::idle());
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            controller: SessionController::new(config),
            collaborators,
            lifecycle_tx,
            feedback_tx,
            subscription: None,
            ticker: None,
            sample_task: None,
            baseline_task: None,
            snapshots: snapshots_tx,
            events: events_tx.clone(),
        };
        let task = tokio::spawn(driver.run(commands_rx, lifecycle_rx, feedback_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            events: events_tx,
            task: Some(task),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot. It is notified when
    /// the session, phase, elapsed seconds or points change; that is at most
    /// once per tick plus once per reconciliation or phase change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn start(&self) -> Result<SessionId, SessionError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// End the session and run the finalize sequence. Resolves once both
    /// submissions have been attempted.
    pub async fn give_up(&self) -> Result<GiveUpOutcome, SessionError> {
        self.request(|reply| Command::GiveUp { reply }).await?
    }

    /// Return a terminated session to idle so a new one can start.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await?
    }

    /// Stop the driver. A session that has not terminated is torn down
    /// without submission. Returns the summary of the last session.
    pub async fn shutdown(mut self) -> Option<SessionSummary> {
        let summary = self
            .request(|reply| Command::Shutdown { reply })
            .await
            .ok()
            .flatten();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        summary
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::RuntimeClosed)?;
        rx.await.map_err(|_| SessionError::RuntimeClosed)
    }
}

struct Driver {
    controller: SessionController,
    collaborators: Collaborators,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleSignal>,
    feedback_tx: mpsc::UnboundedSender<Input>,
    subscription: Option<Subscription>,
    ticker: Option<Interval>,
    sample_task: Option<JoinHandle<()>>,
    baseline_task: Option<JoinHandle<()>>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<Event>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut lifecycle: mpsc::UnboundedReceiver<LifecycleSignal>,
        mut feedback: mpsc::UnboundedReceiver<Input>,
    ) {
        debug!("session runtime started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.shut_down().await;
                        break;
                    }
                },
                Some(signal) = lifecycle.recv() => {
                    self.feed(Input::Lifecycle(signal)).await;
                }
                Some(input) = feedback.recv() => {
                    self.feed(input).await;
                }
                _ = next_tick(&mut self.ticker) => {
                    self.feed(Input::Tick).await;
                }
            }
        }
        debug!("session runtime stopped");
    }

    /// Returns false once the driver should stop.
    async fn command(&mut self, command: Command) -> bool {
        let at = self.collaborators.clock.now();
        match command {
            Command::Start { reply } => {
                let result = self
                    .dispatch(Input::Start { at })
                    .await
                    .and_then(|_| self.controller.session_id().ok_or(SessionError::RuntimeClosed));
                let _ = reply.send(result);
            }
            Command::GiveUp { reply } => {
                let result = self.dispatch(Input::GiveUp { at }).await.map(|report| match report {
                    Some(report) => GiveUpOutcome::Finalized(report),
                    None => GiveUpOutcome::AlreadyEnded,
                });
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                let _ = reply.send(self.dispatch(Input::Reset).await.map(|_| ()));
            }
            Command::Shutdown { reply } => {
                self.shut_down().await;
                let _ = reply.send(self.controller.summary().cloned());
                return false;
            }
        }
        true
    }

    /// Apply an input that nobody waits on.
    async fn feed(&mut self, input: Input) {
        if let Err(err) = self.dispatch(input).await {
            warn!(error = %err, "input rejected");
        }
    }

    async fn shut_down(&mut self) {
        self.feed(Input::Teardown).await;
        self.ticker = None;
        self.abort_sample();
        self.abort_baseline();
        self.subscription = None;
    }

    /// Apply `input` and every input its effects produce. Only the first
    /// input can be rejected; follow-ups are internal and always valid.
    /// Returns the finalize report if this input finalized the session.
    async fn dispatch(&mut self, input: Input) -> Result<Option<FinalizeReport>, SessionError> {
        let effects = self.controller.handle(input)?;
        let mut finalized = None;
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let Some(next) = self.execute(effect).await else {
                continue;
            };
            if let Input::FinalizeCompleted(report) = &next {
                finalized = Some(report.clone());
            }
            match self.controller.handle(next) {
                Ok(more) => queue.extend(more),
                Err(err) => warn!(error = %err, "follow-up input rejected"),
            }
        }

        self.publish_snapshot();
        Ok(finalized)
    }

    /// Store the latest snapshot. Watchers are only woken when the display
    /// changes, so lifecycle noise between ticks does not reach them.
    fn publish_snapshot(&self) {
        let next = self.controller.snapshot();
        self.snapshots.send_if_modified(|current| {
            let changed = !current.same_display(&next);
            *current = next;
            changed
        });
    }

    /// Perform one effect. Effects that complete synchronously with a
    /// result return it as the next input.
    async fn execute(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::SubscribeLifecycle => {
                let tx = self.lifecycle_tx.clone();
                self.subscription = Some(self.collaborators.lifecycle.subscribe(Box::new(
                    move |signal| {
                        let _ = tx.send(signal);
                    },
                )));
            }
            Effect::UnsubscribeLifecycle => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.cancel();
                }
            }
            Effect::CaptureBaseline(session) => {
                self.abort_baseline();
                let sensor = Arc::clone(&self.collaborators.sensor);
                let tx = self.feedback_tx.clone();
                self.baseline_task = Some(tokio::spawn(async move {
                    let reading = sensor.read_brightness().await;
                    let _ = tx.send(Input::BaselineCaptured { session, reading });
                }));
            }
            Effect::CancelBaseline => self.abort_baseline(),
            Effect::StartTicker => {
                let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.ticker = Some(ticker);
            }
            Effect::StopTicker => self.ticker = None,
            Effect::ScheduleSample(request) => self.schedule_sample(request),
            Effect::CancelSample => self.abort_sample(),
            Effect::AcquireKeepAwake => self.collaborators.keep_awake.activate(),
            Effect::ReleaseKeepAwake => self.collaborators.keep_awake.deactivate(),
            Effect::Finalize(request) => {
                info!(session = %request.session_id, "running finalize sequence");
                let report = finalize(
                    &request,
                    self.collaborators.rewards.as_ref(),
                    self.collaborators.statistics.as_ref(),
                )
                .await;
                return Some(Input::FinalizeCompleted(report));
            }
            Effect::Publish(event) => {
                debug!(session = %event.session_id(), ?event, "event");
                let _ = self.events.send(event);
            }
        }
        None
    }

    fn schedule_sample(&mut self, request: SampleRequest) {
        self.abort_sample();
        let sensor = Arc::clone(&self.collaborators.sensor);
        let tx = self.feedback_tx.clone();
        self.sample_task = Some(tokio::spawn(async move {
            tokio::time::sleep(request.delay).await;
            let reading = sensor.read_brightness().await;
            let _ = tx.send(Input::BrightnessSampled {
                excursion: request.excursion,
                reading,
            });
        }));
    }

    fn abort_sample(&mut self) {
        if let Some(task) = self.sample_task.take() {
            task.abort();
        }
    }

    fn abort_baseline(&mut self) {
        if let Some(task) = self.baseline_task.take() {
            task.abort();
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
