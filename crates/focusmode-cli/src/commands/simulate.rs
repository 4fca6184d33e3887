//! Scenario replay through the session controller.
//!
//! A scenario is a TOML file with an optional `platform`, an optional
//! `baseline` brightness, and a list of `[[step]]` tables:
//!
//! ```toml
//! baseline = 0.8
//!
//! [[step]]
//! kind = "tick"
//! count = 10
//!
//! [[step]]
//! kind = "lifecycle"
//! state = "background"
//! after_ms = 500
//!
//! [[step]]
//! kind = "brightness"
//! reading = 0.01
//!
//! [[step]]
//! kind = "give_up"
//! ```
//!
//! Time is simulated: ticks advance the clock by one second, lifecycle
//! steps by `after_ms`. Ticks are only delivered while the session's
//! ticker would be running.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::warn;

use focusmode_core::integrations::memory::RecordingSink;
use focusmode_core::integrations::{RewardSink, StatisticsSink};
use focusmode_core::session::{finalize, format_elapsed, Effect, Input};
use focusmode_core::{
    ApiClient, ClassificationBasis, Config, Event, ExcursionId, FinalizeReport, LifecycleSignal,
    LifecycleState, PlatformFamily, SensorError, SessionConfig, SessionController,
    SessionError, SessionSnapshot, SubmissionStatus,
};

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,
    /// Override the platform family (fine_grained, coarse, ios, android)
    #[arg(long)]
    pub platform: Option<PlatformFamily>,
    /// Send the finalize calls to the configured focus API
    #[arg(long)]
    pub submit: bool,
    /// Print events and the summary as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub platform: Option<PlatformFamily>,
    /// Brightness reported when the session starts. Absent means the
    /// sensor is unavailable.
    #[serde(default)]
    pub baseline: Option<f64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Tick {
        #[serde(default = "default_count")]
        count: u32,
    },
    Lifecycle {
        state: LifecycleState,
        #[serde(default)]
        after_ms: u64,
    },
    /// Answer the pending brightness sample. No reading means the sensor
    /// failed.
    Brightness {
        #[serde(default)]
        reading: Option<f64>,
    },
    GiveUp,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct SimulationOutcome {
    pub events: Vec<Event>,
    pub snapshot: SessionSnapshot,
    pub report: Option<FinalizeReport>,
}

struct Simulator<'a> {
    controller: SessionController,
    now: DateTime<Utc>,
    baseline: Option<f64>,
    ticker_running: bool,
    pending_sample: Option<ExcursionId>,
    events: Vec<Event>,
    report: Option<FinalizeReport>,
    rewards: &'a dyn RewardSink,
    statistics: &'a dyn StatisticsSink,
}

impl Simulator<'_> {
    async fn feed(&mut self, input: Input) -> Result<(), SessionError> {
        let mut queue: VecDeque<Effect> = self.controller.handle(input)?.into();
        while let Some(effect) = queue.pop_front() {
            let next = match effect {
                Effect::CaptureBaseline(session) => Some(Input::BaselineCaptured {
                    session,
                    reading: self.baseline.ok_or(SensorError::Unavailable),
                }),
                Effect::StartTicker => {
                    self.ticker_running = true;
                    None
                }
                Effect::StopTicker => {
                    self.ticker_running = false;
                    None
                }
                Effect::ScheduleSample(request) => {
                    self.pending_sample = Some(request.excursion);
                    None
                }
                Effect::CancelSample => {
                    self.pending_sample = None;
                    None
                }
                Effect::Finalize(request) => {
                    let report = finalize(&request, self.rewards, self.statistics).await;
                    self.report = Some(report.clone());
                    Some(Input::FinalizeCompleted(report))
                }
                Effect::Publish(event) => {
                    self.events.push(event);
                    None
                }
                Effect::SubscribeLifecycle
                | Effect::UnsubscribeLifecycle
                | Effect::CancelBaseline
                | Effect::AcquireKeepAwake
                | Effect::ReleaseKeepAwake => None,
            };
            if let Some(next) = next {
                queue.extend(self.controller.handle(next)?);
            }
        }
        Ok(())
    }

    async fn step(&mut self, step: &Step) -> Result<(), SessionError> {
        match step {
            Step::Tick { count } => {
                for _ in 0..*count {
                    self.now += chrono::Duration::seconds(1);
                    if self.ticker_running {
                        self.feed(Input::Tick).await?;
                    }
                }
            }
            Step::Lifecycle { state, after_ms } => {
                self.now += chrono::Duration::milliseconds(*after_ms as i64);
                self.feed(Input::Lifecycle(LifecycleSignal::new(*state, self.now)))
                    .await?;
            }
            Step::Brightness { reading } => match self.pending_sample.take() {
                Some(excursion) => {
                    self.feed(Input::BrightnessSampled {
                        excursion,
                        reading: reading.ok_or(SensorError::Unavailable),
                    })
                    .await?;
                }
                None => warn!("no brightness sample pending, step ignored"),
            },
            Step::GiveUp => self.feed(Input::GiveUp { at: self.now }).await?,
        }
        Ok(())
    }
}

/// Run `scenario` from start to its last step.
pub async fn simulate(
    scenario: &Scenario,
    config: SessionConfig,
    started_at: DateTime<Utc>,
    rewards: &dyn RewardSink,
    statistics: &dyn StatisticsSink,
) -> Result<SimulationOutcome, SessionError> {
    let mut sim = Simulator {
        controller: SessionController::new(config),
        now: started_at,
        baseline: scenario.baseline,
        ticker_running: false,
        pending_sample: None,
        events: Vec::new(),
        report: None,
        rewards,
        statistics,
    };
    sim.feed(Input::Start { at: started_at }).await?;
    for step in &scenario.steps {
        sim.step(step).await?;
    }
    Ok(SimulationOutcome {
        snapshot: sim.controller.snapshot(),
        events: sim.events,
        report: sim.report,
    })
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&args.scenario)
        .map_err(|e| format!("cannot read {}: {e}", args.scenario.display()))?;
    let scenario: Scenario = toml::from_str(&content)?;

    let config = Config::load()?;
    let mut session_config = config.session_config();
    if let Some(platform) = args.platform.or(scenario.platform) {
        session_config.classifier.platform = platform;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = if args.submit {
        let api = ApiClient::from_config(&config.api)?;
        if !api.is_authenticated() {
            return Err("not authenticated; run `focusmode auth login --token <TOKEN>`".into());
        }
        runtime.block_on(simulate(&scenario, session_config, Utc::now(), &api, &api))?
    } else {
        let sink = RecordingSink::default();
        runtime.block_on(simulate(&scenario, session_config, Utc::now(), &sink, &sink))?
    };

    if args.json {
        for event in &outcome.events {
            println!("{}", serde_json::to_string(event)?);
        }
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "snapshot": outcome.snapshot,
                "report": outcome.report,
            }))?
        );
    } else {
        for event in &outcome.events {
            println!("{}", describe(event));
        }
        print_summary(&outcome, args.submit);
    }
    Ok(())
}

fn describe(event: &Event) -> String {
    match event {
        Event::SessionStarted {
            platform,
            reward_rate,
            ..
        } => format!("session started ({platform}, {reward_rate} points/s)"),
        Event::ExcursionOpened { excursion, .. } => format!("excursion {excursion} opened"),
        Event::ExcursionClassified {
            excursion,
            classification,
            basis,
            ..
        } => format!(
            "excursion {excursion} classified {classification} ({})",
            describe_basis(basis)
        ),
        Event::ExcursionClosed { reconciliation, .. } => format!(
            "excursion {} closed after {}s, credited {}s",
            reconciliation.excursion,
            reconciliation.excursion_seconds,
            reconciliation.credited_seconds
        ),
        Event::ReturnNotice { notice, .. } => notice.message().to_string(),
        Event::AccrualPaused {
            elapsed_seconds, ..
        } => format!("timer paused at {}", format_elapsed(*elapsed_seconds)),
        Event::AccrualResumed {
            elapsed_seconds, ..
        } => format!("timer resumed at {}", format_elapsed(*elapsed_seconds)),
        Event::SessionEnding {
            elapsed_seconds,
            accrued_points,
            ..
        } => format!(
            "giving up at {} with {accrued_points} points",
            format_elapsed(*elapsed_seconds)
        ),
        Event::SessionTerminated { synced, .. } => format!(
            "session terminated ({})",
            if *synced { "synced" } else { "not synced" }
        ),
        Event::SessionDropped { .. } => "session dropped without submission".to_string(),
    }
}

fn describe_basis(basis: &ClassificationBasis) -> String {
    match basis {
        ClassificationBasis::HandoffTiming { handoff_ms } => {
            format!("inactive -> background in {handoff_ms} ms")
        }
        ClassificationBasis::Brightness { reading, threshold } => {
            format!("brightness {reading:.2} vs threshold {threshold:.2}")
        }
        ClassificationBasis::SensorUnavailable => "brightness unavailable".to_string(),
        ClassificationBasis::ForegroundReturn => "returned before a decision".to_string(),
    }
}

fn describe_status(status: &SubmissionStatus) -> String {
    match status {
        SubmissionStatus::Skipped => "skipped".to_string(),
        SubmissionStatus::Submitted => "submitted".to_string(),
        SubmissionStatus::Failed(err) => format!("failed: {err}"),
    }
}

fn print_summary(outcome: &SimulationOutcome, submitted: bool) {
    let snapshot = &outcome.snapshot;
    println!(
        "phase: {}  elapsed: {}  points: {}",
        snapshot.phase,
        snapshot.formatted_elapsed(),
        snapshot.accrued_points
    );
    if let Some(report) = &outcome.report {
        let target = if submitted { "api" } else { "dry run" };
        println!(
            "points submission ({target}): {}",
            describe_status(&report.points)
        );
        println!(
            "session submission ({target}): {}",
            describe_status(&report.session)
        );
    }
}
