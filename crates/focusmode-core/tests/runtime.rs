//! End-to-end tests for the async session runtime on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use focusmode_core::integrations::memory::{
    CountingKeepAwake, ManualClock, ManualLifecycle, RecordingSink, ScriptedSensor,
};
use focusmode_core::integrations::Clock;
use focusmode_core::{
    Classification, ClassificationBasis, ClassifierConfig, Collaborators, Event, GiveUpOutcome,
    LifecycleSignal, LifecycleState, PlatformFamily, ReturnNotice, SessionConfig, SessionError,
    SessionPhase, SessionRuntime, SubmissionError, SubmissionStatus,
};
use tokio::sync::broadcast;

struct Rig {
    runtime: SessionRuntime,
    lifecycle: ManualLifecycle,
    sensor: Arc<ScriptedSensor>,
    sink: Arc<RecordingSink>,
    keep_awake: Arc<CountingKeepAwake>,
    clock: Arc<ManualClock>,
}

impl Rig {
    fn new(platform: PlatformFamily, sensor: ScriptedSensor) -> Self {
        let lifecycle = ManualLifecycle::new();
        let sensor = Arc::new(sensor);
        let sink = Arc::new(RecordingSink::default());
        let keep_awake = Arc::new(CountingKeepAwake::default());
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let config = SessionConfig {
            classifier: ClassifierConfig {
                sample_delay_ms: 300,
                ..ClassifierConfig::for_platform(platform)
            },
            ..SessionConfig::default()
        };
        let runtime = SessionRuntime::spawn(
            config,
            Collaborators {
                lifecycle: Arc::new(lifecycle.clone()),
                sensor: sensor.clone(),
                keep_awake: keep_awake.clone(),
                rewards: sink.clone(),
                statistics: sink.clone(),
                clock: clock.clone(),
            },
        );
        Self {
            runtime,
            lifecycle,
            sensor,
            sink,
            keep_awake,
            clock,
        }
    }

    /// Coarse platform with a bright baseline and `reading` for every
    /// later sample.
    fn coarse(reading: f64) -> Self {
        let sensor = ScriptedSensor::constant(reading);
        sensor.push(Ok(0.8));
        Self::new(PlatformFamily::Coarse, sensor)
    }

    async fn wait_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.clock.advance(chrono::Duration::milliseconds(ms as i64));
    }

    async fn emit(&self, state: LifecycleState) {
        self.lifecycle
            .emit(LifecycleSignal::new(state, self.clock.now()));
        self.wait_ms(10).await;
    }

    async fn finalized(&self) -> focusmode_core::FinalizeReport {
        match self.runtime.give_up().await.unwrap() {
            GiveUpOutcome::Finalized(report) => report,
            other => panic!("expected finalize, got {other:?}"),
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn locked_phone_keeps_counting() {
    let rig = Rig::coarse(0.01);
    let mut events = rig.runtime.subscribe_events();
    rig.runtime.start().await.unwrap();

    rig.wait_ms(10_500).await;
    assert_eq!(rig.runtime.snapshot().elapsed_seconds, 10);

    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(29_990).await;
    rig.emit(LifecycleState::Active).await;

    let report = rig.finalized().await;
    assert_eq!(report.request.elapsed_seconds, 40);
    assert_eq!(report.request.points, 2000);
    assert_eq!(rig.sink.points(), vec![2000]);
    assert_eq!(rig.sink.sessions().len(), 1);
    assert_eq!(rig.sink.sessions()[0].0, 40);

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ReturnNotice {
            notice: ReturnNotice::CountedWhileAsleep,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn switching_apps_stops_the_timer() {
    let rig = Rig::coarse(0.6);
    let mut events = rig.runtime.subscribe_events();
    rig.runtime.start().await.unwrap();

    rig.wait_ms(10_500).await;
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(29_990).await;
    assert_eq!(rig.runtime.snapshot().elapsed_seconds, 10);
    rig.emit(LifecycleState::Active).await;

    let report = rig.finalized().await;
    assert_eq!(report.request.elapsed_seconds, 10);
    assert_eq!(report.request.points, 500);
    assert_eq!(rig.sink.points(), vec![500]);

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ReturnNotice {
            notice: ReturnNotice::StoppedWhileAway,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(e, Event::AccrualPaused { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::AccrualResumed { .. })));
}

#[tokio::test(start_paused = true)]
async fn timer_resumes_after_switch() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();

    rig.wait_ms(5_500).await;
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(10_000).await;
    rig.emit(LifecycleState::Active).await;
    rig.wait_ms(3_500).await;

    assert_eq!(rig.runtime.snapshot().elapsed_seconds, 8);
}

#[tokio::test(start_paused = true)]
async fn fine_grained_lock_needs_no_sensor() {
    let rig = Rig::new(PlatformFamily::FineGrained, ScriptedSensor::unavailable());
    rig.runtime.start().await.unwrap();

    rig.wait_ms(10_500).await;
    rig.lifecycle
        .emit(LifecycleSignal::new(LifecycleState::Inactive, rig.clock.now()));
    rig.wait_ms(5).await;
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(29_980).await;
    rig.emit(LifecycleState::Active).await;

    let report = rig.finalized().await;
    assert_eq!(report.request.elapsed_seconds, 40);
}

#[tokio::test(start_paused = true)]
async fn unavailable_sensor_counts_as_switch() {
    let rig = Rig::new(PlatformFamily::Coarse, ScriptedSensor::unavailable());
    rig.runtime.start().await.unwrap();

    rig.wait_ms(10_500).await;
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(29_990).await;
    rig.emit(LifecycleState::Active).await;

    let report = rig.finalized().await;
    assert_eq!(report.request.elapsed_seconds, 10);
    assert!(rig.sensor.reads() >= 2);
}

#[tokio::test(start_paused = true)]
async fn double_give_up_submits_once() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();
    rig.wait_ms(3_500).await;

    let (first, second) = tokio::join!(rig.runtime.give_up(), rig.runtime.give_up());
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, GiveUpOutcome::Finalized(_)))
            .count(),
        1
    );
    assert!(outcomes.contains(&GiveUpOutcome::AlreadyEnded));
    assert_eq!(rig.sink.points(), vec![150]);
    assert_eq!(rig.sink.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn terminated_session_releases_everything() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();
    rig.wait_ms(10).await;
    assert_eq!(rig.lifecycle.subscriber_count(), 1);
    assert!(rig.keep_awake.is_active());

    rig.finalized().await;
    assert_eq!(rig.runtime.snapshot().phase, SessionPhase::Terminated);
    assert_eq!(rig.lifecycle.subscriber_count(), 0);
    assert!(!rig.keep_awake.is_active());

    // Lifecycle noise after termination changes nothing.
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(5_000).await;
    assert_eq!(rig.runtime.snapshot().elapsed_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn zero_point_session_skips_reward_submission() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();

    let report = rig.finalized().await;
    assert_eq!(report.points, SubmissionStatus::Skipped);
    assert!(rig.sink.points().is_empty());
    assert_eq!(rig.sink.sessions().len(), 1);
    assert_eq!(rig.sink.sessions()[0].0, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_points_still_submit_session() {
    let rig = Rig::coarse(0.6);
    rig.sink.fail_points(SubmissionError::Rejected {
        endpoint: "api/User/xp".into(),
        status: 500,
        body: String::new(),
    });
    rig.runtime.start().await.unwrap();
    rig.wait_ms(2_500).await;

    let report = rig.finalized().await;
    assert!(report.points.is_failed());
    assert_eq!(report.session, SubmissionStatus::Submitted);
    assert_eq!(rig.sink.sessions().len(), 1);
    assert_eq!(rig.runtime.snapshot().phase, SessionPhase::Terminated);
}

#[tokio::test(start_paused = true)]
async fn failed_session_submission_still_tears_down() {
    let rig = Rig::coarse(0.6);
    rig.sink.fail_sessions(SubmissionError::Transport {
        endpoint: "api/Statistics/daily".into(),
        message: "connection refused".into(),
    });
    let mut events = rig.runtime.subscribe_events();
    rig.runtime.start().await.unwrap();
    rig.wait_ms(2_500).await;

    let report = rig.finalized().await;
    assert_eq!(report.points, SubmissionStatus::Submitted);
    assert!(report.session.is_failed());
    assert!(!report.is_synced());
    assert_eq!(rig.sink.points(), vec![100]);
    assert!(rig.sink.sessions().is_empty());

    assert_eq!(rig.runtime.snapshot().phase, SessionPhase::Terminated);
    assert_eq!(rig.lifecycle.subscriber_count(), 0);
    assert!(!rig.keep_awake.is_active());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, Event::SessionTerminated { synced: false, .. })));

    rig.runtime.reset().await.unwrap();
    rig.runtime.start().await.unwrap();
    assert_eq!(rig.runtime.snapshot().phase, SessionPhase::Running);
}

#[tokio::test(start_paused = true)]
async fn late_baseline_from_previous_session_is_discarded() {
    let sensor = ScriptedSensor::constant(0.03);
    sensor.push_after(Duration::from_secs(1), Ok(0.05));
    sensor.push_after(Duration::from_secs(3), Ok(0.9));
    let rig = Rig::new(PlatformFamily::Coarse, sensor);
    let mut events = rig.runtime.subscribe_events();

    rig.runtime.start().await.unwrap();
    rig.wait_ms(10).await;
    rig.finalized().await;
    rig.runtime.reset().await.unwrap();
    rig.runtime.start().await.unwrap();

    // The first read would have landed at 1 s; the second lands at 3 s.
    rig.wait_ms(3_500).await;
    rig.emit(LifecycleState::Background).await;
    rig.wait_ms(490).await;

    assert_eq!(rig.runtime.snapshot().excursion, Some(Classification::Locked));
    let threshold = drain(&mut events).iter().find_map(|e| match e {
        Event::ExcursionClassified {
            basis: ClassificationBasis::Brightness { threshold, .. },
            ..
        } => Some(*threshold),
        _ => None,
    });
    let threshold = threshold.expect("brightness classification");
    assert!((threshold - 0.18).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn watchers_only_wake_when_the_display_changes() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();
    rig.wait_ms(1_500).await;

    let mut rx = rig.runtime.watch();
    assert_eq!(rx.borrow_and_update().elapsed_seconds, 1);

    rig.emit(LifecycleState::Background).await;
    rig.emit(LifecycleState::Active).await;
    rig.emit(LifecycleState::Background).await;
    rig.emit(LifecycleState::Active).await;
    assert!(!rx.has_changed().unwrap());

    rig.wait_ms(700).await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().elapsed_seconds, 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_commands_are_rejected() {
    let rig = Rig::coarse(0.6);
    assert!(matches!(
        rig.runtime.give_up().await,
        Err(SessionError::InvalidTransition { .. })
    ));
    rig.runtime.start().await.unwrap();
    assert!(matches!(
        rig.runtime.start().await,
        Err(SessionError::InvalidTransition { .. })
    ));
    assert!(rig.runtime.reset().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn reset_allows_a_new_session() {
    let rig = Rig::coarse(0.6);
    let first = rig.runtime.start().await.unwrap();
    rig.finalized().await;
    rig.runtime.reset().await.unwrap();
    assert_eq!(rig.runtime.snapshot().phase, SessionPhase::Idle);

    let second = rig.runtime.start().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(rig.keep_awake.activations(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_running_session_without_submitting() {
    let rig = Rig::coarse(0.6);
    rig.runtime.start().await.unwrap();
    rig.wait_ms(3_500).await;

    let Rig {
        runtime,
        lifecycle,
        sink,
        keep_awake,
        ..
    } = rig;
    let summary = runtime.shutdown().await.expect("summary");
    assert_eq!(summary.elapsed_seconds, 3);
    assert!(summary.report.is_none());
    assert!(sink.points().is_empty());
    assert!(sink.sessions().is_empty());
    assert_eq!(lifecycle.subscriber_count(), 0);
    assert!(!keep_awake.is_active());
}
