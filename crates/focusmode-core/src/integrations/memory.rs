//! In-memory collaborators.
//!
//! Used by the CLI's scenario replay (dry-run submission, scripted
//! brightness) and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::traits::{
    BrightnessSensor, Clock, KeepAwake, LifecycleCallback, LifecycleSource, RewardSink,
    StatisticsSink, Subscription,
};
use crate::error::{SensorError, SubmissionError};
use crate::lifecycle::LifecycleSignal;

/// Lifecycle source driven by hand.
#[derive(Clone, Default)]
pub struct ManualLifecycle {
    inner: Arc<ManualLifecycleInner>,
}

#[derive(Default)]
struct ManualLifecycleInner {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Arc<LifecycleCallback>>>,
}

impl ManualLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every current subscriber.
    pub fn emit(&self, signal: LifecycleSignal) {
        let callbacks: Vec<_> = match self.inner.callbacks.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            (**callback)(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl LifecycleSource for ManualLifecycle {
    fn subscribe(&self, callback: LifecycleCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut map) = self.inner.callbacks.lock() {
            map.insert(id, Arc::new(callback));
        }
        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            if let Ok(mut map) = inner.callbacks.lock() {
                map.remove(&id);
            }
        })
    }
}

/// Brightness sensor that replays queued readings, then a fallback.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    queue: Mutex<VecDeque<(std::time::Duration, Result<f64, SensorError>)>>,
    fallback: Mutex<Option<f64>>,
    reads: AtomicUsize,
}

impl ScriptedSensor {
    /// Always reports `value` unless readings are queued.
    pub fn constant(value: f64) -> Self {
        let sensor = Self::default();
        sensor.set_fallback(Some(value));
        sensor
    }

    /// Sensor that is never available.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn push(&self, reading: Result<f64, SensorError>) {
        self.push_after(std::time::Duration::ZERO, reading);
    }

    /// Queue a reading that takes `latency` to come back.
    pub fn push_after(&self, latency: std::time::Duration, reading: Result<f64, SensorError>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back((latency, reading));
        }
    }

    pub fn set_fallback(&self, value: Option<f64>) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = value;
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrightnessSensor for ScriptedSensor {
    async fn read_brightness(&self) -> Result<f64, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        if let Some((latency, reading)) = queued {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            return reading;
        }
        self.fallback
            .lock()
            .ok()
            .and_then(|f| *f)
            .ok_or(SensorError::Unavailable)
    }
}

/// Reward and statistics sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    points: Mutex<Vec<u64>>,
    sessions: Mutex<Vec<(u64, DateTime<Utc>)>>,
    points_error: Mutex<Option<SubmissionError>>,
    session_error: Mutex<Option<SubmissionError>>,
}

impl RecordingSink {
    pub fn points(&self) -> Vec<u64> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn sessions(&self) -> Vec<(u64, DateTime<Utc>)> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make every points submission fail with `err`.
    pub fn fail_points(&self, err: SubmissionError) {
        if let Ok(mut slot) = self.points_error.lock() {
            *slot = Some(err);
        }
    }

    /// Make every session submission fail with `err`.
    pub fn fail_sessions(&self, err: SubmissionError) {
        if let Ok(mut slot) = self.session_error.lock() {
            *slot = Some(err);
        }
    }
}

#[async_trait]
impl RewardSink for RecordingSink {
    async fn submit_points(&self, points: u64) -> Result<(), SubmissionError> {
        if let Some(err) = self.points_error.lock().ok().and_then(|e| e.clone()) {
            return Err(err);
        }
        if let Ok(mut p) = self.points.lock() {
            p.push(points);
        }
        Ok(())
    }
}

#[async_trait]
impl StatisticsSink for RecordingSink {
    async fn submit_focus_session(
        &self,
        elapsed_seconds: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), SubmissionError> {
        if let Some(err) = self.session_error.lock().ok().and_then(|e| e.clone()) {
            return Err(err);
        }
        if let Ok(mut s) = self.sessions.lock() {
            s.push((elapsed_seconds, occurred_at));
        }
        Ok(())
    }
}

/// Keep-awake that only counts.
#[derive(Debug, Default)]
pub struct CountingKeepAwake {
    active: AtomicBool,
    activations: AtomicUsize,
}

impl CountingKeepAwake {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl KeepAwake for CountingKeepAwake {
    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(mut now) => {
                *now += by;
                *now
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;

    #[test]
    fn manual_lifecycle_stops_delivering_after_cancel() {
        let source = ManualLifecycle::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let sub = source.subscribe(Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        source.emit(LifecycleSignal::new(LifecycleState::Background, Utc::now()));
        assert_eq!(source.subscriber_count(), 1);
        sub.cancel();
        source.emit(LifecycleSignal::new(LifecycleState::Active, Utc::now()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn scripted_sensor_drains_queue_then_falls_back() {
        let sensor = ScriptedSensor::constant(0.6);
        sensor.push(Ok(0.01));
        assert_eq!(sensor.read_brightness().await, Ok(0.01));
        assert_eq!(sensor.read_brightness().await, Ok(0.6));
        assert_eq!(sensor.reads(), 2);
        assert_eq!(
            ScriptedSensor::unavailable().read_brightness().await,
            Err(SensorError::Unavailable)
        );
    }
}
