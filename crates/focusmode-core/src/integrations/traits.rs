//! Collaborator seams.
//!
//! The engine never talks to a platform directly. Lifecycle signals,
//! brightness, keep-awake and the remote API all come in through these
//! traits so the runtime can be driven by real devices, the HTTP client,
//! or in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{SensorError, SubmissionError};
use crate::lifecycle::LifecycleSignal;

/// Callback invoked for every lifecycle transition.
pub type LifecycleCallback = Box<dyn Fn(LifecycleSignal) + Send + Sync>;

/// Process-wide lifecycle signal source.
pub trait LifecycleSource: Send + Sync {
    /// Register `callback`. The returned handle unregisters it exactly once,
    /// either through [`Subscription::cancel`] or on drop.
    fn subscribe(&self, callback: LifecycleCallback) -> Subscription;
}

/// Handle to a lifecycle subscription.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ambient light / screen brightness sensor.
#[async_trait]
pub trait BrightnessSensor: Send + Sync {
    /// Current brightness as a fraction in [0, 1].
    async fn read_brightness(&self) -> Result<f64, SensorError>;
}

/// Receives the points earned in a session.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn submit_points(&self, points: u64) -> Result<(), SubmissionError>;
}

/// Receives completed focus sessions.
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    async fn submit_focus_session(
        &self,
        elapsed_seconds: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), SubmissionError>;
}

/// Keeps the display from sleeping while a session is on screen.
pub trait KeepAwake: Send + Sync {
    fn activate(&self);
    fn deactivate(&self);
}

/// Wall-clock source for command timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscription_releases_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
