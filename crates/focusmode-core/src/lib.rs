//! # Focusmode Core Library
//!
//! This library provides the core logic for focus-session tracking: a timer
//! that keeps counting while the phone is merely locked and stops while the
//! user has switched to another app. The CLI and any mobile shell are thin
//! layers over the same library.
//!
//! ## Architecture
//!
//! - **Classifier**: Turns app lifecycle transitions into background
//!   excursions and labels each one LOCKED or SWITCHED
//! - **Timer Engine**: Accrual state machine advanced by one-second ticks,
//!   with reconciliation when an excursion closes
//! - **Session**: Pure controller for the session lifecycle (start, give
//!   up, finalize) that emits effects instead of performing them
//! - **Runtime**: tokio driver executing those effects against real or
//!   in-memory collaborators
//! - **Storage**: TOML-based configuration
//! - **Integrations**: Collaborator traits and the focus API client
//!
//! ## Key Components
//!
//! - [`LockSwitchClassifier`]: Lock/switch heuristics
//! - [`AccrualEngine`]: Elapsed time and points
//! - [`SessionController`]: Session state machine
//! - [`SessionRuntime`]: Async driver
//! - [`Config`]: Application configuration management

pub mod classifier;
pub mod error;
pub mod events;
pub mod integrations;
pub mod lifecycle;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod timer;

pub use classifier::{
    BackgroundExcursion, Classification, ClassificationBasis, ClassifierConfig, ExcursionId,
    LockSwitchClassifier,
};
pub use error::{ConfigError, CoreError, SensorError, SessionError, SubmissionError};
pub use events::{Event, ReturnNotice};
pub use integrations::ApiClient;
pub use lifecycle::{LifecycleSignal, LifecycleState, PlatformFamily};
pub use runtime::{Collaborators, GiveUpOutcome, SessionRuntime};
pub use session::{
    FinalizeReport, FinalizeRequest, SessionConfig, SessionController, SessionId, SessionPhase,
    SessionSnapshot, SessionSummary, SubmissionStatus,
};
pub use storage::Config;
pub use timer::{AccrualEngine, AccrualState, Reconciliation};
