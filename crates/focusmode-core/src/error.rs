//! Core error types for focusmode-core.
//!
//! This module defines the error hierarchy using thiserror. Sensor faults
//! never leave the classifier and submission faults are reported as
//! warnings, so only configuration and invalid-transition errors are
//! ever returned as hard failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionPhase;

/// Core error type for focusmode-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session state machine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote submission errors
    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    /// OS credential store errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Session controller errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The requested action is not valid in the current phase.
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionPhase,
        action: &'static str,
    },

    /// The runtime task has already shut down.
    #[error("session runtime is no longer running")]
    RuntimeClosed,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/config directory could not be resolved or created
    #[error("Configuration directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

/// Failure of one of the two finalize calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// No API token stored
    #[error("not authenticated with the focus API")]
    NotAuthenticated,

    /// The server answered with a non-success status
    #[error("{endpoint} rejected submission: HTTP {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Network or protocol failure
    #[error("{endpoint} unreachable: {message}")]
    Transport { endpoint: String, message: String },

    /// Collaborator-specific failure
    #[error("{0}")]
    Other(String),
}

/// Ambient light sensor failure. Always recovered by the classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// No sensor on this device or permission denied
    #[error("brightness sensor unavailable")]
    Unavailable,

    /// The read failed
    #[error("brightness read failed: {0}")]
    ReadFailed(String),
}

impl From<reqwest::Error> for SubmissionError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        SubmissionError::Transport {
            endpoint,
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
