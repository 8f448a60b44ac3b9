//! Error taxonomy for the probing engine.
//!
//! Configuration and lifecycle errors stop a run before or without any work;
//! probe errors are per-target data and end up inside a `ProbeResult`.

use thiserror::Error;

use crate::retry::ErrorKind;
use crate::runner::RunnerState;

/// Options rejected before any target is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("empty target set")]
    EmptyTargets,
    #[error("target at index {index} is blank")]
    BlankTarget { index: usize },
    #[error("invalid concurrency {0}: must be at least 1")]
    InvalidConcurrency(i64),
    #[error("unsupported HTTP method {0:?}")]
    UnsupportedMethod(String),
    #[error("conflicting flags: {first} and {second} cannot both be set")]
    ConflictingFlags {
        first: &'static str,
        second: &'static str,
    },
}

/// Failure of a single probe. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Network-level failure reported by the HTTP client (after its own retries).
    #[error("{message}")]
    Transport { kind: ErrorKind, message: String },
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },
    /// Host is served through a CDN and CDN-fronted hosts are excluded.
    #[error("CDN-fronted host excluded ({provider})")]
    ExcludedCdn { provider: String },
    /// The prober panicked while handling this target.
    #[error("prober panicked: {0}")]
    Panicked(String),
}

impl ProbeError {
    pub fn transport(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProbeError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to start, drive, or release the worker pool.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("runner cannot start from state {0:?}")]
    NotRunnable(RunnerState),
    #[error("no tokio runtime available to host the worker pool")]
    NoRuntime,
    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),
    #[error("worker task was cancelled by the runtime")]
    WorkerCancelled,
}

/// Run-level failure returned by `Runner::run`.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("option validation failed: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Returned by a sink that no longer accepts results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("result sink is closed")]
pub struct SinkClosed;
