//! Error taxonomy for supervisor setup failures (spec §7).
//!
//! Only the fatal setup failures enumerated here carry a dedicated process
//! exit code (spec §6): semaphore errors, fork errors, task-engine setup
//! errors, thread-creation errors, and signal-handler registration errors.
//! Everything else the core encounters — transient signal loss, partner
//! death, unauthenticated signals, a log-file open failure — is handled
//! in place and never surfaces as a `WatchdogError`.

use thiserror::Error;

/// Shared `Result` alias for the crate's fallible setup paths.
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// A fatal failure encountered while [`crate::supervisor::start`] is
/// bringing supervision up.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// The rendezvous semaphore could not be opened, waited on, posted to,
    /// or removed.
    #[error("rendezvous semaphore error: {details}")]
    Semaphore { details: String },

    /// `fork()` itself failed.
    #[error("fork failed: {details}")]
    Fork { details: String },

    /// Registering a periodic task with the task engine failed (e.g. a
    /// duplicate task name, which would violate the one-BEAT-task /
    /// one-checker-task invariant).
    #[error("task engine setup failed: {details}")]
    TaskEngine { details: String },

    /// Spawning the background thread that runs the task engine (User role
    /// only) failed.
    #[error("failed to spawn task-engine thread: {details}")]
    ThreadSpawn { details: String },

    /// Installing the `BEAT` or `STOP` signal handler failed.
    #[error("failed to install {signal} handler: {details}")]
    SignalHandler {
        signal: &'static str,
        details: String,
    },
}

impl WatchdogError {
    /// The process exit code mandated by spec §6 for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Semaphore { .. } => 1,
            Self::Fork { .. } => 2,
            Self::TaskEngine { .. } => 3,
            Self::ThreadSpawn { .. } => 4,
            Self::SignalHandler { .. } => 5,
        }
    }
}
