use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Scheduler-wide error.
///
/// Only caller mistakes surface here. Failures inside callbacks are contained
/// at the dispatch boundary and never become a `SchedulerError`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No callback is known under the requested name.
    #[error("invalid callback: no factory registered for '{name}'")]
    InvalidCallback { name: String },

    /// A callback factory refused to build its callback.
    #[error("callback factory '{name}' failed: {message}")]
    Factory { name: String, message: String },

    #[error("failed to read config {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Generic error (fallback).
    #[error("{0}")]
    Other(String),
}

impl SchedulerError {
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Why a single callback invocation failed.
///
/// Produced at the dispatch boundary, logged with the callback identity, then dropped.
#[derive(Debug, Error)]
pub enum CallbackFailure {
    #[error("returned error: {0:#}")]
    Error(anyhow::Error),

    #[error("panicked: {0}")]
    Panic(String),
}
