//! Telemetry Core Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: probe invocation, cache
//! reads, subscription management and process-level infrastructure.

use std::fmt;
use std::time::Duration;

use config::ConfigError;
use serde::Serialize;
use tokio::task::JoinError;

use crate::ResourceKey;
use crate::SubscriptionState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A probe failed or missed its deadline
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Point read could not be served from cache or a forced refresh
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Subscription lifecycle violations
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Infrastructure-level failures (tasks, signals, transport, encoding)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// Deadline exceeded before the probe returned
    #[error("Probe for {key} timed out after {duration:?}")]
    Timeout { key: ResourceKey, duration: Duration },

    /// Subsystem reported a failure
    #[error("Probe for {key} failed: {reason}")]
    Failed { key: ResourceKey, reason: String },

    /// Probe was cancelled by shutdown
    #[error("Probe for {key} was cancelled")]
    Cancelled { key: ResourceKey },

    /// No probe registered for the key
    #[error("No probe registered for {key}")]
    NotRegistered { key: ResourceKey },
}

impl ProbeError {
    pub fn failed(
        key: &ResourceKey,
        reason: impl Into<String>,
    ) -> Self {
        ProbeError::Failed {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        match self {
            ProbeError::Timeout { key, .. }
            | ProbeError::Failed { key, .. }
            | ProbeError::Cancelled { key }
            | ProbeError::NotRegistered { key } => key,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Timeout { .. } => FailureKind::Timeout,
            ProbeError::Failed { .. } => FailureKind::Failed,
            ProbeError::Cancelled { .. } => FailureKind::Cancelled,
            ProbeError::NotRegistered { .. } => FailureKind::NotRegistered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Failed,
    Cancelled,
    NotRegistered,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Failed => "failed",
            FailureKind::Cancelled => "cancelled",
            FailureKind::NotRegistered => "not_registered",
        }
    }
}

/// Compact record of the last probe failure, stored on a cache entry and
/// exposed to readers as `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProbeError> for ProbeFailure {
    fn from(e: &ProbeError) -> Self {
        ProbeFailure {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// No servable value: the key was never fetched successfully, or the
    /// forced refresh past hard expiry also failed.
    #[error("Cache miss for {key}")]
    Miss {
        key: ResourceKey,
        last_error: Option<ProbeFailure>,
    },

    /// Forced refresh did not complete within the query timeout. Carries the
    /// entry's last recorded failure, if any.
    #[error("Refresh of {key} did not complete within {duration:?}")]
    RefreshTimeout {
        key: ResourceKey,
        duration: Duration,
        last_error: Option<ProbeFailure>,
    },
}

impl CacheError {
    pub fn last_error(&self) -> Option<&ProbeFailure> {
        match self {
            CacheError::Miss { last_error, .. } | CacheError::RefreshTimeout { last_error, .. } => {
                last_error.as_ref()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Consumer could not keep up and was disconnected by policy
    #[error("Subscriber {id} overflowed its delivery buffer")]
    Overflow { id: u64 },

    #[error("Subscription {id} not found")]
    NotFound { id: u64 },

    #[error("Illegal subscription transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SubscriptionState,
        to: SubscriptionState,
    },

    #[error("Subscription {id} is closed")]
    Closed { id: u64 },

    #[error("Subscription requires at least one topic")]
    EmptyTopics,
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Encode(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}
