//! Error taxonomy for the cluster-client boundary.
//!
//! Everywhere else in the engine plain `anyhow::Result` is used, matching
//! the teacher's style (`anyhow` is used exhaustively across
//! `resources`/`controllers`). `ClusterError` exists only so the Reconciler
//! can classify a failed cluster operation into one of a few outcomes:
//! swallow (not-found), retry-then-requeue (conflict), requeue (transient),
//! or propagate (anything else, which anyhow already handles).

use std::fmt;

#[derive(Debug)]
pub enum ClusterError {
    /// The object no longer exists; treated as nothing to do for this key.
    NotFound,
    /// Optimistic-concurrency conflict: the object changed since it was
    /// read. Retried up to the configured bound, then requeued.
    Conflict,
    /// Network/timeout failure where no state mutation was committed.
    /// Requeued with backoff.
    Transient(anyhow::Error),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::NotFound => write!(f, "object not found"),
            ClusterError::Conflict => write!(f, "resource version conflict"),
            ClusterError::Transient(e) => write!(f, "transient cluster error: {e}"),
        }
    }
}

impl std::error::Error for ClusterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClusterError::Transient(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict)
    }
}
