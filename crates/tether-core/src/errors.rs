//! Warning and error types for the replicated graph.
//!
//! Expected domain violations (missing endpoint, disconnecting removal,
//! duplicate add, operating on a removed id) are never panics: mutating
//! operations return `Err(GraphWarning)` and leave the replica untouched.
//! An `Ok(())` from a mutating call means the operation was applied and
//! observers should be notified.

/// Result alias for graph mutations.
pub type GraphResult<T> = Result<T, GraphWarning>;

/// Structured warning attached to a rejected (no-op) graph operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphWarning {
    /// An operation referenced an element that does not exist, or violated
    /// a structural precondition (duplicate add, self-loop, non-empty seed).
    #[error("invalid reference in {op}: {reason}")]
    InvalidReference { op: &'static str, reason: String },

    /// Applying the operation would split the graph into disconnected parts.
    #[error("{op} rejected: removing {subject} would disconnect the graph")]
    ConnectivityViolation { op: &'static str, subject: String },

    /// The operation targeted an element that was already removed.
    #[error("{op} targets removed element {id}")]
    AlreadyRemoved { op: &'static str, id: String },
}

/// Failure while encoding or decoding a sync delta payload.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed delta payload: {0}")]
    Codec(#[from] serde_json::Error),
}
