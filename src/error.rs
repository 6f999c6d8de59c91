//! Error types for graph construction and analysis

use thiserror::Error;

/// Errors raised by the graph store adapter, the builder and the analyzers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The store (or its backing database) could not be reached at startup
    #[error("Connection to graph store failed: {0}")]
    Connection(String),

    /// A single store operation failed
    #[error("Graph operation '{op}' failed: {detail}")]
    Operation { op: String, detail: String },

    /// A caller-supplied parameter was malformed
    #[error("Invalid parameter: {0}")]
    Validation(String),

    /// The query budget ran out before the operation finished
    #[error("{op} cancelled: {reason}")]
    Cancelled { op: String, reason: String },

    /// The snapshot document is not usable at all
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),
}

impl GraphError {
    pub fn operation(op: impl Into<String>, detail: impl ToString) -> Self {
        GraphError::Operation {
            op: op.into(),
            detail: detail.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GraphError::Validation(msg.into())
    }

    /// Returns a closure for `map_err` that tags a store error with its operation
    pub fn op<E: std::fmt::Display>(op: &'static str) -> impl Fn(E) -> GraphError {
        move |e| GraphError::operation(op, e)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GraphError::Cancelled { .. })
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
