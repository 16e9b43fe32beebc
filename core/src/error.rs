//! Error types for scoped drive operations.

use thiserror::Error;

use crate::node::NodeId;

/// Top-level error type for scoped drive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Target or destination lies outside the sandbox root.
    #[error("not allowed: {id} is outside the sandbox")]
    ScopeViolation { id: NodeId },

    /// The store has no node with this id.
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// Network or quota failure reported by the store.
    #[error("upstream store error: {0}")]
    Upstream(String),

    /// More than one folder carries the configured root name.
    #[error("ambiguous sandbox root '{name}': {} candidates", .candidates.len())]
    AmbiguousRoot { name: String, candidates: Vec<NodeId> },

    /// The sandbox root cannot be renamed, moved or removed.
    #[error("sandbox root {0} cannot be modified")]
    RootProtected(NodeId),

    /// The move would put a node under itself or one of its descendants.
    #[error("cannot move {id} under {new_parent}: it would become its own ancestor")]
    CyclicMove { id: NodeId, new_parent: NodeId },

    /// The node exists but has no text representation.
    #[error("node {id} of type {mime_type} has no text content")]
    NotText { id: NodeId, mime_type: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential load, persist or exchange failed.
    #[error("credential error: {0}")]
    Credentials(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode persisted state.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Short reason used in itemised batch reports.
    pub fn reason(&self) -> String {
        match self {
            Error::ScopeViolation { .. } => "not allowed".to_string(),
            Error::NotFound(_) => "not found".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns true if the store reported the node as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias for scoped drive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_violation_reason_is_not_allowed() {
        let err = Error::ScopeViolation {
            id: NodeId::from("x"),
        };
        assert_eq!(err.reason(), "not allowed");
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_is_distinct_from_scope_violation() {
        let err = Error::NotFound(NodeId::from("gone"));
        assert_eq!(err.reason(), "not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn ambiguous_root_counts_candidates() {
        let err = Error::AmbiguousRoot {
            name: "sandbox".to_string(),
            candidates: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert_eq!(err.to_string(), "ambiguous sandbox root 'sandbox': 2 candidates");
    }
}
