//! Error types for plan construction and analysis.
//!
//! Two classes of failures exist in this crate. Violated invariants
//! (unknown operator tags, register exhaustion, double-attached subquery
//! roots) are surfaced as [`PlanError`] values and abort the operation
//! that detected them. Expected outcomes of graph edits, such as a
//! dependency that was not found during replace/remove, are reported as
//! booleans by the kernel itself and never reach this type.

use thiserror::Error;

/// Errors that can occur while building, analyzing or (de)serializing
/// an execution plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// An operator type name outside the closed catalog was encountered
    /// during deserialization.
    #[error("unknown execution node type: {0}")]
    UnknownNodeType(String),

    /// An operator type tag outside the closed catalog was looked up.
    #[error("invalid execution node type tag: {0}")]
    InvalidTypeTag(u32),

    /// A node id was registered twice in the same plan.
    #[error("duplicate node id {0} in plan")]
    DuplicateNodeId(u64),

    /// A serialized plan referenced a collection the catalog does not know.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A serialized plan referenced an index the catalog does not know.
    #[error("unknown index {index} on collection {collection}")]
    UnknownIndex {
        /// The index identifier that could not be resolved.
        index: String,
        /// The collection the index was looked up on.
        collection: String,
    },

    /// A subquery node already carries a nested plan root.
    #[error("subquery root already attached to node {0}")]
    SubqueryAlreadySet(u64),

    /// A subquery node has no nested plan root attached yet.
    #[error("subquery node {0} has no nested plan root")]
    SubqueryMissing(u64),

    /// Register planning ran out of assignable register slots.
    #[error("query plan needs more than {limit} registers")]
    TooManyRegisters {
        /// The fixed ceiling on assignable register ids.
        limit: u32,
    },

    /// The plan has no root node to start an analysis pass from.
    #[error("plan has no root node")]
    MissingRoot,

    /// A structural record could not be encoded or decoded.
    #[error("plan serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlanError::UnknownNodeType("FancyJoinNode".to_string());
        assert!(err.to_string().contains("FancyJoinNode"));

        let err = PlanError::TooManyRegisters { limit: 1000 };
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn unknown_index_display() {
        let err = PlanError::UnknownIndex {
            index: "idx_age".to_string(),
            collection: "users".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("idx_age"));
        assert!(text.contains("users"));
    }
}
