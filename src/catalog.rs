//! Collection and index descriptors.
//!
//! The metadata catalog is an external collaborator; this module defines
//! the read-only descriptors that plan nodes reference and the
//! [`QueryResources`] bundle that plan import resolves names against.
//! Nodes hold shared handles and never mutate a descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::variable::VariableRegistry;

/// The kind of an index, which determines what scans it can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Primary key index, point lookups only.
    Primary,
    /// Hash index, point lookups only.
    Hash,
    /// Skiplist index, ordered scans over its field sequence.
    Skiplist,
}

/// Descriptor of a secondary index on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    id: String,
    kind: IndexKind,
    fields: Vec<String>,
    unique: bool,
}

impl Index {
    /// Creates an index descriptor.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: IndexKind,
        fields: Vec<String>,
        unique: bool,
    ) -> Self {
        Self { id: id.into(), kind, fields, unique }
    }

    /// The catalog-wide identifier of the index.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The index kind.
    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    /// The ordered attribute sequence the index is built over.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the index can serve an ordered (range) scan.
    #[must_use]
    pub const fn supports_ordered_scan(&self) -> bool {
        matches!(self.kind, IndexKind::Skiplist)
    }
}

/// Descriptor of a document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    name: String,
    document_count: u64,
    indexes: Vec<Arc<Index>>,
}

impl Collection {
    /// Creates a collection descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, document_count: u64) -> Self {
        Self { name: name.into(), document_count, indexes: Vec::new() }
    }

    /// Adds an index to the descriptor.
    #[must_use]
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(Arc::new(index));
        self
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The estimated number of documents in the collection.
    #[must_use]
    pub const fn document_count(&self) -> u64 {
        self.document_count
    }

    /// The indexes defined on the collection.
    #[must_use]
    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    /// Looks up an index on this collection by id.
    #[must_use]
    pub fn index(&self, id: &str) -> Option<Arc<Index>> {
        self.indexes.iter().find(|idx| idx.id() == id).cloned()
    }
}

/// Opaque options payload carried by modification nodes.
///
/// Interpreted only by the execution runtime; the plan core stores and
/// round-trips it verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModificationOptions(pub serde_json::Value);

impl ModificationOptions {
    /// Creates an empty options payload.
    #[must_use]
    pub fn none() -> Self {
        Self(serde_json::Value::Null)
    }
}

/// The external resources one query's plan is resolved against: the
/// symbol table and the collection catalog.
#[derive(Debug, Clone, Default)]
pub struct QueryResources {
    /// Variable symbol table for the query.
    pub variables: VariableRegistry,
    collections: HashMap<String, Arc<Collection>>,
}

impl QueryResources {
    /// Creates an empty resource bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection descriptor and returns its shared handle.
    pub fn add_collection(&mut self, collection: Collection) -> Arc<Collection> {
        let handle = Arc::new(collection);
        self.collections.insert(handle.name().to_string(), Arc::clone(&handle));
        handle
    }

    /// Resolves a collection by name.
    pub fn collection(&self, name: &str) -> PlanResult<Arc<Collection>> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| PlanError::UnknownCollection(name.to_string()))
    }

    /// Resolves an index by id on a named collection.
    pub fn index(&self, collection: &str, id: &str) -> PlanResult<Arc<Index>> {
        let coll = self.collection(collection)?;
        coll.index(id).ok_or_else(|| PlanError::UnknownIndex {
            index: id.to_string(),
            collection: collection.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_index_lookup() {
        let coll = Collection::new("users", 1000).with_index(Index::new(
            "idx_age",
            IndexKind::Skiplist,
            vec!["age".to_string()],
            false,
        ));

        assert!(coll.index("idx_age").is_some());
        assert!(coll.index("missing").is_none());
        assert!(coll.index("idx_age").unwrap().supports_ordered_scan());
    }

    #[test]
    fn resources_resolve_by_name() {
        let mut resources = QueryResources::new();
        resources.add_collection(Collection::new("users", 10));

        assert!(resources.collection("users").is_ok());
        assert!(matches!(
            resources.collection("ghosts"),
            Err(PlanError::UnknownCollection(name)) if name == "ghosts"
        ));
    }

    #[test]
    fn missing_index_is_reported() {
        let mut resources = QueryResources::new();
        resources.add_collection(Collection::new("users", 10));

        assert!(matches!(
            resources.index("users", "idx_age"),
            Err(PlanError::UnknownIndex { .. })
        ));
    }
}
