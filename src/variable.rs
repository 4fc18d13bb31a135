//! Variables flowing through an execution plan.
//!
//! Variables are minted by the query's symbol table and only referenced
//! by plan nodes. The [`VariableRegistry`] is the owner of record; nodes
//! hold shared handles so that clones of a plan keep pointing at the
//! same identities.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique identifier for a variable within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(u64);

impl VariableId {
    /// Create a new `VariableId` from a raw u64 value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for VariableId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named value slot produced and consumed by plan nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    id: VariableId,
    name: String,
}

impl Variable {
    /// Creates a variable with an explicit id.
    ///
    /// Normally variables come out of a [`VariableRegistry`]; this is the
    /// escape hatch for tests and for plan import.
    #[must_use]
    pub fn new(id: VariableId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// The variable's query-unique id.
    #[must_use]
    pub const fn id(&self) -> VariableId {
        self.id
    }

    /// The variable's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Owner of record for the variables of one query.
///
/// Resolves stable ids to display names and guarantees that each id maps
/// to exactly one [`Variable`] instance, so identity comparisons on the
/// shared handles are meaningful.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: HashMap<VariableId, Arc<Variable>>,
    next_id: u64,
}

impl VariableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh variable with the next free id.
    pub fn fresh(&mut self, name: impl Into<String>) -> Arc<Variable> {
        let id = VariableId::new(self.next_id);
        self.next_id += 1;
        let var = Arc::new(Variable::new(id, name));
        self.variables.insert(id, Arc::clone(&var));
        var
    }

    /// Looks up a variable by id.
    #[must_use]
    pub fn get(&self, id: VariableId) -> Option<Arc<Variable>> {
        self.variables.get(&id).cloned()
    }

    /// Resolves an id to its registered variable, registering `(id, name)`
    /// if unseen. Used when reconstructing a plan from its serialized form.
    pub fn get_or_create(&mut self, id: VariableId, name: &str) -> Arc<Variable> {
        if let Some(var) = self.variables.get(&id) {
            return Arc::clone(var);
        }
        let var = Arc::new(Variable::new(id, name));
        self.variables.insert(id, Arc::clone(&var));
        if id.as_u64() >= self.next_id {
            self.next_id = id.as_u64() + 1;
        }
        var
    }

    /// Number of registered variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_variables_get_distinct_ids() {
        let mut registry = VariableRegistry::new();
        let a = registry.fresh("a");
        let b = registry.fresh("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut registry = VariableRegistry::new();
        let first = registry.get_or_create(VariableId::new(7), "doc");
        let second = registry.get_or_create(VariableId::new(7), "doc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_or_create_advances_fresh_ids() {
        let mut registry = VariableRegistry::new();
        registry.get_or_create(VariableId::new(5), "imported");
        let next = registry.fresh("minted");
        assert!(next.id().as_u64() > 5);
    }
}
