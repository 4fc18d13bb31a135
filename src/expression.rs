//! Opaque expression descriptors.
//!
//! The expression evaluator lives outside this crate. Plan nodes only
//! need three facts about an expression: which variables it reads,
//! whether evaluating it can raise a runtime fault, and whether it is
//! reducible to a plain attribute access (which makes a sort criterion
//! comparable across plans). An [`Expression`] carries exactly those
//! facts plus a display form; the core never evaluates it.

use std::fmt;
use std::sync::Arc;

use crate::variable::Variable;

/// Descriptor of an expression owned by the external evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    variables: Vec<Arc<Variable>>,
    can_throw: bool,
    attribute_path: Option<String>,
}

impl Expression {
    /// Creates a descriptor for an arbitrary expression.
    #[must_use]
    pub fn new(source: impl Into<String>, variables: Vec<Arc<Variable>>, can_throw: bool) -> Self {
        Self { source: source.into(), variables, can_throw, attribute_path: None }
    }

    /// Creates a descriptor for a plain attribute access like `doc.age`.
    ///
    /// Attribute accesses never throw and read exactly one variable.
    #[must_use]
    pub fn attribute_access(variable: Arc<Variable>, path: impl Into<String>) -> Self {
        let path = path.into();
        let source = format!("{}.{path}", variable.name());
        Self {
            source,
            variables: vec![variable],
            can_throw: false,
            attribute_path: Some(path),
        }
    }

    /// Marks the expression as reducible to the given attribute path.
    #[must_use]
    pub fn with_attribute_path(mut self, path: impl Into<String>) -> Self {
        self.attribute_path = Some(path.into());
        self
    }

    /// The display form of the expression.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The free variables the expression reads.
    #[must_use]
    pub fn variables(&self) -> &[Arc<Variable>] {
        &self.variables
    }

    /// Whether evaluating the expression can raise a runtime fault.
    #[must_use]
    pub const fn can_throw(&self) -> bool {
        self.can_throw
    }

    /// The attribute path this expression reduces to, if it is a plain
    /// attribute access on a single variable.
    #[must_use]
    pub fn attribute_path(&self) -> Option<&str> {
        self.attribute_path.as_deref()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableRegistry;

    #[test]
    fn attribute_access_reads_one_variable() {
        let mut registry = VariableRegistry::new();
        let doc = registry.fresh("doc");
        let expr = Expression::attribute_access(Arc::clone(&doc), "age");

        assert_eq!(expr.source(), "doc.age");
        assert_eq!(expr.variables().len(), 1);
        assert_eq!(expr.attribute_path(), Some("age"));
        assert!(!expr.can_throw());
    }

    #[test]
    fn general_expression_has_no_path() {
        let mut registry = VariableRegistry::new();
        let a = registry.fresh("a");
        let b = registry.fresh("b");
        let expr = Expression::new("a / b", vec![a, b], true);

        assert!(expr.attribute_path().is_none());
        assert!(expr.can_throw());
    }
}
