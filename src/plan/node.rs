//! Execution node operator catalog.
//!
//! This module defines the closed set of operator kinds a plan can
//! contain: the [`NodeType`] tag enum with its total tag/name tables,
//! and the [`NodeKind`] payload enum with one variant per operator.
//! Structural concerns (edges, cost cache, traversal) live in the plan
//! kernel; this module only knows what each operator *is*: its
//! parameters, the variables it reads and produces, and whether it can
//! raise a runtime fault.

// Allow matching arms with identical bodies - intentional for grouping
#![allow(clippy::match_same_arms)]

use std::fmt;
use std::sync::Arc;

use crate::catalog::{Collection, Index, ModificationOptions};
use crate::error::{PlanError, PlanResult};
use crate::expression::Expression;
use crate::plan::graph::ExecutionNodeId;
use crate::variable::Variable;

/// The closed set of operator kinds, with the fixed wire tags used by
/// the structural plan format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NodeType {
    /// Produces exactly one empty row; the leaf of every plan.
    Singleton = 1,
    /// Full scan over a collection.
    EnumerateCollection = 2,
    /// Range scan over an index.
    IndexRange = 3,
    /// Enumeration over a list value.
    EnumerateList = 4,
    /// Drops rows whose condition variable is false.
    Filter = 5,
    /// Offset/limit window over its input.
    Limit = 6,
    /// Evaluates an expression into a new variable.
    Calculation = 7,
    /// Runs a nested plan per input row.
    Subquery = 8,
    /// Sorts its input.
    Sort = 9,
    /// Grouping/aggregation.
    Aggregate = 10,
    /// Fans rows out to multiple shards.
    Scatter = 11,
    /// Merges rows from multiple shards, optionally merge-sorting.
    Gather = 12,
    /// Boundary to a plan fragment running on another server.
    Remote = 13,
    /// Document insert.
    Insert = 14,
    /// Document removal.
    Remove = 15,
    /// Document replacement.
    Replace = 16,
    /// Partial document update.
    Update = 17,
    /// Hands final rows to the caller; the root of most plans.
    Return = 18,
    /// Produces no rows at all.
    NoResults = 19,
    /// Routes each row to the shard responsible for it.
    Distribute = 20,
}

impl NodeType {
    /// All operator kinds, in tag order.
    pub const ALL: [NodeType; 20] = [
        NodeType::Singleton,
        NodeType::EnumerateCollection,
        NodeType::IndexRange,
        NodeType::EnumerateList,
        NodeType::Filter,
        NodeType::Limit,
        NodeType::Calculation,
        NodeType::Subquery,
        NodeType::Sort,
        NodeType::Aggregate,
        NodeType::Scatter,
        NodeType::Gather,
        NodeType::Remote,
        NodeType::Insert,
        NodeType::Remove,
        NodeType::Replace,
        NodeType::Update,
        NodeType::Return,
        NodeType::NoResults,
        NodeType::Distribute,
    ];

    /// The numeric wire tag of this operator kind.
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Validates a numeric tag against the closed catalog.
    pub fn from_tag(tag: u32) -> PlanResult<Self> {
        match tag {
            1 => Ok(NodeType::Singleton),
            2 => Ok(NodeType::EnumerateCollection),
            3 => Ok(NodeType::IndexRange),
            4 => Ok(NodeType::EnumerateList),
            5 => Ok(NodeType::Filter),
            6 => Ok(NodeType::Limit),
            7 => Ok(NodeType::Calculation),
            8 => Ok(NodeType::Subquery),
            9 => Ok(NodeType::Sort),
            10 => Ok(NodeType::Aggregate),
            11 => Ok(NodeType::Scatter),
            12 => Ok(NodeType::Gather),
            13 => Ok(NodeType::Remote),
            14 => Ok(NodeType::Insert),
            15 => Ok(NodeType::Remove),
            16 => Ok(NodeType::Replace),
            17 => Ok(NodeType::Update),
            18 => Ok(NodeType::Return),
            19 => Ok(NodeType::NoResults),
            20 => Ok(NodeType::Distribute),
            other => Err(PlanError::InvalidTypeTag(other)),
        }
    }

    /// The fixed display name of this operator kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            NodeType::Singleton => "SingletonNode",
            NodeType::EnumerateCollection => "EnumerateCollectionNode",
            NodeType::IndexRange => "IndexRangeNode",
            NodeType::EnumerateList => "EnumerateListNode",
            NodeType::Filter => "FilterNode",
            NodeType::Limit => "LimitNode",
            NodeType::Calculation => "CalculationNode",
            NodeType::Subquery => "SubqueryNode",
            NodeType::Sort => "SortNode",
            NodeType::Aggregate => "AggregateNode",
            NodeType::Scatter => "ScatterNode",
            NodeType::Gather => "GatherNode",
            NodeType::Remote => "RemoteNode",
            NodeType::Insert => "InsertNode",
            NodeType::Remove => "RemoveNode",
            NodeType::Replace => "ReplaceNode",
            NodeType::Update => "UpdateNode",
            NodeType::Return => "ReturnNode",
            NodeType::NoResults => "NoResultsNode",
            NodeType::Distribute => "DistributeNode",
        }
    }

    /// The inverse of [`NodeType::name`].
    pub fn from_name(name: &str) -> PlanResult<Self> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| PlanError::UnknownNodeType(name.to_string()))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sort criterion: a variable and its direction
/// (true = ascending, false = descending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortElement {
    /// The variable holding the sort key.
    pub variable: Arc<Variable>,
    /// Ascending order when true.
    pub ascending: bool,
}

impl SortElement {
    /// Creates an ascending sort criterion.
    #[must_use]
    pub fn asc(variable: Arc<Variable>) -> Self {
        Self { variable, ascending: true }
    }

    /// Creates a descending sort criterion.
    #[must_use]
    pub fn desc(variable: Arc<Variable>) -> Self {
        Self { variable, ascending: false }
    }
}

/// One end of an attribute range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    /// The bound value.
    pub value: BoundValue,
    /// Whether the bound itself is part of the range.
    pub inclusive: bool,
}

/// A range bound value: a literal known at planning time, or a variable
/// produced upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// A constant bound.
    Literal(serde_json::Value),
    /// A bound read from a variable at runtime.
    Variable(Arc<Variable>),
}

/// A range of values for one attribute of an index.
///
/// The ranges of an [`IndexRangeNode`] correspond positionally to a
/// prefix of the index's field sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRange {
    /// The attribute the range constrains.
    pub attribute: String,
    /// Lower bound, if any.
    pub low: Option<RangeBound>,
    /// Upper bound, if any.
    pub high: Option<RangeBound>,
}

impl AttributeRange {
    /// Creates an equality range (`attribute == value`).
    #[must_use]
    pub fn equality(attribute: impl Into<String>, value: BoundValue) -> Self {
        let low = RangeBound { value: value.clone(), inclusive: true };
        let high = RangeBound { value, inclusive: true };
        Self { attribute: attribute.into(), low: Some(low), high: Some(high) }
    }

    /// Whether the range pins the attribute to a single value.
    #[must_use]
    pub fn is_equality(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(low), Some(high)) => {
                low.inclusive && high.inclusive && low.value == high.value
            }
            _ => false,
        }
    }

    /// Whether the range is bounded on at least one side.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.low.is_some() || self.high.is_some()
    }

    /// The variables read by the range bounds.
    #[must_use]
    pub fn variables(&self) -> Vec<Arc<Variable>> {
        let mut vars = Vec::new();
        for bound in [&self.low, &self.high].into_iter().flatten() {
            if let BoundValue::Variable(var) = &bound.value {
                vars.push(Arc::clone(var));
            }
        }
        vars
    }
}

// ========== Operator payloads ==========

/// Full collection scan producing one row per document.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerateCollectionNode {
    /// The collection to scan.
    pub collection: Arc<Collection>,
    /// Variable receiving the current document.
    pub out_variable: Arc<Variable>,
}

/// Index range scan producing one row per matching document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRangeNode {
    /// The collection the index belongs to.
    pub collection: Arc<Collection>,
    /// The index to scan.
    pub index: Arc<Index>,
    /// Variable receiving the current document.
    pub out_variable: Arc<Variable>,
    /// Per-field ranges, positionally matching a prefix of the index fields.
    pub ranges: Vec<AttributeRange>,
    /// Whether to scan the index in reverse order.
    pub reverse: bool,
}

/// Enumeration over a list value held in a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerateListNode {
    /// Variable holding the list.
    pub in_variable: Arc<Variable>,
    /// Variable receiving the current element.
    pub out_variable: Arc<Variable>,
}

/// Filter on a previously calculated boolean variable.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    /// Variable holding the condition result.
    pub in_variable: Arc<Variable>,
}

/// Offset/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitNode {
    /// Number of rows to skip.
    pub offset: u64,
    /// Maximum number of rows to pass on.
    pub limit: u64,
}

/// Expression evaluation into a fresh variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationNode {
    /// The expression to evaluate per row.
    pub expression: Expression,
    /// Variable receiving the result.
    pub out_variable: Arc<Variable>,
}

/// Nested plan executed per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryNode {
    subquery: Option<ExecutionNodeId>,
    /// Variable receiving the subquery's result list.
    pub out_variable: Arc<Variable>,
}

impl SubqueryNode {
    /// Creates a subquery payload with its nested plan root attached.
    #[must_use]
    pub const fn new(subquery: ExecutionNodeId, out_variable: Arc<Variable>) -> Self {
        Self { subquery: Some(subquery), out_variable }
    }

    /// Creates a subquery payload whose nested root is attached later.
    #[must_use]
    pub const fn detached(out_variable: Arc<Variable>) -> Self {
        Self { subquery: None, out_variable }
    }

    /// The nested plan root, if attached.
    #[must_use]
    pub const fn subquery(&self) -> Option<ExecutionNodeId> {
        self.subquery
    }

    /// Attaches the nested plan root. Overwriting an existing root is a
    /// violated invariant and is refused.
    pub fn set_subquery(
        &mut self,
        node_id: u64,
        subquery: ExecutionNodeId,
    ) -> PlanResult<()> {
        if self.subquery.is_some() {
            return Err(PlanError::SubqueryAlreadySet(node_id));
        }
        self.subquery = Some(subquery);
        Ok(())
    }
}

/// Sort over one or more criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    /// Sort criteria, most significant first.
    pub elements: Vec<SortElement>,
    /// Whether equal rows keep their input order.
    pub stable: bool,
}

/// Grouping/aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    /// Group variables as (produced, grouped-on) pairs.
    pub groups: Vec<(Arc<Variable>, Arc<Variable>)>,
    /// Optional collector variable receiving each full group.
    pub out_variable: Option<Arc<Variable>>,
    /// Variables captured into the collector groups; only consumed when
    /// `out_variable` is present.
    pub captured: Vec<Arc<Variable>>,
}

/// Final projection of rows to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnNode {
    /// Variable holding the value to return.
    pub in_variable: Arc<Variable>,
}

/// Document insert into a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertNode {
    /// Target collection.
    pub collection: Arc<Collection>,
    /// Runtime-interpreted options.
    pub options: ModificationOptions,
    /// Variable holding the document to insert.
    pub in_variable: Arc<Variable>,
    /// Optional variable receiving the written document.
    pub out_variable: Option<Arc<Variable>>,
}

/// Document removal from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNode {
    /// Target collection.
    pub collection: Arc<Collection>,
    /// Runtime-interpreted options.
    pub options: ModificationOptions,
    /// Variable holding the document or key to remove.
    pub in_variable: Arc<Variable>,
    /// Optional variable receiving the removed document.
    pub out_variable: Option<Arc<Variable>>,
}

/// Partial document update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNode {
    /// Target collection.
    pub collection: Arc<Collection>,
    /// Runtime-interpreted options.
    pub options: ModificationOptions,
    /// Variable holding the patch document.
    pub in_doc_variable: Arc<Variable>,
    /// Optional variable holding the key when it is not part of the patch.
    pub in_key_variable: Option<Arc<Variable>>,
    /// Optional variable receiving the written document.
    pub out_variable: Option<Arc<Variable>>,
}

/// Full document replacement. Same shape as [`UpdateNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceNode {
    /// Target collection.
    pub collection: Arc<Collection>,
    /// Runtime-interpreted options.
    pub options: ModificationOptions,
    /// Variable holding the replacement document.
    pub in_doc_variable: Arc<Variable>,
    /// Optional variable holding the key when it is not part of the document.
    pub in_key_variable: Option<Arc<Variable>>,
    /// Optional variable receiving the written document.
    pub out_variable: Option<Arc<Variable>>,
}

/// Boundary to a plan fragment executing on another server.
///
/// Addressing fields may be empty at construction and filled in once the
/// fragment has been placed.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNode {
    /// Collection the remote fragment operates on, if any.
    pub collection: Option<Arc<Collection>>,
    /// Target server, e.g. `shard:S1000` or `server:claus`.
    pub server: String,
    /// Our own identity as seen by the peer; the shard id on a data
    /// server, empty on the coordinator.
    pub own_name: String,
    /// Id of the query registered on the peer.
    pub query_id: String,
}

/// Fan-out of rows to all shards of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterNode {
    /// The sharded collection.
    pub collection: Arc<Collection>,
}

/// Routing of each row to the single shard responsible for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributeNode {
    /// The sharded collection.
    pub collection: Arc<Collection>,
}

/// Merge of rows coming back from shards, optionally keeping a sort
/// order established on each shard.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherNode {
    /// The sharded collection.
    pub collection: Arc<Collection>,
    /// Merge-sort criteria; empty for unordered gathering.
    pub elements: Vec<SortElement>,
}

/// Variant payload of an execution node.
///
/// The catalog is closed on purpose: dispatch on the kind is exhaustive
/// and adding an operator is a compile-visible change everywhere it
/// matters (cost, serialization, liveness).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// See [`NodeType::Singleton`].
    Singleton,
    /// See [`NodeType::EnumerateCollection`].
    EnumerateCollection(EnumerateCollectionNode),
    /// See [`NodeType::IndexRange`].
    IndexRange(Box<IndexRangeNode>),
    /// See [`NodeType::EnumerateList`].
    EnumerateList(EnumerateListNode),
    /// See [`NodeType::Filter`].
    Filter(FilterNode),
    /// See [`NodeType::Limit`].
    Limit(LimitNode),
    /// See [`NodeType::Calculation`].
    Calculation(CalculationNode),
    /// See [`NodeType::Subquery`].
    Subquery(SubqueryNode),
    /// See [`NodeType::Sort`].
    Sort(SortNode),
    /// See [`NodeType::Aggregate`].
    Aggregate(AggregateNode),
    /// See [`NodeType::Scatter`].
    Scatter(ScatterNode),
    /// See [`NodeType::Gather`].
    Gather(GatherNode),
    /// See [`NodeType::Remote`].
    Remote(RemoteNode),
    /// See [`NodeType::Insert`].
    Insert(InsertNode),
    /// See [`NodeType::Remove`].
    Remove(RemoveNode),
    /// See [`NodeType::Replace`].
    Replace(ReplaceNode),
    /// See [`NodeType::Update`].
    Update(UpdateNode),
    /// See [`NodeType::Return`].
    Return(ReturnNode),
    /// See [`NodeType::NoResults`].
    NoResults,
    /// See [`NodeType::Distribute`].
    Distribute(DistributeNode),
}

impl NodeKind {
    /// The operator kind tag of this payload.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Singleton => NodeType::Singleton,
            NodeKind::EnumerateCollection(_) => NodeType::EnumerateCollection,
            NodeKind::IndexRange(_) => NodeType::IndexRange,
            NodeKind::EnumerateList(_) => NodeType::EnumerateList,
            NodeKind::Filter(_) => NodeType::Filter,
            NodeKind::Limit(_) => NodeType::Limit,
            NodeKind::Calculation(_) => NodeType::Calculation,
            NodeKind::Subquery(_) => NodeType::Subquery,
            NodeKind::Sort(_) => NodeType::Sort,
            NodeKind::Aggregate(_) => NodeType::Aggregate,
            NodeKind::Scatter(_) => NodeType::Scatter,
            NodeKind::Gather(_) => NodeType::Gather,
            NodeKind::Remote(_) => NodeType::Remote,
            NodeKind::Insert(_) => NodeType::Insert,
            NodeKind::Remove(_) => NodeType::Remove,
            NodeKind::Replace(_) => NodeType::Replace,
            NodeKind::Update(_) => NodeType::Update,
            NodeKind::Return(_) => NodeType::Return,
            NodeKind::NoResults => NodeType::NoResults,
            NodeKind::Distribute(_) => NodeType::Distribute,
        }
    }

    /// The variables this operator itself reads per row.
    ///
    /// Subquery nodes are the one exception handled at the plan level:
    /// their used set is the free-variable set of the nested plan, which
    /// only the kernel can compute (see
    /// [`ExecutionPlan::variables_used_here`]).
    ///
    /// [`ExecutionPlan::variables_used_here`]: crate::plan::graph::ExecutionPlan::variables_used_here
    #[must_use]
    pub fn variables_used_here(&self) -> Vec<Arc<Variable>> {
        match self {
            NodeKind::Singleton
            | NodeKind::Limit(_)
            | NodeKind::NoResults
            | NodeKind::Remote(_)
            | NodeKind::Scatter(_)
            | NodeKind::Distribute(_)
            | NodeKind::Subquery(_) => Vec::new(),
            NodeKind::EnumerateCollection(_) => Vec::new(),
            NodeKind::IndexRange(node) => {
                node.ranges.iter().flat_map(AttributeRange::variables).collect()
            }
            NodeKind::EnumerateList(node) => vec![Arc::clone(&node.in_variable)],
            NodeKind::Filter(node) => vec![Arc::clone(&node.in_variable)],
            NodeKind::Calculation(node) => node.expression.variables().to_vec(),
            NodeKind::Sort(node) => {
                node.elements.iter().map(|e| Arc::clone(&e.variable)).collect()
            }
            NodeKind::Aggregate(node) => {
                let mut vars: Vec<_> =
                    node.groups.iter().map(|(_, input)| Arc::clone(input)).collect();
                if node.out_variable.is_some() {
                    vars.extend(node.captured.iter().cloned());
                }
                vars
            }
            NodeKind::Gather(node) => {
                node.elements.iter().map(|e| Arc::clone(&e.variable)).collect()
            }
            NodeKind::Return(node) => vec![Arc::clone(&node.in_variable)],
            NodeKind::Insert(node) => vec![Arc::clone(&node.in_variable)],
            NodeKind::Remove(node) => vec![Arc::clone(&node.in_variable)],
            NodeKind::Update(node) => {
                let mut vars = vec![Arc::clone(&node.in_doc_variable)];
                if let Some(key) = &node.in_key_variable {
                    vars.push(Arc::clone(key));
                }
                vars
            }
            NodeKind::Replace(node) => {
                let mut vars = vec![Arc::clone(&node.in_doc_variable)];
                if let Some(key) = &node.in_key_variable {
                    vars.push(Arc::clone(key));
                }
                vars
            }
        }
    }

    /// The variables this operator produces per row.
    #[must_use]
    pub fn variables_set_here(&self) -> Vec<Arc<Variable>> {
        match self {
            NodeKind::Singleton
            | NodeKind::Filter(_)
            | NodeKind::Limit(_)
            | NodeKind::Sort(_)
            | NodeKind::Return(_)
            | NodeKind::NoResults
            | NodeKind::Remote(_)
            | NodeKind::Scatter(_)
            | NodeKind::Gather(_)
            | NodeKind::Distribute(_) => Vec::new(),
            NodeKind::EnumerateCollection(node) => vec![Arc::clone(&node.out_variable)],
            NodeKind::IndexRange(node) => vec![Arc::clone(&node.out_variable)],
            NodeKind::EnumerateList(node) => vec![Arc::clone(&node.out_variable)],
            NodeKind::Calculation(node) => vec![Arc::clone(&node.out_variable)],
            NodeKind::Subquery(node) => vec![Arc::clone(&node.out_variable)],
            NodeKind::Aggregate(node) => {
                let mut vars: Vec<_> =
                    node.groups.iter().map(|(out, _)| Arc::clone(out)).collect();
                if let Some(out) = &node.out_variable {
                    vars.push(Arc::clone(out));
                }
                vars
            }
            NodeKind::Insert(node) => node.out_variable.iter().cloned().collect(),
            NodeKind::Remove(node) => node.out_variable.iter().cloned().collect(),
            NodeKind::Update(node) => node.out_variable.iter().cloned().collect(),
            NodeKind::Replace(node) => node.out_variable.iter().cloned().collect(),
        }
    }

    /// Whether a runtime fault can originate at this operator itself.
    ///
    /// Subquery nodes delegate to their nested plan; the kernel answers
    /// that case (see [`ExecutionPlan::can_throw`]).
    ///
    /// [`ExecutionPlan::can_throw`]: crate::plan::graph::ExecutionPlan::can_throw
    #[must_use]
    pub fn can_throw_here(&self) -> bool {
        match self {
            NodeKind::Calculation(node) => node.expression.can_throw(),
            _ => false,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::EnumerateCollection(node) => {
                write!(
                    f,
                    "EnumerateCollection {} -> {}",
                    node.collection.name(),
                    node.out_variable
                )
            }
            NodeKind::IndexRange(node) => {
                write!(
                    f,
                    "IndexRange {}/{} -> {}{}",
                    node.collection.name(),
                    node.index.id(),
                    node.out_variable,
                    if node.reverse { " (reverse)" } else { "" }
                )
            }
            NodeKind::EnumerateList(node) => {
                write!(f, "EnumerateList {} -> {}", node.in_variable, node.out_variable)
            }
            NodeKind::Filter(node) => write!(f, "Filter {}", node.in_variable),
            NodeKind::Limit(node) => write!(f, "Limit {}, {}", node.offset, node.limit),
            NodeKind::Calculation(node) => {
                write!(f, "Calculation {} -> {}", node.expression, node.out_variable)
            }
            NodeKind::Subquery(node) => write!(f, "Subquery -> {}", node.out_variable),
            NodeKind::Sort(node) => {
                write!(f, "Sort")?;
                for (i, element) in node.elements.iter().enumerate() {
                    let sep = if i == 0 { ' ' } else { ',' };
                    let dir = if element.ascending { "asc" } else { "desc" };
                    write!(f, "{sep}{} {dir}", element.variable)?;
                }
                Ok(())
            }
            NodeKind::Aggregate(node) => {
                write!(f, "Aggregate ({} groups)", node.groups.len())
            }
            NodeKind::Return(node) => write!(f, "Return {}", node.in_variable),
            NodeKind::Insert(node) => write!(f, "Insert into {}", node.collection.name()),
            NodeKind::Remove(node) => write!(f, "Remove from {}", node.collection.name()),
            NodeKind::Update(node) => write!(f, "Update {}", node.collection.name()),
            NodeKind::Replace(node) => write!(f, "Replace {}", node.collection.name()),
            NodeKind::Remote(node) => write!(f, "Remote {}", node.server),
            NodeKind::Scatter(node) => write!(f, "Scatter {}", node.collection.name()),
            NodeKind::Distribute(node) => {
                write!(f, "Distribute {}", node.collection.name())
            }
            NodeKind::Gather(node) => write!(f, "Gather {}", node.collection.name()),
            NodeKind::Singleton | NodeKind::NoResults => {
                f.write_str(self.node_type().name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{VariableId, VariableRegistry};

    #[test]
    fn tag_table_is_total_and_invertible() {
        for node_type in NodeType::ALL {
            assert_eq!(NodeType::from_tag(node_type.tag()).unwrap(), node_type);
            assert_eq!(NodeType::from_name(node_type.name()).unwrap(), node_type);
        }
    }

    #[test]
    fn out_of_range_tag_is_rejected() {
        assert!(matches!(NodeType::from_tag(0), Err(PlanError::InvalidTypeTag(0))));
        assert!(matches!(NodeType::from_tag(21), Err(PlanError::InvalidTypeTag(21))));
        assert!(matches!(
            NodeType::from_name("JoinNode"),
            Err(PlanError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn subquery_root_cannot_be_overwritten() {
        let mut registry = VariableRegistry::new();
        let out = registry.fresh("sub");
        let mut node = SubqueryNode::detached(out);

        node.set_subquery(9, ExecutionNodeId::new(1)).unwrap();
        assert!(matches!(
            node.set_subquery(9, ExecutionNodeId::new(2)),
            Err(PlanError::SubqueryAlreadySet(9))
        ));
        assert_eq!(node.subquery(), Some(ExecutionNodeId::new(1)));
    }

    #[test]
    fn update_uses_doc_and_key_variables() {
        let mut registry = VariableRegistry::new();
        let doc = registry.fresh("doc");
        let key = registry.fresh("key");
        let collection = Arc::new(Collection::new("users", 100));

        let kind = NodeKind::Update(UpdateNode {
            collection,
            options: ModificationOptions::none(),
            in_doc_variable: Arc::clone(&doc),
            in_key_variable: Some(Arc::clone(&key)),
            out_variable: None,
        });

        let used = kind.variables_used_here();
        assert_eq!(used.len(), 2);
        assert!(kind.variables_set_here().is_empty());
    }

    #[test]
    fn aggregate_captures_only_with_collector() {
        let mut registry = VariableRegistry::new();
        let group_out = registry.fresh("g");
        let group_in = registry.fresh("doc_age");
        let captured = registry.fresh("doc");

        let mut aggregate = AggregateNode {
            groups: vec![(group_out, Arc::clone(&group_in))],
            out_variable: None,
            captured: vec![Arc::clone(&captured)],
        };

        let kind = NodeKind::Aggregate(aggregate.clone());
        assert_eq!(kind.variables_used_here().len(), 1);

        aggregate.out_variable = Some(registry.fresh("groups"));
        let kind = NodeKind::Aggregate(aggregate);
        assert_eq!(kind.variables_used_here().len(), 2);
        assert_eq!(kind.variables_set_here().len(), 2);
    }

    #[test]
    fn range_bound_variables_are_consumed() {
        let bound_var =
            Arc::new(Variable::new(VariableId::new(3), "low"));
        let range = AttributeRange {
            attribute: "age".to_string(),
            low: Some(RangeBound {
                value: BoundValue::Variable(Arc::clone(&bound_var)),
                inclusive: true,
            }),
            high: None,
        };

        assert!(!range.is_equality());
        assert!(range.is_bounded());
        assert_eq!(range.variables().len(), 1);
    }

    #[test]
    fn equality_range_detection() {
        let range =
            AttributeRange::equality("age", BoundValue::Literal(serde_json::json!(42)));
        assert!(range.is_equality());
    }
}
