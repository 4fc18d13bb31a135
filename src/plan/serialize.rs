//! Structural plan serialization.
//!
//! A plan subtree exports to a tree of [`NodeRecord`]s: plain data with
//! no handles into any arena, tagged per node with the operator's fixed
//! type name. Import rebuilds an [`ExecutionPlan`] by resolving
//! collection and index names against a [`QueryResources`] catalog and
//! variable ids against its registry, so a re-imported plan shares
//! variable identities with everything else resolved from the same
//! resources.
//!
//! Analysis state (cost memo, liveness sets, register assignments) is
//! derived data and deliberately not part of the format; an imported
//! plan starts analytically blank.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{ModificationOptions, QueryResources};
use crate::error::{PlanError, PlanResult};
use crate::expression::Expression;
use crate::plan::graph::{ExecutionNodeId, ExecutionPlan};
use crate::plan::node::{
    AggregateNode, AttributeRange, BoundValue, CalculationNode, DistributeNode,
    EnumerateCollectionNode, EnumerateListNode, FilterNode, GatherNode, IndexRangeNode,
    InsertNode, LimitNode, NodeKind, NodeType, RangeBound, RemoteNode, RemoveNode,
    ReplaceNode, ReturnNode, ScatterNode, SortElement, SortNode, SubqueryNode,
    UpdateNode,
};
use crate::variable::{Variable, VariableId};

/// Serialized form of a variable reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// The variable's query-unique id.
    pub id: u64,
    /// The variable's display name.
    pub name: String,
}

impl From<&Arc<Variable>> for VariableRecord {
    fn from(variable: &Arc<Variable>) -> Self {
        Self { id: variable.id().as_u64(), name: variable.name().to_string() }
    }
}

impl VariableRecord {
    fn resolve(&self, resources: &mut QueryResources) -> Arc<Variable> {
        resources.variables.get_or_create(VariableId::new(self.id), &self.name)
    }
}

/// Serialized form of an expression descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    /// Display form of the expression.
    pub source: String,
    /// Free variables the expression reads.
    pub variables: Vec<VariableRecord>,
    /// Whether evaluation can raise a runtime fault.
    pub can_throw: bool,
    /// Attribute path, when the expression is a plain attribute access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_path: Option<String>,
}

impl ExpressionRecord {
    fn export(expression: &Expression) -> Self {
        Self {
            source: expression.source().to_string(),
            variables: expression.variables().iter().map(VariableRecord::from).collect(),
            can_throw: expression.can_throw(),
            attribute_path: expression.attribute_path().map(str::to_string),
        }
    }

    fn resolve(&self, resources: &mut QueryResources) -> Expression {
        let variables =
            self.variables.iter().map(|v| v.resolve(resources)).collect();
        let expression = Expression::new(&self.source, variables, self.can_throw);
        match &self.attribute_path {
            Some(path) => expression.with_attribute_path(path),
            None => expression,
        }
    }
}

/// Serialized sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortElementRecord {
    /// Variable holding the sort key.
    pub variable: VariableRecord,
    /// Ascending order when true.
    pub ascending: bool,
}

impl SortElementRecord {
    fn export(element: &SortElement) -> Self {
        Self {
            variable: VariableRecord::from(&element.variable),
            ascending: element.ascending,
        }
    }

    fn resolve(&self, resources: &mut QueryResources) -> SortElement {
        SortElement {
            variable: self.variable.resolve(resources),
            ascending: self.ascending,
        }
    }
}

/// Serialized range bound value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundValueRecord {
    /// Constant bound.
    Literal(serde_json::Value),
    /// Bound read from a variable at runtime.
    Variable(VariableRecord),
}

/// Serialized range bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBoundRecord {
    /// The bound value.
    pub value: BoundValueRecord,
    /// Whether the bound itself is part of the range.
    pub inclusive: bool,
}

/// Serialized attribute range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRangeRecord {
    /// The constrained attribute.
    pub attribute: String,
    /// Lower bound, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<RangeBoundRecord>,
    /// Upper bound, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<RangeBoundRecord>,
}

impl AttributeRangeRecord {
    fn export(range: &AttributeRange) -> Self {
        let export_bound = |bound: &RangeBound| RangeBoundRecord {
            value: match &bound.value {
                BoundValue::Literal(value) => BoundValueRecord::Literal(value.clone()),
                BoundValue::Variable(var) => {
                    BoundValueRecord::Variable(VariableRecord::from(var))
                }
            },
            inclusive: bound.inclusive,
        };
        Self {
            attribute: range.attribute.clone(),
            low: range.low.as_ref().map(export_bound),
            high: range.high.as_ref().map(export_bound),
        }
    }

    fn resolve(&self, resources: &mut QueryResources) -> AttributeRange {
        let mut resolve_bound = |bound: &RangeBoundRecord| RangeBound {
            value: match &bound.value {
                BoundValueRecord::Literal(value) => BoundValue::Literal(value.clone()),
                BoundValueRecord::Variable(var) => {
                    BoundValue::Variable(var.resolve(resources))
                }
            },
            inclusive: bound.inclusive,
        };
        AttributeRange {
            attribute: self.attribute.clone(),
            low: self.low.as_ref().map(&mut resolve_bound),
            high: self.high.as_ref().map(&mut resolve_bound),
        }
    }
}

/// Serialized aggregation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Produced group variable.
    pub out_variable: VariableRecord,
    /// Grouped-on input variable.
    pub in_variable: VariableRecord,
}

/// The operator payload of a serialized node, tagged with the
/// operator's fixed type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs, clippy::large_enum_variant)]
pub enum PayloadRecord {
    #[serde(rename = "SingletonNode")]
    Singleton,
    #[serde(rename = "EnumerateCollectionNode")]
    EnumerateCollection { collection: String, out_variable: VariableRecord },
    #[serde(rename = "IndexRangeNode")]
    IndexRange {
        collection: String,
        index: String,
        out_variable: VariableRecord,
        ranges: Vec<AttributeRangeRecord>,
        reverse: bool,
    },
    #[serde(rename = "EnumerateListNode")]
    EnumerateList { in_variable: VariableRecord, out_variable: VariableRecord },
    #[serde(rename = "FilterNode")]
    Filter { in_variable: VariableRecord },
    #[serde(rename = "LimitNode")]
    Limit { offset: u64, limit: u64 },
    #[serde(rename = "CalculationNode")]
    Calculation { expression: ExpressionRecord, out_variable: VariableRecord },
    #[serde(rename = "SubqueryNode")]
    Subquery { subquery: Box<NodeRecord>, out_variable: VariableRecord },
    #[serde(rename = "SortNode")]
    Sort { elements: Vec<SortElementRecord>, stable: bool },
    #[serde(rename = "AggregateNode")]
    Aggregate {
        groups: Vec<GroupRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out_variable: Option<VariableRecord>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        captured: Vec<VariableRecord>,
    },
    #[serde(rename = "ScatterNode")]
    Scatter { collection: String },
    #[serde(rename = "GatherNode")]
    Gather { collection: String, elements: Vec<SortElementRecord> },
    #[serde(rename = "RemoteNode")]
    Remote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        server: String,
        own_name: String,
        query_id: String,
    },
    #[serde(rename = "InsertNode")]
    Insert {
        collection: String,
        options: ModificationOptions,
        in_variable: VariableRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out_variable: Option<VariableRecord>,
    },
    #[serde(rename = "RemoveNode")]
    Remove {
        collection: String,
        options: ModificationOptions,
        in_variable: VariableRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out_variable: Option<VariableRecord>,
    },
    #[serde(rename = "ReplaceNode")]
    Replace {
        collection: String,
        options: ModificationOptions,
        in_doc_variable: VariableRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_key_variable: Option<VariableRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out_variable: Option<VariableRecord>,
    },
    #[serde(rename = "UpdateNode")]
    Update {
        collection: String,
        options: ModificationOptions,
        in_doc_variable: VariableRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_key_variable: Option<VariableRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out_variable: Option<VariableRecord>,
    },
    #[serde(rename = "ReturnNode")]
    Return { in_variable: VariableRecord },
    #[serde(rename = "NoResultsNode")]
    NoResults,
    #[serde(rename = "DistributeNode")]
    Distribute { collection: String },
}

/// One serialized plan node with its dependency subtree inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The node's id, stable across export and import.
    pub id: u64,
    /// Serialized dependency subtrees, in pull order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<NodeRecord>,
    /// The operator payload, including its type tag.
    #[serde(flatten)]
    pub payload: PayloadRecord,
}

impl NodeRecord {
    /// Encodes the record tree as a JSON value.
    pub fn to_json(&self) -> PlanResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes a record tree from a JSON value, validating every type
    /// tag against the closed operator catalog first.
    pub fn from_json(value: serde_json::Value) -> PlanResult<Self> {
        check_type_tags(&value)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Walks a record tree in JSON form and validates each `type` tag, so
/// an out-of-catalog operator reports as such rather than as a generic
/// decode failure.
fn check_type_tags(value: &serde_json::Value) -> PlanResult<()> {
    if let Some(tag) = value.get("type").and_then(serde_json::Value::as_str) {
        NodeType::from_name(tag)?;
    }
    if let Some(deps) = value.get("dependencies").and_then(serde_json::Value::as_array) {
        for dep in deps {
            check_type_tags(dep)?;
        }
    }
    if let Some(subquery) = value.get("subquery") {
        check_type_tags(subquery)?;
    }
    Ok(())
}

impl ExecutionPlan {
    /// Exports the subtree under `root` as a record tree.
    ///
    /// The dependency structure is exported as a tree, one record per
    /// edge; subquery bodies are inlined under their subquery node. A
    /// subquery node without an attached body cannot be exported.
    pub fn export(&self, root: ExecutionNodeId) -> PlanResult<NodeRecord> {
        let node = self.node(root);
        let mut dependencies = Vec::with_capacity(node.dependencies().len());
        for &dep in node.dependencies() {
            dependencies.push(self.export(dep)?);
        }
        let payload = self.export_payload(root)?;
        Ok(NodeRecord { id: root.as_u64(), dependencies, payload })
    }

    /// Exports the whole plan from its root.
    pub fn export_root(&self) -> PlanResult<NodeRecord> {
        let root = self.root().ok_or(PlanError::MissingRoot)?;
        self.export(root)
    }

    fn export_payload(&self, id: ExecutionNodeId) -> PlanResult<PayloadRecord> {
        let record = match self.node(id).kind() {
            NodeKind::Singleton => PayloadRecord::Singleton,
            NodeKind::NoResults => PayloadRecord::NoResults,
            NodeKind::EnumerateCollection(node) => PayloadRecord::EnumerateCollection {
                collection: node.collection.name().to_string(),
                out_variable: VariableRecord::from(&node.out_variable),
            },
            NodeKind::IndexRange(node) => PayloadRecord::IndexRange {
                collection: node.collection.name().to_string(),
                index: node.index.id().to_string(),
                out_variable: VariableRecord::from(&node.out_variable),
                ranges: node.ranges.iter().map(AttributeRangeRecord::export).collect(),
                reverse: node.reverse,
            },
            NodeKind::EnumerateList(node) => PayloadRecord::EnumerateList {
                in_variable: VariableRecord::from(&node.in_variable),
                out_variable: VariableRecord::from(&node.out_variable),
            },
            NodeKind::Filter(node) => PayloadRecord::Filter {
                in_variable: VariableRecord::from(&node.in_variable),
            },
            NodeKind::Limit(node) => {
                PayloadRecord::Limit { offset: node.offset, limit: node.limit }
            }
            NodeKind::Calculation(node) => PayloadRecord::Calculation {
                expression: ExpressionRecord::export(&node.expression),
                out_variable: VariableRecord::from(&node.out_variable),
            },
            NodeKind::Subquery(node) => {
                let sub_root = node
                    .subquery()
                    .ok_or(PlanError::SubqueryMissing(id.as_u64()))?;
                PayloadRecord::Subquery {
                    subquery: Box::new(self.export(sub_root)?),
                    out_variable: VariableRecord::from(&node.out_variable),
                }
            }
            NodeKind::Sort(node) => PayloadRecord::Sort {
                elements: node.elements.iter().map(SortElementRecord::export).collect(),
                stable: node.stable,
            },
            NodeKind::Aggregate(node) => PayloadRecord::Aggregate {
                groups: node
                    .groups
                    .iter()
                    .map(|(out, input)| GroupRecord {
                        out_variable: VariableRecord::from(out),
                        in_variable: VariableRecord::from(input),
                    })
                    .collect(),
                out_variable: node.out_variable.as_ref().map(VariableRecord::from),
                captured: node.captured.iter().map(VariableRecord::from).collect(),
            },
            NodeKind::Scatter(node) => PayloadRecord::Scatter {
                collection: node.collection.name().to_string(),
            },
            NodeKind::Gather(node) => PayloadRecord::Gather {
                collection: node.collection.name().to_string(),
                elements: node.elements.iter().map(SortElementRecord::export).collect(),
            },
            NodeKind::Remote(node) => PayloadRecord::Remote {
                collection: node.collection.as_ref().map(|c| c.name().to_string()),
                server: node.server.clone(),
                own_name: node.own_name.clone(),
                query_id: node.query_id.clone(),
            },
            NodeKind::Insert(node) => PayloadRecord::Insert {
                collection: node.collection.name().to_string(),
                options: node.options.clone(),
                in_variable: VariableRecord::from(&node.in_variable),
                out_variable: node.out_variable.as_ref().map(VariableRecord::from),
            },
            NodeKind::Remove(node) => PayloadRecord::Remove {
                collection: node.collection.name().to_string(),
                options: node.options.clone(),
                in_variable: VariableRecord::from(&node.in_variable),
                out_variable: node.out_variable.as_ref().map(VariableRecord::from),
            },
            NodeKind::Replace(node) => PayloadRecord::Replace {
                collection: node.collection.name().to_string(),
                options: node.options.clone(),
                in_doc_variable: VariableRecord::from(&node.in_doc_variable),
                in_key_variable: node.in_key_variable.as_ref().map(VariableRecord::from),
                out_variable: node.out_variable.as_ref().map(VariableRecord::from),
            },
            NodeKind::Update(node) => PayloadRecord::Update {
                collection: node.collection.name().to_string(),
                options: node.options.clone(),
                in_doc_variable: VariableRecord::from(&node.in_doc_variable),
                in_key_variable: node.in_key_variable.as_ref().map(VariableRecord::from),
                out_variable: node.out_variable.as_ref().map(VariableRecord::from),
            },
            NodeKind::Return(node) => PayloadRecord::Return {
                in_variable: VariableRecord::from(&node.in_variable),
            },
            NodeKind::Distribute(node) => PayloadRecord::Distribute {
                collection: node.collection.name().to_string(),
            },
        };
        Ok(record)
    }

    /// Rebuilds a plan from a record tree, resolving catalog and
    /// variable references against `resources`.
    pub fn import(
        record: &NodeRecord,
        resources: &mut QueryResources,
    ) -> PlanResult<ExecutionPlan> {
        let mut plan = ExecutionPlan::new();
        let root = plan.import_node(record, resources)?;
        plan.set_root(root);
        Ok(plan)
    }

    fn import_node(
        &mut self,
        record: &NodeRecord,
        resources: &mut QueryResources,
    ) -> PlanResult<ExecutionNodeId> {
        let kind = self.import_payload(&record.payload, resources)?;
        let id = self.add_node_with_id(ExecutionNodeId::new(record.id), kind)?;
        for dep in &record.dependencies {
            let dep_id = self.import_node(dep, resources)?;
            self.add_dependency(id, dep_id);
        }
        Ok(id)
    }

    fn import_payload(
        &mut self,
        payload: &PayloadRecord,
        resources: &mut QueryResources,
    ) -> PlanResult<NodeKind> {
        let kind = match payload {
            PayloadRecord::Singleton => NodeKind::Singleton,
            PayloadRecord::NoResults => NodeKind::NoResults,
            PayloadRecord::EnumerateCollection { collection, out_variable } => {
                NodeKind::EnumerateCollection(EnumerateCollectionNode {
                    collection: resources.collection(collection)?,
                    out_variable: out_variable.resolve(resources),
                })
            }
            PayloadRecord::IndexRange {
                collection,
                index,
                out_variable,
                ranges,
                reverse,
            } => NodeKind::IndexRange(Box::new(IndexRangeNode {
                collection: resources.collection(collection)?,
                index: resources.index(collection, index)?,
                out_variable: out_variable.resolve(resources),
                ranges: ranges.iter().map(|r| r.resolve(resources)).collect(),
                reverse: *reverse,
            })),
            PayloadRecord::EnumerateList { in_variable, out_variable } => {
                NodeKind::EnumerateList(EnumerateListNode {
                    in_variable: in_variable.resolve(resources),
                    out_variable: out_variable.resolve(resources),
                })
            }
            PayloadRecord::Filter { in_variable } => {
                NodeKind::Filter(FilterNode { in_variable: in_variable.resolve(resources) })
            }
            PayloadRecord::Limit { offset, limit } => {
                NodeKind::Limit(LimitNode { offset: *offset, limit: *limit })
            }
            PayloadRecord::Calculation { expression, out_variable } => {
                NodeKind::Calculation(CalculationNode {
                    expression: expression.resolve(resources),
                    out_variable: out_variable.resolve(resources),
                })
            }
            PayloadRecord::Subquery { subquery, out_variable } => {
                let sub_root = self.import_node(subquery, resources)?;
                NodeKind::Subquery(SubqueryNode::new(
                    sub_root,
                    out_variable.resolve(resources),
                ))
            }
            PayloadRecord::Sort { elements, stable } => NodeKind::Sort(SortNode {
                elements: elements.iter().map(|e| e.resolve(resources)).collect(),
                stable: *stable,
            }),
            PayloadRecord::Aggregate { groups, out_variable, captured } => {
                NodeKind::Aggregate(AggregateNode {
                    groups: groups
                        .iter()
                        .map(|g| {
                            (g.out_variable.resolve(resources), g.in_variable.resolve(resources))
                        })
                        .collect(),
                    out_variable: out_variable.as_ref().map(|v| v.resolve(resources)),
                    captured: captured.iter().map(|v| v.resolve(resources)).collect(),
                })
            }
            PayloadRecord::Scatter { collection } => NodeKind::Scatter(ScatterNode {
                collection: resources.collection(collection)?,
            }),
            PayloadRecord::Gather { collection, elements } => {
                NodeKind::Gather(GatherNode {
                    collection: resources.collection(collection)?,
                    elements: elements.iter().map(|e| e.resolve(resources)).collect(),
                })
            }
            PayloadRecord::Remote { collection, server, own_name, query_id } => {
                NodeKind::Remote(RemoteNode {
                    collection: match collection {
                        Some(name) => Some(resources.collection(name)?),
                        None => None,
                    },
                    server: server.clone(),
                    own_name: own_name.clone(),
                    query_id: query_id.clone(),
                })
            }
            PayloadRecord::Insert { collection, options, in_variable, out_variable } => {
                NodeKind::Insert(InsertNode {
                    collection: resources.collection(collection)?,
                    options: options.clone(),
                    in_variable: in_variable.resolve(resources),
                    out_variable: out_variable.as_ref().map(|v| v.resolve(resources)),
                })
            }
            PayloadRecord::Remove { collection, options, in_variable, out_variable } => {
                NodeKind::Remove(RemoveNode {
                    collection: resources.collection(collection)?,
                    options: options.clone(),
                    in_variable: in_variable.resolve(resources),
                    out_variable: out_variable.as_ref().map(|v| v.resolve(resources)),
                })
            }
            PayloadRecord::Replace {
                collection,
                options,
                in_doc_variable,
                in_key_variable,
                out_variable,
            } => NodeKind::Replace(ReplaceNode {
                collection: resources.collection(collection)?,
                options: options.clone(),
                in_doc_variable: in_doc_variable.resolve(resources),
                in_key_variable: in_key_variable.as_ref().map(|v| v.resolve(resources)),
                out_variable: out_variable.as_ref().map(|v| v.resolve(resources)),
            }),
            PayloadRecord::Update {
                collection,
                options,
                in_doc_variable,
                in_key_variable,
                out_variable,
            } => NodeKind::Update(UpdateNode {
                collection: resources.collection(collection)?,
                options: options.clone(),
                in_doc_variable: in_doc_variable.resolve(resources),
                in_key_variable: in_key_variable.as_ref().map(|v| v.resolve(resources)),
                out_variable: out_variable.as_ref().map(|v| v.resolve(resources)),
            }),
            PayloadRecord::Return { in_variable } => {
                NodeKind::Return(ReturnNode { in_variable: in_variable.resolve(resources) })
            }
            PayloadRecord::Distribute { collection } => {
                NodeKind::Distribute(DistributeNode {
                    collection: resources.collection(collection)?,
                })
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Collection;

    fn resources() -> QueryResources {
        let mut resources = QueryResources::new();
        resources.add_collection(Collection::new("users", 1000));
        resources
    }

    fn build_scan_plan(resources: &mut QueryResources) -> ExecutionPlan {
        let doc = resources.variables.fresh("doc");
        let collection = resources.collection("users").unwrap();

        let mut plan = ExecutionPlan::new();
        let singleton = plan.add_node(NodeKind::Singleton);
        let scan = plan.add_node(NodeKind::EnumerateCollection(EnumerateCollectionNode {
            collection,
            out_variable: Arc::clone(&doc),
        }));
        let ret = plan.add_node(NodeKind::Return(ReturnNode { in_variable: doc }));
        plan.add_dependency(scan, singleton);
        plan.add_dependency(ret, scan);
        plan.set_root(ret);
        plan
    }

    #[test]
    fn export_tags_nodes_with_type_names() {
        let mut resources = resources();
        let plan = build_scan_plan(&mut resources);
        let record = plan.export_root().unwrap();
        let json = record.to_json().unwrap();

        assert_eq!(json["type"], "ReturnNode");
        assert_eq!(json["dependencies"][0]["type"], "EnumerateCollectionNode");
        assert_eq!(json["dependencies"][0]["dependencies"][0]["type"], "SingletonNode");
    }

    #[test]
    fn import_rebuilds_structure_and_identities() {
        let mut resources = resources();
        let plan = build_scan_plan(&mut resources);
        let record = plan.export_root().unwrap();

        let imported = ExecutionPlan::import(&record, &mut resources).unwrap();
        assert_eq!(imported.len(), plan.len());
        assert_eq!(imported.root(), plan.root());

        let root = imported.root().unwrap();
        assert_eq!(imported.node(root).node_type(), NodeType::Return);
        // No analysis state round-trips.
        assert!(imported.node(root).cost().is_none());
        assert!(!imported.var_usage_valid());

        // The returned variable resolves to the registry's single "doc".
        let NodeKind::Return(ret) = imported.node(root).kind() else {
            panic!("root is not a return node");
        };
        let doc = resources.variables.get(ret.in_variable.id()).unwrap();
        assert!(Arc::ptr_eq(&doc, &ret.in_variable));
    }

    #[test]
    fn subqueries_round_trip_inline() {
        let mut resources = resources();
        let outer = resources.variables.fresh("outer");
        let sub_out = resources.variables.fresh("sub");

        let mut plan = ExecutionPlan::new();
        let sub_singleton = plan.add_node(NodeKind::Singleton);
        let sub_ret = plan.add_node(NodeKind::Return(ReturnNode {
            in_variable: Arc::clone(&outer),
        }));
        plan.add_dependency(sub_ret, sub_singleton);

        let singleton = plan.add_node(NodeKind::Singleton);
        let subquery = plan.add_node(NodeKind::Subquery(SubqueryNode::new(
            sub_ret,
            Arc::clone(&sub_out),
        )));
        let ret = plan.add_node(NodeKind::Return(ReturnNode { in_variable: sub_out }));
        plan.add_dependency(subquery, singleton);
        plan.add_dependency(ret, subquery);
        plan.set_root(ret);

        let record = plan.export_root().unwrap();
        let imported = ExecutionPlan::import(&record, &mut resources).unwrap();
        assert_eq!(imported.len(), 5);

        let sq = imported.nodes_of_type(NodeType::Subquery)[0];
        let NodeKind::Subquery(node) = imported.node(sq).kind() else { unreachable!() };
        assert_eq!(node.subquery(), Some(sub_ret));
    }

    #[test]
    fn detached_subquery_cannot_be_exported() {
        let mut resources = resources();
        let sub_out = resources.variables.fresh("sub");

        let mut plan = ExecutionPlan::new();
        let subquery =
            plan.add_node(NodeKind::Subquery(SubqueryNode::detached(sub_out)));
        plan.set_root(subquery);

        assert!(matches!(
            plan.export_root(),
            Err(PlanError::SubqueryMissing(_))
        ));
    }

    #[test]
    fn unknown_type_tag_is_reported_by_name() {
        let json = serde_json::json!({
            "id": 1,
            "type": "TeleportNode"
        });
        assert!(matches!(
            NodeRecord::from_json(json),
            Err(PlanError::UnknownNodeType(name)) if name == "TeleportNode"
        ));
    }

    #[test]
    fn unknown_collection_fails_import() {
        let mut resources = resources();
        let plan = build_scan_plan(&mut resources);
        let record = plan.export_root().unwrap();

        let mut empty = QueryResources::new();
        assert!(matches!(
            ExecutionPlan::import(&record, &mut empty),
            Err(PlanError::UnknownCollection(name)) if name == "users"
        ));
    }

    #[test]
    fn index_ranges_round_trip() {
        let mut resources = QueryResources::new();
        resources.add_collection(
            Collection::new("users", 1000).with_index(crate::catalog::Index::new(
                "idx_age",
                crate::catalog::IndexKind::Skiplist,
                vec!["age".to_string()],
                false,
            )),
        );
        let doc = resources.variables.fresh("doc");
        let collection = resources.collection("users").unwrap();
        let index = resources.index("users", "idx_age").unwrap();

        let mut plan = ExecutionPlan::new();
        let singleton = plan.add_node(NodeKind::Singleton);
        let scan = plan.add_node(NodeKind::IndexRange(Box::new(IndexRangeNode {
            collection,
            index,
            out_variable: Arc::clone(&doc),
            ranges: vec![AttributeRange::equality(
                "age",
                BoundValue::Literal(serde_json::json!(42)),
            )],
            reverse: true,
        })));
        let ret = plan.add_node(NodeKind::Return(ReturnNode { in_variable: doc }));
        plan.add_dependency(scan, singleton);
        plan.add_dependency(ret, scan);
        plan.set_root(ret);

        let record = plan.export_root().unwrap();
        let json = record.to_json().unwrap();
        let reparsed = NodeRecord::from_json(json).unwrap();
        let imported = ExecutionPlan::import(&reparsed, &mut resources).unwrap();

        let scan_id = imported.nodes_of_type(NodeType::IndexRange)[0];
        let NodeKind::IndexRange(node) = imported.node(scan_id).kind() else {
            unreachable!()
        };
        assert!(node.reverse);
        assert_eq!(node.index.id(), "idx_age");
        assert!(node.ranges[0].is_equality());
    }
}
