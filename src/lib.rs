//! Heron Plan
//!
//! This crate provides the execution plan core for the Heron query
//! engine: the typed operator graph a query compiles into, and the
//! analysis passes the optimizer runs over it.
//!
//! # Overview
//!
//! The plan core consists of several layers:
//!
//! - **Catalog**: Read-only collection and index descriptors
//! - **Variables**: The query's symbol table and liveness tracking
//! - **Plan**: The operator node arena with dependency edges
//! - **Analysis**: Cost estimation, register planning, sort subsumption
//! - **Serialization**: Structural export/import of plan trees
//!
//! # Modules
//!
//! - [`catalog`] - Collection/index descriptors and query resources
//! - [`variable`] - Variables and the per-query registry
//! - [`expression`] - Opaque expression descriptors
//! - [`plan`] - The plan graph and its analysis passes
//! - [`error`] - Error types for plan construction and analysis
//!
//! # Quick Start
//!
//! Build a plan that scans a collection and returns each document:
//!
//! ```
//! use std::sync::Arc;
//! use heron_plan::catalog::{Collection, QueryResources};
//! use heron_plan::plan::node::{EnumerateCollectionNode, ReturnNode};
//! use heron_plan::plan::{ExecutionPlan, NodeKind};
//!
//! let mut resources = QueryResources::new();
//! let users = resources.add_collection(Collection::new("users", 1000));
//! let doc = resources.variables.fresh("doc");
//!
//! let mut plan = ExecutionPlan::new();
//! let singleton = plan.add_node(NodeKind::Singleton);
//! let scan = plan.add_node(NodeKind::EnumerateCollection(EnumerateCollectionNode {
//!     collection: users,
//!     out_variable: Arc::clone(&doc),
//! }));
//! let ret = plan.add_node(NodeKind::Return(ReturnNode { in_variable: doc }));
//! plan.add_dependency(scan, singleton);
//! plan.add_dependency(ret, scan);
//! plan.set_root(ret);
//!
//! assert_eq!(plan.cost_of(ret), 1000.0);
//! ```
//!
//! Run the register pass and export the plan:
//!
//! ```
//! # use std::sync::Arc;
//! # use heron_plan::catalog::{Collection, QueryResources};
//! # use heron_plan::plan::node::{EnumerateCollectionNode, ReturnNode};
//! # use heron_plan::plan::{ExecutionPlan, NodeKind};
//! # let mut resources = QueryResources::new();
//! # let users = resources.add_collection(Collection::new("users", 1000));
//! # let doc = resources.variables.fresh("doc");
//! # let mut plan = ExecutionPlan::new();
//! # let singleton = plan.add_node(NodeKind::Singleton);
//! # let scan = plan.add_node(NodeKind::EnumerateCollection(EnumerateCollectionNode {
//! #     collection: users,
//! #     out_variable: Arc::clone(&doc),
//! # }));
//! # let ret = plan.add_node(NodeKind::Return(ReturnNode { in_variable: Arc::clone(&doc) }));
//! # plan.add_dependency(scan, singleton);
//! # plan.add_dependency(ret, scan);
//! # plan.set_root(ret);
//! let registers = plan.plan_registers().unwrap();
//! assert_eq!(registers.register_of(doc.id()), Some(0));
//!
//! let record = plan.export_root().unwrap();
//! let rebuilt = ExecutionPlan::import(&record, &mut resources).unwrap();
//! assert_eq!(rebuilt.len(), plan.len());
//! ```

pub mod catalog;
pub mod error;
pub mod expression;
pub mod plan;
pub mod variable;

// Re-export commonly used items at the crate root
pub use catalog::{Collection, Index, IndexKind, QueryResources};
pub use error::{PlanError, PlanResult};
pub use expression::Expression;
pub use plan::{
    CostModel, ExecutionNode, ExecutionNodeId, ExecutionPlan, NodeKind, NodeType,
    PlanVisitor, RegisterPlan,
};
pub use variable::{Variable, VariableId, VariableRegistry};
