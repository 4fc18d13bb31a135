//! Execution plan core.
//!
//! A plan is a graph of typed operator nodes owned by an
//! [`ExecutionPlan`] arena, with rows flowing from dependencies toward
//! the root. On top of the graph sit the analysis passes: cost
//! estimation, variable liveness, register planning, sort-order
//! subsumption and index matching, plus the structural serialization
//! format.
//!
//! - [`node`] - The closed operator catalog and per-operator payloads
//! - [`graph`] - Node arena, edges, traversal, liveness and cloning
//! - [`cost`] - The tunable cost model
//! - [`registers`] - Variable-to-register assignment
//! - [`index_match`] - Matching sort requests against ordered indexes
//! - [`sort`] - Sort-order descriptions and subsumption
//! - [`serialize`] - Export/import of plans as structural records

pub mod cost;
pub mod graph;
pub mod index_match;
pub mod node;
pub mod registers;
pub mod serialize;
pub mod sort;

pub use cost::CostModel;
pub use graph::{ExecutionNode, ExecutionNodeId, ExecutionPlan, PlanVisitor};
pub use index_match::{compare_index, matching_indexes, IndexMatch, MatchQuality};
pub use node::{NodeKind, NodeType, SortElement};
pub use registers::{RegisterId, RegisterPlan, VarInfo, MAX_REGISTER_ID};
pub use serialize::NodeRecord;
pub use sort::{SortCoverage, SortCriterion, SortInformation};
