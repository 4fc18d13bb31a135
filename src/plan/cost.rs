//! Cost model for execution plans.
//!
//! Costs are unitless, monotonically accumulated along dependency edges
//! and only ever compared against each other. Every constant in the
//! model is a named, overridable field so experiments can tune a single
//! factor without touching the estimation code. The defaults are
//! placeholders calibrated for plausibility, not measurements.
//!
//! Estimation itself is demand-driven: [`CostModel::estimate`] computes
//! the cost of one node from the memoized costs of its dependencies,
//! which the plan kernel caches per node (see
//! [`ExecutionPlan::cost_of`](crate::plan::graph::ExecutionPlan::cost_of)).

use crate::plan::graph::{ExecutionNodeId, ExecutionPlan};
use crate::plan::node::{AttributeRange, IndexRangeNode, NodeKind};

/// Tunable constants for cost estimation.
///
/// The model is `Copy` so the kernel can lift it out of the plan before
/// recursing; estimation never mutates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Cost of producing the one singleton row.
    pub singleton_cost: f64,
    /// Assumed cardinality of a list enumeration, per input row.
    pub list_enumeration_factor: f64,
    /// Fraction of rows a filter is assumed to pass, plus its own
    /// per-row work.
    pub filter_factor: f64,
    /// Per-row overhead of counting rows through a limit.
    pub limit_overhead: f64,
    /// Per-row cost of evaluating a calculation.
    pub calculation_factor: f64,
    /// Per-row overhead of dispatching into a subquery.
    pub subquery_overhead: f64,
    /// Per-row cost of grouping.
    pub aggregate_factor: f64,
    /// Per-row cost of a document write (insert, update, replace).
    pub modification_factor: f64,
    /// Per-row overhead of crossing a server boundary.
    pub remote_overhead: f64,
    /// Flat cost of a row-exchange operator (scatter, gather,
    /// distribute).
    pub exchange_cost: f64,
    /// Selectivity of an equality condition on one index attribute.
    pub equality_selectivity: f64,
    /// Selectivity of a bounded (but not pinned) range on one index
    /// attribute.
    pub range_selectivity: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            singleton_cost: 1.0,
            list_enumeration_factor: 1000.0,
            filter_factor: 0.105,
            limit_overhead: 1.005,
            calculation_factor: 2.0,
            subquery_overhead: 1.005,
            aggregate_factor: 2.0,
            modification_factor: 1000.0,
            remote_overhead: 1.5,
            exchange_cost: 1.0,
            equality_selectivity: 0.01,
            range_selectivity: 0.1,
        }
    }
}

impl CostModel {
    /// Estimates the cost of one node, pulling dependency costs from the
    /// plan's memo.
    ///
    /// `C` below is the summed (memoized) cost of the node's
    /// dependencies. Operators that restart the row stream (singleton,
    /// exchange operators) ignore `C` entirely.
    pub(crate) fn estimate(self, plan: &mut ExecutionPlan, id: ExecutionNodeId) -> f64 {
        let deps = plan.dependency_cost(id);
        // Payload reads must not hold a borrow across the match arms, so
        // pull the few scalar inputs out first.
        let kind = plan.node(id).kind().clone();

        match &kind {
            NodeKind::Singleton => self.singleton_cost,
            NodeKind::EnumerateCollection(node) => {
                node.collection.document_count() as f64 * deps
            }
            NodeKind::IndexRange(node) => self.index_range_cost(node) * deps,
            NodeKind::EnumerateList(_) => self.list_enumeration_factor * deps,
            NodeKind::Filter(_) => self.filter_factor * deps,
            NodeKind::Limit(node) => {
                self.limit_overhead * (node.limit as f64).min(deps)
            }
            NodeKind::Calculation(_) => self.calculation_factor * deps,
            NodeKind::Subquery(_) => self.subquery_overhead * deps,
            NodeKind::Sort(_) => {
                if deps <= 2.0 {
                    deps
                } else {
                    deps * deps.ln()
                }
            }
            NodeKind::Aggregate(_) => self.aggregate_factor * deps,
            NodeKind::Return(_) => deps,
            NodeKind::Insert(_) | NodeKind::Update(_) | NodeKind::Replace(_) => {
                self.modification_factor * deps
            }
            NodeKind::Remove(_) => deps,
            NodeKind::NoResults => 0.0,
            NodeKind::Remote(_) => {
                if plan.node(id).dependencies().is_empty() {
                    self.remote_overhead
                } else {
                    self.remote_overhead * deps
                }
            }
            NodeKind::Scatter(_) | NodeKind::Gather(_) | NodeKind::Distribute(_) => {
                self.exchange_cost
            }
        }
    }

    /// Expected number of documents an index range scan produces per
    /// input row: the product of per-attribute selectivities applied to
    /// the collection size, floored at one document.
    fn index_range_cost(self, node: &IndexRangeNode) -> f64 {
        let selectivity: f64 =
            node.ranges.iter().map(|range| self.range_selectivity_of(range)).product();
        (selectivity * node.collection.document_count() as f64).max(1.0)
    }

    fn range_selectivity_of(self, range: &AttributeRange) -> f64 {
        if range.is_equality() {
            self.equality_selectivity
        } else if range.is_bounded() {
            self.range_selectivity
        } else {
            1.0
        }
    }
}
