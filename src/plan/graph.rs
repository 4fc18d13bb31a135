//! The execution plan kernel: node arena, dependency edges, cost memo
//! and variable liveness.
//!
//! A plan owns every node in a single arena and hands out
//! [`ExecutionNodeId`] handles. All edges are stored as id pairs and
//! kept symmetric by the kernel itself; payloads never hold edges apart
//! from the subquery root handle. Rows flow from dependencies towards
//! parents, so the plan root is the most downstream node.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{PlanError, PlanResult};
use crate::plan::cost::CostModel;
use crate::plan::node::{NodeKind, NodeType};
use crate::plan::registers::RegisterId;
use crate::variable::{Variable, VariableId};

/// Handle to a node inside one [`ExecutionPlan`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionNodeId(u64);

impl ExecutionNodeId {
    /// Create a node id from a raw u64 value.
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

impl fmt::Display for ExecutionNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of an execution plan: an operator payload plus the
/// structural state the kernel maintains for it.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    id: ExecutionNodeId,
    kind: NodeKind,
    dependencies: Vec<ExecutionNodeId>,
    parents: Vec<ExecutionNodeId>,
    cost: Option<f64>,
    vars_used_later: Option<HashSet<VariableId>>,
    vars_valid: Option<HashSet<VariableId>>,
    depth: usize,
    regs_to_clear: HashSet<RegisterId>,
}

impl ExecutionNode {
    fn new(id: ExecutionNodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dependencies: Vec::new(),
            parents: Vec::new(),
            cost: None,
            vars_used_later: None,
            vars_valid: None,
            depth: 0,
            regs_to_clear: HashSet::new(),
        }
    }

    /// The node's id within its plan.
    #[must_use]
    pub const fn id(&self) -> ExecutionNodeId {
        self.id
    }

    /// The operator payload.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The operator kind tag.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Upstream nodes this node pulls rows from, in pull order.
    #[must_use]
    pub fn dependencies(&self) -> &[ExecutionNodeId] {
        &self.dependencies
    }

    /// Downstream nodes pulling rows from this node.
    #[must_use]
    pub fn parents(&self) -> &[ExecutionNodeId] {
        &self.parents
    }

    /// Whether this node has a dependency edge to `other`.
    #[must_use]
    pub fn has_dependency(&self, other: ExecutionNodeId) -> bool {
        self.dependencies.contains(&other)
    }

    /// The memoized cost, if it has been estimated since the last
    /// invalidation.
    #[must_use]
    pub const fn cost(&self) -> Option<f64> {
        self.cost
    }

    /// Variables consumed by this node or any node downstream of it.
    /// `None` until a liveness pass has run.
    #[must_use]
    pub const fn vars_used_later(&self) -> Option<&HashSet<VariableId>> {
        self.vars_used_later.as_ref()
    }

    /// Variables already produced when this node runs. `None` until a
    /// liveness pass has run.
    #[must_use]
    pub const fn vars_valid(&self) -> Option<&HashSet<VariableId>> {
        self.vars_valid.as_ref()
    }

    /// The register frame depth assigned by the last register pass.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Registers whose values die at this node and are to be cleared
    /// after it ran. Assigned by the register pass.
    #[must_use]
    pub const fn regs_to_clear(&self) -> &HashSet<RegisterId> {
        &self.regs_to_clear
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub(crate) fn set_regs_to_clear(&mut self, regs: HashSet<RegisterId>) {
        self.regs_to_clear = regs;
    }
}

/// Visitor over a plan subtree.
///
/// The walk is depth-first: `before` fires on the way down (return
/// `true` to abort the whole walk), dependencies are visited next, then
/// nested subqueries, then `after` fires on the way up. Subquery descent
/// is opt-out via `enter_subquery`.
pub trait PlanVisitor {
    /// Called before a node's dependencies. Return `true` to abort.
    fn before(&mut self, _node: &ExecutionNode) -> bool {
        false
    }

    /// Called after a node's dependencies and subqueries.
    fn after(&mut self, _node: &ExecutionNode) {}

    /// Whether to descend into a subquery. `node` is the subquery node,
    /// `root` the nested plan root.
    fn enter_subquery(&mut self, _node: &ExecutionNode, _root: &ExecutionNode) -> bool {
        true
    }

    /// Called after a subquery subtree has been walked.
    fn leave_subquery(&mut self, _node: &ExecutionNode, _root: &ExecutionNode) {}
}

/// An execution plan: the arena of nodes plus the designated root.
///
/// Nested subquery plans live in the same arena as the main query; a
/// subquery payload points at its nested root by id.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    nodes: Vec<ExecutionNode>,
    index: HashMap<ExecutionNodeId, usize>,
    next_id: u64,
    root: Option<ExecutionNodeId>,
    var_usage_valid: bool,
    cost_model: CostModel,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionPlan {
    /// Creates an empty plan with the default cost model.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cost_model(CostModel::default())
    }

    /// Creates an empty plan with an explicit cost model.
    #[must_use]
    pub fn with_cost_model(cost_model: CostModel) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
            root: None,
            var_usage_valid: false,
            cost_model,
        }
    }

    /// The cost model used by this plan.
    #[must_use]
    pub const fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    // ========== Arena ==========

    /// Inserts a node with a freshly assigned id.
    pub fn add_node(&mut self, kind: NodeKind) -> ExecutionNodeId {
        let id = ExecutionNodeId::new(self.next_id);
        self.next_id += 1;
        self.index.insert(id, self.nodes.len());
        self.nodes.push(ExecutionNode::new(id, kind));
        id
    }

    /// Inserts a node under an externally chosen id, as plan import does.
    pub fn add_node_with_id(
        &mut self,
        id: ExecutionNodeId,
        kind: NodeKind,
    ) -> PlanResult<ExecutionNodeId> {
        if self.index.contains_key(&id) {
            return Err(PlanError::DuplicateNodeId(id.as_u64()));
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(ExecutionNode::new(id, kind));
        if id.as_u64() >= self.next_id {
            self.next_id = id.as_u64() + 1;
        }
        Ok(id)
    }

    /// Designates the plan root.
    pub fn set_root(&mut self, id: ExecutionNodeId) {
        self.root = Some(id);
    }

    /// The plan root, if one has been designated.
    #[must_use]
    pub const fn root(&self) -> Option<ExecutionNodeId> {
        self.root
    }

    /// Whether the arena contains a node under this id.
    #[must_use]
    pub fn contains(&self, id: ExecutionNodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by id.
    ///
    /// # Panics
    /// Panics if the id does not belong to this plan; handles are only
    /// valid within the arena that minted them.
    #[must_use]
    pub fn node(&self, id: ExecutionNodeId) -> &ExecutionNode {
        &self.nodes[self.index[&id]]
    }

    /// Looks up a node by id, returning `None` for foreign ids.
    #[must_use]
    pub fn get_node(&self, id: ExecutionNodeId) -> Option<&ExecutionNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    fn node_mut(&mut self, id: ExecutionNodeId) -> &mut ExecutionNode {
        &mut self.nodes[self.index[&id]]
    }

    /// Mutable access to a node's operator payload.
    ///
    /// Editing a payload changes what the node reads and writes, so the
    /// cost memo and any liveness state of the subtree are dropped.
    ///
    /// # Panics
    /// Panics if the id does not belong to this plan.
    pub fn kind_mut(&mut self, id: ExecutionNodeId) -> &mut NodeKind {
        self.invalidate_cost(id);
        self.invalidate_var_usage();
        &mut self.node_mut(id).kind
    }

    /// All nodes of one operator kind, in arena order.
    #[must_use]
    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<ExecutionNodeId> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == node_type)
            .map(ExecutionNode::id)
            .collect()
    }

    /// Ids of all nodes, in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = ExecutionNodeId> + '_ {
        self.nodes.iter().map(ExecutionNode::id)
    }

    // ========== Edges ==========

    /// Links `node` to pull rows from `dependency`. Both halves of the
    /// edge are written together.
    pub fn add_dependency(&mut self, node: ExecutionNodeId, dependency: ExecutionNodeId) {
        self.node_mut(node).dependencies.push(dependency);
        self.node_mut(dependency).parents.push(node);
    }

    /// Replaces the dependency edge `node -> old` with `node -> new`,
    /// keeping its position in the pull order.
    ///
    /// Returns `false` without touching anything when no such edge
    /// exists. A dangling back-edge on the old dependency is cleaned up
    /// best-effort; its absence is logged, not fatal.
    pub fn replace_dependency(
        &mut self,
        node: ExecutionNodeId,
        old: ExecutionNodeId,
        new: ExecutionNodeId,
    ) -> bool {
        let Some(pos) =
            self.node(node).dependencies.iter().position(|&d| d == old)
        else {
            return false;
        };

        self.node_mut(node).dependencies[pos] = new;
        self.node_mut(new).parents.push(node);

        let old_node = self.node_mut(old);
        if let Some(parent_pos) = old_node.parents.iter().position(|&p| p == node) {
            old_node.parents.remove(parent_pos);
        } else {
            trace!(node = %node, old = %old, "stale parent edge was already gone");
        }
        true
    }

    /// Removes the dependency edge `node -> dependency`.
    ///
    /// Returns `false` when no such edge exists. As with
    /// [`replace_dependency`](Self::replace_dependency), a missing
    /// back-edge is tolerated.
    pub fn remove_dependency(
        &mut self,
        node: ExecutionNodeId,
        dependency: ExecutionNodeId,
    ) -> bool {
        let Some(pos) =
            self.node(node).dependencies.iter().position(|&d| d == dependency)
        else {
            return false;
        };
        self.node_mut(node).dependencies.remove(pos);

        let dep_node = self.node_mut(dependency);
        if let Some(parent_pos) = dep_node.parents.iter().position(|&p| p == node) {
            dep_node.parents.remove(parent_pos);
        } else {
            trace!(node = %node, dependency = %dependency, "stale parent edge was already gone");
        }
        true
    }

    /// Removes all dependency edges of `node`.
    pub fn remove_dependencies(&mut self, node: ExecutionNodeId) {
        let deps = std::mem::take(&mut self.node_mut(node).dependencies);
        for dep in deps {
            let dep_node = self.node_mut(dep);
            if let Some(pos) = dep_node.parents.iter().position(|&p| p == node) {
                dep_node.parents.remove(pos);
            }
        }
    }

    // ========== Cost ==========

    /// The estimated cost of the subtree rooted at `id`, memoized per
    /// node until invalidated.
    pub fn cost_of(&mut self, id: ExecutionNodeId) -> f64 {
        if let Some(cost) = self.node(id).cost {
            return cost;
        }
        let model = self.cost_model;
        let cost = model.estimate(self, id);
        assert!(cost >= 0.0 && cost.is_finite(), "cost estimate out of range: {cost}");
        self.node_mut(id).cost = Some(cost);
        cost
    }

    /// Summed memoized cost of a node's dependencies.
    pub(crate) fn dependency_cost(&mut self, id: ExecutionNodeId) -> f64 {
        let deps = self.node(id).dependencies.clone();
        deps.into_iter().map(|dep| self.cost_of(dep)).sum()
    }

    /// Drops the cost memo of `id` and everything upstream of it.
    /// Idempotent; shared upstream nodes are visited once.
    pub fn invalidate_cost(&mut self, id: ExecutionNodeId) {
        let mut visited = HashSet::new();
        self.invalidate_cost_inner(id, &mut visited);
    }

    fn invalidate_cost_inner(
        &mut self,
        id: ExecutionNodeId,
        visited: &mut HashSet<ExecutionNodeId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        self.node_mut(id).cost = None;
        let deps = self.node(id).dependencies.clone();
        for dep in deps {
            self.invalidate_cost_inner(dep, visited);
        }
    }

    // ========== Traversal ==========

    /// Walks the subtree under `root` depth-first with `visitor`.
    /// Returns `true` when the visitor aborted the walk.
    pub fn walk<V: PlanVisitor>(&self, root: ExecutionNodeId, visitor: &mut V) -> bool {
        self.walk_inner(root, visitor)
    }

    fn walk_inner<V: PlanVisitor>(&self, id: ExecutionNodeId, visitor: &mut V) -> bool {
        let node = self.node(id);
        if visitor.before(node) {
            return true;
        }
        for &dep in &node.dependencies {
            if self.walk_inner(dep, visitor) {
                return true;
            }
        }
        if let NodeKind::Subquery(subquery) = &node.kind {
            if let Some(sub_root) = subquery.subquery() {
                let root_node = self.node(sub_root);
                if visitor.enter_subquery(node, root_node) {
                    if self.walk_inner(sub_root, visitor) {
                        return true;
                    }
                    visitor.leave_subquery(node, self.node(sub_root));
                }
            }
        }
        visitor.after(self.node(id));
        false
    }

    // ========== Variable liveness ==========

    /// Whether the per-node liveness sets are current.
    #[must_use]
    pub const fn var_usage_valid(&self) -> bool {
        self.var_usage_valid
    }

    /// Drops all per-node liveness state.
    pub fn invalidate_var_usage(&mut self) {
        for node in &mut self.nodes {
            node.vars_used_later = None;
            node.vars_valid = None;
        }
        self.var_usage_valid = false;
    }

    /// Computes `vars_used_later` and `vars_valid` for every node
    /// reachable from the root.
    ///
    /// `vars_used_later` accumulates top-down (a variable is "used
    /// later" at a node when some node downstream of it consumes it);
    /// `vars_valid` accumulates bottom-up (a variable is valid once some
    /// dependency produced it). Subqueries start with an empty used set
    /// of their own but inherit the valid set of their surroundings.
    pub fn find_var_usage(&mut self) -> PlanResult<()> {
        let root = self.root.ok_or(PlanError::MissingRoot)?;
        self.invalidate_var_usage();
        let mut used_later = HashSet::new();
        let mut valid = HashSet::new();
        self.var_usage_walk(root, &mut used_later, &mut valid);
        self.var_usage_valid = true;
        debug!(nodes = self.nodes.len(), "variable liveness pass complete");
        Ok(())
    }

    fn var_usage_walk(
        &mut self,
        id: ExecutionNodeId,
        used_later: &mut HashSet<VariableId>,
        valid: &mut HashSet<VariableId>,
    ) {
        let used_here: Vec<VariableId> =
            self.variables_used_here(id).iter().map(|v| v.id()).collect();

        self.node_mut(id).vars_used_later = Some(used_later.clone());
        used_later.extend(used_here);

        let deps = self.node(id).dependencies.clone();
        for dep in deps {
            self.var_usage_walk(dep, used_later, valid);
        }

        if let NodeKind::Subquery(subquery) = &self.node(id).kind {
            if let Some(sub_root) = subquery.subquery() {
                let mut sub_used = HashSet::new();
                let mut sub_valid = valid.clone();
                self.var_usage_walk(sub_root, &mut sub_used, &mut sub_valid);
            }
        }

        let set_here: Vec<VariableId> =
            self.node(id).kind.variables_set_here().iter().map(|v| v.id()).collect();
        valid.extend(set_here);
        self.node_mut(id).vars_valid = Some(valid.clone());
    }

    /// The variables node `id` reads per row.
    ///
    /// For subquery nodes this is the free-variable set of the nested
    /// plan: everything the subtree reads but does not produce itself.
    #[must_use]
    pub fn variables_used_here(&self, id: ExecutionNodeId) -> Vec<Arc<Variable>> {
        match &self.node(id).kind {
            NodeKind::Subquery(subquery) => match subquery.subquery() {
                Some(sub_root) => {
                    let mut used = HashMap::new();
                    let mut set = HashSet::new();
                    self.collect_subtree_usage(sub_root, &mut used, &mut set);
                    used.into_iter()
                        .filter(|(var_id, _)| !set.contains(var_id))
                        .map(|(_, var)| var)
                        .collect()
                }
                None => Vec::new(),
            },
            kind => kind.variables_used_here(),
        }
    }

    fn collect_subtree_usage(
        &self,
        id: ExecutionNodeId,
        used: &mut HashMap<VariableId, Arc<Variable>>,
        set: &mut HashSet<VariableId>,
    ) {
        // variables_used_here recurses into nested subqueries itself, so
        // plain payload traversal is enough here.
        for var in self.variables_used_here(id) {
            used.insert(var.id(), var);
        }
        for var in self.node(id).kind.variables_set_here() {
            set.insert(var.id());
        }
        let deps = self.node(id).dependencies.clone();
        for dep in deps {
            self.collect_subtree_usage(dep, used, set);
        }
    }

    /// Whether a runtime fault can originate in the subtree rooted at
    /// `id` itself (not in its dependencies). For subquery nodes this
    /// asks the whole nested plan.
    #[must_use]
    pub fn can_throw(&self, id: ExecutionNodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::Subquery(subquery) => match subquery.subquery() {
                Some(sub_root) => self.subtree_can_throw(sub_root),
                None => false,
            },
            kind => kind.can_throw_here(),
        }
    }

    fn subtree_can_throw(&self, id: ExecutionNodeId) -> bool {
        if self.can_throw(id) {
            return true;
        }
        self.node(id).dependencies.iter().any(|&dep| self.subtree_can_throw(dep))
    }

    // ========== Cloning ==========

    /// Clones the subtree under `root` into a fresh plan, keeping node
    /// ids stable.
    ///
    /// `with_dependencies` controls whether upstream nodes come along;
    /// nested subquery plans are always cloned whole, since a subquery
    /// payload without its root is meaningless. `with_state` carries the
    /// cost memo, liveness sets and register assignments over; without
    /// it the clone starts analytically blank.
    pub fn clone_subtree(
        &self,
        root: ExecutionNodeId,
        with_dependencies: bool,
        with_state: bool,
    ) -> PlanResult<ExecutionPlan> {
        let mut target = ExecutionPlan::with_cost_model(self.cost_model);
        self.clone_into(root, &mut target, with_dependencies, with_state)?;
        target.set_root(root);
        target.next_id = self.next_id;
        target.var_usage_valid = with_state && self.var_usage_valid;
        Ok(target)
    }

    fn clone_into(
        &self,
        id: ExecutionNodeId,
        target: &mut ExecutionPlan,
        with_dependencies: bool,
        with_state: bool,
    ) -> PlanResult<()> {
        if target.contains(id) {
            // Shared node reached over a second edge.
            return Ok(());
        }
        let source = self.node(id);
        target.add_node_with_id(id, source.kind.clone())?;
        if with_state {
            let copy = target.node_mut(id);
            copy.cost = source.cost;
            copy.vars_used_later = source.vars_used_later.clone();
            copy.vars_valid = source.vars_valid.clone();
            copy.depth = source.depth;
            copy.regs_to_clear = source.regs_to_clear.clone();
        }
        if let NodeKind::Subquery(subquery) = &source.kind {
            if let Some(sub_root) = subquery.subquery() {
                self.clone_into(sub_root, target, true, with_state)?;
            }
        }
        if with_dependencies {
            for &dep in &source.dependencies {
                self.clone_into(dep, target, true, with_state)?;
                target.add_dependency(id, dep);
            }
        }
        Ok(())
    }

    // ========== Register plumbing ==========

    pub(crate) fn set_depth(&mut self, id: ExecutionNodeId, depth: usize) {
        self.node_mut(id).set_depth(depth);
    }

    pub(crate) fn set_regs_to_clear(
        &mut self,
        id: ExecutionNodeId,
        regs: HashSet<RegisterId>,
    ) {
        self.node_mut(id).set_regs_to_clear(regs);
    }

    // ========== Display ==========

    fn fmt_subtree(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: ExecutionNodeId,
        indent: usize,
    ) -> fmt::Result {
        let node = self.node(id);
        writeln!(f, "{:indent$}{} [{}]", "", node.kind, node.id, indent = indent)?;
        if let NodeKind::Subquery(subquery) = &node.kind {
            if let Some(sub_root) = subquery.subquery() {
                self.fmt_subtree(f, sub_root, indent + 4)?;
            }
        }
        for &dep in &node.dependencies {
            self.fmt_subtree(f, dep, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_subtree(f, root, 0),
            None => writeln!(f, "(empty plan)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Collection;
    use crate::expression::Expression;
    use crate::plan::node::{
        CalculationNode, EnumerateCollectionNode, FilterNode, LimitNode, ReturnNode,
        SubqueryNode,
    };
    use crate::variable::VariableRegistry;

    fn scan_plan() -> (ExecutionPlan, VariableRegistry, Vec<ExecutionNodeId>) {
        let mut registry = VariableRegistry::new();
        let doc = registry.fresh("doc");
        let cond = registry.fresh("cond");
        let collection = Arc::new(Collection::new("users", 1000));

        let mut plan = ExecutionPlan::new();
        let singleton = plan.add_node(NodeKind::Singleton);
        let scan = plan.add_node(NodeKind::EnumerateCollection(EnumerateCollectionNode {
            collection,
            out_variable: Arc::clone(&doc),
        }));
        let calc = plan.add_node(NodeKind::Calculation(CalculationNode {
            expression: Expression::attribute_access(Arc::clone(&doc), "active"),
            out_variable: Arc::clone(&cond),
        }));
        let filter = plan.add_node(NodeKind::Filter(FilterNode {
            in_variable: Arc::clone(&cond),
        }));
        let ret = plan.add_node(NodeKind::Return(ReturnNode {
            in_variable: Arc::clone(&doc),
        }));

        plan.add_dependency(scan, singleton);
        plan.add_dependency(calc, scan);
        plan.add_dependency(filter, calc);
        plan.add_dependency(ret, filter);
        plan.set_root(ret);

        (plan, registry, vec![singleton, scan, calc, filter, ret])
    }

    #[test]
    fn edges_stay_symmetric() {
        let (plan, _, ids) = scan_plan();
        let [singleton, scan, ..] = ids[..] else { unreachable!() };

        assert!(plan.node(scan).has_dependency(singleton));
        assert_eq!(plan.node(singleton).parents(), &[scan]);
    }

    #[test]
    fn replace_dependency_flips_both_halves() {
        let (mut plan, _, ids) = scan_plan();
        let [singleton, scan, calc, filter, _] = ids[..] else { unreachable!() };

        // Splice the filter directly onto the scan.
        assert!(plan.replace_dependency(filter, calc, scan));
        assert!(plan.node(filter).has_dependency(scan));
        assert!(plan.node(scan).parents().contains(&filter));
        assert!(!plan.node(calc).parents().contains(&filter));

        // No edge, no change.
        assert!(!plan.replace_dependency(filter, calc, singleton));
    }

    #[test]
    fn remove_dependency_reports_missing_edges() {
        let (mut plan, _, ids) = scan_plan();
        let [singleton, scan, ..] = ids[..] else { unreachable!() };

        assert!(plan.remove_dependency(scan, singleton));
        assert!(!plan.remove_dependency(scan, singleton));
        assert!(plan.node(singleton).parents().is_empty());
    }

    #[test]
    fn cost_is_memoized_and_invalidation_is_partial() {
        let (mut plan, _, ids) = scan_plan();
        let [singleton, scan, _, filter, _] = ids[..] else { unreachable!() };

        let first = plan.cost_of(filter);
        assert!(first > 0.0);
        assert!(plan.node(singleton).cost().is_some());

        plan.invalidate_cost(filter);
        assert!(plan.node(filter).cost().is_none());
        assert!(plan.node(singleton).cost().is_none());

        // Re-estimation lands on the same value.
        let second = plan.cost_of(filter);
        assert!((first - second).abs() < 1e-9);

        // Invalidating only the scan leaves the filter memo alone.
        plan.invalidate_cost(scan);
        assert!(plan.node(filter).cost().is_some());
        assert!(plan.node(scan).cost().is_none());
    }

    #[test]
    fn walk_visits_dependencies_before_after_hooks() {
        struct Recorder {
            before: Vec<NodeType>,
            after: Vec<NodeType>,
        }
        impl PlanVisitor for Recorder {
            fn before(&mut self, node: &ExecutionNode) -> bool {
                self.before.push(node.node_type());
                false
            }
            fn after(&mut self, node: &ExecutionNode) {
                self.after.push(node.node_type());
            }
        }

        let (plan, _, ids) = scan_plan();
        let mut recorder = Recorder { before: Vec::new(), after: Vec::new() };
        let root = ids[4];
        assert!(!plan.walk(root, &mut recorder));

        assert_eq!(recorder.before.first(), Some(&NodeType::Return));
        assert_eq!(recorder.after.first(), Some(&NodeType::Singleton));
        assert_eq!(recorder.after.last(), Some(&NodeType::Return));
    }

    #[test]
    fn walk_aborts_on_before() {
        struct Abort;
        impl PlanVisitor for Abort {
            fn before(&mut self, node: &ExecutionNode) -> bool {
                node.node_type() == NodeType::Filter
            }
        }

        let (plan, _, ids) = scan_plan();
        assert!(plan.walk(ids[4], &mut Abort));
    }

    #[test]
    fn var_usage_flows_both_ways() {
        let (mut plan, registry, ids) = scan_plan();
        let [singleton, scan, _, filter, ret] = ids[..] else { unreachable!() };
        plan.find_var_usage().unwrap();
        assert!(plan.var_usage_valid());

        let doc_id = registry.get(crate::variable::VariableId::new(0)).unwrap().id();

        // The scan's output is needed downstream of the scan.
        assert!(plan.node(scan).vars_used_later().unwrap().contains(&doc_id));
        // Nothing is used later than the root.
        assert!(plan.node(ret).vars_used_later().unwrap().is_empty());
        // Nothing is valid at the singleton, everything at the filter.
        assert!(plan.node(singleton).vars_valid().unwrap().is_empty());
        assert!(plan.node(filter).vars_valid().unwrap().contains(&doc_id));
    }

    #[test]
    fn subquery_usage_is_its_free_variables() {
        let mut registry = VariableRegistry::new();
        let outer = registry.fresh("outer");
        let inner = registry.fresh("inner");
        let sub_out = registry.fresh("sub");

        let mut plan = ExecutionPlan::new();

        // Nested plan: RETURN outer + inner (inner produced inside).
        let sub_singleton = plan.add_node(NodeKind::Singleton);
        let sub_calc = plan.add_node(NodeKind::Calculation(CalculationNode {
            expression: Expression::new(
                "outer + 1",
                vec![Arc::clone(&outer)],
                false,
            ),
            out_variable: Arc::clone(&inner),
        }));
        let sub_ret = plan.add_node(NodeKind::Return(ReturnNode {
            in_variable: Arc::clone(&inner),
        }));
        plan.add_dependency(sub_calc, sub_singleton);
        plan.add_dependency(sub_ret, sub_calc);

        let subquery = plan.add_node(NodeKind::Subquery(SubqueryNode::new(
            sub_ret,
            Arc::clone(&sub_out),
        )));

        let used = plan.variables_used_here(subquery);
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].id(), outer.id());
    }

    #[test]
    fn clone_subtree_keeps_ids_and_optionally_state() {
        let (mut plan, _, ids) = scan_plan();
        let [_, scan, _, filter, ret] = ids[..] else { unreachable!() };
        plan.cost_of(ret);
        plan.find_var_usage().unwrap();

        let bare = plan.clone_subtree(ret, true, false).unwrap();
        assert_eq!(bare.len(), 5);
        assert_eq!(bare.root(), Some(ret));
        assert!(bare.node(filter).cost().is_none());
        assert!(!bare.var_usage_valid());
        assert!(bare.node(filter).has_dependency(ids[2]));

        let full = plan.clone_subtree(ret, true, true).unwrap();
        assert_eq!(full.node(scan).cost(), plan.node(scan).cost());
        assert!(full.var_usage_valid());

        // Without dependencies only the root comes along.
        let head = plan.clone_subtree(ret, false, false).unwrap();
        assert_eq!(head.len(), 1);
    }

    #[test]
    fn limit_cost_matches_the_windowed_cardinality() {
        let (mut plan, _, ids) = scan_plan();
        let ret = ids[4];
        let limit = plan.add_node(NodeKind::Limit(LimitNode { offset: 0, limit: 10 }));
        plan.replace_dependency(ret, ids[3], limit);
        plan.add_dependency(limit, ids[3]);
        plan.set_root(ret);

        // singleton 1 -> scan 1000 -> calc 2000 -> filter 210 -> limit 10.05
        let cost = plan.cost_of(ret);
        assert!((cost - 10.05).abs() < 1e-9);
    }
}
