//! Register planning.
//!
//! The execution runtime passes rows between operators as blocks of
//! registers. This pass assigns every variable a register slot and a
//! frame depth, bottom-up over the plan. A new frame opens at each
//! operator that changes the row cardinality of the stream (collection,
//! index and list enumerations, and grouping); all other producers
//! extend the current frame.
//!
//! The result is an immutable [`RegisterPlan`] lookup table. Nested
//! subqueries get their own table, seeded from the frames visible at
//! their subquery node, so a subquery plan reuses register numbering
//! independently of its siblings.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::plan::graph::{ExecutionNodeId, ExecutionPlan};
use crate::plan::node::{NodeKind, NodeType};
use crate::variable::VariableId;

/// A register slot index within a row block.
pub type RegisterId = u32;

/// Hard ceiling on assignable register slots per plan region.
pub const MAX_REGISTER_ID: RegisterId = 1000;

/// Where one variable lives: its frame depth and register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
    /// Frame depth the variable is assigned in.
    pub depth: usize,
    /// Register slot holding the variable's value.
    pub register: RegisterId,
}

/// The immutable result of a register pass over one plan region.
#[derive(Debug, Clone, Default)]
pub struct RegisterPlan {
    var_info: HashMap<VariableId, VarInfo>,
    nr_regs_here: Vec<usize>,
    nr_regs: Vec<usize>,
    total_nr_regs: usize,
    subquery_plans: HashMap<ExecutionNodeId, RegisterPlan>,
}

impl RegisterPlan {
    /// Where a variable lives, if it was assigned in this region.
    #[must_use]
    pub fn var_info(&self, variable: VariableId) -> Option<&VarInfo> {
        self.var_info.get(&variable)
    }

    /// The register slot of a variable, if assigned in this region.
    #[must_use]
    pub fn register_of(&self, variable: VariableId) -> Option<RegisterId> {
        self.var_info.get(&variable).map(|info| info.register)
    }

    /// Number of registers introduced at each frame depth.
    #[must_use]
    pub fn nr_regs_here(&self) -> &[usize] {
        &self.nr_regs_here
    }

    /// Cumulative number of registers visible at each frame depth.
    #[must_use]
    pub fn nr_regs(&self) -> &[usize] {
        &self.nr_regs
    }

    /// Total number of registers assigned in this region.
    #[must_use]
    pub const fn total_nr_regs(&self) -> usize {
        self.total_nr_regs
    }

    /// The nested register table of a subquery node in this region.
    #[must_use]
    pub fn subquery_plan(&self, node: ExecutionNodeId) -> Option<&RegisterPlan> {
        self.subquery_plans.get(&node)
    }

    /// Number of variables assigned in this region.
    #[must_use]
    pub fn assigned_variables(&self) -> usize {
        self.var_info.len()
    }
}

/// Mutable walk state; frozen into a [`RegisterPlan`] per region.
struct RegisterState {
    var_info: HashMap<VariableId, VarInfo>,
    nr_regs_here: Vec<usize>,
    nr_regs: Vec<usize>,
    depth: usize,
    total: usize,
    subqueries: Vec<ExecutionNodeId>,
}

impl RegisterState {
    fn fresh() -> Self {
        Self {
            var_info: HashMap::new(),
            nr_regs_here: vec![0],
            nr_regs: vec![0],
            depth: 0,
            total: 0,
            subqueries: Vec::new(),
        }
    }

    /// Seeds the state for a subquery region: the frames visible at the
    /// subquery node carry over, everything deeper is out of scope, and
    /// the body starts in a fresh frame of its own one level down.
    fn for_subquery(parent: &RegisterPlan, depth: usize) -> Self {
        let mut nr_regs_here = parent.nr_regs_here.clone();
        let mut nr_regs = parent.nr_regs.clone();
        nr_regs_here.truncate(depth + 1);
        nr_regs.truncate(depth + 1);
        let total = nr_regs[depth];
        nr_regs_here.push(0);
        nr_regs.push(total);
        Self {
            var_info: parent.var_info.clone(),
            nr_regs_here,
            nr_regs,
            depth: depth + 1,
            total,
            subqueries: Vec::new(),
        }
    }

    fn open_frame(&mut self) {
        self.depth += 1;
        self.nr_regs_here.push(0);
        let carried = self.nr_regs[self.depth - 1];
        self.nr_regs.push(carried);
    }

    fn assign(&mut self, variable: VariableId) -> PlanResult<()> {
        self.nr_regs_here[self.depth] += 1;
        self.nr_regs[self.depth] += 1;
        self.var_info.insert(
            variable,
            VarInfo { depth: self.depth, register: self.total as RegisterId },
        );
        self.total += 1;
        if self.total > MAX_REGISTER_ID as usize {
            return Err(PlanError::TooManyRegisters { limit: MAX_REGISTER_ID });
        }
        Ok(())
    }

    fn freeze(self) -> (RegisterPlan, Vec<ExecutionNodeId>) {
        let plan = RegisterPlan {
            var_info: self.var_info,
            nr_regs_here: self.nr_regs_here,
            nr_regs: self.nr_regs,
            total_nr_regs: self.total,
            subquery_plans: HashMap::new(),
        };
        (plan, self.subqueries)
    }
}

impl ExecutionPlan {
    /// Runs the register pass from the plan root.
    ///
    /// Requires current variable liveness and recomputes it when stale.
    /// Writes each node's frame depth and dead-register set back onto
    /// the node; all variable-to-register facts land in the returned
    /// table.
    pub fn plan_registers(&mut self) -> PlanResult<RegisterPlan> {
        if !self.var_usage_valid() {
            self.find_var_usage()?;
        }
        let root = self.root().ok_or(PlanError::MissingRoot)?;
        let plan = self.plan_region(root, RegisterState::fresh())?;
        debug!(
            registers = plan.total_nr_regs(),
            frames = plan.nr_regs().len(),
            "register pass complete"
        );
        Ok(plan)
    }

    /// Plans one region (main query or one subquery body), then recurses
    /// into the subquery nodes found in it.
    fn plan_region(
        &mut self,
        root: ExecutionNodeId,
        mut state: RegisterState,
    ) -> PlanResult<RegisterPlan> {
        self.register_walk(root, &mut state)?;
        let (mut plan, subqueries) = state.freeze();

        for subquery_id in subqueries {
            let depth = self.node(subquery_id).depth();
            let sub_root = match self.node(subquery_id).kind() {
                NodeKind::Subquery(subquery) => subquery
                    .subquery()
                    .ok_or(PlanError::SubqueryMissing(subquery_id.as_u64()))?,
                _ => continue,
            };
            let sub_state = RegisterState::for_subquery(&plan, depth);
            let sub_plan = self.plan_region(sub_root, sub_state)?;
            plan.subquery_plans.insert(subquery_id, sub_plan);
        }
        Ok(plan)
    }

    /// Post-order walk over one region; does not descend into subqueries.
    fn register_walk(
        &mut self,
        id: ExecutionNodeId,
        state: &mut RegisterState,
    ) -> PlanResult<()> {
        let deps = self.node(id).dependencies().to_vec();
        for dep in deps {
            self.register_walk(dep, state)?;
        }

        match self.node(id).node_type() {
            NodeType::EnumerateCollection
            | NodeType::EnumerateList
            | NodeType::IndexRange
            | NodeType::Aggregate => state.open_frame(),
            NodeType::Subquery => state.subqueries.push(id),
            _ => {}
        }

        for variable in self.node(id).kind().variables_set_here() {
            state.assign(variable.id())?;
        }
        self.set_depth(id, state.depth);

        // Registers of variables that are valid here but never read
        // again die at this node.
        let node = self.node(id);
        let regs: HashSet<RegisterId> = match (node.vars_valid(), node.vars_used_later())
        {
            (Some(valid), Some(used_later)) => valid
                .difference(used_later)
                .filter_map(|var| state.var_info.get(var).map(|info| info.register))
                .collect(),
            _ => HashSet::new(),
        };
        self.set_regs_to_clear(id, regs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::catalog::Collection;
    use crate::expression::Expression;
    use crate::plan::node::{
        CalculationNode, EnumerateCollectionNode, FilterNode, ReturnNode, SubqueryNode,
    };
    use crate::variable::VariableRegistry;

    #[test]
    fn registers_follow_production_order() {
        let mut registry = VariableRegistry::new();
        let doc = registry.fresh("doc");
        let cond = registry.fresh("cond");
        let collection = Arc::new(Collection::new("users", 100));

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

        let registers = plan.plan_registers().unwrap();

        // doc is produced first, cond second, both in the scan's frame.
        assert_eq!(registers.register_of(doc.id()), Some(0));
        assert_eq!(registers.register_of(cond.id()), Some(1));
        assert_eq!(registers.var_info(doc.id()).unwrap().depth, 1);
        assert_eq!(registers.var_info(cond.id()).unwrap().depth, 1);
        assert_eq!(registers.total_nr_regs(), 2);
        assert_eq!(registers.nr_regs(), &[0, 2]);

        // The scan opens a frame; singleton stays at depth zero.
        assert_eq!(plan.node(singleton).depth(), 0);
        assert_eq!(plan.node(scan).depth(), 1);
        assert_eq!(plan.node(ret).depth(), 1);

        // cond is dead after the filter consumed it.
        assert!(plan.node(filter).regs_to_clear().contains(&1));
        assert!(!plan.node(filter).regs_to_clear().contains(&0));

        // Re-running is deterministic.
        let again = plan.plan_registers().unwrap();
        assert_eq!(again.register_of(doc.id()), Some(0));
        assert_eq!(again.total_nr_regs(), 2);
    }

    #[test]
    fn subquery_gets_its_own_seeded_table() {
        let mut registry = VariableRegistry::new();
        let outer = registry.fresh("outer");
        let inner = registry.fresh("inner");
        let sub_out = registry.fresh("sub");
        let collection = Arc::new(Collection::new("users", 100));

        let mut plan = ExecutionPlan::new();
        let singleton = plan.add_node(NodeKind::Singleton);
        let scan = plan.add_node(NodeKind::EnumerateCollection(EnumerateCollectionNode {
            collection,
            out_variable: Arc::clone(&outer),
        }));

        // Nested body: RETURN inner computed from outer.
        let sub_singleton = plan.add_node(NodeKind::Singleton);
        let sub_calc = plan.add_node(NodeKind::Calculation(CalculationNode {
            expression: Expression::new("outer * 2", vec![Arc::clone(&outer)], false),
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
        let ret = plan.add_node(NodeKind::Return(ReturnNode {
            in_variable: Arc::clone(&sub_out),
        }));
        plan.add_dependency(scan, singleton);
        plan.add_dependency(subquery, scan);
        plan.add_dependency(ret, subquery);
        plan.set_root(ret);

        let registers = plan.plan_registers().unwrap();

        // Main region: outer then sub, in the scan's frame.
        assert_eq!(registers.register_of(outer.id()), Some(0));
        assert_eq!(registers.register_of(sub_out.id()), Some(1));

        // Nested region sees outer's frame and numbers its own
        // registers after the slots that frame already claims.
        let nested = registers.subquery_plan(subquery).unwrap();
        assert_eq!(nested.register_of(outer.id()), Some(0));
        assert_eq!(nested.register_of(inner.id()), Some(2));
        assert_eq!(nested.total_nr_regs(), 3);

        // The body opens a frame of its own: everything it produces
        // lives strictly below the subquery node's depth.
        let inner_info = nested.var_info(inner.id()).unwrap();
        assert!(inner_info.depth > plan.node(subquery).depth());
        assert_eq!(inner_info.depth, 2);
        assert_eq!(plan.node(sub_ret).depth(), 2);
        assert_eq!(nested.nr_regs(), &[0, 2, 3]);
    }

    #[test]
    fn register_exhaustion_is_an_error() {
        let mut registry = VariableRegistry::new();
        let mut plan = ExecutionPlan::new();
        let singleton = plan.add_node(NodeKind::Singleton);
        let mut tail = singleton;
        for i in 0..=MAX_REGISTER_ID {
            let out = registry.fresh(format!("v{i}"));
            let calc = plan.add_node(NodeKind::Calculation(CalculationNode {
                expression: Expression::new("1", Vec::new(), false),
                out_variable: out,
            }));
            plan.add_dependency(calc, tail);
            tail = calc;
        }
        plan.set_root(tail);

        assert!(matches!(
            plan.plan_registers(),
            Err(PlanError::TooManyRegisters { limit: MAX_REGISTER_ID })
        ));
    }
}
