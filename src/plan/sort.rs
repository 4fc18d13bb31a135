//! Sort order descriptions and subsumption between them.
//!
//! To decide whether one sort makes another redundant, the planner
//! reduces each sort node to a [`SortInformation`]: the ordered list of
//! comparable sort keys, resolved through the nodes that produce the
//! sort variables. Keys are compared structurally (attribute path or
//! variable name plus direction); the producing node itself does not
//! participate in the comparison.

use crate::plan::graph::{ExecutionNodeId, ExecutionPlan};
use crate::plan::node::{NodeKind, SortElement};
use crate::variable::VariableId;

/// One resolved sort criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCriterion {
    /// The node producing the sort variable.
    pub node: ExecutionNodeId,
    /// Comparable form of the sort key: the attribute-access source or
    /// the plain variable name.
    pub key: String,
    /// Ascending order when true.
    pub ascending: bool,
}

/// How one sort order relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortCoverage {
    /// The orders differ, neither subsumes the other.
    Unequal,
    /// The other order is a strict prefix of ours: sorting by ours also
    /// establishes it.
    OtherLessAccurate,
    /// Our order is a strict prefix of the other.
    OurselvesLessAccurate,
    /// Both orders are identical.
    AllEqual,
}

/// The resolved sort order of one sort (or merge-gather) node.
#[derive(Debug, Clone, Default)]
pub struct SortInformation {
    /// Resolved criteria, most significant first.
    pub criteria: Vec<SortCriterion>,
    /// False when a sort variable has no producing node in the plan.
    pub is_valid: bool,
    /// True when a sort key is a computed expression rather than an
    /// attribute access or plain variable; complex keys are never
    /// comparable across nodes.
    pub is_complex: bool,
    /// True when resolving a sort key involves a throwing expression.
    pub can_throw: bool,
}

impl SortInformation {
    /// Whether sorting by `self` makes sorting by `other` redundant,
    /// and vice versa.
    ///
    /// Invalid or complex orders compare as [`SortCoverage::Unequal`]:
    /// a key that cannot be named structurally cannot be proven equal
    /// to anything.
    #[must_use]
    pub fn is_covered_by(&self, other: &SortInformation) -> SortCoverage {
        if !self.is_valid || !other.is_valid {
            return SortCoverage::Unequal;
        }
        if self.is_complex || other.is_complex {
            return SortCoverage::Unequal;
        }

        for (i, ours) in self.criteria.iter().enumerate() {
            let Some(theirs) = other.criteria.get(i) else {
                return SortCoverage::OtherLessAccurate;
            };
            if ours.ascending != theirs.ascending || ours.key != theirs.key {
                return SortCoverage::Unequal;
            }
        }
        if other.criteria.len() > self.criteria.len() {
            return SortCoverage::OurselvesLessAccurate;
        }
        SortCoverage::AllEqual
    }
}

impl ExecutionPlan {
    /// Resolves the sort order of a sort or merge-gather node.
    ///
    /// Each sort variable is traced to its producing node: a
    /// calculation that is a plain attribute access contributes its
    /// source form as the key, any other calculation marks the order
    /// complex, and a non-calculation producer contributes the
    /// variable's name. A variable nothing produces invalidates the
    /// whole order.
    #[must_use]
    pub fn sort_information(&self, node: ExecutionNodeId) -> SortInformation {
        let elements: &[SortElement] = match self.node(node).kind() {
            NodeKind::Sort(sort) => &sort.elements,
            NodeKind::Gather(gather) => &gather.elements,
            _ => return SortInformation::default(),
        };

        let mut info = SortInformation { is_valid: true, ..SortInformation::default() };
        for element in elements {
            let Some(setter) = self.producer_of(element.variable.id()) else {
                info.is_valid = false;
                continue;
            };

            let key = match self.node(setter).kind() {
                NodeKind::Calculation(calc) => {
                    if calc.expression.can_throw() {
                        info.can_throw = true;
                    }
                    if calc.expression.attribute_path().is_none() {
                        info.is_complex = true;
                    }
                    calc.expression.source().to_string()
                }
                _ => element.variable.name().to_string(),
            };
            info.criteria.push(SortCriterion {
                node: setter,
                key,
                ascending: element.ascending,
            });
        }
        info
    }

    /// The node producing a variable, if any node in the arena does.
    #[must_use]
    pub fn producer_of(&self, variable: VariableId) -> Option<ExecutionNodeId> {
        self.node_ids().find(|&id| {
            self.node(id)
                .kind()
                .variables_set_here()
                .iter()
                .any(|v| v.id() == variable)
        })
    }
}
