//! Subproblem solution: primal/dual displacements and active sets.

use std::fmt;

use crate::iterate::Multipliers;

/// Status returned by the QP/LP solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubproblemStatus {
    /// Subproblem solved to optimality
    Optimal,
    /// Linearized constraints are inconsistent
    Infeasible,
    /// Subproblem is unbounded below
    Unbounded,
    /// Solver failure
    Error,
}

/// Indices at a bound in the subproblem solution.
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    /// Variables at their lower displacement bound
    pub bounds_at_lower: Vec<usize>,
    /// Variables at their upper displacement bound
    pub bounds_at_upper: Vec<usize>,
    /// Constraints at their lower bound (equalities included)
    pub constraints_at_lower: Vec<usize>,
    /// Constraints at their upper bound
    pub constraints_at_upper: Vec<usize>,
}

/// Partition of the constraints produced when the subproblem solver detects
/// local inconsistency.
///
/// Invariant: the four sets are disjoint, their union is `{0, .., m-1}`, and
/// `infeasible` is exactly the union of the two signed infeasibility sets.
#[derive(Debug, Clone, Default)]
pub struct ConstraintPartition {
    /// Constraints whose linearization is satisfied
    pub feasible: Vec<usize>,
    /// Constraints violated below their lower bound
    pub lower_bound_infeasible: Vec<usize>,
    /// Constraints violated above their upper bound
    pub upper_bound_infeasible: Vec<usize>,
    /// All violated constraints
    pub infeasible: Vec<usize>,
}

impl ConstraintPartition {
    /// Check the partition invariant against the constraint count.
    pub fn is_consistent(&self, number_constraints: usize) -> bool {
        let total =
            self.feasible.len() + self.lower_bound_infeasible.len() + self.upper_bound_infeasible.len();
        let union_matches = self.infeasible.len()
            == self.lower_bound_infeasible.len() + self.upper_bound_infeasible.len();
        total == number_constraints && union_matches
    }
}

/// Solution of one subproblem.
#[derive(Debug, Clone)]
pub struct Direction {
    /// Primal displacement d
    pub x: Vec<f64>,
    /// Multiplier displacements (trial multipliers = current + α·displacement)
    pub multipliers: Multipliers,
    /// Active sets at the subproblem solution
    pub active_set: ActiveSet,
    /// Optimal value of the subproblem model
    pub objective: f64,
    /// Solver status
    pub status: SubproblemStatus,
    /// Norm of the primal displacement (∞-norm)
    pub norm: f64,
    /// Objective multiplier the direction was computed with
    pub objective_multiplier: f64,
    /// Partition reported for inconsistent linearizations
    pub constraint_partition: Option<ConstraintPartition>,
}

impl Direction {
    /// All-zero direction for the given dimensions.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Self {
            x: vec![0.0; number_variables],
            multipliers: Multipliers::new(number_variables, number_constraints),
            active_set: ActiveSet::default(),
            objective: 0.0,
            status: SubproblemStatus::Optimal,
            norm: 0.0,
            objective_multiplier: 1.0,
            constraint_partition: None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "direction: status {:?}, model objective {:e}, norm {:e}",
            self.status, self.objective, self.norm
        )?;
        write!(f, "  d = {:?}", self.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_consistency() {
        let partition = ConstraintPartition {
            feasible: vec![0, 2],
            lower_bound_infeasible: vec![1],
            upper_bound_infeasible: vec![3],
            infeasible: vec![1, 3],
        };
        assert!(partition.is_consistent(4));
        assert!(!partition.is_consistent(5));

        let broken = ConstraintPartition {
            feasible: vec![0],
            lower_bound_infeasible: vec![1],
            upper_bound_infeasible: vec![],
            infeasible: vec![],
        };
        assert!(!broken.is_consistent(2));
    }
}
