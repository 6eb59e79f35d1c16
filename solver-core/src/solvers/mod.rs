//! External QP/LP solver boundary.
//!
//! The engine talks to quadratic and linear programming solvers through the
//! traits below; a factory dispatches on option names, and names that this
//! build does not provide are configuration errors.

pub mod pdqp;

use crate::direction::Direction;
use crate::error::{ConfigurationError, NumericalError};
use crate::linalg::{CooSymmetricMatrix, RectangularMatrix, SparseVector};
use crate::problem::Bound;
use crate::statistics::Statistics;

pub use pdqp::PdqpSolver;

/// Inputs of one QP/LP solve, in displacement form.
pub struct SubproblemData<'a> {
    /// Variable displacement bounds (may include elastic columns)
    pub variable_bounds: &'a [Bound],
    /// Linearized constraint bounds
    pub constraint_bounds: &'a [Bound],
    /// Objective gradient over all columns
    pub objective_gradient: &'a SparseVector,
    /// Constraint Jacobian (one row per constraint)
    pub constraint_jacobian: &'a RectangularMatrix,
    /// Hessian; `None` for an LP. Its dimension may be smaller than the
    /// number of columns (elastic columns carry no curvature).
    pub hessian: Option<&'a CooSymmetricMatrix>,
    /// Initial point
    pub initial_point: &'a [f64],
}

impl SubproblemData<'_> {
    /// Number of columns of the subproblem.
    pub fn number_variables(&self) -> usize {
        self.variable_bounds.len()
    }

    /// Number of constraint rows.
    pub fn number_constraints(&self) -> usize {
        self.constraint_bounds.len()
    }
}

/// A solver for quadratic programs with two-sided linear constraints.
pub trait QpSolver {
    /// Solve the QP and return the direction with multipliers and active
    /// sets. The caller's memory layout is preserved: the direction has one
    /// entry per column of `data`.
    fn solve_qp(
        &mut self,
        statistics: &mut Statistics,
        data: &SubproblemData,
    ) -> Result<Direction, NumericalError>;
}

/// A solver for linear programs (a QP without Hessian).
pub trait LpSolver {
    /// Solve the LP.
    fn solve_lp(
        &mut self,
        statistics: &mut Statistics,
        data: &SubproblemData,
    ) -> Result<Direction, NumericalError>;
}

/// Create a QP solver by name.
pub fn create_qp_solver(name: &str) -> Result<Box<dyn QpSolver>, ConfigurationError> {
    match name {
        "PDQP" => Ok(Box::new(PdqpSolver::new())),
        _ => Err(ConfigurationError::MissingSolver(name.to_string())),
    }
}

/// Create an LP solver by name.
pub fn create_lp_solver(name: &str) -> Result<Box<dyn LpSolver>, ConfigurationError> {
    match name {
        "PDQP" => Ok(Box::new(PdqpSolver::new())),
        _ => Err(ConfigurationError::MissingSolver(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_unknown_solver() {
        assert!(create_qp_solver("BQPD").is_err());
        assert!(create_lp_solver("CPLEX").is_err());
        assert!(create_qp_solver("PDQP").is_ok());
    }
}
