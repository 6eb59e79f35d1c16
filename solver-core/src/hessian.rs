//! Lagrangian Hessian models.
//!
//! The exact model evaluates ∇²ₓL through the problem. The convexified model
//! wraps it and corrects the inertia to (n, 0, 0) with a growing diagonal
//! shift, following Nocedal & Wright, p. 51.

use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::Iterate;
use crate::linalg::{CooSymmetricMatrix, DirectSymmetricIndefiniteSolver, EigenSymmetricSolver};
use crate::problem::Problem;
use crate::statistics::Statistics;

/// Strategy to evaluate (or approximate) the Lagrangian Hessian.
pub trait HessianModel {
    /// Evaluate the model at the iterate with the prevailing objective
    /// multiplier and the given constraint multipliers.
    fn evaluate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &Iterate,
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
    ) -> Result<(), NumericalError>;

    /// The current Hessian.
    fn hessian(&self) -> &CooSymmetricMatrix;

    /// Mutable access, used for proximal terms.
    fn hessian_mut(&mut self) -> &mut CooSymmetricMatrix;
}

/// Exact Hessian of the Lagrangian.
pub struct ExactHessian {
    hessian: CooSymmetricMatrix,
}

impl ExactHessian {
    /// Allocate for the given dimension and nonzero capacity.
    pub fn new(dimension: usize, capacity: usize) -> Self {
        Self {
            hessian: CooSymmetricMatrix::new(dimension, capacity),
        }
    }
}

impl HessianModel for ExactHessian {
    fn evaluate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &Iterate,
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
    ) -> Result<(), NumericalError> {
        iterate.evaluate_lagrangian_hessian(
            problem,
            statistics,
            objective_multiplier,
            constraint_multipliers,
            &mut self.hessian,
        )
    }

    fn hessian(&self) -> &CooSymmetricMatrix {
        &self.hessian
    }

    fn hessian_mut(&mut self) -> &mut CooSymmetricMatrix {
        &mut self.hessian
    }
}

/// Exact Hessian followed by inertia correction: the returned matrix is
/// positive definite, which guarantees bounded subproblems and descent
/// directions when no trust region restrains the step.
pub struct ConvexifiedHessian {
    exact: ExactHessian,
    solver: EigenSymmetricSolver,
}

impl ConvexifiedHessian {
    /// Allocate for the given dimension and nonzero capacity.
    pub fn new(dimension: usize, capacity: usize) -> Self {
        Self {
            exact: ExactHessian::new(dimension, capacity),
            solver: EigenSymmetricSolver::new(dimension),
        }
    }

    /// Shift the diagonal until the factorization reports inertia (n, 0, 0).
    fn correct_inertia(&mut self) -> Result<(), NumericalError> {
        const BETA: f64 = 1e-4;
        let hessian = self.exact.hessian_mut();

        let smallest_diagonal_entry = hessian.smallest_diagonal_entry();
        let mut shift = if smallest_diagonal_entry <= 0.0 {
            BETA - smallest_diagonal_entry
        } else {
            0.0
        };
        if 0.0 < shift {
            hessian.add_identity_multiple(shift);
        }

        self.solver.do_symbolic_factorization(hessian);
        self.solver.do_numerical_factorization(hessian)?;

        loop {
            if !self.solver.matrix_is_singular() && self.solver.number_negative_eigenvalues() == 0 {
                log::debug!("inertia correction accepted with shift {:e}", shift);
                return Ok(());
            }
            let previous_shift = shift;
            shift = if shift == 0.0 { BETA } else { 2.0 * shift };
            hessian.add_identity_multiple(shift - previous_shift);
            self.solver.do_numerical_factorization(hessian)?;
        }
    }
}

impl HessianModel for ConvexifiedHessian {
    fn evaluate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &Iterate,
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
    ) -> Result<(), NumericalError> {
        self.exact.evaluate(
            statistics,
            problem,
            iterate,
            objective_multiplier,
            constraint_multipliers,
        )?;
        self.correct_inertia()
    }

    fn hessian(&self) -> &CooSymmetricMatrix {
        self.exact.hessian()
    }

    fn hessian_mut(&mut self) -> &mut CooSymmetricMatrix {
        self.exact.hessian_mut()
    }
}

/// Create a Hessian model by option name. `convexify` forces inertia
/// correction on top of an exact evaluation (a line search needs a bounded
/// subproblem even when `exact` is configured).
pub fn create_hessian_model(
    kind: &str,
    dimension: usize,
    capacity: usize,
    convexify: bool,
) -> Result<Box<dyn HessianModel>, ConfigurationError> {
    match kind {
        "exact" => {
            if convexify {
                Ok(Box::new(ConvexifiedHessian::new(dimension, capacity)))
            } else {
                Ok(Box::new(ExactHessian::new(dimension, capacity)))
            }
        }
        "convexified" => Ok(Box::new(ConvexifiedHessian::new(dimension, capacity))),
        _ => Err(ConfigurationError::InvalidValue {
            option: "hessian_model".to_string(),
            value: kind.to_string(),
        }),
    }
}
