//! Minimal example: a constrained quadratic solved with the default
//! filter-SQP configuration.
//!
//! Solves:
//!   minimize    (x1 - 1)^2 + (x2 - 2.5)^2
//!   subject to  x1 - 2 x2 >= -2
//!               x1, x2 >= 0
//!
//! Optimal solution: x = (1.4, 1.7).

use solver_core::error::NumericalError;
use solver_core::linalg::{CooSymmetricMatrix, RectangularMatrix, SparseVector};
use solver_core::{solve, Bound, Options, Problem};

struct ConstrainedQuadratic;

impl Problem for ConstrainedQuadratic {
    fn name(&self) -> &str {
        "constrained-quadratic"
    }
    fn number_variables(&self) -> usize {
        2
    }
    fn number_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 2] = [
            Bound { lb: 0.0, ub: f64::INFINITY },
            Bound { lb: 0.0, ub: f64::INFINITY },
        ];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 1] = [Bound { lb: -2.0, ub: f64::INFINITY }];
        &BOUNDS
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.fill(2.0);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok((x[0] - 1.0).powi(2) + (x[1] - 2.5).powi(2))
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) -> Result<(), NumericalError> {
        constraints[0] = x[0] - 2.0 * x[1];
        Ok(())
    }
    fn evaluate_objective_gradient(
        &self,
        x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        gradient.insert(0, 2.0 * (x[0] - 1.0));
        gradient.insert(1, 2.0 * (x[1] - 2.5));
        Ok(())
    }
    fn evaluate_constraint_jacobian(
        &self,
        _x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        jacobian.row_mut(0).insert(0, 1.0);
        jacobian.row_mut(0).insert(1, -2.0);
        Ok(())
    }
    fn evaluate_lagrangian_hessian(
        &self,
        _x: &[f64],
        objective_multiplier: f64,
        _constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        hessian.insert(0, 0, 2.0 * objective_multiplier);
        hessian.insert(1, 1, 2.0 * objective_multiplier);
        Ok(())
    }
}

fn main() {
    let mut options = Options::default();
    options.set("verbose", "yes");

    match solve(&ConstrainedQuadratic, &options) {
        Ok(result) => result.print(true),
        Err(error) => eprintln!("solve failed: {}", error),
    }
}
