//! Karush: an SQP engine for smooth nonconvex nonlinear programming
//!
//! This library implements the iteration engine of a sequential
//! quadratic/linear programming solver for problems of the form
//!
//! ```text
//! minimize    f(x)
//! subject to  c_L <= c(x) <= c_U
//!             x_L <= x <= x_U
//! ```
//!
//! with smooth, generally nonconvex f and c. Starting from a primal-dual
//! guess, it produces iterates converging to a first-order stationary (KKT)
//! point or, failing that, to an infeasible stationary (Fritz-John) point.
//!
//! # Architecture
//!
//! Each outer iteration flows through four exchangeable ingredients:
//!
//! - **Subproblem** (`QP`, `LP`): the local model around the iterate
//! - **Constraint relaxation** (`l1-relaxation`, `feasibility-restoration`):
//!   handles inconsistent linearizations
//! - **Globalization strategy** (`penalty`, `filter`, `nonmonotone-filter`):
//!   the acceptance oracle
//! - **Globalization mechanism** (`TR`, `LS`): trust region or backtracking
//!
//! Ownership flows driver → mechanism → relaxation → subproblem → external
//! QP/LP solver; there are no back-pointers and no internal concurrency.
//!
//! # Example
//!
//! ```ignore
//! use solver_core::{solve, Options, Problem};
//!
//! let options = Options::default();   // filter SQP with a trust region
//! let result = solve(&my_problem, &options)?;
//! println!("{}: f = {}", result.status, result.objective);
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)] // acceptance tests thread many actors

pub mod direction;
pub mod driver;
pub mod error;
pub mod hessian;
pub mod iterate;
pub mod linalg;
pub mod mechanism;
pub mod options;
pub mod problem;
pub mod relaxation;
pub mod scaling;
pub mod solvers;
pub mod statistics;
pub mod strategy;
pub mod subproblem;

pub use direction::{ConstraintPartition, Direction, SubproblemStatus};
pub use driver::{Driver, SolveResult, TerminationStatus};
pub use error::{ConfigurationError, MechanismError, NumericalError, SolverError};
pub use iterate::{Iterate, Multipliers, ProgressMeasures, Residuals};
pub use options::Options;
pub use problem::{Bound, BoundKind, Problem};
pub use statistics::Statistics;

use iterate::compute_optimality_conditions;
use linalg::Norm;
use mechanism::create_globalization_mechanism;
use problem::project_into_bounds;
use relaxation::create_constraint_relaxation_strategy;
use scaling::{ScaledProblem, Scaling};

/// Solve a problem with the given options.
///
/// Builds the ingredient stack from the options, projects the initial point
/// into the variable bounds, runs the outer loop, and reports the terminal
/// status with the final iterate. When `scale_functions` is enabled, the
/// engine solves a scaled view of the problem and translates multipliers
/// back to original units.
pub fn solve(problem: &dyn Problem, options: &Options) -> Result<SolveResult, SolverError> {
    let mut statistics = Statistics::new();
    let first_iterate = initial_iterate(problem, options)?;

    if options.get_bool("scale_functions")? {
        let scaling = compute_initial_scaling(problem, options, &first_iterate, &mut statistics)?;
        let scaled_problem = ScaledProblem::new(problem, scaling);
        let mut result = solve_with_ingredients(&scaled_problem, options, statistics, first_iterate)?;

        // postsolve: back to original units
        let scaling = scaled_problem.scaling();
        scaling.unscale_multipliers(&mut result.iterate.multipliers);
        result.objective /= scaling.objective;
        // residuals of the original problem at the final point
        let mut postsolve_statistics = Statistics::new();
        result.iterate.clear();
        compute_optimality_conditions(
            problem,
            &mut postsolve_statistics,
            &mut result.iterate,
            problem.objective_sign(),
            Norm::from_option(options.get("residual_norm")?)?,
        )
        .map_err(SolverError::InitialEvaluation)?;
        Ok(result)
    } else {
        solve_with_ingredients(problem, options, statistics, first_iterate)
    }
}

/// Initial primal-dual iterate: the problem's starting point projected into
/// the variable bounds, with the problem's initial multipliers.
fn initial_iterate(problem: &dyn Problem, _options: &Options) -> Result<Iterate, SolverError> {
    let n = problem.number_variables();
    let m = problem.number_constraints();

    let mut x = vec![0.0; n];
    problem.initial_primal_point(&mut x);
    project_into_bounds(&mut x, problem.variable_bounds());

    let mut multipliers = Multipliers::new(n, m);
    problem.initial_dual_point(&mut multipliers.constraints);
    Ok(Iterate::from_point(x, multipliers))
}

/// Scale factors from the gradients at the initial point.
fn compute_initial_scaling(
    problem: &dyn Problem,
    options: &Options,
    first_iterate: &Iterate,
    statistics: &mut Statistics,
) -> Result<Scaling, SolverError> {
    let threshold = options.get_f64("scaling_threshold")?;
    let mut probe = first_iterate.clone();
    probe.evaluate_objective_gradient(problem, statistics)?;
    probe.evaluate_constraint_jacobian(problem, statistics)?;
    Ok(Scaling::compute(
        &probe.objective_gradient,
        &probe.constraint_jacobian,
        threshold,
    ))
}

fn solve_with_ingredients(
    problem: &dyn Problem,
    options: &Options,
    mut statistics: Statistics,
    first_iterate: Iterate,
) -> Result<SolveResult, SolverError> {
    let trust_region = options.get("mechanism")? == "TR";
    let relaxation_strategy =
        create_constraint_relaxation_strategy(options, problem, trust_region)?;
    let mechanism = create_globalization_mechanism(relaxation_strategy, options)?;
    let mut driver = Driver::new(mechanism, options)?;
    driver.solve(&mut statistics, problem, first_iterate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{CooSymmetricMatrix, RectangularMatrix, SparseVector};

    /// Bound-constrained quadratic: min (x-3)^2 with x <= 1.
    struct BoundedQuadratic;

    impl Problem for BoundedQuadratic {
        fn name(&self) -> &str {
            "bounded-quadratic"
        }
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            0
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 1] = [Bound { lb: f64::NEG_INFINITY, ub: 1.0 }];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[Bound] {
            &[]
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            // outside the bounds on purpose: the driver projects it
            x.fill(5.0);
        }
        fn evaluate_objective(&self, x: &[f64]) -> Result<f64, crate::NumericalError> {
            Ok((x[0] - 3.0) * (x[0] - 3.0))
        }
        fn evaluate_constraints(
            &self,
            _x: &[f64],
            _c: &mut [f64],
        ) -> Result<(), crate::NumericalError> {
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), crate::NumericalError> {
            gradient.insert(0, 2.0 * (x[0] - 3.0));
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            _jacobian: &mut RectangularMatrix,
        ) -> Result<(), crate::NumericalError> {
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            hessian: &mut CooSymmetricMatrix,
        ) -> Result<(), crate::NumericalError> {
            hessian.insert(0, 0, 2.0 * objective_multiplier);
            Ok(())
        }
    }

    #[test]
    fn test_solve_bounded_quadratic() {
        let problem = BoundedQuadratic;
        let options = Options::default();
        let result = solve(&problem, &options).unwrap();

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert!((result.iterate.x[0] - 1.0).abs() < 1e-8);
        assert!((result.objective - 4.0).abs() < 1e-6);
        // active upper bound carries a nonpositive multiplier
        assert!(result.iterate.multipliers.upper_bounds[0] < -1e-8);
    }

    #[test]
    fn test_unknown_option_value_is_fatal() {
        let problem = BoundedQuadratic;
        let mut options = Options::default();
        options.set("mechanism", "gradient-descent");
        assert!(matches!(
            solve(&problem, &options),
            Err(SolverError::Configuration(_))
        ));
    }
}
