//! Primal-dual iterate with lazily cached evaluations.

use crate::error::NumericalError;
use crate::linalg::{CooSymmetricMatrix, Norm, RectangularMatrix, SparseVector};
use crate::problem::{constraint_violation, Problem};
use crate::statistics::Statistics;

/// Lagrange multipliers of constraints and variable bounds.
///
/// Sign conventions: constraint multipliers are nonnegative when the lower
/// bound is active and nonpositive when the upper bound is active;
/// lower-bound multipliers are nonnegative; upper-bound multipliers are
/// nonpositive.
#[derive(Debug, Clone)]
pub struct Multipliers {
    /// Constraint multipliers (length m)
    pub constraints: Vec<f64>,
    /// Lower-bound multipliers (length n)
    pub lower_bounds: Vec<f64>,
    /// Upper-bound multipliers (length n)
    pub upper_bounds: Vec<f64>,
}

impl Multipliers {
    /// All-zero multipliers.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Self {
            constraints: vec![0.0; number_constraints],
            lower_bounds: vec![0.0; number_variables],
            upper_bounds: vec![0.0; number_variables],
        }
    }
}

/// First-order residuals of an iterate (§ termination tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct Residuals {
    /// Constraint infeasibility in the configured norm
    pub constraints: f64,
    /// Stationarity: norm of the Lagrangian gradient with the prevailing
    /// objective multiplier
    pub stationarity: f64,
    /// Fritz-John measure: stationarity with a zero objective multiplier
    pub fritz_john: f64,
    /// Complementarity error
    pub complementarity: f64,
}

/// The (feasibility, objective) pair consumed by globalization strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressMeasures {
    /// Feasibility measure (constraint violation)
    pub feasibility: f64,
    /// Objective measure
    pub objective: f64,
}

/// Point of the optimization process together with its evaluations.
///
/// Each cached evaluation carries a computed flag; once populated it stays
/// consistent with `x` until [`Iterate::clear`] resets the caches.
#[derive(Debug, Clone)]
pub struct Iterate {
    /// Primal variables
    pub x: Vec<f64>,
    /// Dual variables
    pub multipliers: Multipliers,

    /// Objective value
    pub objective: f64,
    is_objective_computed: bool,

    /// Constraint values (length m)
    pub constraints: Vec<f64>,
    are_constraints_computed: bool,

    /// Sparse objective gradient
    pub objective_gradient: SparseVector,
    is_objective_gradient_computed: bool,

    /// Sparse constraint Jacobian
    pub constraint_jacobian: RectangularMatrix,
    is_constraint_jacobian_computed: bool,

    /// Dense Lagrangian gradient, recomputed on request
    pub lagrangian_gradient: Vec<f64>,

    /// Residuals of the optimality conditions
    pub residuals: Residuals,
    /// Progress measures for the globalization strategy
    pub progress: ProgressMeasures,
}

impl Iterate {
    /// Iterate at the origin with zero multipliers.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Self {
            x: vec![0.0; number_variables],
            multipliers: Multipliers::new(number_variables, number_constraints),
            objective: 0.0,
            is_objective_computed: false,
            constraints: vec![0.0; number_constraints],
            are_constraints_computed: false,
            objective_gradient: SparseVector::with_capacity(number_variables),
            is_objective_gradient_computed: false,
            constraint_jacobian: RectangularMatrix::new(number_constraints, number_variables),
            is_constraint_jacobian_computed: false,
            lagrangian_gradient: vec![0.0; number_variables],
            residuals: Residuals::default(),
            progress: ProgressMeasures::default(),
        }
    }

    /// Iterate at a given primal-dual point.
    pub fn from_point(x: Vec<f64>, multipliers: Multipliers) -> Self {
        let number_variables = x.len();
        let number_constraints = multipliers.constraints.len();
        let mut iterate = Self::new(number_variables, number_constraints);
        iterate.x = x;
        iterate.multipliers = multipliers;
        iterate
    }

    /// Number of primal variables.
    pub fn number_variables(&self) -> usize {
        self.x.len()
    }

    /// Invalidate all cached evaluations (call after changing `x`).
    pub fn clear(&mut self) {
        self.is_objective_computed = false;
        self.are_constraints_computed = false;
        self.is_objective_gradient_computed = false;
        self.is_constraint_jacobian_computed = false;
    }

    /// Evaluate (or reuse) the objective.
    pub fn evaluate_objective(
        &mut self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
    ) -> Result<f64, NumericalError> {
        if !self.is_objective_computed {
            self.objective = problem.evaluate_objective(&self.x)?;
            self.is_objective_computed = true;
            statistics.objective_evaluations += 1;
        }
        Ok(self.objective)
    }

    /// Evaluate (or reuse) the constraints.
    pub fn evaluate_constraints(
        &mut self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
    ) -> Result<&[f64], NumericalError> {
        if !self.are_constraints_computed {
            problem.evaluate_constraints(&self.x, &mut self.constraints)?;
            self.are_constraints_computed = true;
            statistics.constraint_evaluations += 1;
        }
        Ok(&self.constraints)
    }

    /// Evaluate (or reuse) the objective gradient.
    pub fn evaluate_objective_gradient(
        &mut self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
    ) -> Result<&SparseVector, NumericalError> {
        if !self.is_objective_gradient_computed {
            self.objective_gradient.clear();
            problem.evaluate_objective_gradient(&self.x, &mut self.objective_gradient)?;
            self.is_objective_gradient_computed = true;
            statistics.gradient_evaluations += 1;
        }
        Ok(&self.objective_gradient)
    }

    /// Evaluate (or reuse) the constraint Jacobian.
    pub fn evaluate_constraint_jacobian(
        &mut self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
    ) -> Result<&RectangularMatrix, NumericalError> {
        if !self.is_constraint_jacobian_computed {
            self.constraint_jacobian.clear();
            problem.evaluate_constraint_jacobian(&self.x, &mut self.constraint_jacobian)?;
            self.is_constraint_jacobian_computed = true;
            statistics.jacobian_evaluations += 1;
        }
        Ok(&self.constraint_jacobian)
    }

    /// Compute the dense Lagrangian gradient
    /// `∇ₓL = σ ∇f - Σⱼ λⱼ ∇cⱼ - λ_L - λ_U` into `self.lagrangian_gradient`.
    pub fn evaluate_lagrangian_gradient(
        &mut self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
        objective_multiplier: f64,
        multipliers: &Multipliers,
    ) -> Result<(), NumericalError> {
        self.evaluate_objective_gradient(problem, statistics)?;
        self.evaluate_constraint_jacobian(problem, statistics)?;

        self.lagrangian_gradient.fill(0.0);
        if objective_multiplier != 0.0 {
            self.objective_gradient
                .add_to_dense(&mut self.lagrangian_gradient, objective_multiplier);
        }
        for (j, row) in self.constraint_jacobian.iter_rows().enumerate() {
            let multiplier = multipliers.constraints[j];
            if multiplier != 0.0 {
                row.add_to_dense(&mut self.lagrangian_gradient, -multiplier);
            }
        }
        for i in 0..self.lagrangian_gradient.len() {
            self.lagrangian_gradient[i] -= multipliers.lower_bounds[i] + multipliers.upper_bounds[i];
        }
        Ok(())
    }

    /// Hessian evaluation wrapper that counts the evaluation.
    pub fn evaluate_lagrangian_hessian(
        &self,
        problem: &dyn Problem,
        statistics: &mut Statistics,
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        hessian.reset();
        problem.evaluate_lagrangian_hessian(
            &self.x,
            objective_multiplier,
            constraint_multipliers,
            hessian,
        )?;
        statistics.hessian_evaluations += 1;
        Ok(())
    }
}

/// Complementarity error: per bound and constraint, `min(|slack|, |multiplier|)`
/// against the nearest finite bound, aggregated in the given norm.
pub fn complementarity_error(
    problem: &dyn Problem,
    iterate: &Iterate,
    multipliers: &Multipliers,
    norm: Norm,
) -> f64 {
    let n = problem.number_variables();
    let m = problem.number_constraints();
    let variable_bounds = problem.variable_bounds();
    let constraint_bounds = problem.constraint_bounds();

    let component = |k: usize| -> f64 {
        if k < n {
            // lower-bound pairing
            let slack = (iterate.x[k] - variable_bounds[k].lb).abs();
            slack.min(multipliers.lower_bounds[k].abs())
        } else if k < 2 * n {
            let i = k - n;
            let slack = (variable_bounds[i].ub - iterate.x[i]).abs();
            slack.min(multipliers.upper_bounds[i].abs())
        } else {
            let j = k - 2 * n;
            let bound = &constraint_bounds[j];
            let slack = (iterate.constraints[j] - bound.lb)
                .abs()
                .min((bound.ub - iterate.constraints[j]).abs());
            slack.min(multipliers.constraints[j].abs())
        }
    };
    norm.of_function(component, 2 * n + m)
}

/// Evaluate the §"residuals" block of an iterate: constraint infeasibility,
/// stationarity, Fritz-John measure and complementarity.
pub fn compute_optimality_conditions(
    problem: &dyn Problem,
    statistics: &mut Statistics,
    iterate: &mut Iterate,
    objective_multiplier: f64,
    residual_norm: Norm,
) -> Result<(), NumericalError> {
    iterate.evaluate_constraints(problem, statistics)?;
    iterate.residuals.constraints =
        constraint_violation(problem, &iterate.constraints, residual_norm);

    let multipliers = iterate.multipliers.clone();
    iterate.evaluate_lagrangian_gradient(problem, statistics, objective_multiplier, &multipliers)?;
    iterate.residuals.stationarity = residual_norm.of_slice(&iterate.lagrangian_gradient);

    iterate.evaluate_lagrangian_gradient(problem, statistics, 0.0, &multipliers)?;
    iterate.residuals.fritz_john = residual_norm.of_slice(&iterate.lagrangian_gradient);

    iterate.residuals.complementarity =
        complementarity_error(problem, iterate, &multipliers, residual_norm);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Bound;

    struct QuadraticProblem;

    impl Problem for QuadraticProblem {
        fn name(&self) -> &str {
            "quadratic"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 2] = [
                Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
                Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
            ];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 1] = [Bound { lb: 1.0, ub: 1.0 }];
            &BOUNDS
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x.fill(0.0);
        }
        fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
            Ok(x[0] * x[0] + x[1] * x[1])
        }
        fn evaluate_constraints(
            &self,
            x: &[f64],
            constraints: &mut [f64],
        ) -> Result<(), NumericalError> {
            constraints[0] = x[0] + x[1];
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), NumericalError> {
            gradient.insert(0, 2.0 * x[0]);
            gradient.insert(1, 2.0 * x[1]);
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            jacobian: &mut RectangularMatrix,
        ) -> Result<(), NumericalError> {
            jacobian.row_mut(0).insert(0, 1.0);
            jacobian.row_mut(0).insert(1, 1.0);
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

    #[test]
    fn test_lazy_caches_and_clear() {
        let problem = QuadraticProblem;
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        iterate.x = vec![1.0, 2.0];

        assert_eq!(iterate.evaluate_objective(&problem, &mut statistics).unwrap(), 5.0);
        assert_eq!(iterate.evaluate_objective(&problem, &mut statistics).unwrap(), 5.0);
        // the second call hit the cache
        assert_eq!(statistics.objective_evaluations, 1);

        iterate.x = vec![0.0, 0.0];
        iterate.clear();
        assert_eq!(iterate.evaluate_objective(&problem, &mut statistics).unwrap(), 0.0);
        assert_eq!(statistics.objective_evaluations, 2);
    }

    #[test]
    fn test_clear_then_recompute_is_identical() {
        let problem = QuadraticProblem;
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        iterate.x = vec![0.5, -0.25];

        iterate.evaluate_objective(&problem, &mut statistics).unwrap();
        iterate.evaluate_constraints(&problem, &mut statistics).unwrap();
        let objective_before = iterate.objective;
        let constraints_before = iterate.constraints.clone();

        iterate.clear();
        iterate.evaluate_objective(&problem, &mut statistics).unwrap();
        iterate.evaluate_constraints(&problem, &mut statistics).unwrap();

        // bit-identical on a pure problem
        assert_eq!(iterate.objective.to_bits(), objective_before.to_bits());
        assert_eq!(iterate.constraints[0].to_bits(), constraints_before[0].to_bits());
    }

    #[test]
    fn test_lagrangian_gradient_signs() {
        let problem = QuadraticProblem;
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        iterate.x = vec![0.5, 0.5];
        let mut multipliers = Multipliers::new(2, 1);
        multipliers.constraints[0] = 1.0;

        iterate
            .evaluate_lagrangian_gradient(&problem, &mut statistics, 1.0, &multipliers)
            .unwrap();
        // ∇L = 2x - λ·(1,1) = (1,1) - (1,1) = 0 at the minimizer of f on c=1
        assert!(iterate.lagrangian_gradient.iter().all(|g| g.abs() < 1e-12));
    }

    #[test]
    fn test_optimality_conditions_at_kkt_point() {
        let problem = QuadraticProblem;
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        iterate.x = vec![0.5, 0.5];
        iterate.multipliers.constraints[0] = 1.0;

        compute_optimality_conditions(&problem, &mut statistics, &mut iterate, 1.0, Norm::Inf)
            .unwrap();
        assert!(iterate.residuals.constraints < 1e-12);
        assert!(iterate.residuals.stationarity < 1e-12);
        assert!(iterate.residuals.complementarity < 1e-12);
        // the constraint gradient is nonzero, so the FJ measure is not zero
        assert!(iterate.residuals.fritz_john > 0.5);
    }
}
