//! ℓ1 relaxation with penalty steering.
//!
//! The subproblem minimizes `σ f(x) + ‖c violation‖₁`, with the ℓ1 term
//! carried by nonnegative elastic variables. The penalty parameter σ is
//! driven by the Byrd-Nocedal-Waltz steering rules: whenever the relaxed
//! subproblem keeps a nonzero linearized residual, σ is reduced until the
//! step recovers a fraction of the best achievable linearized decrease
//! (condition C1) and of the best achievable model decrease (condition C2).

use super::{
    is_small_step, remove_elastic_variables_from_direction, ConstraintRelaxationStrategy,
    ElasticVariables,
};
use crate::direction::Direction;
use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::{complementarity_error, compute_optimality_conditions, Iterate, Multipliers};
use crate::linalg::{dot, norm_1};
use crate::options::Options;
use crate::problem::Problem;
use crate::statistics::Statistics;
use crate::strategy::{create_globalization_strategy, GlobalizationStrategy};
use crate::subproblem::{create_subproblem, PredictedReductionModel, Subproblem};

// The interior-point QP solver returns elastic values that are tiny but
// never exactly zero; residuals below this relative threshold count as zero.
const RESIDUAL_ZERO_TOLERANCE: f64 = 1e-10;

struct SteeringParameters {
    decrease_factor: f64,
    epsilon1: f64,
    epsilon2: f64,
}

/// ℓ1 penalty relaxation.
pub struct L1Relaxation {
    subproblem: Box<dyn Subproblem>,
    globalization_strategy: Box<dyn GlobalizationStrategy>,
    elastic_variables: ElasticVariables,
    elastic_objective_coefficient: f64,
    penalty_parameter: f64,
    parameters: SteeringParameters,
    penalty_threshold: f64,
    number_problem_variables: usize,
}

impl L1Relaxation {
    /// Build from the options.
    pub fn new(
        options: &Options,
        problem: &dyn Problem,
        trust_region: bool,
    ) -> Result<Self, ConfigurationError> {
        let n = problem.number_variables();
        Ok(Self {
            subproblem: create_subproblem(options, problem, trust_region)?,
            globalization_strategy: create_globalization_strategy(options)?,
            elastic_variables: ElasticVariables::generate(problem, n),
            elastic_objective_coefficient: options.get_f64("elastic_objective_coefficient")?,
            penalty_parameter: options.get_f64("l1_relaxation_initial_parameter")?,
            parameters: SteeringParameters {
                decrease_factor: options.get_f64("l1_relaxation_decrease_factor")?,
                epsilon1: options.get_f64("l1_relaxation_epsilon1")?,
                epsilon2: options.get_f64("l1_relaxation_epsilon2")?,
            },
            penalty_threshold: options.get_f64("l1_relaxation_penalty_threshold")?,
            number_problem_variables: n,
        })
    }

    /// Current penalty parameter (exposed for tests).
    pub fn penalty_parameter(&self) -> f64 {
        self.penalty_parameter
    }

    fn objective_multiplier(&self, problem: &dyn Problem) -> f64 {
        self.penalty_parameter * problem.objective_sign()
    }

    /// Install the multipliers implied by the KKT conditions of the ℓ1
    /// problem: +1 for constraints violated below, −1 above.
    fn set_violated_multipliers(&mut self, problem: &dyn Problem, iterate: &Iterate) {
        for (j, bound) in problem.constraint_bounds().iter().enumerate() {
            if iterate.constraints[j] < bound.lb {
                self.subproblem.set_constraint_multiplier(j, 1.0);
            } else if bound.ub < iterate.constraints[j] {
                self.subproblem.set_constraint_multiplier(j, -1.0);
            }
        }
    }

    /// Solve the already assembled subproblem; elastics are stripped from
    /// the subproblem (not from the direction) afterwards.
    fn solve_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &Iterate,
    ) -> Result<Direction, NumericalError> {
        let mut direction = self.subproblem.solve(statistics, problem, iterate)?;
        direction.objective_multiplier = self.objective_multiplier(problem);
        self.subproblem.remove_elastic_variables();
        Ok(direction)
    }

    /// Rebuild the objective with a different penalty and resolve.
    fn resolve_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        penalty_parameter: f64,
    ) -> Result<Direction, NumericalError> {
        self.subproblem.build_objective_model(
            statistics,
            problem,
            iterate,
            penalty_parameter * problem.objective_sign(),
        )?;
        self.subproblem
            .add_elastic_variables(&self.elastic_variables, self.elastic_objective_coefficient);

        let mut direction = self.subproblem.solve(statistics, problem, iterate)?;
        direction.objective_multiplier = penalty_parameter * problem.objective_sign();
        self.subproblem.remove_elastic_variables();
        Ok(direction)
    }

    /// Error measure of the ℓ1 problem: complementarity plus the ℓ1 norm of
    /// the Lagrangian gradient at the given multiplier displacements.
    fn compute_error(
        &self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        multiplier_displacements: &Multipliers,
        penalty_parameter: f64,
    ) -> Result<f64, NumericalError> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let mut multipliers = Multipliers::new(n, m);
        for i in 0..n {
            multipliers.lower_bounds[i] =
                iterate.multipliers.lower_bounds[i] + multiplier_displacements.lower_bounds[i];
            multipliers.upper_bounds[i] =
                iterate.multipliers.upper_bounds[i] + multiplier_displacements.upper_bounds[i];
        }
        for j in 0..m {
            multipliers.constraints[j] =
                iterate.multipliers.constraints[j] + multiplier_displacements.constraints[j];
        }

        let mut error =
            complementarity_error(problem, iterate, &multipliers, self.subproblem.residual_norm());
        iterate.evaluate_lagrangian_gradient(
            problem,
            statistics,
            penalty_parameter * problem.objective_sign(),
            &multipliers,
        )?;
        error += norm_1(&iterate.lagrangian_gradient);
        Ok(error)
    }

    /// Byrd steering: compute the step, then decrease σ until the C1/C2
    /// conditions hold. σ is monotonically non-increasing within one call.
    fn solve_with_steering_rule(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        // stage a: step with the current penalty parameter
        let mut direction = self.solve_subproblem(statistics, problem, iterate)?;

        if self.penalty_parameter <= 0.0 {
            return Ok(direction);
        }
        let violation = iterate.residuals.constraints;
        let residual_zero = RESIDUAL_ZERO_TOLERANCE * (1.0 + violation);

        let mut linearized_residual = self.elastic_variables.linearized_residual(&direction.x);
        log::debug!("linearized residual m(d): {:e}", linearized_residual);
        if linearized_residual <= residual_zero {
            // the relaxation was not needed; keep σ
            return Ok(direction);
        }

        let current_penalty_parameter = self.penalty_parameter;

        // stage c: lowest possible linearized residual (σ = 0)
        let direction_lowest_violation =
            self.resolve_subproblem(statistics, problem, iterate, 0.0)?;
        let residual_lowest_violation = self
            .elastic_variables
            .linearized_residual(&direction_lowest_violation.x);

        // when even the pure feasibility step cannot improve on the current
        // violation, nothing steers: keep σ
        let no_linearized_progress = 0.0 < violation
            && (residual_lowest_violation - violation).abs() <= 1e-8 * (1.0 + violation);
        if !no_linearized_progress {
            // ideal error with a zero penalty parameter
            let error_lowest_violation = self.compute_error(
                statistics,
                problem,
                iterate,
                &direction_lowest_violation.multipliers,
                0.0,
            )?;
            if error_lowest_violation <= residual_zero {
                // stage f: the feasibility problem is already solved
                self.penalty_parameter = 0.0;
                direction = direction_lowest_violation;
            } else {
                let updated_penalty_parameter = self.penalty_parameter;
                let term = error_lowest_violation / violation.max(1.0);
                self.penalty_parameter = self.penalty_parameter.min(term * term);
                if self.penalty_parameter < updated_penalty_parameter {
                    if self.penalty_parameter == 0.0 {
                        direction = direction_lowest_violation.clone();
                    } else {
                        direction = self.resolve_subproblem(
                            statistics,
                            problem,
                            iterate,
                            self.penalty_parameter,
                        )?;
                        linearized_residual =
                            self.elastic_variables.linearized_residual(&direction.x);
                    }
                }

                // stages d and e: decrease σ until C1 and C2 hold
                let mut condition1 = false;
                let mut condition2 = false;
                while !condition2 && 0.0 < self.penalty_parameter {
                    if !condition1 {
                        // C1: a fraction of the ideal linearized decrease
                        let ideal_case = residual_lowest_violation <= residual_zero
                            && linearized_residual <= residual_zero;
                        let fraction_reached = residual_lowest_violation > residual_zero
                            && violation - linearized_residual
                                >= self.parameters.epsilon1
                                    * (violation - residual_lowest_violation);
                        if ideal_case || fraction_reached {
                            condition1 = true;
                        }
                    }
                    // C2: a fraction of the ideal model decrease
                    if condition1
                        && violation - direction.objective
                            >= self.parameters.epsilon2
                                * (violation - direction_lowest_violation.objective)
                    {
                        condition2 = true;
                    }
                    if !condition2 {
                        self.penalty_parameter /= self.parameters.decrease_factor;
                        if self.penalty_parameter < self.penalty_threshold {
                            self.penalty_parameter = 0.0;
                            direction = direction_lowest_violation.clone();
                            break;
                        }
                        log::debug!(
                            "steering: resolving with penalty parameter {:e}",
                            self.penalty_parameter
                        );
                        direction = self.resolve_subproblem(
                            statistics,
                            problem,
                            iterate,
                            self.penalty_parameter,
                        )?;
                        linearized_residual =
                            self.elastic_variables.linearized_residual(&direction.x);
                    }
                }
            }
        }

        if self.penalty_parameter < current_penalty_parameter {
            log::debug!("penalty parameter updated to {:e}", self.penalty_parameter);
            self.globalization_strategy.reset();
        }
        Ok(direction)
    }

    /// Predicted reduction of the ℓ1 merit model: the linearized-violation
    /// decrease plus the subproblem model reduction.
    fn compute_predicted_reduction(
        &self,
        problem: &dyn Problem,
        current_iterate: &Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> f64 {
        let violation = current_iterate.residuals.constraints;
        if step_length == 1.0 {
            violation + predicted_reduction_model.evaluate(step_length)
        } else {
            // linearized violation after a partial step
            let bounds = problem.constraint_bounds();
            let norm = self.subproblem.residual_norm();
            let linearized_violation = norm.of_function(
                |j| {
                    let component = current_iterate.constraints[j]
                        + step_length
                            * dot(&direction.x, current_iterate.constraint_jacobian.row(j));
                    bounds[j].violation(component)
                },
                problem.number_constraints(),
            );
            violation - linearized_violation + predicted_reduction_model.evaluate(step_length)
        }
    }
}

impl ConstraintRelaxationStrategy for L1Relaxation {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        statistics.add_column("penalty param.", 15);
        self.subproblem.initialize(statistics, problem, iterate)?;
        self.subproblem
            .compute_progress_measures(statistics, problem, iterate)?;
        compute_optimality_conditions(
            problem,
            statistics,
            iterate,
            self.objective_multiplier(problem),
            self.subproblem.residual_norm(),
        )?;
        self.globalization_strategy.initialize(iterate);
        Ok(())
    }

    fn create_current_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        iterate.evaluate_constraints(problem, statistics)?;
        self.subproblem
            .set_constraint_multipliers(&iterate.multipliers.constraints);
        self.set_violated_multipliers(problem, iterate);

        let objective_multiplier = self.objective_multiplier(problem);
        self.subproblem.build_current_subproblem(
            statistics,
            problem,
            iterate,
            objective_multiplier,
            trust_region_radius,
        )?;
        self.subproblem
            .add_elastic_variables(&self.elastic_variables, self.elastic_objective_coefficient);
        Ok(())
    }

    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        log::debug!("penalty parameter: {:e}", self.penalty_parameter);
        let mut direction = self.solve_with_steering_rule(statistics, problem, iterate)?;
        remove_elastic_variables_from_direction(self.number_problem_variables, &mut direction);
        Ok(direction)
    }

    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        _phase_2_direction: Option<&Direction>,
    ) -> Result<Direction, NumericalError> {
        let mut direction = self.resolve_subproblem(statistics, problem, iterate, 0.0)?;
        remove_elastic_variables_from_direction(self.number_problem_variables, &mut direction);
        Ok(direction)
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        self.subproblem.generate_predicted_reduction_model(direction)
    }

    fn is_acceptable(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, NumericalError> {
        self.subproblem
            .compute_progress_measures(statistics, problem, trial_iterate)?;
        let accept = if is_small_step(direction) {
            true
        } else {
            let predicted_reduction = self.compute_predicted_reduction(
                problem,
                current_iterate,
                direction,
                predicted_reduction_model,
                step_length,
            );
            self.globalization_strategy.check_acceptance(
                statistics,
                &current_iterate.progress,
                &trial_iterate.progress,
                self.penalty_parameter,
                predicted_reduction,
            )
        };
        if accept {
            statistics.record("penalty param.", format!("{:.2e}", self.penalty_parameter));
            compute_optimality_conditions(
                problem,
                statistics,
                trial_iterate,
                direction.objective_multiplier,
                self.subproblem.residual_norm(),
            )?;
        }
        Ok(accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{CooSymmetricMatrix, Norm, RectangularMatrix, SparseVector};
    use crate::problem::Bound;

    /// min x/2 s.t. x = 1 (one equality), from x = 0: the linearization is
    /// consistent, so steering must leave σ untouched.
    struct ShiftProblem;

    impl Problem for ShiftProblem {
        fn name(&self) -> &str {
            "shift"
        }
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 1] = [Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY }];
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
            Ok(0.5 * x[0])
        }
        fn evaluate_constraints(&self, x: &[f64], c: &mut [f64]) -> Result<(), NumericalError> {
            c[0] = x[0];
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            _x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), NumericalError> {
            gradient.insert(0, 0.5);
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            jacobian: &mut RectangularMatrix,
        ) -> Result<(), NumericalError> {
            jacobian.row_mut(0).insert(0, 1.0);
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            _objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            _hessian: &mut CooSymmetricMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
    }

    fn setup(problem: &dyn Problem) -> (L1Relaxation, Iterate, Statistics) {
        let options = Options::default();
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(problem.number_variables(), problem.number_constraints());
        let mut relaxation = L1Relaxation::new(&options, problem, true).unwrap();
        relaxation
            .initialize(&mut statistics, problem, &mut iterate)
            .unwrap();
        (relaxation, iterate, statistics)
    }

    #[test]
    fn test_direction_has_problem_dimension() {
        let problem = ShiftProblem;
        let (mut relaxation, mut iterate, mut statistics) = setup(&problem);

        relaxation
            .create_current_subproblem(&mut statistics, &problem, &mut iterate, 10.0)
            .unwrap();
        let direction = relaxation
            .compute_feasible_direction(&mut statistics, &problem, &mut iterate)
            .unwrap();

        // elastics never leak out of the relaxation
        assert_eq!(direction.x.len(), 1);
        assert_eq!(direction.multipliers.lower_bounds.len(), 1);
        // the step solves the linearized problem: d = 1
        assert!((direction.x[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_consistent_linearization_keeps_penalty() {
        let problem = ShiftProblem;
        let (mut relaxation, mut iterate, mut statistics) = setup(&problem);
        let initial_penalty = relaxation.penalty_parameter();

        relaxation
            .create_current_subproblem(&mut statistics, &problem, &mut iterate, 10.0)
            .unwrap();
        relaxation
            .compute_feasible_direction(&mut statistics, &problem, &mut iterate)
            .unwrap();
        assert_eq!(relaxation.penalty_parameter(), initial_penalty);
    }

    /// min x s.t. x = 1 and x = -1: irreconcilable equalities force the
    /// steering rule to give up on the objective.
    struct ContradictionProblem;

    impl Problem for ContradictionProblem {
        fn name(&self) -> &str {
            "contradiction"
        }
        fn number_variables(&self) -> usize {
            1
        }
        fn number_constraints(&self) -> usize {
            2
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 1] = [Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY }];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 2] = [
                Bound { lb: 1.0, ub: 1.0 },
                Bound { lb: -1.0, ub: -1.0 },
            ];
            &BOUNDS
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x.fill(0.0);
        }
        fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
            Ok(x[0])
        }
        fn evaluate_constraints(&self, x: &[f64], c: &mut [f64]) -> Result<(), NumericalError> {
            c[0] = x[0];
            c[1] = x[0];
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            _x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), NumericalError> {
            gradient.insert(0, 1.0);
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            jacobian: &mut RectangularMatrix,
        ) -> Result<(), NumericalError> {
            jacobian.row_mut(0).insert(0, 1.0);
            jacobian.row_mut(1).insert(0, 1.0);
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            _objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            _hessian: &mut CooSymmetricMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
    }

    #[test]
    fn test_steering_is_monotone_on_inconsistent_rows() {
        let problem = ContradictionProblem;
        let (mut relaxation, mut iterate, mut statistics) = setup(&problem);
        let initial_penalty = relaxation.penalty_parameter();

        relaxation
            .create_current_subproblem(&mut statistics, &problem, &mut iterate, 10.0)
            .unwrap();
        let direction = relaxation
            .compute_feasible_direction(&mut statistics, &problem, &mut iterate)
            .unwrap();

        // the relaxation stays feasible; no linearized progress is possible,
        // so steering drives σ down
        assert_eq!(direction.x.len(), 1);
        assert!(relaxation.penalty_parameter() < initial_penalty);
        // residual norm is configurable but defaults to Inf
        assert_eq!(relaxation.subproblem.residual_norm(), Norm::Inf);
    }
}
