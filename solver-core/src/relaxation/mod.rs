//! Constraint-relaxation strategies.
//!
//! The linearized constraints of a subproblem may be inconsistent even when
//! the nonlinear problem is feasible. Two remedies are provided: an ℓ1
//! penalty reformulation with elastic variables and penalty steering, and a
//! two-phase feasibility-restoration scheme.

pub mod feasibility_restoration;
pub mod l1_relaxation;

use crate::direction::Direction;
use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::Iterate;
use crate::linalg::norm_inf;
use crate::options::Options;
use crate::problem::Problem;
use crate::statistics::Statistics;
use crate::subproblem::PredictedReductionModel;

pub use feasibility_restoration::FeasibilityRestoration;
pub use l1_relaxation::L1Relaxation;

/// One elastic variable attached to a constraint row.
#[derive(Debug, Clone, Copy)]
pub struct ElasticVariable {
    /// Constraint the elastic relaxes
    pub constraint: usize,
    /// Column index of the elastic in the subproblem
    pub variable: usize,
    /// Jacobian coefficient (−1 absorbs upper violation, +1 lower)
    pub coefficient: f64,
}

/// Elastic variables of a subproblem: the positive set absorbs violations
/// above the upper bounds, the negative set violations below the lower
/// bounds. Elastics never outlive one relaxation solve.
#[derive(Debug, Clone, Default)]
pub struct ElasticVariables {
    /// Elastics with coefficient −1 (upper-bound side)
    pub positive: Vec<ElasticVariable>,
    /// Elastics with coefficient +1 (lower-bound side)
    pub negative: Vec<ElasticVariable>,
}

impl ElasticVariables {
    /// One elastic per finite constraint-bound side, with column indices
    /// starting at `first_variable`.
    pub fn generate(problem: &dyn Problem, first_variable: usize) -> Self {
        let mut elastics = Self::default();
        let mut next_variable = first_variable;
        for (j, bound) in problem.constraint_bounds().iter().enumerate() {
            if bound.ub < f64::INFINITY {
                elastics.positive.push(ElasticVariable {
                    constraint: j,
                    variable: next_variable,
                    coefficient: -1.0,
                });
                next_variable += 1;
            }
            if bound.lb > f64::NEG_INFINITY {
                elastics.negative.push(ElasticVariable {
                    constraint: j,
                    variable: next_variable,
                    coefficient: 1.0,
                });
                next_variable += 1;
            }
        }
        elastics
    }

    /// Total number of elastic variables.
    pub fn number(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    /// All elastics ordered by their column index (the order in which they
    /// must be appended to a subproblem).
    pub fn iter_in_variable_order(&self) -> Vec<&ElasticVariable> {
        let mut all: Vec<&ElasticVariable> =
            self.positive.iter().chain(self.negative.iter()).collect();
        all.sort_by_key(|elastic| elastic.variable);
        all
    }

    /// ℓ1 residual of the linearized constraints: the sum of the elastic
    /// values in a (not yet stripped) direction.
    pub fn linearized_residual(&self, direction_x: &[f64]) -> f64 {
        let mut residual = 0.0;
        for elastic in self.positive.iter().chain(self.negative.iter()) {
            residual += direction_x[elastic.variable];
        }
        residual
    }
}

/// Strip elastic columns out of a direction so that the engine only ever
/// observes the problem dimension.
pub fn remove_elastic_variables_from_direction(
    number_problem_variables: usize,
    direction: &mut Direction,
) {
    let n = number_problem_variables;
    direction.x.truncate(n);
    direction.multipliers.lower_bounds.truncate(n);
    direction.multipliers.upper_bounds.truncate(n);
    direction.active_set.bounds_at_lower.retain(|&i| i < n);
    direction.active_set.bounds_at_upper.retain(|&i| i < n);
    direction.norm = norm_inf(&direction.x);
}

/// A step this small carries no information for the acceptance test; it is
/// accepted directly and the driver decides on small-step termination.
pub fn is_small_step(direction: &Direction) -> bool {
    direction.norm <= 1e-9
}

/// Produces feasible directions and decides acceptance of trial iterates.
pub trait ConstraintRelaxationStrategy {
    /// Evaluate the first iterate: progress measures, residuals, strategy
    /// references, statistics columns.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Assemble the subproblem at the iterate (with elastics or multiplier
    /// bookkeeping as the policy requires).
    fn create_current_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError>;

    /// Compute a direction along which the linearized model improves,
    /// switching into a feasibility formulation when necessary.
    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError>;

    /// Solve the pure feasibility problem (used by the line search after a
    /// failed backtrack and by the restoration phase).
    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        phase_2_direction: Option<&Direction>,
    ) -> Result<Direction, NumericalError>;

    /// Predicted-reduction model for the direction.
    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel;

    /// Acceptance test for a trial iterate; on acceptance the trial's
    /// residuals are refreshed.
    #[allow(clippy::too_many_arguments)]
    fn is_acceptable(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, NumericalError>;
}

/// Create a relaxation strategy by option name. `trust_region` is forwarded
/// to the subproblem factory (it decides Hessian convexification).
pub fn create_constraint_relaxation_strategy(
    options: &Options,
    problem: &dyn Problem,
    trust_region: bool,
) -> Result<Box<dyn ConstraintRelaxationStrategy>, ConfigurationError> {
    match options.get("constraint-relaxation")? {
        "l1-relaxation" => Ok(Box::new(L1Relaxation::new(options, problem, trust_region)?)),
        "feasibility-restoration" => Ok(Box::new(FeasibilityRestoration::new(
            options,
            problem,
            trust_region,
        )?)),
        other => Err(ConfigurationError::InvalidValue {
            option: "constraint-relaxation".to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::problem::Bound;

    struct TwoConstraintProblem;

    impl Problem for TwoConstraintProblem {
        fn name(&self) -> &str {
            "two-constraints"
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
                Bound { lb: 0.0, ub: 1.0 },
                Bound { lb: f64::NEG_INFINITY, ub: 2.0 },
            ];
            &BOUNDS
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x.fill(0.0);
        }
        fn evaluate_objective(&self, _x: &[f64]) -> Result<f64, NumericalError> {
            Ok(0.0)
        }
        fn evaluate_constraints(&self, _x: &[f64], _c: &mut [f64]) -> Result<(), NumericalError> {
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            _x: &[f64],
            _g: &mut crate::linalg::SparseVector,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            _jacobian: &mut crate::linalg::RectangularMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            _objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            _hessian: &mut crate::linalg::CooSymmetricMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
    }

    #[test]
    fn test_elastic_generation() {
        let problem = TwoConstraintProblem;
        let elastics = ElasticVariables::generate(&problem, 1);
        // constraint 0 gets both sides, constraint 1 only the upper side
        assert_eq!(elastics.number(), 3);
        assert_eq!(elastics.positive.len(), 2);
        assert_eq!(elastics.negative.len(), 1);

        let ordered = elastics.iter_in_variable_order();
        assert_eq!(
            ordered.iter().map(|e| e.variable).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // direction with elastic values 0.5, 0.25, 0
        let residual = elastics.linearized_residual(&[9.0, 0.5, 0.25, 0.0]);
        assert_eq!(residual, 0.75);
    }

    #[test]
    fn test_remove_elastics_from_direction() {
        let mut direction = Direction::new(3, 2);
        direction.x = vec![1.0, -2.0, 5.0];
        direction.active_set.bounds_at_lower = vec![0, 2];
        direction.norm = 5.0;

        remove_elastic_variables_from_direction(1, &mut direction);
        assert_eq!(direction.x, vec![1.0]);
        assert_eq!(direction.active_set.bounds_at_lower, vec![0]);
        assert_eq!(direction.norm, 1.0);
        assert_eq!(direction.multipliers.lower_bounds.len(), 1);
    }
}
