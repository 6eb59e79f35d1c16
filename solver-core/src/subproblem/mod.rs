//! Local QP/LP models of the nonlinear problem.
//!
//! A subproblem linearizes the constraints and models the objective around
//! the current iterate, invokes the external QP/LP solver, and hands back a
//! [`Direction`]. The constraint-relaxation strategies reshape the model
//! (elastic columns, feasibility objectives) through the trait surface.

pub mod lp;
pub mod qp;

use std::cell::OnceCell;

use crate::direction::{ConstraintPartition, Direction};
use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::Iterate;
use crate::linalg::Norm;
use crate::options::Options;
use crate::problem::Problem;
use crate::relaxation::ElasticVariables;
use crate::statistics::Statistics;

pub use lp::LpSubproblem;
pub use qp::QpSubproblem;

/// Local model of the problem around an iterate.
pub trait Subproblem {
    /// One-time setup at the initial iterate.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Evaluate the functions at the iterate and assemble the model:
    /// objective gradient (scaled by the objective multiplier), Hessian,
    /// Jacobian, displacement bounds intersected with the trust box, and
    /// linearized constraint bounds. Pass `f64::INFINITY` as the radius when
    /// no trust region restrains the step.
    fn build_current_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError>;

    /// Rebuild only the objective model (gradient and Hessian) with a new
    /// objective multiplier; constraints and bounds are kept.
    fn build_objective_model(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError>;

    /// Invoke the external solver on the assembled model.
    fn solve(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &Iterate,
    ) -> Result<Direction, NumericalError>;

    /// Two-stage lazy model of the predicted reduction along `direction`.
    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel;

    /// Evaluate the (feasibility, objective) progress measures of an iterate.
    fn compute_progress_measures(
        &self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Norm used for residuals and progress measures.
    fn residual_norm(&self) -> Norm;

    /// Proximal coefficient for restoration (0 when not applicable).
    fn proximal_coefficient(&self) -> f64;

    /// Number of columns currently in the model (elastics included).
    fn number_variables(&self) -> usize;

    /// Starting point for the next solve.
    fn set_initial_point(&mut self, point: &[f64]);

    /// Install the constraint multipliers used for Hessian evaluations.
    /// Called by the relaxation strategy before the model is (re)built.
    fn set_constraint_multipliers(&mut self, multipliers: &[f64]);

    /// Override one constraint multiplier used for the Hessian evaluation.
    fn set_constraint_multiplier(&mut self, constraint_index: usize, value: f64);

    /// Append elastic columns (unit objective coefficient, zero lower bound,
    /// ±1 Jacobian coefficient).
    fn add_elastic_variables(&mut self, elastics: &ElasticVariables, objective_coefficient: f64);

    /// Strip all elastic columns from the model.
    fn remove_elastic_variables(&mut self);

    /// Replace the objective by the linear feasibility objective: the sum of
    /// the gradients of the infeasible constraints, signed by the violation
    /// direction.
    fn build_feasibility_objective(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        partition: &ConstraintPartition,
    ) -> Result<(), NumericalError>;

    /// Override the linearized constraint bounds to encode the feasibility
    /// problem of a constraint partition.
    fn set_feasibility_bounds(
        &mut self,
        problem: &dyn Problem,
        constraints: &[f64],
        partition: &ConstraintPartition,
    );

    /// Add the diagonal proximal term to the Hessian (no-op for an LP).
    fn add_proximal_term(&mut self, iterate: &Iterate);
}

/// Lazy two-stage model of the predicted reduction as a function of the
/// step length.
///
/// Stage 1 is the value at a full step, known from the subproblem objective.
/// Stage 2 precomputes the (linear, quadratic) coefficients once, so that a
/// line search can evaluate arbitrary step lengths in O(1).
pub struct PredictedReductionModel {
    full_step_value: f64,
    coefficients: OnceCell<(f64, f64)>,
    precompute: Box<dyn Fn() -> (f64, f64)>,
}

impl PredictedReductionModel {
    /// Build a model from the full-step value and the coefficient closure.
    pub fn new(full_step_value: f64, precompute: impl Fn() -> (f64, f64) + 'static) -> Self {
        Self {
            full_step_value,
            coefficients: OnceCell::new(),
            precompute: Box::new(precompute),
        }
    }

    /// Predicted reduction for a step of length `step_length`.
    pub fn evaluate(&self, step_length: f64) -> f64 {
        if step_length == 1.0 {
            self.full_step_value
        } else {
            let (linear, quadratic) = *self.coefficients.get_or_init(|| (self.precompute)());
            -step_length * (linear + step_length * quadratic)
        }
    }
}

/// Create a subproblem by option name. `trust_region` tells whether the
/// globalization mechanism bounds the step; without it, the Hessian model
/// is convexified so that the subproblem stays bounded.
pub fn create_subproblem(
    options: &Options,
    problem: &dyn Problem,
    trust_region: bool,
) -> Result<Box<dyn Subproblem>, ConfigurationError> {
    match options.get("subproblem")? {
        "QP" => Ok(Box::new(QpSubproblem::new(options, problem, !trust_region)?)),
        "LP" => {
            // a first-order model is unbounded without a trust region
            if !trust_region {
                return Err(ConfigurationError::InvalidValue {
                    option: "subproblem".to_string(),
                    value: "LP with mechanism LS".to_string(),
                });
            }
            Ok(Box::new(LpSubproblem::new(options, problem)?))
        }
        "barrier" => Err(ConfigurationError::MissingSolver(
            "barrier subproblem (interior-point build)".to_string(),
        )),
        other => Err(ConfigurationError::InvalidValue {
            option: "subproblem".to_string(),
            value: other.to_string(),
        }),
    }
}
