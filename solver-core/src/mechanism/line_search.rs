//! Backtracking line search globalization.
//!
//! A full step along the direction is halved until the relaxation strategy
//! accepts the trial. When every step length fails, the search retries once
//! along a pure feasibility direction before giving up.

use super::{assemble_trial_iterate, GlobalizationMechanism};
use crate::direction::{Direction, SubproblemStatus};
use crate::error::{ConfigurationError, MechanismError, NumericalError};
use crate::iterate::Iterate;
use crate::options::Options;
use crate::problem::Problem;
use crate::relaxation::ConstraintRelaxationStrategy;
use crate::statistics::Statistics;

/// Backtracking line-search mechanism.
pub struct BacktrackingLineSearch {
    relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
    backtracking_ratio: f64,
    min_step_length: f64,
    max_iterations: usize,
}

impl BacktrackingLineSearch {
    /// Build from the options.
    pub fn new(
        relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        let mechanism = Self {
            relaxation_strategy,
            backtracking_ratio: options.get_f64("LS_backtracking_ratio")?,
            min_step_length: options.get_f64("LS_min_step_length")?,
            max_iterations: options.get_usize("LS_max_iterations")?,
        };
        assert!(0.0 < mechanism.backtracking_ratio && mechanism.backtracking_ratio < 1.0);
        Ok(mechanism)
    }

    /// Backtrack along one direction. `Ok(None)` means every step length
    /// was rejected.
    fn backtrack(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Option<(Iterate, f64)>, MechanismError> {
        let predicted_reduction_model = self
            .relaxation_strategy
            .generate_predicted_reduction_model(direction);

        let mut step_length = 1.0;
        for _ in 0..self.max_iterations {
            log::debug!("line-search trial with step length {:e}", step_length);
            let mut trial_iterate =
                assemble_trial_iterate(current_iterate, direction, step_length);

            match self.relaxation_strategy.is_acceptable(
                statistics,
                problem,
                current_iterate,
                &mut trial_iterate,
                direction,
                &predicted_reduction_model,
                step_length,
            ) {
                Ok(true) => {
                    statistics.record("LS step", format!("{:.2e}", step_length));
                    return Ok(Some((trial_iterate, step_length * direction.norm)));
                }
                Ok(false) => {}
                Err(error) => {
                    // evaluation failed at the trial point: shorten the step
                    log::warn!("line search caught a numerical error: {}", error);
                }
            }
            step_length *= self.backtracking_ratio;
            if step_length < self.min_step_length {
                break;
            }
        }
        Ok(None)
    }
}

impl GlobalizationMechanism for BacktrackingLineSearch {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        statistics.add_column("LS step", 10);
        self.relaxation_strategy.initialize(statistics, problem, iterate)
    }

    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), MechanismError> {
        self.relaxation_strategy.create_current_subproblem(
            statistics,
            problem,
            current_iterate,
            f64::INFINITY,
        )?;
        let direction = self.relaxation_strategy.compute_feasible_direction(
            statistics,
            problem,
            current_iterate,
        )?;
        if direction.status == SubproblemStatus::Unbounded {
            return Err(MechanismError::Numerical(NumericalError::UnboundedSubproblem));
        }

        if let Some(accepted) =
            self.backtrack(statistics, problem, current_iterate, &direction)?
        {
            return Ok(accepted);
        }

        // the step made no progress at any length: fall back to a pure
        // feasibility direction
        log::debug!("line search failed, retrying along a feasibility direction");
        let feasibility_direction = self.relaxation_strategy.solve_feasibility_problem(
            statistics,
            problem,
            current_iterate,
            Some(&direction),
        )?;
        if let Some(accepted) =
            self.backtrack(statistics, problem, current_iterate, &feasibility_direction)?
        {
            return Ok(accepted);
        }
        Err(MechanismError::LineSearchFailed {
            step_length: self.min_step_length,
        })
    }
}
