//! Trust-region globalization.
//!
//! The direction is computed inside a displacement box of radius Δ and the
//! full step is proposed. Accepted steps that touch the box expand Δ;
//! rejected steps and numerical errors shrink it. The mechanism fails when
//! Δ falls below its floor.

use super::{assemble_trial_iterate, GlobalizationMechanism};
use crate::direction::{Direction, SubproblemStatus};
use crate::error::{ConfigurationError, MechanismError, NumericalError};
use crate::iterate::Iterate;
use crate::options::Options;
use crate::problem::Problem;
use crate::relaxation::ConstraintRelaxationStrategy;
use crate::statistics::Statistics;

enum IterationOutcome {
    Accepted(Iterate, f64),
    Rejected(f64),
}

/// Trust-region mechanism.
pub struct TrustRegion {
    relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
    radius: f64,
    increase_factor: f64,
    decrease_factor: f64,
    min_radius: f64,
    activity_tolerance: f64,
    number_inner_iterations: usize,
}

impl TrustRegion {
    /// Build from the options.
    pub fn new(
        relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        let mechanism = Self {
            relaxation_strategy,
            radius: options.get_f64("TR_radius")?,
            increase_factor: options.get_f64("TR_increase_factor")?,
            decrease_factor: options.get_f64("TR_decrease_factor")?,
            min_radius: options.get_f64("TR_min_radius")?,
            activity_tolerance: options.get_f64("TR_activity_tolerance")?,
            number_inner_iterations: 0,
        };
        assert!(0.0 < mechanism.radius);
        assert!(1.0 < mechanism.increase_factor && 1.0 < mechanism.decrease_factor);
        Ok(mechanism)
    }

    /// Current radius (exposed for tests).
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Bound multipliers of variables active at the trust box, not at a
    /// real bound, are artifacts: drop them from the active set and zero
    /// the trial multiplier.
    fn rectify_active_set(&self, current_iterate: &Iterate, direction: &mut Direction) {
        assert!(0.0 < self.radius);
        let radius = self.radius;
        let tolerance = self.activity_tolerance;

        fn rectify(
            indices: &mut Vec<usize>,
            displacement: &[f64],
            at_value: f64,
            tolerance: f64,
            multipliers: &mut [f64],
            current: &[f64],
        ) {
            indices.retain(|&i| {
                if (displacement[i] - at_value).abs() <= tolerance {
                    // cancel the current multiplier so the trial value is zero
                    multipliers[i] = -current[i];
                    false
                } else {
                    true
                }
            });
        }
        rectify(
            &mut direction.active_set.bounds_at_lower,
            &direction.x,
            -radius,
            tolerance,
            &mut direction.multipliers.lower_bounds,
            &current_iterate.multipliers.lower_bounds,
        );
        rectify(
            &mut direction.active_set.bounds_at_upper,
            &direction.x,
            radius,
            tolerance,
            &mut direction.multipliers.upper_bounds,
            &current_iterate.multipliers.upper_bounds,
        );
    }

    fn try_iteration(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<IterationOutcome, NumericalError> {
        self.relaxation_strategy.create_current_subproblem(
            statistics,
            problem,
            current_iterate,
            self.radius,
        )?;
        let mut direction = self.relaxation_strategy.compute_feasible_direction(
            statistics,
            problem,
            current_iterate,
        )?;
        if direction.status == SubproblemStatus::Unbounded {
            return Err(NumericalError::UnboundedSubproblem);
        }
        self.rectify_active_set(current_iterate, &mut direction);

        // full step to the trial iterate
        let full_step_length = 1.0;
        let mut trial_iterate =
            assemble_trial_iterate(current_iterate, &direction, full_step_length);
        let predicted_reduction_model = self
            .relaxation_strategy
            .generate_predicted_reduction_model(&direction);

        let accepted = self.relaxation_strategy.is_acceptable(
            statistics,
            problem,
            current_iterate,
            &mut trial_iterate,
            &direction,
            &predicted_reduction_model,
            full_step_length,
        )?;
        if accepted {
            // grow the region when the step pushed against it
            if direction.norm >= self.radius - self.activity_tolerance {
                self.radius *= self.increase_factor;
            }
            Ok(IterationOutcome::Accepted(trial_iterate, direction.norm))
        } else {
            Ok(IterationOutcome::Rejected(direction.norm))
        }
    }
}

impl GlobalizationMechanism for TrustRegion {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        statistics.add_column("minor", 6);
        statistics.add_column("TR radius", 12);
        self.relaxation_strategy.initialize(statistics, problem, iterate)
    }

    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), MechanismError> {
        self.number_inner_iterations = 0;

        while self.radius >= self.min_radius {
            assert!(0.0 < self.radius);
            self.number_inner_iterations += 1;
            log::debug!(
                "trust-region iteration {}, radius {:e}",
                self.number_inner_iterations,
                self.radius
            );

            match self.try_iteration(statistics, problem, current_iterate) {
                Ok(IterationOutcome::Accepted(trial_iterate, step_norm)) => {
                    statistics.record("minor", self.number_inner_iterations);
                    statistics.record("TR radius", format!("{:.2e}", self.radius));
                    return Ok((trial_iterate, step_norm));
                }
                Ok(IterationOutcome::Rejected(step_norm)) => {
                    self.radius = self.radius.min(step_norm) / self.decrease_factor;
                }
                Err(error) => {
                    log::warn!("trust region caught a numerical error: {}", error);
                    self.radius /= self.decrease_factor;
                }
            }
        }
        Err(MechanismError::TrustRegionTooSmall {
            radius: self.radius,
            min_radius: self.min_radius,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;

    #[test]
    fn test_rectify_active_set_removes_trust_box_artifacts() {
        let options = Options::default();
        let relaxation = crate::relaxation::create_constraint_relaxation_strategy(
            &options,
            &DummyProblem,
            true,
        )
        .unwrap();
        let mut mechanism = TrustRegion::new(relaxation, &options).unwrap();
        mechanism.radius = 2.0;

        let mut current = Iterate::new(2, 0);
        current.multipliers.lower_bounds[0] = 0.25;

        let mut direction = Direction::new(2, 0);
        direction.x = vec![-2.0, 1.0];
        direction.active_set.bounds_at_lower = vec![0];
        direction.active_set.bounds_at_upper = vec![1];
        direction.multipliers.lower_bounds[0] = 0.5;

        mechanism.rectify_active_set(&current, &mut direction);
        // variable 0 sits at -radius: an artifact of the box
        assert!(direction.active_set.bounds_at_lower.is_empty());
        assert_eq!(direction.multipliers.lower_bounds[0], -0.25);
        // variable 1 is at a genuine bound (|d| != radius)
        assert_eq!(direction.active_set.bounds_at_upper, vec![1]);
    }

    struct DummyProblem;

    impl Problem for DummyProblem {
        fn name(&self) -> &str {
            "dummy"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            0
        }
        fn variable_bounds(&self) -> &[crate::problem::Bound] {
            const BOUNDS: [crate::problem::Bound; 2] = [
                crate::problem::Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
                crate::problem::Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
            ];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[crate::problem::Bound] {
            &[]
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
}
