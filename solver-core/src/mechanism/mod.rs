//! Globalization mechanisms: the outer loops that force acceptance.

pub mod line_search;
pub mod trust_region;

use crate::direction::Direction;
use crate::error::{ConfigurationError, MechanismError, NumericalError};
use crate::iterate::Iterate;
use crate::options::Options;
use crate::problem::Problem;
use crate::relaxation::ConstraintRelaxationStrategy;
use crate::statistics::Statistics;

pub use line_search::BacktrackingLineSearch;
pub use trust_region::TrustRegion;

/// Outer loop that shrinks a trust region or backtracks a step length until
/// the relaxation strategy accepts a trial iterate.
pub trait GlobalizationMechanism {
    /// Register statistics columns and initialize the relaxation strategy.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Produce an accepted trial iterate and the step norm taken.
    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), MechanismError>;
}

/// Trial iterate at `current + step_length * direction`, with multipliers
/// moved along their displacements. Evaluation caches start empty.
pub fn assemble_trial_iterate(
    current_iterate: &Iterate,
    direction: &Direction,
    step_length: f64,
) -> Iterate {
    let n = current_iterate.number_variables();
    let mut trial = Iterate::new(n, current_iterate.multipliers.constraints.len());
    for i in 0..n {
        trial.x[i] = current_iterate.x[i] + step_length * direction.x[i];
        trial.multipliers.lower_bounds[i] = current_iterate.multipliers.lower_bounds[i]
            + step_length * direction.multipliers.lower_bounds[i];
        trial.multipliers.upper_bounds[i] = current_iterate.multipliers.upper_bounds[i]
            + step_length * direction.multipliers.upper_bounds[i];
    }
    for j in 0..trial.multipliers.constraints.len() {
        trial.multipliers.constraints[j] = current_iterate.multipliers.constraints[j]
            + step_length * direction.multipliers.constraints[j];
    }
    trial
}

/// Create a mechanism by option name, taking ownership of the relaxation
/// strategy.
pub fn create_globalization_mechanism(
    relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
    options: &Options,
) -> Result<Box<dyn GlobalizationMechanism>, ConfigurationError> {
    match options.get("mechanism")? {
        "TR" => Ok(Box::new(TrustRegion::new(relaxation_strategy, options)?)),
        "LS" => Ok(Box::new(BacktrackingLineSearch::new(
            relaxation_strategy,
            options,
        )?)),
        other => Err(ConfigurationError::InvalidValue {
            option: "mechanism".to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::Multipliers;

    #[test]
    fn test_assemble_trial_iterate() {
        let mut current = Iterate::new(2, 1);
        current.x = vec![1.0, 2.0];
        current.multipliers.constraints[0] = 0.5;

        let mut direction = Direction::new(2, 1);
        direction.x = vec![1.0, -1.0];
        direction.multipliers = Multipliers::new(2, 1);
        direction.multipliers.constraints[0] = 1.0;

        let trial = assemble_trial_iterate(&current, &direction, 0.5);
        assert_eq!(trial.x, vec![1.5, 1.5]);
        assert_eq!(trial.multipliers.constraints[0], 1.0);
    }
}
