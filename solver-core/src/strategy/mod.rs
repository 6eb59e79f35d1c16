//! Globalization strategies: the acceptance oracle for trial iterates.

pub mod filter;
pub mod merit;

use crate::error::ConfigurationError;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::statistics::Statistics;

pub use filter::{Filter, FilterStrategy};
pub use merit::MeritFunctionStrategy;

/// Decides whether a trial iterate makes enough progress.
pub trait GlobalizationStrategy {
    /// Set the reference state from the first iterate.
    fn initialize(&mut self, iterate: &Iterate);

    /// Forget all accumulated state (called when the subproblem definition
    /// changes, e.g. after a penalty-parameter update).
    fn reset(&mut self);

    /// Record an iterate as a reference point (adds to the filter).
    fn notify(&mut self, iterate: &Iterate);

    /// Acceptance test on the progress of the current and trial iterates.
    fn check_acceptance(
        &mut self,
        statistics: &mut Statistics,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool;
}

/// Create a strategy by option name.
pub fn create_globalization_strategy(
    options: &Options,
) -> Result<Box<dyn GlobalizationStrategy>, ConfigurationError> {
    match options.get("strategy")? {
        "penalty" => Ok(Box::new(MeritFunctionStrategy::new(options)?)),
        "filter" => Ok(Box::new(FilterStrategy::new(options, false)?)),
        "nonmonotone-filter" => Ok(Box::new(FilterStrategy::new(options, true)?)),
        other => Err(ConfigurationError::InvalidValue {
            option: "strategy".to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory() {
        let mut options = Options::default();
        assert!(create_globalization_strategy(&options).is_ok());
        options.set("strategy", "penalty");
        assert!(create_globalization_strategy(&options).is_ok());
        options.set("strategy", "nonmonotone-filter");
        assert!(create_globalization_strategy(&options).is_ok());
        options.set("strategy", "watchdog");
        assert!(create_globalization_strategy(&options).is_err());
    }
}
