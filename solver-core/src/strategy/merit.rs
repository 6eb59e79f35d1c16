//! ℓ1 merit function acceptance.
//!
//! The merit function is `φ_σ(x) = σ f(x) + viol(x)`. A trial point is
//! accepted when the actual merit reduction covers a small fraction of the
//! predicted reduction (an Armijo condition on the merit function).

use super::GlobalizationStrategy;
use crate::error::ConfigurationError;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::statistics::Statistics;

/// Penalty (merit-function) strategy.
pub struct MeritFunctionStrategy {
    decrease_fraction: f64,
}

impl MeritFunctionStrategy {
    /// Build from the options.
    pub fn new(options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
        })
    }

    fn merit(progress: &ProgressMeasures, objective_multiplier: f64) -> f64 {
        objective_multiplier * progress.objective + progress.feasibility
    }
}

impl GlobalizationStrategy for MeritFunctionStrategy {
    fn initialize(&mut self, _iterate: &Iterate) {}

    fn reset(&mut self) {}

    fn notify(&mut self, _iterate: &Iterate) {}

    fn check_acceptance(
        &mut self,
        _statistics: &mut Statistics,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        if predicted_reduction <= 0.0 {
            return false;
        }
        let actual_reduction = Self::merit(current_progress, objective_multiplier)
            - Self::merit(trial_progress, objective_multiplier);
        log::debug!(
            "merit acceptance: actual {:e}, predicted {:e}",
            actual_reduction,
            predicted_reduction
        );
        actual_reduction >= self.decrease_fraction * predicted_reduction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> MeritFunctionStrategy {
        MeritFunctionStrategy::new(&Options::default()).unwrap()
    }

    fn progress(feasibility: f64, objective: f64) -> ProgressMeasures {
        ProgressMeasures {
            feasibility,
            objective,
        }
    }

    #[test]
    fn test_accepts_sufficient_merit_decrease() {
        let mut strategy = strategy();
        let mut statistics = Statistics::new();
        // merit goes from 1.0 + 2.0 to 0.1 + 1.0
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(1.0, 2.0),
            &progress(0.1, 1.0),
            1.0,
            1.0,
        );
        assert!(accepted);
    }

    #[test]
    fn test_rejects_nonpositive_predicted_reduction() {
        let mut strategy = strategy();
        let mut statistics = Statistics::new();
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(1.0, 2.0),
            &progress(0.0, 0.0),
            1.0,
            0.0,
        );
        assert!(!accepted);
    }

    #[test]
    fn test_rejects_merit_increase() {
        let mut strategy = strategy();
        let mut statistics = Statistics::new();
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(0.1, 1.0),
            &progress(1.0, 2.0),
            1.0,
            1.0,
        );
        assert!(!accepted);
    }

    #[test]
    fn test_pure_feasibility_merit_when_multiplier_is_zero() {
        let mut strategy = strategy();
        let mut statistics = Statistics::new();
        // with sigma = 0 the objective increase is irrelevant
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(1.0, 0.0),
            &progress(0.2, 100.0),
            0.0,
            0.5,
        );
        assert!(accepted);
    }
}
