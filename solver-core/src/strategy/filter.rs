//! Filter acceptance.
//!
//! The filter keeps a set of (feasibility, objective) pairs. A trial point
//! is acceptable to an entry `(φ_k, f_k)` when it improves feasibility
//! enough or improves the objective enough:
//!
//! ```text
//! φ < β φ_k   or   f < f_k - γ φ
//! ```
//!
//! Accepted steps that fail the switching condition add the current iterate
//! to the filter; steps that pass it must also satisfy an Armijo condition
//! on the objective. The nonmonotone variant measures progress against the
//! average of the last K reference pairs instead of the current iterate.

use std::collections::VecDeque;

use super::GlobalizationStrategy;
use crate::error::ConfigurationError;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::options::Options;
use crate::statistics::Statistics;

/// Set of dominated (feasibility, objective) pairs with an envelope.
pub struct Filter {
    entries: Vec<(f64, f64)>,
    beta: f64,
    gamma: f64,
    capacity: usize,
    infeasibility_upper_bound: f64,
}

impl Filter {
    /// Empty filter with envelope β and margin γ.
    pub fn new(beta: f64, gamma: f64, capacity: usize) -> Self {
        assert!(0.0 < beta && beta <= 1.0);
        assert!(0.0 <= gamma);
        Self {
            entries: Vec::new(),
            beta,
            gamma,
            capacity,
            infeasibility_upper_bound: f64::INFINITY,
        }
    }

    /// Remove all entries and the upper bound.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.infeasibility_upper_bound = f64::INFINITY;
    }

    /// Cap the acceptable infeasibility.
    pub fn set_infeasibility_upper_bound(&mut self, upper_bound: f64) {
        self.infeasibility_upper_bound = upper_bound;
    }

    /// Acceptability with respect to one reference pair.
    pub fn acceptable_to_pair(&self, reference: (f64, f64), pair: (f64, f64)) -> bool {
        let (reference_feasibility, reference_objective) = reference;
        let (feasibility, objective) = pair;
        feasibility < self.beta * reference_feasibility
            || objective < reference_objective - self.gamma * feasibility
    }

    /// Acceptability with respect to every stored entry and the upper bound.
    pub fn accepts(&self, feasibility: f64, objective: f64) -> bool {
        if feasibility >= self.infeasibility_upper_bound {
            return false;
        }
        self.entries
            .iter()
            .all(|&entry| self.acceptable_to_pair(entry, (feasibility, objective)))
    }

    /// Insert a pair, discarding entries it dominates.
    pub fn add(&mut self, feasibility: f64, objective: f64) {
        self.entries
            .retain(|&(entry_feasibility, entry_objective)| {
                entry_feasibility < feasibility || entry_objective < objective
            });
        if self.entries.len() == self.capacity {
            // drop the most infeasible entry to make room
            if let Some(position) = self
                .entries
                .iter()
                .enumerate()
                .max_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                .map(|(position, _)| position)
            {
                self.entries.swap_remove(position);
            }
        }
        self.entries.push((feasibility, objective));
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the filter holds no pair.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filter-based globalization strategy, optionally nonmonotone.
pub struct FilterStrategy {
    filter: Filter,
    switching_fraction: f64,
    decrease_fraction: f64,
    nonmonotone: bool,
    memory: usize,
    history: VecDeque<(f64, f64)>,
}

impl FilterStrategy {
    /// Build from the options.
    pub fn new(options: &Options, nonmonotone: bool) -> Result<Self, ConfigurationError> {
        Ok(Self {
            filter: Filter::new(
                options.get_f64("filter_beta")?,
                options.get_f64("filter_gamma")?,
                options.get_usize("filter_capacity")?,
            ),
            switching_fraction: options.get_f64("filter_switching_fraction")?,
            decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
            nonmonotone,
            memory: options.get_usize("nonmonotone_filter_memory")?,
            history: VecDeque::new(),
        })
    }

    fn reference(&self, current_progress: &ProgressMeasures) -> (f64, f64) {
        let current = (current_progress.feasibility, current_progress.objective);
        if !self.nonmonotone || self.history.is_empty() {
            return current;
        }
        // average the remembered references together with the current pair
        let mut feasibility = current.0;
        let mut objective = current.1;
        for &(entry_feasibility, entry_objective) in &self.history {
            feasibility += entry_feasibility;
            objective += entry_objective;
        }
        let count = (self.history.len() + 1) as f64;
        (feasibility / count, objective / count)
    }

    fn remember(&mut self, pair: (f64, f64)) {
        if self.nonmonotone {
            if self.history.len() == self.memory {
                self.history.pop_front();
            }
            self.history.push_back(pair);
        }
    }
}

impl GlobalizationStrategy for FilterStrategy {
    fn initialize(&mut self, iterate: &Iterate) {
        self.filter.reset();
        self.history.clear();
        let initial_infeasibility = iterate.progress.feasibility;
        self.filter
            .set_infeasibility_upper_bound(100.0_f64.max(1.25 * initial_infeasibility));
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.history.clear();
    }

    fn notify(&mut self, iterate: &Iterate) {
        self.filter
            .add(iterate.progress.feasibility, iterate.progress.objective);
        self.remember((iterate.progress.feasibility, iterate.progress.objective));
    }

    fn check_acceptance(
        &mut self,
        _statistics: &mut Statistics,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        _objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        let trial = (trial_progress.feasibility, trial_progress.objective);
        if !self.filter.accepts(trial.0, trial.1) {
            log::debug!("filter rejects the trial pair ({:e}, {:e})", trial.0, trial.1);
            return false;
        }
        let reference = self.reference(current_progress);
        if !self.filter.acceptable_to_pair(reference, trial) {
            return false;
        }

        // switching condition: the model promises more than the violation
        // can explain
        let switching = predicted_reduction > 0.0
            && predicted_reduction
                >= self.switching_fraction * current_progress.feasibility.powi(2);
        if switching {
            let actual_reduction = reference.1 - trial.1;
            if actual_reduction < self.decrease_fraction * predicted_reduction {
                return false;
            }
        } else {
            // feasibility-improving step: remember the current iterate
            self.filter
                .add(current_progress.feasibility, current_progress.objective);
            self.remember((current_progress.feasibility, current_progress.objective));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> Filter {
        Filter::new(0.999, 0.001, 50)
    }

    #[test]
    fn test_filter_domination() {
        let mut filter = default_filter();
        filter.add(1.0, 10.0);

        // dominated in both measures
        assert!(!filter.accepts(1.0, 10.0));
        assert!(!filter.accepts(2.0, 11.0));
        // much more feasible
        assert!(filter.accepts(0.5, 11.0));
        // much better objective
        assert!(filter.accepts(1.0, 5.0));
    }

    #[test]
    fn test_add_removes_dominated_entries() {
        let mut filter = default_filter();
        filter.add(1.0, 10.0);
        filter.add(2.0, 20.0);
        assert_eq!(filter.len(), 1);

        filter.add(0.5, 5.0);
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_infeasibility_upper_bound() {
        let mut filter = default_filter();
        filter.set_infeasibility_upper_bound(10.0);
        assert!(!filter.accepts(15.0, -100.0));
        assert!(filter.accepts(5.0, -100.0));
    }

    fn progress(feasibility: f64, objective: f64) -> ProgressMeasures {
        ProgressMeasures {
            feasibility,
            objective,
        }
    }

    #[test]
    fn test_strategy_accepts_feasibility_improvement_and_updates_filter() {
        let options = Options::default();
        let mut strategy = FilterStrategy::new(&options, false).unwrap();
        let mut statistics = Statistics::new();

        // no predicted reduction: an h-type step; the current pair enters
        // the filter
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(2.0, 5.0),
            &progress(0.5, 5.5),
            1.0,
            0.0,
        );
        assert!(accepted);
        assert_eq!(strategy.filter.len(), 1);

        // a later trial dominated by that stored pair is rejected
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(0.5, 5.5),
            &progress(2.5, 6.0),
            1.0,
            0.0,
        );
        assert!(!accepted);
    }

    #[test]
    fn test_strategy_armijo_on_f_type_steps() {
        let options = Options::default();
        let mut strategy = FilterStrategy::new(&options, false).unwrap();
        let mut statistics = Statistics::new();

        // nearly feasible, large predicted reduction, no actual objective
        // decrease: rejected
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(1e-8, 5.0),
            &progress(1e-8, 5.0 + 1e-3),
            1.0,
            1.0,
        );
        assert!(!accepted);

        // same predicted reduction with a real objective decrease: accepted
        let accepted = strategy.check_acceptance(
            &mut statistics,
            &progress(1e-8, 5.0),
            &progress(1e-8, 4.0),
            1.0,
            1.0,
        );
        assert!(accepted);
    }

    #[test]
    fn test_nonmonotone_reference_averages_history() {
        let options = Options::default();
        let mut strategy = FilterStrategy::new(&options, true).unwrap();

        strategy.remember((1.0, 10.0));
        strategy.remember((3.0, 30.0));
        let reference = strategy.reference(&progress(2.0, 20.0));
        assert_eq!(reference, (2.0, 20.0));
    }
}
