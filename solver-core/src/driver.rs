//! Outer fixed-point loop and termination tests.

use std::fmt;
use std::time::Instant;

use crate::error::{ConfigurationError, SolverError};
use crate::iterate::Iterate;
use crate::mechanism::GlobalizationMechanism;
use crate::options::Options;
use crate::problem::Problem;
use crate::statistics::Statistics;

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// First-order optimality conditions hold
    KktPoint,
    /// Infeasible stationary point (zero objective multiplier)
    FjPoint,
    /// Negligible step at a feasible point
    FeasibleSmallStep,
    /// Negligible step at an infeasible point
    InfeasibleSmallStep,
    /// Iteration cap reached
    MaxIterations,
    /// The globalization mechanism could not produce an acceptable iterate
    MechanismFailure,
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationStatus::KktPoint => "Converged with KKT point",
            TerminationStatus::FjPoint => "Converged with infeasible stationary point",
            TerminationStatus::FeasibleSmallStep => "Terminated with feasible small step",
            TerminationStatus::InfeasibleSmallStep => "Terminated with infeasible small step",
            TerminationStatus::MaxIterations => "Maximum number of iterations reached",
            TerminationStatus::MechanismFailure => "Globalization mechanism failed",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of a solve: terminal status, final iterate and counters.
#[derive(Debug)]
pub struct SolveResult {
    /// Terminal status
    pub status: TerminationStatus,
    /// Final primal-dual iterate with its residuals
    pub iterate: Iterate,
    /// Objective value at the final iterate
    pub objective: f64,
    /// Outer iterations taken
    pub iterations: usize,
    /// Wall-clock solve time in milliseconds
    pub solve_time_ms: u64,
    /// Objective evaluations
    pub objective_evaluations: usize,
    /// Constraint evaluations
    pub constraint_evaluations: usize,
    /// Objective gradient evaluations
    pub gradient_evaluations: usize,
    /// Constraint Jacobian evaluations
    pub jacobian_evaluations: usize,
    /// Lagrangian Hessian evaluations
    pub hessian_evaluations: usize,
    /// QP/LP subproblem solves
    pub subproblem_solves: usize,
}

impl SolveResult {
    /// Print a summary, optionally with the primal-dual solution.
    pub fn print(&self, print_solution: bool) {
        println!("{}", "-".repeat(64));
        println!("Status: {}", self.status);
        println!("Objective value: {:.12e}", self.objective);
        println!("Constraint violation: {:.4e}", self.iterate.residuals.constraints);
        println!("Stationarity residual: {:.4e}", self.iterate.residuals.stationarity);
        println!("Complementarity: {:.4e}", self.iterate.residuals.complementarity);
        println!("Iterations: {}", self.iterations);
        println!("Solve time: {} ms", self.solve_time_ms);
        println!(
            "Evaluations: objective {}, constraints {}, gradient {}, Jacobian {}, Hessian {}",
            self.objective_evaluations,
            self.constraint_evaluations,
            self.gradient_evaluations,
            self.jacobian_evaluations,
            self.hessian_evaluations,
        );
        println!("Subproblems solved: {}", self.subproblem_solves);
        if print_solution {
            println!("Primal solution: {:?}", self.iterate.x);
            println!("Constraint multipliers: {:?}", self.iterate.multipliers.constraints);
            println!("Lower-bound multipliers: {:?}", self.iterate.multipliers.lower_bounds);
            println!("Upper-bound multipliers: {:?}", self.iterate.multipliers.upper_bounds);
        }
    }
}

/// The outer loop: repeatedly asks the mechanism for an acceptable iterate
/// and tests the termination criteria on the accepted point.
pub struct Driver {
    mechanism: Box<dyn GlobalizationMechanism>,
    tolerance: f64,
    small_step_tolerance: f64,
    max_iterations: usize,
    verbose: bool,
}

impl Driver {
    /// Build the driver around a mechanism.
    pub fn new(
        mechanism: Box<dyn GlobalizationMechanism>,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            mechanism,
            tolerance: options.get_f64("tolerance")?,
            small_step_tolerance: options.get_f64("small_step_tolerance")?,
            max_iterations: options.get_usize("max_iterations")?,
            verbose: options.get_bool("verbose")?,
        })
    }

    fn check_termination(&self, iterate: &Iterate, step_norm: f64) -> Option<TerminationStatus> {
        let residuals = &iterate.residuals;
        let feasible = residuals.constraints <= self.tolerance;

        if feasible
            && residuals.stationarity <= self.tolerance
            && residuals.complementarity <= self.tolerance
        {
            return Some(TerminationStatus::KktPoint);
        }
        // an infeasible stationary point needs a nontrivial multiplier set
        let multipliers_nonzero = iterate
            .multipliers
            .constraints
            .iter()
            .any(|multiplier| multiplier.abs() > self.tolerance);
        if !feasible && multipliers_nonzero && residuals.fritz_john <= self.tolerance {
            return Some(TerminationStatus::FjPoint);
        }
        if step_norm <= self.small_step_tolerance {
            return Some(if feasible {
                TerminationStatus::FeasibleSmallStep
            } else {
                TerminationStatus::InfeasibleSmallStep
            });
        }
        None
    }

    fn record_iteration(
        &self,
        statistics: &mut Statistics,
        iteration: usize,
        iterate: &Iterate,
        step_norm: f64,
    ) {
        statistics.record("iter", iteration);
        statistics.record("objective", format!("{:.6e}", iterate.progress.objective));
        statistics.record("infeas.", format!("{:.2e}", iterate.residuals.constraints));
        statistics.record("KKT", format!("{:.2e}", iterate.residuals.stationarity));
        statistics.record("compl.", format!("{:.2e}", iterate.residuals.complementarity));
        statistics.record("step norm", format!("{:.2e}", step_norm));
    }

    /// Run the loop from the first iterate.
    pub fn solve(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        mut current_iterate: Iterate,
    ) -> Result<SolveResult, SolverError> {
        let start = Instant::now();

        statistics.add_column("iter", 6);
        statistics.add_column("objective", 14);
        statistics.add_column("infeas.", 10);
        statistics.add_column("KKT", 10);
        statistics.add_column("compl.", 10);
        statistics.add_column("step norm", 11);
        self.mechanism
            .initialize(statistics, problem, &mut current_iterate)?;

        if self.verbose {
            println!(
                "Problem {}: {} variables, {} constraints",
                problem.name(),
                problem.number_variables(),
                problem.number_constraints()
            );
            statistics.print_header();
        }

        let mut status = TerminationStatus::MaxIterations;
        let mut iteration = 0;
        while iteration < self.max_iterations {
            iteration += 1;
            match self
                .mechanism
                .compute_acceptable_iterate(statistics, problem, &mut current_iterate)
            {
                Ok((trial_iterate, step_norm)) => {
                    current_iterate = trial_iterate;
                    self.record_iteration(statistics, iteration, &current_iterate, step_norm);
                    if self.verbose {
                        statistics.print_row();
                    }
                    if let Some(terminal) = self.check_termination(&current_iterate, step_norm) {
                        status = terminal;
                        break;
                    }
                }
                Err(error) => {
                    log::warn!("mechanism failure: {}", error);
                    status = TerminationStatus::MechanismFailure;
                    break;
                }
            }
        }

        // the reported objective is always f, regardless of which progress
        // measure the terminal phase was using
        let objective = current_iterate
            .evaluate_objective(problem, statistics)
            .unwrap_or(f64::NAN);
        Ok(SolveResult {
            status,
            objective,
            iterate: current_iterate,
            iterations: iteration,
            solve_time_ms: start.elapsed().as_millis() as u64,
            objective_evaluations: statistics.objective_evaluations,
            constraint_evaluations: statistics.constraint_evaluations,
            gradient_evaluations: statistics.gradient_evaluations,
            jacobian_evaluations: statistics.jacobian_evaluations,
            hessian_evaluations: statistics.hessian_evaluations,
            subproblem_solves: statistics.subproblem_solves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::Residuals;

    struct NoopMechanism;

    impl GlobalizationMechanism for NoopMechanism {
        fn initialize(
            &mut self,
            _statistics: &mut Statistics,
            _problem: &dyn Problem,
            _iterate: &mut Iterate,
        ) -> Result<(), crate::error::NumericalError> {
            Ok(())
        }
        fn compute_acceptable_iterate(
            &mut self,
            _statistics: &mut Statistics,
            _problem: &dyn Problem,
            _current_iterate: &mut Iterate,
        ) -> Result<(Iterate, f64), crate::error::MechanismError> {
            unreachable!("not used in termination tests")
        }
    }

    fn driver() -> Driver {
        Driver::new(Box::new(NoopMechanism), &Options::default()).unwrap()
    }

    fn iterate_with_residuals(residuals: Residuals) -> Iterate {
        let mut iterate = Iterate::new(1, 1);
        iterate.residuals = residuals;
        iterate
    }

    #[test]
    fn test_kkt_termination() {
        let driver = driver();
        let iterate = iterate_with_residuals(Residuals {
            constraints: 1e-10,
            stationarity: 1e-9,
            fritz_john: 1.0,
            complementarity: 1e-12,
        });
        assert_eq!(
            driver.check_termination(&iterate, 1.0),
            Some(TerminationStatus::KktPoint)
        );
    }

    #[test]
    fn test_fj_requires_nonzero_multipliers() {
        let driver = driver();
        let mut iterate = iterate_with_residuals(Residuals {
            constraints: 1.0,
            stationarity: 1.0,
            fritz_john: 0.0,
            complementarity: 0.0,
        });
        // zero multipliers: a trivially stationary violation, not an FJ point
        assert_eq!(driver.check_termination(&iterate, 1.0), None);

        iterate.multipliers.constraints[0] = 1.0;
        assert_eq!(
            driver.check_termination(&iterate, 1.0),
            Some(TerminationStatus::FjPoint)
        );
    }

    #[test]
    fn test_small_step_split_on_feasibility() {
        let driver = driver();
        let feasible = iterate_with_residuals(Residuals {
            constraints: 0.0,
            stationarity: 1.0,
            fritz_john: 1.0,
            complementarity: 1.0,
        });
        assert_eq!(
            driver.check_termination(&feasible, 1e-12),
            Some(TerminationStatus::FeasibleSmallStep)
        );

        let infeasible = iterate_with_residuals(Residuals {
            constraints: 0.5,
            stationarity: 1.0,
            fritz_john: 1.0,
            complementarity: 1.0,
        });
        assert_eq!(
            driver.check_termination(&infeasible, 1e-12),
            Some(TerminationStatus::InfeasibleSmallStep)
        );
    }
}
