//! Two-phase feasibility restoration.
//!
//! Phase 2 (optimality) solves the plain subproblem. When the linearization
//! is inconsistent, phase 1 (restoration) minimizes the constraint violation
//! instead, either from the solver's constraint partition or through an
//! elastic reformulation. Each phase carries its own globalization strategy.

use super::{
    is_small_step, remove_elastic_variables_from_direction, ConstraintRelaxationStrategy,
    ElasticVariables,
};
use crate::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::{compute_optimality_conditions, Iterate};
use crate::options::Options;
use crate::problem::{constraint_violation, constraint_violation_subset, Problem};
use crate::statistics::Statistics;
use crate::strategy::{create_globalization_strategy, GlobalizationStrategy};
use crate::subproblem::{create_subproblem, PredictedReductionModel, Subproblem};

/// Phase of the restoration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Minimizing the constraint violation
    FeasibilityRestoration = 1,
    /// Solving the actual subproblem
    Optimality = 2,
}

/// Feasibility-restoration relaxation strategy.
pub struct FeasibilityRestoration {
    subproblem: Box<dyn Subproblem>,
    phase_1_strategy: Box<dyn GlobalizationStrategy>,
    phase_2_strategy: Box<dyn GlobalizationStrategy>,
    current_phase: Phase,
    elastic_variables: ElasticVariables,
    elastic_objective_coefficient: f64,
    use_proximal_term: bool,
    number_problem_variables: usize,
}

impl FeasibilityRestoration {
    /// Build from the options.
    pub fn new(
        options: &Options,
        problem: &dyn Problem,
        trust_region: bool,
    ) -> Result<Self, ConfigurationError> {
        let n = problem.number_variables();
        Ok(Self {
            subproblem: create_subproblem(options, problem, trust_region)?,
            phase_1_strategy: create_globalization_strategy(options)?,
            phase_2_strategy: create_globalization_strategy(options)?,
            current_phase: Phase::Optimality,
            elastic_variables: ElasticVariables::generate(problem, n),
            elastic_objective_coefficient: options.get_f64("elastic_objective_coefficient")?,
            use_proximal_term: options.get_bool("use_proximal_term")?,
            number_problem_variables: n,
        })
    }

    /// Phase the strategy is currently in (exposed for tests).
    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    /// The values ±1 are the KKT multipliers of the feasibility problem.
    fn set_restoration_multipliers(
        constraint_multipliers: &mut [f64],
        partition: &ConstraintPartition,
    ) {
        for &j in &partition.lower_bound_infeasible {
            constraint_multipliers[j] = 1.0;
        }
        for &j in &partition.upper_bound_infeasible {
            constraint_multipliers[j] = -1.0;
        }
    }

    /// Assemble the feasibility problem, with or without a partition.
    fn create_current_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        phase_2_primal_direction: Option<&[f64]>,
        partition: Option<&ConstraintPartition>,
    ) -> Result<(), NumericalError> {
        if let Some(partition) = partition {
            assert!(
                !partition.infeasible.is_empty(),
                "the subproblem is infeasible but no constraint is infeasible"
            );
            Self::set_restoration_multipliers(
                &mut current_iterate.multipliers.constraints,
                partition,
            );
            self.subproblem
                .set_constraint_multipliers(&current_iterate.multipliers.constraints);

            // objective model with a zero objective multiplier
            self.subproblem
                .build_objective_model(statistics, problem, current_iterate, 0.0)?;
            if self.use_proximal_term {
                self.subproblem.add_proximal_term(current_iterate);
            }
            self.subproblem.build_feasibility_objective(
                statistics,
                problem,
                current_iterate,
                partition,
            )?;
            current_iterate.evaluate_constraints(problem, statistics)?;
            let constraints = current_iterate.constraints.clone();
            self.subproblem
                .set_feasibility_bounds(problem, &constraints, partition);
        } else {
            // no partition: elastic l1 feasibility problem
            current_iterate.multipliers.constraints.fill(0.0);
            self.subproblem
                .set_constraint_multipliers(&current_iterate.multipliers.constraints);
            self.subproblem
                .build_objective_model(statistics, problem, current_iterate, 0.0)?;
            if self.use_proximal_term {
                self.subproblem.add_proximal_term(current_iterate);
            }
            self.subproblem
                .add_elastic_variables(&self.elastic_variables, self.elastic_objective_coefficient);
        }
        // start from the phase-2 solution
        if let Some(primal_direction) = phase_2_primal_direction {
            self.subproblem.set_initial_point(primal_direction);
        }
        Ok(())
    }

    /// Progress measures of the restoration phase: feasibility of all
    /// constraints, "objective" = residual of the infeasible subset (or the
    /// elastic objective when no partition is available).
    fn compute_infeasibility_measures(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        partition: Option<&ConstraintPartition>,
    ) -> Result<(), NumericalError> {
        let norm = self.subproblem.residual_norm();
        iterate.evaluate_constraints(problem, statistics)?;
        if let Some(partition) = partition {
            iterate.progress.feasibility =
                constraint_violation(problem, &iterate.constraints, norm);
            iterate.progress.objective = constraint_violation_subset(
                problem,
                &iterate.constraints,
                &partition.infeasible,
                norm,
            );
        } else {
            self.subproblem
                .compute_progress_measures(statistics, problem, iterate)?;
            // each violated side corresponds to one elastic at its violation
            let bounds = problem.constraint_bounds();
            let elastic_total: f64 = (0..problem.number_constraints())
                .map(|j| bounds[j].violation(iterate.constraints[j]))
                .sum();
            iterate.progress.objective += self.elastic_objective_coefficient * elastic_total;
        }
        Ok(())
    }

    /// Weighted distance between the trial and current iterates, added to
    /// the restoration objective measure.
    fn add_proximal_term_to_progress_measures(
        &self,
        current_iterate: &Iterate,
        trial_iterate: &mut Iterate,
    ) {
        let coefficient = self.subproblem.proximal_coefficient();
        for i in 0..self.number_problem_variables {
            let x = current_iterate.x[i].abs();
            let weight = if x == 0.0 { 1.0 } else { (1.0 / x).min(1.0) };
            let difference = weight * (trial_iterate.x[i] - current_iterate.x[i]);
            trial_iterate.progress.objective += coefficient * difference * difference;
        }
    }

    /// Switch the phase according to the direction's objective multiplier
    /// and refresh the progress measures of both iterates.
    fn switch_phase(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<(), NumericalError> {
        if self.current_phase == Phase::FeasibilityRestoration
            && direction.objective_multiplier != 0.0
        {
            log::debug!("switching from restoration to optimality phase");
            self.current_phase = Phase::Optimality;
            current_iterate.evaluate_constraints(problem, statistics)?;
            self.subproblem
                .compute_progress_measures(statistics, problem, current_iterate)?;
        } else if self.current_phase == Phase::Optimality && direction.objective_multiplier == 0.0 {
            log::debug!("switching from optimality to restoration phase");
            self.current_phase = Phase::FeasibilityRestoration;
            self.phase_2_strategy.notify(current_iterate);
            self.phase_1_strategy.reset();
            self.compute_infeasibility_measures(
                statistics,
                problem,
                current_iterate,
                direction.constraint_partition.as_ref(),
            )?;
            self.phase_1_strategy.notify(current_iterate);
        }

        // progress measures of the trial iterate, in the (possibly new) phase
        if self.current_phase == Phase::Optimality {
            trial_iterate.evaluate_constraints(problem, statistics)?;
            self.subproblem
                .compute_progress_measures(statistics, problem, trial_iterate)?;
        } else {
            self.compute_infeasibility_measures(
                statistics,
                problem,
                trial_iterate,
                direction.constraint_partition.as_ref(),
            )?;
            if self.use_proximal_term {
                self.add_proximal_term_to_progress_measures(current_iterate, trial_iterate);
            }
        }
        Ok(())
    }
}

impl ConstraintRelaxationStrategy for FeasibilityRestoration {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        statistics.add_column("phase", 7);
        self.subproblem.initialize(statistics, problem, iterate)?;
        self.subproblem
            .compute_progress_measures(statistics, problem, iterate)?;
        compute_optimality_conditions(
            problem,
            statistics,
            iterate,
            problem.objective_sign(),
            self.subproblem.residual_norm(),
        )?;
        self.phase_1_strategy.initialize(iterate);
        self.phase_2_strategy.initialize(iterate);
        Ok(())
    }

    fn create_current_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        self.subproblem
            .set_constraint_multipliers(&iterate.multipliers.constraints);
        self.subproblem.build_current_subproblem(
            statistics,
            problem,
            iterate,
            problem.objective_sign(),
            trust_region_radius,
        )
    }

    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let mut direction = self.subproblem.solve(statistics, problem, iterate)?;
        direction.objective_multiplier = problem.objective_sign();
        match direction.status {
            SubproblemStatus::Optimal => Ok(direction),
            SubproblemStatus::Infeasible => {
                // inconsistent linearization: minimize the violation instead
                self.solve_feasibility_problem(statistics, problem, iterate, Some(&direction))
            }
            SubproblemStatus::Unbounded => Err(NumericalError::UnboundedSubproblem),
            SubproblemStatus::Error => Err(NumericalError::SubproblemSolver(
                "the subproblem was not solved properly".to_string(),
            )),
        }
    }

    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        phase_2_direction: Option<&Direction>,
    ) -> Result<Direction, NumericalError> {
        let partition = phase_2_direction.and_then(|d| d.constraint_partition.clone());
        self.create_current_feasibility_problem(
            statistics,
            problem,
            iterate,
            phase_2_direction.map(|d| d.x.as_slice()),
            partition.as_ref(),
        )?;

        let solve_outcome = self.subproblem.solve(statistics, problem, iterate);
        if partition.is_none() {
            self.subproblem.remove_elastic_variables();
        }
        let mut feasibility_direction = solve_outcome?;
        feasibility_direction.objective_multiplier = 0.0;
        if feasibility_direction.status != SubproblemStatus::Optimal {
            return Err(NumericalError::SubproblemSolver(
                "the feasibility subproblem was not solved to optimality".to_string(),
            ));
        }

        if let Some(partition) = partition {
            // transfer the phase-2 partition to the feasibility direction
            feasibility_direction.constraint_partition = Some(partition);
        }
        remove_elastic_variables_from_direction(
            self.number_problem_variables,
            &mut feasibility_direction,
        );
        Ok(feasibility_direction)
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
        let accept = if is_small_step(direction) {
            self.subproblem
                .compute_progress_measures(statistics, problem, trial_iterate)?;
            true
        } else {
            self.switch_phase(statistics, problem, current_iterate, trial_iterate, direction)?;
            let predicted_reduction = predicted_reduction_model.evaluate(step_length);
            let strategy = match self.current_phase {
                Phase::Optimality => &mut self.phase_2_strategy,
                Phase::FeasibilityRestoration => &mut self.phase_1_strategy,
            };
            strategy.check_acceptance(
                statistics,
                &current_iterate.progress,
                &trial_iterate.progress,
                direction.objective_multiplier,
                predicted_reduction,
            )
        };

        if accept {
            statistics.record("phase", self.current_phase as u8);
            if direction.objective_multiplier == 0.0 {
                if let Some(partition) = &direction.constraint_partition {
                    Self::set_restoration_multipliers(
                        &mut trial_iterate.multipliers.constraints,
                        partition,
                    );
                }
            }
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
