//! Linear programming subproblem.
//!
//! First-order model: the Hessian is left empty. Only meaningful together
//! with a trust region, which bounds the LP.

use super::{PredictedReductionModel, Subproblem};
use crate::direction::{ConstraintPartition, Direction};
use crate::error::{ConfigurationError, NumericalError};
use crate::iterate::Iterate;
use crate::linalg::{Norm, RectangularMatrix, SparseVector};
use crate::options::Options;
use crate::problem::{constraint_violation, Bound, Problem};
use crate::relaxation::ElasticVariables;
use crate::solvers::{create_lp_solver, LpSolver, SubproblemData};
use crate::statistics::Statistics;

/// Local linear model solved by an external LP solver.
pub struct LpSubproblem {
    number_problem_variables: usize,
    number_constraints: usize,

    solver: Box<dyn LpSolver>,

    objective_gradient: SparseVector,
    constraints: Vec<f64>,
    constraint_jacobian: RectangularMatrix,
    variable_bounds: Vec<Bound>,
    constraint_bounds: Vec<Bound>,
    initial_point: Vec<f64>,

    residual_norm: Norm,
}

impl LpSubproblem {
    /// Build an LP subproblem from the options.
    pub fn new(options: &Options, problem: &dyn Problem) -> Result<Self, ConfigurationError> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        Ok(Self {
            number_problem_variables: n,
            number_constraints: m,
            solver: create_lp_solver(options.get("LP_solver")?)?,
            objective_gradient: SparseVector::with_capacity(n),
            constraints: vec![0.0; m],
            constraint_jacobian: RectangularMatrix::new(m, n),
            variable_bounds: vec![Bound::free(); n],
            constraint_bounds: vec![Bound::free(); m],
            initial_point: vec![0.0; n],
            residual_norm: Norm::from_option(options.get("residual_norm")?)?,
        })
    }
}

impl Subproblem for LpSubproblem {
    fn initialize(
        &mut self,
        _statistics: &mut Statistics,
        _problem: &dyn Problem,
        _iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        Ok(())
    }

    fn build_current_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        assert!(
            trust_region_radius < f64::INFINITY,
            "an LP subproblem requires a trust region"
        );
        // drop any elastic columns left over from an aborted solve
        self.remove_elastic_variables();

        iterate.evaluate_constraints(problem, statistics)?;
        self.constraints.copy_from_slice(&iterate.constraints);
        iterate.evaluate_constraint_jacobian(problem, statistics)?;
        self.constraint_jacobian = iterate.constraint_jacobian.clone();

        self.build_objective_model(statistics, problem, iterate, objective_multiplier)?;

        for (i, bound) in problem.variable_bounds().iter().enumerate() {
            let lb = (bound.lb - iterate.x[i]).max(-trust_region_radius);
            let ub = (bound.ub - iterate.x[i]).min(trust_region_radius);
            self.variable_bounds[i] = Bound::new(lb, ub);
        }
        for (j, bound) in problem.constraint_bounds().iter().enumerate() {
            self.constraint_bounds[j] =
                Bound::new(bound.lb - self.constraints[j], bound.ub - self.constraints[j]);
        }
        Ok(())
    }

    fn build_objective_model(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError> {
        self.objective_gradient.clear();
        if objective_multiplier != 0.0 {
            iterate.evaluate_objective_gradient(problem, statistics)?;
            for (index, value) in iterate.objective_gradient.iter() {
                self.objective_gradient
                    .insert(index, objective_multiplier * value);
            }
        }
        self.initial_point.fill(0.0);
        Ok(())
    }

    fn solve(
        &mut self,
        statistics: &mut Statistics,
        _problem: &dyn Problem,
        iterate: &Iterate,
    ) -> Result<Direction, NumericalError> {
        let data = SubproblemData {
            variable_bounds: &self.variable_bounds,
            constraint_bounds: &self.constraint_bounds,
            objective_gradient: &self.objective_gradient,
            constraint_jacobian: &self.constraint_jacobian,
            hessian: None,
            initial_point: &self.initial_point,
        };
        let mut direction = self.solver.solve_lp(statistics, &data)?;
        super::qp::compute_dual_displacements(iterate, &mut direction);
        Ok(direction)
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        // the model is linear: the reduction scales with the step length
        let objective = direction.objective;
        PredictedReductionModel::new(-objective, move || (objective, 0.0))
    }

    fn compute_progress_measures(
        &self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        iterate.evaluate_constraints(problem, statistics)?;
        iterate.progress.feasibility =
            constraint_violation(problem, &iterate.constraints, self.residual_norm);
        iterate.progress.objective = iterate.evaluate_objective(problem, statistics)?;
        Ok(())
    }

    fn residual_norm(&self) -> Norm {
        self.residual_norm
    }

    fn proximal_coefficient(&self) -> f64 {
        // no second-order term to attach a proximal matrix to
        0.0
    }

    fn number_variables(&self) -> usize {
        self.variable_bounds.len()
    }

    fn set_initial_point(&mut self, point: &[f64]) {
        let length = point.len().min(self.initial_point.len());
        self.initial_point[..length].copy_from_slice(&point[..length]);
    }

    fn set_constraint_multipliers(&mut self, _multipliers: &[f64]) {
        // multipliers only enter through the Hessian, absent here
    }

    fn set_constraint_multiplier(&mut self, _constraint_index: usize, _value: f64) {}

    fn add_elastic_variables(&mut self, elastics: &ElasticVariables, objective_coefficient: f64) {
        for elastic in elastics.iter_in_variable_order() {
            assert_eq!(elastic.variable, self.variable_bounds.len());
            self.variable_bounds.push(Bound::lower(0.0));
            self.initial_point.push(0.0);
            self.objective_gradient
                .insert(elastic.variable, objective_coefficient);
            self.constraint_jacobian
                .row_mut(elastic.constraint)
                .insert(elastic.variable, elastic.coefficient);
        }
    }

    fn remove_elastic_variables(&mut self) {
        let n = self.number_problem_variables;
        self.variable_bounds.truncate(n);
        self.initial_point.truncate(n);
        self.objective_gradient.retain(|index| index < n);
        for j in 0..self.number_constraints {
            self.constraint_jacobian.row_mut(j).retain(|index| index < n);
        }
    }

    fn build_feasibility_objective(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        partition: &ConstraintPartition,
    ) -> Result<(), NumericalError> {
        iterate.evaluate_constraint_jacobian(problem, statistics)?;
        self.objective_gradient.clear();
        for &j in &partition.lower_bound_infeasible {
            for (index, value) in iterate.constraint_jacobian.row(j).iter() {
                self.objective_gradient.insert(index, -value);
            }
        }
        for &j in &partition.upper_bound_infeasible {
            for (index, value) in iterate.constraint_jacobian.row(j).iter() {
                self.objective_gradient.insert(index, value);
            }
        }
        Ok(())
    }

    fn set_feasibility_bounds(
        &mut self,
        problem: &dyn Problem,
        constraints: &[f64],
        partition: &ConstraintPartition,
    ) {
        let bounds = problem.constraint_bounds();
        for &j in &partition.feasible {
            self.constraint_bounds[j] =
                Bound::new(bounds[j].lb - constraints[j], bounds[j].ub - constraints[j]);
        }
        for &j in &partition.lower_bound_infeasible {
            self.constraint_bounds[j] = Bound::upper(bounds[j].lb - constraints[j]);
        }
        for &j in &partition.upper_bound_infeasible {
            self.constraint_bounds[j] = Bound::lower(bounds[j].ub - constraints[j]);
        }
    }

    fn add_proximal_term(&mut self, _iterate: &Iterate) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::SubproblemStatus;
    use crate::linalg::CooSymmetricMatrix;

    /// min x0 + x1 over the box [-1, 1]^2
    struct LinearProblem;

    impl Problem for LinearProblem {
        fn name(&self) -> &str {
            "linear"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            0
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 2] = [
                Bound { lb: -1.0, ub: 1.0 },
                Bound { lb: -1.0, ub: 1.0 },
            ];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[Bound] {
            &[]
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x.fill(0.0);
        }
        fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
            Ok(x[0] + x[1])
        }
        fn evaluate_constraints(&self, _x: &[f64], _c: &mut [f64]) -> Result<(), NumericalError> {
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            _x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), NumericalError> {
            gradient.insert(0, 1.0);
            gradient.insert(1, 1.0);
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            _jacobian: &mut RectangularMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            _objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            _hessian: &mut CooSymmetricMatrix,
        ) -> Result<(), NumericalError> {
            Ok(())
        }
    }

    #[test]
    fn test_lp_direction_hits_trust_region_corner() {
        let problem = LinearProblem;
        let options = Options::default();
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 0);
        let mut subproblem = LpSubproblem::new(&options, &problem).unwrap();

        subproblem
            .build_current_subproblem(&mut statistics, &problem, &mut iterate, 1.0, 0.5)
            .unwrap();
        let direction = subproblem
            .solve(&mut statistics, &problem, &iterate)
            .unwrap();

        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.x[0] + 0.5).abs() < 1e-6);
        assert!((direction.x[1] + 0.5).abs() < 1e-6);

        // linear model: reduction is proportional to the step length
        let model = subproblem.generate_predicted_reduction_model(&direction);
        assert!((model.evaluate(1.0) - 1.0).abs() < 1e-6);
        assert!((model.evaluate(0.5) - 0.5).abs() < 1e-6);
    }
}
