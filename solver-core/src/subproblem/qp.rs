//! Quadratic programming subproblem.

use super::{PredictedReductionModel, Subproblem};
use crate::direction::{ConstraintPartition, Direction};
use crate::error::{ConfigurationError, NumericalError};
use crate::hessian::{create_hessian_model, HessianModel};
use crate::iterate::Iterate;
use crate::linalg::{dot, Norm, RectangularMatrix, SparseVector};
use crate::options::Options;
use crate::problem::{constraint_violation, Bound, Problem};
use crate::relaxation::ElasticVariables;
use crate::solvers::{create_qp_solver, QpSolver, SubproblemData};
use crate::statistics::Statistics;

/// Local quadratic model solved by an external QP solver.
pub struct QpSubproblem {
    number_problem_variables: usize,
    number_constraints: usize,

    solver: Box<dyn QpSolver>,
    hessian_model: Box<dyn HessianModel>,

    // assembled model
    objective_gradient: SparseVector,
    constraints: Vec<f64>,
    constraint_jacobian: RectangularMatrix,
    constraint_multipliers: Vec<f64>,
    variable_bounds: Vec<Bound>,
    constraint_bounds: Vec<Bound>,
    initial_point: Vec<f64>,

    residual_norm: Norm,
    proximal_coefficient: f64,
}

impl QpSubproblem {
    /// Build a QP subproblem from the options. `convexify` applies inertia
    /// correction after every Hessian evaluation.
    pub fn new(
        options: &Options,
        problem: &dyn Problem,
        convexify: bool,
    ) -> Result<Self, ConfigurationError> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        // room for the diagonal terms appended by inertia correction
        let hessian_capacity = problem.hessian_maximum_number_nonzeros() + n;

        Ok(Self {
            number_problem_variables: n,
            number_constraints: m,
            solver: create_qp_solver(options.get("QP_solver")?)?,
            hessian_model: create_hessian_model(
                options.get("hessian_model")?,
                n,
                hessian_capacity,
                convexify,
            )?,
            objective_gradient: SparseVector::with_capacity(n),
            constraints: vec![0.0; m],
            constraint_jacobian: RectangularMatrix::new(m, n),
            constraint_multipliers: vec![0.0; m],
            variable_bounds: vec![Bound::free(); n],
            constraint_bounds: vec![Bound::free(); m],
            initial_point: vec![0.0; n],
            residual_norm: Norm::from_option(options.get("residual_norm")?)?,
            proximal_coefficient: options.get_f64("proximal_coefficient")?,
        })
    }

    fn set_variable_displacement_bounds(
        &mut self,
        problem: &dyn Problem,
        iterate: &Iterate,
        trust_region_radius: f64,
    ) {
        assert!(0.0 < trust_region_radius);
        for (i, bound) in problem.variable_bounds().iter().enumerate() {
            let lb = (bound.lb - iterate.x[i]).max(-trust_region_radius);
            let ub = (bound.ub - iterate.x[i]).min(trust_region_radius);
            self.variable_bounds[i] = Bound::new(lb, ub);
        }
    }

    fn set_linearized_constraint_bounds(&mut self, problem: &dyn Problem) {
        for (j, bound) in problem.constraint_bounds().iter().enumerate() {
            self.constraint_bounds[j] =
                Bound::new(bound.lb - self.constraints[j], bound.ub - self.constraints[j]);
        }
    }
}

impl Subproblem for QpSubproblem {
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
        // drop any elastic columns left over from an aborted solve
        self.remove_elastic_variables();

        iterate.evaluate_constraints(problem, statistics)?;
        self.constraints.copy_from_slice(&iterate.constraints);
        iterate.evaluate_constraint_jacobian(problem, statistics)?;
        self.constraint_jacobian = iterate.constraint_jacobian.clone();
        iterate.evaluate_objective_gradient(problem, statistics)?;

        self.build_objective_model(statistics, problem, iterate, objective_multiplier)?;

        self.set_variable_displacement_bounds(problem, iterate, trust_region_radius);
        self.set_linearized_constraint_bounds(problem);
        Ok(())
    }

    fn build_objective_model(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError> {
        // the Hessian is always evaluated with the prevailing multiplier
        self.hessian_model.evaluate(
            statistics,
            problem,
            iterate,
            objective_multiplier,
            &self.constraint_multipliers,
        )?;

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
            hessian: Some(self.hessian_model.hessian()),
            initial_point: &self.initial_point,
        };
        let mut direction = self.solver.solve_qp(statistics, &data)?;
        compute_dual_displacements(iterate, &mut direction);
        Ok(direction)
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        let gradient = self.objective_gradient.clone();
        let hessian = self.hessian_model.hessian().clone();
        let displacement = direction.x.clone();
        let length = displacement.len().min(self.number_problem_variables);
        PredictedReductionModel::new(-direction.objective, move || {
            let linear = dot(&displacement, &gradient);
            let quadratic =
                hessian.quadratic_product(&displacement, &displacement, length) / 2.0;
            (linear, quadratic)
        })
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
        self.proximal_coefficient
    }

    fn number_variables(&self) -> usize {
        self.variable_bounds.len()
    }

    fn set_initial_point(&mut self, point: &[f64]) {
        let length = point.len().min(self.initial_point.len());
        self.initial_point[..length].copy_from_slice(&point[..length]);
    }

    fn set_constraint_multipliers(&mut self, multipliers: &[f64]) {
        self.constraint_multipliers.copy_from_slice(multipliers);
    }

    fn set_constraint_multiplier(&mut self, constraint_index: usize, value: f64) {
        self.constraint_multipliers[constraint_index] = value;
    }

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
        // sum of the gradients of the violated constraints, signed so that
        // the linear objective decreases the violation
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
        // violated constraints may move up to, but not past, the violated side
        for &j in &partition.lower_bound_infeasible {
            self.constraint_bounds[j] = Bound::upper(bounds[j].lb - constraints[j]);
        }
        for &j in &partition.upper_bound_infeasible {
            self.constraint_bounds[j] = Bound::lower(bounds[j].ub - constraints[j]);
        }
    }

    fn add_proximal_term(&mut self, iterate: &Iterate) {
        let coefficient = self.proximal_coefficient;
        if coefficient == 0.0 {
            return;
        }
        let hessian = self.hessian_model.hessian_mut();
        for i in 0..self.number_problem_variables {
            let x = iterate.x[i].abs();
            let weight = if x == 0.0 { 1.0 } else { (1.0 / x).min(1.0) };
            hessian.insert(i, i, coefficient * weight * weight);
        }
    }
}

/// Turn the solver's absolute multipliers into displacements with respect
/// to the current iterate (trial multipliers = current + α·displacement).
pub(crate) fn compute_dual_displacements(iterate: &Iterate, direction: &mut Direction) {
    for (j, multiplier) in iterate.multipliers.constraints.iter().enumerate() {
        direction.multipliers.constraints[j] -= multiplier;
    }
    let n = iterate.number_variables();
    for i in 0..n.min(direction.multipliers.lower_bounds.len()) {
        direction.multipliers.lower_bounds[i] -= iterate.multipliers.lower_bounds[i];
        direction.multipliers.upper_bounds[i] -= iterate.multipliers.upper_bounds[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::CooSymmetricMatrix;

    /// min x0^2 + x1^2 s.t. x0 + x1 >= 1, starting from the origin
    struct CircleProblem;

    impl Problem for CircleProblem {
        fn name(&self) -> &str {
            "circle"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 2] = [
                Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
                Bound { lb: f64::NEG_INFINITY, ub: f64::INFINITY },
            ];
            &BOUNDS
        }
        fn constraint_bounds(&self) -> &[Bound] {
            const BOUNDS: [Bound; 1] = [Bound { lb: 1.0, ub: f64::INFINITY }];
            &BOUNDS
        }
        fn initial_primal_point(&self, x: &mut [f64]) {
            x.fill(0.0);
        }
        fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
            Ok(x[0] * x[0] + x[1] * x[1])
        }
        fn evaluate_constraints(&self, x: &[f64], c: &mut [f64]) -> Result<(), NumericalError> {
            c[0] = x[0] + x[1];
            Ok(())
        }
        fn evaluate_objective_gradient(
            &self,
            x: &[f64],
            gradient: &mut SparseVector,
        ) -> Result<(), NumericalError> {
            gradient.insert(0, 2.0 * x[0]);
            gradient.insert(1, 2.0 * x[1]);
            Ok(())
        }
        fn evaluate_constraint_jacobian(
            &self,
            _x: &[f64],
            jacobian: &mut RectangularMatrix,
        ) -> Result<(), NumericalError> {
            jacobian.row_mut(0).insert(0, 1.0);
            jacobian.row_mut(0).insert(1, 1.0);
            Ok(())
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            objective_multiplier: f64,
            _constraint_multipliers: &[f64],
            hessian: &mut CooSymmetricMatrix,
        ) -> Result<(), NumericalError> {
            hessian.insert(0, 0, 2.0 * objective_multiplier);
            hessian.insert(1, 1, 2.0 * objective_multiplier);
            Ok(())
        }
    }

    fn build_and_solve(radius: f64) -> (QpSubproblem, Direction, Iterate, Statistics) {
        let problem = CircleProblem;
        let options = Options::default();
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        let mut subproblem = QpSubproblem::new(&options, &problem, false).unwrap();
        subproblem
            .build_current_subproblem(&mut statistics, &problem, &mut iterate, 1.0, radius)
            .unwrap();
        let direction = subproblem
            .solve(&mut statistics, &problem, &iterate)
            .unwrap();
        (subproblem, direction, iterate, statistics)
    }

    #[test]
    fn test_qp_direction_at_origin() {
        // minimize |d|^2 s.t. d0 + d1 >= 1: d = (1/2, 1/2)
        let (_, direction, _, statistics) = build_and_solve(10.0);
        assert!((direction.x[0] - 0.5).abs() < 1e-6);
        assert!((direction.x[1] - 0.5).abs() < 1e-6);
        assert_eq!(statistics.subproblem_solves, 1);
        assert_eq!(statistics.hessian_evaluations, 1);
    }

    #[test]
    fn test_trust_region_restricts_displacements() {
        let (subproblem, direction, _, _) = build_and_solve(0.1);
        // the box clips the step at the radius
        assert!(direction.norm <= 0.1 + 1e-9);
        assert_eq!(subproblem.variable_bounds[0].lb, -0.1);
        assert_eq!(subproblem.variable_bounds[0].ub, 0.1);
    }

    #[test]
    fn test_predicted_reduction_model_consistency() {
        let (subproblem, direction, _, _) = build_and_solve(10.0);
        let model = subproblem.generate_predicted_reduction_model(&direction);
        // at alpha = 1 the model returns the negated subproblem objective
        assert!((model.evaluate(1.0) + direction.objective).abs() < 1e-12);
        // the quadratic model agrees with a direct evaluation at alpha = 1/2:
        // -alpha (g.d + alpha d.H.d / 2)
        let expected = -0.5 * (0.0 + 0.5 * 1.0 * 0.5);
        assert!((model.evaluate(0.5) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_objective_multiplier_clears_gradient() {
        let problem = CircleProblem;
        let options = Options::default();
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        iterate.x = vec![1.0, 1.0];
        let mut subproblem = QpSubproblem::new(&options, &problem, false).unwrap();
        subproblem
            .build_current_subproblem(&mut statistics, &problem, &mut iterate, 0.0, 10.0)
            .unwrap();
        assert!(subproblem.objective_gradient.is_empty());
    }

    #[test]
    fn test_elastic_columns_round_trip() {
        let problem = CircleProblem;
        let options = Options::default();
        let mut statistics = Statistics::new();
        let mut iterate = Iterate::new(2, 1);
        let mut subproblem = QpSubproblem::new(&options, &problem, false).unwrap();
        subproblem
            .build_current_subproblem(&mut statistics, &problem, &mut iterate, 1.0, 10.0)
            .unwrap();

        let elastics = ElasticVariables::generate(&problem, 2);
        subproblem.add_elastic_variables(&elastics, 1.0);
        assert_eq!(subproblem.number_variables(), 3);

        subproblem.remove_elastic_variables();
        assert_eq!(subproblem.number_variables(), 2);
        assert!(subproblem
            .constraint_jacobian
            .row(0)
            .iter()
            .all(|(index, _)| index < 2));
    }
}
