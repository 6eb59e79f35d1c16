//! Built-in registry of analytic test problems.
//!
//! The modeling front end is out of scope for the engine; the CLI instead
//! ships a set of standard nonlinear programming instances with hand-coded
//! derivatives, addressed by name.

use solver_core::error::NumericalError;
use solver_core::linalg::{CooSymmetricMatrix, RectangularMatrix, SparseVector};
use solver_core::{Bound, Problem};

/// Create a registry problem by name.
pub fn create_problem(name: &str) -> Option<Box<dyn Problem>> {
    match name {
        "quadratic" => Some(Box::new(UnconstrainedQuadratic)),
        "circle" => Some(Box::new(EqualityCircle)),
        "contradiction" => Some(Box::new(Contradiction)),
        "shifted-parabola" => Some(Box::new(ShiftedParabola)),
        "hs71" => Some(Box::new(HockSchittkowski71)),
        _ => None,
    }
}

/// Names of the registry problems.
pub fn problem_names() -> &'static [&'static str] {
    &["quadratic", "circle", "contradiction", "shifted-parabola", "hs71"]
}

const FREE: Bound = Bound {
    lb: f64::NEG_INFINITY,
    ub: f64::INFINITY,
};

/// min ½‖x − (1, 2)‖², unconstrained.
pub struct UnconstrainedQuadratic;

impl Problem for UnconstrainedQuadratic {
    fn name(&self) -> &str {
        "quadratic"
    }
    fn number_variables(&self) -> usize {
        2
    }
    fn number_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 2] = [FREE, FREE];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        &[]
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.fill(0.0);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok(0.5 * ((x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2)))
    }
    fn evaluate_constraints(&self, _x: &[f64], _c: &mut [f64]) -> Result<(), NumericalError> {
        Ok(())
    }
    fn evaluate_objective_gradient(
        &self,
        x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        gradient.insert(0, x[0] - 1.0);
        gradient.insert(1, x[1] - 2.0);
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
        objective_multiplier: f64,
        _constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        hessian.insert(0, 0, objective_multiplier);
        hessian.insert(1, 1, objective_multiplier);
        Ok(())
    }
}

/// min x₁ + x₂ s.t. x₁² + x₂² = 2. Minimizer (−1, −1).
pub struct EqualityCircle;

impl Problem for EqualityCircle {
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
        const BOUNDS: [Bound; 2] = [FREE, FREE];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 1] = [Bound { lb: 2.0, ub: 2.0 }];
        &BOUNDS
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.fill(0.0);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok(x[0] + x[1])
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) -> Result<(), NumericalError> {
        constraints[0] = x[0] * x[0] + x[1] * x[1];
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
        x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        jacobian.row_mut(0).insert(0, 2.0 * x[0]);
        jacobian.row_mut(0).insert(1, 2.0 * x[1]);
        Ok(())
    }
    fn evaluate_lagrangian_hessian(
        &self,
        _x: &[f64],
        _objective_multiplier: f64,
        constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        let curvature = -2.0 * constraint_multipliers[0];
        hessian.insert(0, 0, curvature);
        hessian.insert(1, 1, curvature);
        Ok(())
    }
}

/// min x s.t. x ≥ 1 and x ≤ 0 as general constraints: infeasible, with a
/// whole segment of stationary points of the violation.
pub struct Contradiction;

impl Problem for Contradiction {
    fn name(&self) -> &str {
        "contradiction"
    }
    fn number_variables(&self) -> usize {
        1
    }
    fn number_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 1] = [FREE];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 2] = [
            Bound { lb: 1.0, ub: f64::INFINITY },
            Bound { lb: f64::NEG_INFINITY, ub: 0.0 },
        ];
        &BOUNDS
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.fill(0.5);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok(x[0])
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) -> Result<(), NumericalError> {
        constraints[0] = x[0];
        constraints[1] = x[0];
        Ok(())
    }
    fn evaluate_objective_gradient(
        &self,
        _x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        gradient.insert(0, 1.0);
        Ok(())
    }
    fn evaluate_constraint_jacobian(
        &self,
        _x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        jacobian.row_mut(0).insert(0, 1.0);
        jacobian.row_mut(1).insert(0, 1.0);
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

/// min (x − 2)² s.t. x² ≤ 1, started at x = 5 where the linearization is
/// poor. Minimizer x = 1.
pub struct ShiftedParabola;

impl Problem for ShiftedParabola {
    fn name(&self) -> &str {
        "shifted-parabola"
    }
    fn number_variables(&self) -> usize {
        1
    }
    fn number_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 1] = [FREE];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 1] = [Bound { lb: f64::NEG_INFINITY, ub: 1.0 }];
        &BOUNDS
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.fill(5.0);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok((x[0] - 2.0) * (x[0] - 2.0))
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) -> Result<(), NumericalError> {
        constraints[0] = x[0] * x[0];
        Ok(())
    }
    fn evaluate_objective_gradient(
        &self,
        x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        gradient.insert(0, 2.0 * (x[0] - 2.0));
        Ok(())
    }
    fn evaluate_constraint_jacobian(
        &self,
        x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        jacobian.row_mut(0).insert(0, 2.0 * x[0]);
        Ok(())
    }
    fn evaluate_lagrangian_hessian(
        &self,
        _x: &[f64],
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        hessian.insert(0, 0, 2.0 * objective_multiplier - 2.0 * constraint_multipliers[0]);
        Ok(())
    }
}

/// Hock-Schittkowski problem 71:
///
/// ```text
/// minimize    x1 x4 (x1 + x2 + x3) + x3
/// subject to  x1 x2 x3 x4 >= 25
///             x1² + x2² + x3² + x4² = 40
///             1 <= x <= 5
/// ```
///
/// Standard start (1, 5, 5, 1); minimizer ≈ (1, 4.743, 3.821, 1.379).
pub struct HockSchittkowski71;

impl Problem for HockSchittkowski71 {
    fn name(&self) -> &str {
        "hs71"
    }
    fn number_variables(&self) -> usize {
        4
    }
    fn number_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 4] = [
            Bound { lb: 1.0, ub: 5.0 },
            Bound { lb: 1.0, ub: 5.0 },
            Bound { lb: 1.0, ub: 5.0 },
            Bound { lb: 1.0, ub: 5.0 },
        ];
        &BOUNDS
    }
    fn constraint_bounds(&self) -> &[Bound] {
        const BOUNDS: [Bound; 2] = [
            Bound { lb: 25.0, ub: f64::INFINITY },
            Bound { lb: 40.0, ub: 40.0 },
        ];
        &BOUNDS
    }
    fn initial_primal_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[1.0, 5.0, 5.0, 1.0]);
    }
    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok(x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2])
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) -> Result<(), NumericalError> {
        constraints[0] = x[0] * x[1] * x[2] * x[3];
        constraints[1] = x[0] * x[0] + x[1] * x[1] + x[2] * x[2] + x[3] * x[3];
        Ok(())
    }
    fn evaluate_objective_gradient(
        &self,
        x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        gradient.insert(0, x[3] * (x[0] + x[1] + x[2]) + x[0] * x[3]);
        gradient.insert(1, x[0] * x[3]);
        gradient.insert(2, x[0] * x[3] + 1.0);
        gradient.insert(3, x[0] * (x[0] + x[1] + x[2]));
        Ok(())
    }
    fn evaluate_constraint_jacobian(
        &self,
        x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        jacobian.row_mut(0).insert(0, x[1] * x[2] * x[3]);
        jacobian.row_mut(0).insert(1, x[0] * x[2] * x[3]);
        jacobian.row_mut(0).insert(2, x[0] * x[1] * x[3]);
        jacobian.row_mut(0).insert(3, x[0] * x[1] * x[2]);
        for i in 0..4 {
            jacobian.row_mut(1).insert(i, 2.0 * x[i]);
        }
        Ok(())
    }
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        constraint_multipliers: &[f64],
        hessian: &mut CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        let sigma = objective_multiplier;
        let lambda1 = constraint_multipliers[0];
        let lambda2 = constraint_multipliers[1];

        // objective curvature
        hessian.insert(0, 0, sigma * 2.0 * x[3]);
        hessian.insert(1, 0, sigma * x[3]);
        hessian.insert(2, 0, sigma * x[3]);
        hessian.insert(3, 0, sigma * (2.0 * x[0] + x[1] + x[2]));
        hessian.insert(3, 1, sigma * x[0]);
        hessian.insert(3, 2, sigma * x[0]);

        // product constraint curvature
        hessian.insert(1, 0, -lambda1 * x[2] * x[3]);
        hessian.insert(2, 0, -lambda1 * x[1] * x[3]);
        hessian.insert(3, 0, -lambda1 * x[1] * x[2]);
        hessian.insert(2, 1, -lambda1 * x[0] * x[3]);
        hessian.insert(3, 1, -lambda1 * x[0] * x[2]);
        hessian.insert(3, 2, -lambda1 * x[0] * x[1]);

        // sphere constraint curvature
        for i in 0..4 {
            hessian.insert(i, i, -lambda2 * 2.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver_core::Statistics;

    #[test]
    fn test_registry_lookup() {
        for &name in problem_names() {
            assert!(create_problem(name).is_some(), "missing problem {}", name);
        }
        assert!(create_problem("rosenbrock-42").is_none());
    }

    #[test]
    fn test_hs71_derivatives_match_finite_differences() {
        let problem = HockSchittkowski71;
        let x = [1.0, 4.9, 4.7, 1.2];
        let step = 1e-6;

        // objective gradient
        let mut gradient = SparseVector::with_capacity(4);
        problem.evaluate_objective_gradient(&x, &mut gradient).unwrap();
        let mut dense = vec![0.0; 4];
        gradient.add_to_dense(&mut dense, 1.0);
        for i in 0..4 {
            let mut forward = x;
            forward[i] += step;
            let mut backward = x;
            backward[i] -= step;
            let estimate = (problem.evaluate_objective(&forward).unwrap()
                - problem.evaluate_objective(&backward).unwrap())
                / (2.0 * step);
            assert!(
                (dense[i] - estimate).abs() < 1e-5,
                "objective gradient component {}: {} vs {}",
                i,
                dense[i],
                estimate
            );
        }

        // constraint Jacobian
        let mut jacobian = RectangularMatrix::new(2, 4);
        problem.evaluate_constraint_jacobian(&x, &mut jacobian).unwrap();
        for j in 0..2 {
            let mut row = vec![0.0; 4];
            jacobian.row(j).add_to_dense(&mut row, 1.0);
            for i in 0..4 {
                let mut forward = x;
                forward[i] += step;
                let mut backward = x;
                backward[i] -= step;
                let mut c_forward = [0.0; 2];
                let mut c_backward = [0.0; 2];
                problem.evaluate_constraints(&forward, &mut c_forward).unwrap();
                problem.evaluate_constraints(&backward, &mut c_backward).unwrap();
                let estimate = (c_forward[j] - c_backward[j]) / (2.0 * step);
                assert!(
                    (row[i] - estimate).abs() < 1e-5,
                    "Jacobian ({}, {}): {} vs {}",
                    j,
                    i,
                    row[i],
                    estimate
                );
            }
        }
    }

    #[test]
    fn test_hs71_hessian_is_lagrangian_curvature() {
        let problem = HockSchittkowski71;
        let x = [1.0, 4.9, 4.7, 1.2];
        let multipliers = [0.3, -0.2];
        let mut hessian = CooSymmetricMatrix::new(4, 32);
        problem
            .evaluate_lagrangian_hessian(&x, 1.0, &multipliers, &mut hessian)
            .unwrap();

        // quadratic form against a finite-difference directional derivative
        // of the Lagrangian gradient
        let direction = [0.5, -1.0, 0.25, 1.0];
        let step = 1e-5;
        let lagrangian_gradient = |x: &[f64; 4]| -> Vec<f64> {
            let mut statistics = Statistics::new();
            let mut iterate = solver_core::Iterate::new(4, 2);
            iterate.x = x.to_vec();
            let mut m = solver_core::Multipliers::new(4, 2);
            m.constraints.copy_from_slice(&multipliers);
            iterate
                .evaluate_lagrangian_gradient(&problem, &mut statistics, 1.0, &m)
                .unwrap();
            iterate.lagrangian_gradient.clone()
        };
        let mut forward = x;
        let mut backward = x;
        for i in 0..4 {
            forward[i] += step * direction[i];
            backward[i] -= step * direction[i];
        }
        let gradient_forward = lagrangian_gradient(&forward);
        let gradient_backward = lagrangian_gradient(&backward);

        let mut expected = vec![0.0; 4];
        hessian.product(&direction, &mut expected);
        for i in 0..4 {
            let estimate = (gradient_forward[i] - gradient_backward[i]) / (2.0 * step);
            assert!(
                (expected[i] - estimate).abs() < 1e-4,
                "Hessian row {}: {} vs {}",
                i,
                expected[i],
                estimate
            );
        }
    }
}
