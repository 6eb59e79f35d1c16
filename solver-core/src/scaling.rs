//! Function scaling.
//!
//! Scale factors are computed once from the gradients at the initial point:
//! `s = min(1, threshold / ‖∇·‖∞)` for the objective and each constraint.
//! The engine then solves a scaled view of the problem; multipliers and
//! bounds are translated back to original units after the solve.

use crate::error::NumericalError;
use crate::iterate::Multipliers;
use crate::linalg::norms::sparse_norm_inf;
use crate::linalg::{CooSymmetricMatrix, RectangularMatrix, SparseVector};
use crate::problem::{Bound, Problem};

/// Multiplicative scale factors for the objective and the constraints.
#[derive(Debug, Clone)]
pub struct Scaling {
    /// Objective factor
    pub objective: f64,
    /// Constraint factors (length m)
    pub constraints: Vec<f64>,
}

impl Scaling {
    /// Identity scaling.
    pub fn identity(number_constraints: usize) -> Self {
        Self {
            objective: 1.0,
            constraints: vec![1.0; number_constraints],
        }
    }

    /// Compute factors from gradients at the initial point.
    pub fn compute(
        objective_gradient: &SparseVector,
        constraint_jacobian: &RectangularMatrix,
        threshold: f64,
    ) -> Self {
        assert!(0.0 < threshold);
        let factor = |gradient_norm: f64| -> f64 {
            if gradient_norm > threshold {
                threshold / gradient_norm
            } else {
                1.0
            }
        };
        Self {
            objective: factor(sparse_norm_inf(objective_gradient)),
            constraints: constraint_jacobian
                .iter_rows()
                .map(|row| factor(sparse_norm_inf(row)))
                .collect(),
        }
    }

    /// Translate multipliers of the scaled problem into original units:
    /// `λ = λ̃ · s_j / s_f`.
    pub fn unscale_multipliers(&self, multipliers: &mut Multipliers) {
        assert!(self.objective != 0.0);
        for (multiplier, factor) in multipliers
            .constraints
            .iter_mut()
            .zip(self.constraints.iter())
        {
            *multiplier *= factor / self.objective;
        }
        for multiplier in &mut multipliers.lower_bounds {
            *multiplier /= self.objective;
        }
        for multiplier in &mut multipliers.upper_bounds {
            *multiplier /= self.objective;
        }
    }
}

/// Scaled view of a problem: `f̃ = s_f·f`, `c̃ⱼ = sⱼ·cⱼ`, bounds scaled
/// accordingly. Implements [`Problem`], so the engine is oblivious to it.
pub struct ScaledProblem<'a> {
    inner: &'a dyn Problem,
    scaling: Scaling,
    scaled_constraint_bounds: Vec<Bound>,
}

impl<'a> ScaledProblem<'a> {
    /// Wrap `inner` with the given scaling.
    pub fn new(inner: &'a dyn Problem, scaling: Scaling) -> Self {
        assert_eq!(scaling.constraints.len(), inner.number_constraints());
        let scaled_constraint_bounds = inner
            .constraint_bounds()
            .iter()
            .zip(scaling.constraints.iter())
            .map(|(bound, &factor)| Bound::new(factor * bound.lb, factor * bound.ub))
            .collect();
        Self {
            inner,
            scaling,
            scaled_constraint_bounds,
        }
    }

    /// The scaling in use.
    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }
}

impl Problem for ScaledProblem<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn number_variables(&self) -> usize {
        self.inner.number_variables()
    }

    fn number_constraints(&self) -> usize {
        self.inner.number_constraints()
    }

    fn variable_bounds(&self) -> &[Bound] {
        self.inner.variable_bounds()
    }

    fn constraint_bounds(&self) -> &[Bound] {
        &self.scaled_constraint_bounds
    }

    fn objective_sign(&self) -> f64 {
        self.inner.objective_sign()
    }

    fn initial_primal_point(&self, x: &mut [f64]) {
        self.inner.initial_primal_point(x);
    }

    fn initial_dual_point(&self, multipliers: &mut [f64]) {
        self.inner.initial_dual_point(multipliers);
    }

    fn evaluate_objective(&self, x: &[f64]) -> Result<f64, NumericalError> {
        Ok(self.scaling.objective * self.inner.evaluate_objective(x)?)
    }

    fn evaluate_constraints(
        &self,
        x: &[f64],
        constraints: &mut [f64],
    ) -> Result<(), NumericalError> {
        self.inner.evaluate_constraints(x, constraints)?;
        for (value, &factor) in constraints.iter_mut().zip(self.scaling.constraints.iter()) {
            *value *= factor;
        }
        Ok(())
    }

    fn evaluate_objective_gradient(
        &self,
        x: &[f64],
        gradient: &mut SparseVector,
    ) -> Result<(), NumericalError> {
        self.inner.evaluate_objective_gradient(x, gradient)?;
        gradient.scale(self.scaling.objective);
        Ok(())
    }

    fn evaluate_constraint_jacobian(
        &self,
        x: &[f64],
        jacobian: &mut RectangularMatrix,
    ) -> Result<(), NumericalError> {
        self.inner.evaluate_constraint_jacobian(x, jacobian)?;
        for (j, &factor) in self.scaling.constraints.iter().enumerate() {
            jacobian.row_mut(j).scale(factor);
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
        // ∇²(σ·s_f·f - Σ λ̃ⱼ·sⱼ·cⱼ) in terms of the unscaled problem
        let scaled_multipliers: Vec<f64> = constraint_multipliers
            .iter()
            .zip(self.scaling.constraints.iter())
            .map(|(&multiplier, &factor)| multiplier * factor)
            .collect();
        self.inner.evaluate_lagrangian_hessian(
            x,
            objective_multiplier * self.scaling.objective,
            &scaled_multipliers,
            hessian,
        )
    }

    fn hessian_maximum_number_nonzeros(&self) -> usize {
        self.inner.hessian_maximum_number_nonzeros()
    }
}
