//! In-tree primal-dual interior-point solver for convex QPs and LPs.
//!
//! Stands in for an external active-set code behind the [`QpSolver`] and
//! [`LpSolver`] traits. The subproblem arrives with a variable box and
//! two-sided linearized constraints; it is brought into the standard form
//!
//! ```text
//! minimize    (1/2) x^T Q x + c^T x
//! subject to  A x = b            (equality rows)
//!             G x + s = h, s >= 0  (one facet per finite inequality side)
//! ```
//!
//! and solved with Mehrotra predictor-corrector steps on a regularized KKT
//! system. A phase-1 elastic LP runs first; when the constraint rows are
//! inconsistent the solver reports `Infeasible` together with the signed
//! constraint partition instead of a phase-2 solution.
//!
//! The Hessian must be positive semidefinite; pairing nonconvex models with
//! this solver is the caller's responsibility (inertia correction).

use nalgebra::{DMatrix, DVector};

use super::{LpSolver, QpSolver, SubproblemData};
use crate::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::error::NumericalError;
use crate::linalg::norm_inf;
use crate::problem::BoundKind;
use crate::statistics::Statistics;

const MAX_ITERATIONS: usize = 100;
const STATIC_REGULARIZATION: f64 = 1e-10;
const FRACTION_TO_BOUNDARY: f64 = 0.995;
const RESIDUAL_TOLERANCE: f64 = 1e-10;
const COMPLEMENTARITY_TOLERANCE: f64 = 1e-11;
const FEASIBILITY_TOLERANCE: f64 = 1e-8;
const ACTIVITY_TOLERANCE: f64 = 1e-7;
const DIVERGENCE_THRESHOLD: f64 = 1e10;

/// Primal-dual interior-point QP/LP solver.
#[derive(Default)]
pub struct PdqpSolver {}

impl PdqpSolver {
    /// Create a solver instance.
    pub fn new() -> Self {
        Self {}
    }
}

impl QpSolver for PdqpSolver {
    fn solve_qp(
        &mut self,
        statistics: &mut Statistics,
        data: &SubproblemData,
    ) -> Result<Direction, NumericalError> {
        statistics.subproblem_solves += 1;
        solve(data, data.hessian.is_some())
    }
}

impl LpSolver for PdqpSolver {
    fn solve_lp(
        &mut self,
        statistics: &mut Statistics,
        data: &SubproblemData,
    ) -> Result<Direction, NumericalError> {
        statistics.subproblem_solves += 1;
        solve(data, false)
    }
}

/// Where a standard-form row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowSource {
    /// Constraint row j, at its lower or upper bound
    Constraint(usize),
    /// Variable column i, at its lower or upper bound
    Variable(usize),
    /// Nonnegativity of a phase-1 elastic column
    Elastic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

/// Dense standard form with provenance of every row.
struct StandardForm {
    number_columns: usize,
    quadratic: DMatrix<f64>,
    gradient: Vec<f64>,
    equality_rows: Vec<Vec<f64>>,
    equality_rhs: Vec<f64>,
    equality_sources: Vec<RowSource>,
    facet_rows: Vec<Vec<f64>>,
    facet_rhs: Vec<f64>,
    facet_sources: Vec<(RowSource, Side)>,
}

impl StandardForm {
    fn push_equality(&mut self, row: Vec<f64>, rhs: f64, source: RowSource) {
        self.equality_rows.push(row);
        self.equality_rhs.push(rhs);
        self.equality_sources.push(source);
    }

    fn push_facet(&mut self, row: Vec<f64>, rhs: f64, source: RowSource, side: Side) {
        self.facet_rows.push(row);
        self.facet_rhs.push(rhs);
        self.facet_sources.push((source, side));
    }
}

fn densify_gradient(data: &SubproblemData) -> Vec<f64> {
    let mut gradient = vec![0.0; data.number_variables()];
    data.objective_gradient.add_to_dense(&mut gradient, 1.0);
    gradient
}

fn densify_row(data: &SubproblemData, j: usize) -> Vec<f64> {
    let mut row = vec![0.0; data.number_variables()];
    data.constraint_jacobian.row(j).add_to_dense(&mut row, 1.0);
    row
}

fn densify_hessian(data: &SubproblemData, use_hessian: bool) -> DMatrix<f64> {
    let n = data.number_variables();
    let mut quadratic = DMatrix::zeros(n, n);
    if use_hessian {
        if let Some(hessian) = data.hessian {
            for (i, j, value) in hessian.iter() {
                quadratic[(i, j)] += value;
                if i != j {
                    quadratic[(j, i)] += value;
                }
            }
        }
    }
    quadratic
}

/// Assemble the phase-2 standard form of the subproblem.
fn build_phase2_form(data: &SubproblemData, use_hessian: bool) -> StandardForm {
    let n = data.number_variables();
    let mut form = StandardForm {
        number_columns: n,
        quadratic: densify_hessian(data, use_hessian),
        gradient: densify_gradient(data),
        equality_rows: Vec::new(),
        equality_rhs: Vec::new(),
        equality_sources: Vec::new(),
        facet_rows: Vec::new(),
        facet_rhs: Vec::new(),
        facet_sources: Vec::new(),
    };

    for (j, bound) in data.constraint_bounds.iter().enumerate() {
        let row = densify_row(data, j);
        match bound.kind() {
            BoundKind::Equal => form.push_equality(row, bound.lb, RowSource::Constraint(j)),
            _ => {
                if bound.lb > f64::NEG_INFINITY {
                    let negated: Vec<f64> = row.iter().map(|&v| -v).collect();
                    form.push_facet(negated, -bound.lb, RowSource::Constraint(j), Side::Lower);
                }
                if bound.ub < f64::INFINITY {
                    form.push_facet(row, bound.ub, RowSource::Constraint(j), Side::Upper);
                }
            }
        }
    }

    for (i, bound) in data.variable_bounds.iter().enumerate() {
        match bound.kind() {
            BoundKind::Equal => {
                let mut row = vec![0.0; n];
                row[i] = 1.0;
                form.push_equality(row, bound.lb, RowSource::Variable(i));
            }
            _ => {
                if bound.lb > f64::NEG_INFINITY {
                    let mut row = vec![0.0; n];
                    row[i] = -1.0;
                    form.push_facet(row, -bound.lb, RowSource::Variable(i), Side::Lower);
                }
                if bound.ub < f64::INFINITY {
                    let mut row = vec![0.0; n];
                    row[i] = 1.0;
                    form.push_facet(row, bound.ub, RowSource::Variable(i), Side::Upper);
                }
            }
        }
    }
    form
}

/// Assemble the phase-1 elastic LP: minimize the total violation of the
/// constraint rows over the variable box.
fn build_phase1_form(data: &SubproblemData) -> StandardForm {
    let phase2 = build_phase2_form(data, false);
    let n = data.number_variables();

    // one elastic column per relaxed row
    let number_elastics = phase2
        .equality_sources
        .iter()
        .filter(|source| matches!(source, RowSource::Constraint(_)))
        .count()
        * 2
        + phase2
            .facet_sources
            .iter()
            .filter(|(source, _)| matches!(source, RowSource::Constraint(_)))
            .count();
    let total = n + number_elastics;

    let extend = |row: &[f64]| -> Vec<f64> {
        let mut extended = vec![0.0; total];
        extended[..n].copy_from_slice(row);
        extended
    };

    let mut form = StandardForm {
        number_columns: total,
        quadratic: DMatrix::zeros(total, total),
        gradient: vec![0.0; total],
        equality_rows: Vec::new(),
        equality_rhs: Vec::new(),
        equality_sources: Vec::new(),
        facet_rows: Vec::new(),
        facet_rhs: Vec::new(),
        facet_sources: Vec::new(),
    };

    let mut next_elastic = n;
    let mut relax = |row: &mut Vec<f64>, coefficient: f64, form: &mut StandardForm| {
        row[next_elastic] = coefficient;
        form.gradient[next_elastic] = 1.0;
        let mut nonnegativity = vec![0.0; total];
        nonnegativity[next_elastic] = -1.0;
        form.push_facet(nonnegativity, 0.0, RowSource::Elastic, Side::Lower);
        next_elastic += 1;
    };

    for ((row, &rhs), &source) in phase2
        .equality_rows
        .iter()
        .zip(phase2.equality_rhs.iter())
        .zip(phase2.equality_sources.iter())
    {
        let mut extended = extend(row);
        if matches!(source, RowSource::Constraint(_)) {
            relax(&mut extended, 1.0, &mut form);
            relax(&mut extended, -1.0, &mut form);
        }
        form.push_equality(extended, rhs, source);
    }
    for ((row, &rhs), &(source, side)) in phase2
        .facet_rows
        .iter()
        .zip(phase2.facet_rhs.iter())
        .zip(phase2.facet_sources.iter())
    {
        let mut extended = extend(row);
        if matches!(source, RowSource::Constraint(_)) {
            relax(&mut extended, -1.0, &mut form);
        }
        form.push_facet(extended, rhs, source, side);
    }
    form
}

struct IpmState {
    x: Vec<f64>,
    equality_duals: Vec<f64>,
    facet_duals: Vec<f64>,
    diverged: bool,
}

fn dense_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// Mehrotra predictor-corrector loop on the standard form.
fn run_ipm(form: &StandardForm, initial_point: &[f64]) -> Result<IpmState, NumericalError> {
    let nx = form.number_columns;
    let me = form.equality_rows.len();
    let mi = form.facet_rows.len();
    let dimension = nx + me + mi;

    let mut x: Vec<f64> = initial_point.to_vec();
    x.resize(nx, 0.0);
    let mut y = vec![0.0; me];
    let mut z = vec![1.0; mi];
    let mut s = vec![1.0; mi];
    for k in 0..mi {
        let gap = form.facet_rhs[k] - dense_dot(&form.facet_rows[k], &x);
        s[k] = gap.max(1.0);
    }

    let scale = 1.0
        + norm_inf(&form.gradient)
        + norm_inf(&form.equality_rhs)
        + norm_inf(&form.facet_rhs);

    let mut rd = vec![0.0; nx];
    let mut rp = vec![0.0; me];
    let mut rg = vec![0.0; mi];

    for _iteration in 0..MAX_ITERATIONS {
        // residuals
        for i in 0..nx {
            rd[i] = form.gradient[i];
            for j in 0..nx {
                rd[i] += form.quadratic[(i, j)] * x[j];
            }
        }
        for k in 0..me {
            for i in 0..nx {
                rd[i] += form.equality_rows[k][i] * y[k];
            }
            rp[k] = dense_dot(&form.equality_rows[k], &x) - form.equality_rhs[k];
        }
        for k in 0..mi {
            for i in 0..nx {
                rd[i] += form.facet_rows[k][i] * z[k];
            }
            rg[k] = dense_dot(&form.facet_rows[k], &x) + s[k] - form.facet_rhs[k];
        }
        let mu = if mi > 0 {
            dense_dot(&s, &z) / mi as f64
        } else {
            0.0
        };

        let feasible = norm_inf(&rp).max(norm_inf(&rg)) <= RESIDUAL_TOLERANCE * scale;
        let stationary = norm_inf(&rd) <= RESIDUAL_TOLERANCE * scale;
        if feasible && stationary && mu <= COMPLEMENTARITY_TOLERANCE * scale {
            return Ok(IpmState {
                x,
                equality_duals: y,
                facet_duals: z,
                diverged: false,
            });
        }
        if norm_inf(&x) > DIVERGENCE_THRESHOLD {
            return Ok(IpmState {
                x,
                equality_duals: y,
                facet_duals: z,
                diverged: true,
            });
        }

        // regularized KKT matrix
        let mut kkt = DMatrix::zeros(dimension, dimension);
        for i in 0..nx {
            for j in 0..nx {
                kkt[(i, j)] = form.quadratic[(i, j)];
            }
            kkt[(i, i)] += STATIC_REGULARIZATION;
        }
        for k in 0..me {
            for i in 0..nx {
                kkt[(nx + k, i)] = form.equality_rows[k][i];
                kkt[(i, nx + k)] = form.equality_rows[k][i];
            }
            kkt[(nx + k, nx + k)] = -STATIC_REGULARIZATION;
        }
        for k in 0..mi {
            let r = nx + me + k;
            for i in 0..nx {
                kkt[(r, i)] = form.facet_rows[k][i];
                kkt[(i, r)] = form.facet_rows[k][i];
            }
            kkt[(r, r)] = -(s[k] / z[k] + STATIC_REGULARIZATION);
        }
        let lu = kkt.lu();

        let solve_with_complementarity =
            |lu: &nalgebra::linalg::LU<f64, nalgebra::Dyn, nalgebra::Dyn>,
             complementarity: &[f64]|
             -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>), NumericalError> {
                let mut rhs = DVector::zeros(dimension);
                for i in 0..nx {
                    rhs[i] = -rd[i];
                }
                for k in 0..me {
                    rhs[nx + k] = -rp[k];
                }
                for k in 0..mi {
                    rhs[nx + me + k] = -rg[k] + complementarity[k] / z[k];
                }
                let solution = lu.solve(&rhs).ok_or_else(|| {
                    NumericalError::Factorization("singular KKT system in QP solver".to_string())
                })?;
                let dx: Vec<f64> = (0..nx).map(|i| solution[i]).collect();
                let dy: Vec<f64> = (0..me).map(|k| solution[nx + k]).collect();
                let dz: Vec<f64> = (0..mi).map(|k| solution[nx + me + k]).collect();
                let ds: Vec<f64> = (0..mi)
                    .map(|k| -(complementarity[k] + s[k] * dz[k]) / z[k])
                    .collect();
                Ok((dx, dy, dz, ds))
            };

        let max_step = |s: &[f64], z: &[f64], ds: &[f64], dz: &[f64]| -> f64 {
            let mut step = 1.0_f64;
            for k in 0..mi {
                if ds[k] < 0.0 {
                    step = step.min(-s[k] / ds[k]);
                }
                if dz[k] < 0.0 {
                    step = step.min(-z[k] / dz[k]);
                }
            }
            step
        };

        // predictor
        let complementarity_affine: Vec<f64> = (0..mi).map(|k| s[k] * z[k]).collect();
        let (dx, dy, dz, ds) = solve_with_complementarity(&lu, &complementarity_affine)?;

        let (dx, dy, dz, ds) = if mi > 0 {
            let alpha_affine = max_step(&s, &z, &ds, &dz);
            let mu_affine = (0..mi)
                .map(|k| (s[k] + alpha_affine * ds[k]) * (z[k] + alpha_affine * dz[k]))
                .sum::<f64>()
                / mi as f64;
            let sigma = (mu_affine / mu).powi(3).clamp(0.0, 1.0);

            // corrector with centering and second-order term
            let complementarity: Vec<f64> = (0..mi)
                .map(|k| s[k] * z[k] - sigma * mu + ds[k] * dz[k])
                .collect();
            solve_with_complementarity(&lu, &complementarity)?
        } else {
            (dx, dy, dz, ds)
        };

        let alpha = if mi > 0 {
            (FRACTION_TO_BOUNDARY * max_step(&s, &z, &ds, &dz)).min(1.0)
        } else {
            1.0
        };

        for i in 0..nx {
            x[i] += alpha * dx[i];
        }
        for k in 0..me {
            y[k] += alpha * dy[k];
        }
        for k in 0..mi {
            z[k] = (z[k] + alpha * dz[k]).max(1e-14);
            s[k] = (s[k] + alpha * ds[k]).max(1e-14);
        }
    }
    Err(NumericalError::SubproblemSolver(
        "interior-point iteration limit reached".to_string(),
    ))
}

/// Total violation of the constraint rows at a point.
fn constraint_row_violation(data: &SubproblemData, x: &[f64]) -> f64 {
    let mut total = 0.0;
    for (j, bound) in data.constraint_bounds.iter().enumerate() {
        let row = densify_row(data, j);
        total += bound.violation(dense_dot(&row, &x[..data.number_variables()]));
    }
    total
}

/// Signed partition of the constraint rows at a point.
fn partition_constraint_rows(data: &SubproblemData, x: &[f64]) -> ConstraintPartition {
    let mut partition = ConstraintPartition::default();
    let tolerance = FEASIBILITY_TOLERANCE;
    for (j, bound) in data.constraint_bounds.iter().enumerate() {
        let row = densify_row(data, j);
        let value = dense_dot(&row, &x[..data.number_variables()]);
        if value < bound.lb - tolerance {
            partition.lower_bound_infeasible.push(j);
            partition.infeasible.push(j);
        } else if value > bound.ub + tolerance {
            partition.upper_bound_infeasible.push(j);
            partition.infeasible.push(j);
        } else {
            partition.feasible.push(j);
        }
    }
    partition
}

/// Map the standard-form solution back to a [`Direction`].
fn extract_direction(
    data: &SubproblemData,
    form: &StandardForm,
    state: &IpmState,
    status: SubproblemStatus,
) -> Direction {
    let n = data.number_variables();
    let m = data.number_constraints();
    let mut direction = Direction::new(n, m);
    direction.status = status;
    direction.x.copy_from_slice(&state.x[..n]);
    direction.norm = norm_inf(&direction.x);

    // objective value of the model, over all standard-form columns
    let mut objective = dense_dot(&form.gradient, &state.x);
    for i in 0..form.number_columns {
        for j in 0..form.number_columns {
            objective += 0.5 * state.x[i] * form.quadratic[(i, j)] * state.x[j];
        }
    }
    direction.objective = objective;

    let multipliers = &mut direction.multipliers;
    for (k, &source) in form.equality_sources.iter().enumerate() {
        match source {
            RowSource::Constraint(j) => multipliers.constraints[j] -= state.equality_duals[k],
            RowSource::Variable(i) => {
                if i < n {
                    multipliers.lower_bounds[i] -= state.equality_duals[k];
                }
            }
            RowSource::Elastic => {}
        }
    }
    for (k, &(source, side)) in form.facet_sources.iter().enumerate() {
        let dual = state.facet_duals[k];
        match (source, side) {
            (RowSource::Constraint(j), Side::Lower) => multipliers.constraints[j] += dual,
            (RowSource::Constraint(j), Side::Upper) => multipliers.constraints[j] -= dual,
            (RowSource::Variable(i), Side::Lower) if i < n => multipliers.lower_bounds[i] += dual,
            (RowSource::Variable(i), Side::Upper) if i < n => multipliers.upper_bounds[i] -= dual,
            _ => {}
        }
    }

    // active sets, by primal slack
    let active_set = &mut direction.active_set;
    for &source in form.equality_sources.iter() {
        match source {
            RowSource::Constraint(j) => active_set.constraints_at_lower.push(j),
            RowSource::Variable(i) if i < n => active_set.bounds_at_lower.push(i),
            _ => {}
        }
    }
    for (k, &(source, side)) in form.facet_sources.iter().enumerate() {
        let slack = form.facet_rhs[k] - dense_dot(&form.facet_rows[k], &state.x);
        if slack.abs() > ACTIVITY_TOLERANCE * (1.0 + form.facet_rhs[k].abs()) {
            continue;
        }
        match (source, side) {
            (RowSource::Constraint(j), Side::Lower) => active_set.constraints_at_lower.push(j),
            (RowSource::Constraint(j), Side::Upper) => active_set.constraints_at_upper.push(j),
            (RowSource::Variable(i), Side::Lower) if i < n => active_set.bounds_at_lower.push(i),
            (RowSource::Variable(i), Side::Upper) if i < n => active_set.bounds_at_upper.push(i),
            _ => {}
        }
    }
    direction
}

fn solve(data: &SubproblemData, use_hessian: bool) -> Result<Direction, NumericalError> {
    // phase 1: minimal violation of the constraint rows
    let phase1 = build_phase1_form(data);
    let phase1_origin = vec![0.0; phase1.number_columns];
    let phase1_state = run_ipm(&phase1, &phase1_origin)?;
    let violation = constraint_row_violation(data, &phase1_state.x);

    let scale = 1.0 + norm_inf(&phase1.facet_rhs) + norm_inf(&phase1.equality_rhs);
    if violation > FEASIBILITY_TOLERANCE * scale {
        // inconsistent linearization: report the signed partition
        let mut direction = extract_direction(data, &phase1, &phase1_state, SubproblemStatus::Infeasible);
        direction.objective = violation;
        direction.constraint_partition = Some(partition_constraint_rows(data, &phase1_state.x));
        return Ok(direction);
    }

    // phase 2: solve the actual subproblem
    let phase2 = build_phase2_form(data, use_hessian);
    let phase2_state = run_ipm(&phase2, data.initial_point)?;
    if phase2_state.diverged {
        let mut direction = Direction::new(data.number_variables(), data.number_constraints());
        direction.status = SubproblemStatus::Unbounded;
        return Ok(direction);
    }
    Ok(extract_direction(data, &phase2, &phase2_state, SubproblemStatus::Optimal))
}
