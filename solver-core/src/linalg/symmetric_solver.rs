//! Direct symmetric-indefinite linear solver.
//!
//! Inertia correction only needs factorization, inertia counts and a solve.
//! The shipped backend assembles the coordinate matrix densely and uses a
//! symmetric eigendecomposition, which yields the inertia triple exactly.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};

use super::coo_symmetric::CooSymmetricMatrix;
use crate::error::NumericalError;

/// Interface of a direct solver for symmetric indefinite systems.
///
/// A symbolic factorization fixes the dimension; numerical factorizations
/// can then be repeated for matrices with the same structure, and expose the
/// inertia of the factorized matrix.
pub trait DirectSymmetricIndefiniteSolver {
    /// Analyze the matrix structure.
    fn do_symbolic_factorization(&mut self, matrix: &CooSymmetricMatrix);

    /// Factorize the matrix numerically.
    fn do_numerical_factorization(
        &mut self,
        matrix: &CooSymmetricMatrix,
    ) -> Result<(), NumericalError>;

    /// Solve `M x = rhs` using the last numerical factorization.
    fn solve(&self, rhs: &[f64], result: &mut [f64]) -> Result<(), NumericalError>;

    /// Inertia (positive, negative, zero eigenvalue counts).
    fn inertia(&self) -> (usize, usize, usize);

    /// Number of negative eigenvalues of the factorized matrix.
    fn number_negative_eigenvalues(&self) -> usize {
        self.inertia().1
    }

    /// True when the factorized matrix is numerically singular.
    fn matrix_is_singular(&self) -> bool {
        self.inertia().2 > 0
    }

    /// Numerical rank of the factorized matrix.
    fn rank(&self) -> usize {
        let (positive, negative, _) = self.inertia();
        positive + negative
    }
}

/// Dense eigendecomposition backend.
pub struct EigenSymmetricSolver {
    dimension: usize,
    singularity_tolerance: f64,
    decomposition: Option<SymmetricEigen<f64, nalgebra::Dyn>>,
}

impl EigenSymmetricSolver {
    /// Create a solver; `singularity_tolerance` is the relative eigenvalue
    /// magnitude below which the matrix counts as singular.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            singularity_tolerance: 1e-12,
            decomposition: None,
        }
    }

    fn eigenvalue_threshold(&self, eigenvalues: &DVector<f64>) -> f64 {
        let largest = eigenvalues.iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
        self.singularity_tolerance * largest.max(1.0)
    }
}

impl DirectSymmetricIndefiniteSolver for EigenSymmetricSolver {
    fn do_symbolic_factorization(&mut self, matrix: &CooSymmetricMatrix) {
        assert_eq!(matrix.dimension(), self.dimension);
        self.decomposition = None;
    }

    fn do_numerical_factorization(
        &mut self,
        matrix: &CooSymmetricMatrix,
    ) -> Result<(), NumericalError> {
        assert_eq!(matrix.dimension(), self.dimension);
        let dense: DMatrix<f64> = matrix.to_dense();
        if dense.iter().any(|v| !v.is_finite()) {
            return Err(NumericalError::Factorization(
                "matrix contains non-finite entries".to_string(),
            ));
        }
        self.decomposition = Some(SymmetricEigen::new(dense));
        Ok(())
    }

    fn solve(&self, rhs: &[f64], result: &mut [f64]) -> Result<(), NumericalError> {
        assert_eq!(rhs.len(), self.dimension);
        assert_eq!(result.len(), self.dimension);
        let decomposition = self
            .decomposition
            .as_ref()
            .expect("solve called before numerical factorization");

        let threshold = self.eigenvalue_threshold(&decomposition.eigenvalues);
        if decomposition
            .eigenvalues
            .iter()
            .any(|lambda| lambda.abs() <= threshold)
        {
            return Err(NumericalError::Factorization(
                "matrix is numerically singular".to_string(),
            ));
        }

        // x = V diag(1/lambda) V^T rhs
        let rhs = DVector::from_column_slice(rhs);
        let mut projected = decomposition.eigenvectors.transpose() * rhs;
        for (coefficient, lambda) in projected.iter_mut().zip(decomposition.eigenvalues.iter()) {
            *coefficient /= lambda;
        }
        let solution = &decomposition.eigenvectors * projected;
        result.copy_from_slice(solution.as_slice());
        Ok(())
    }

    fn inertia(&self) -> (usize, usize, usize) {
        let decomposition = self
            .decomposition
            .as_ref()
            .expect("inertia queried before numerical factorization");
        let threshold = self.eigenvalue_threshold(&decomposition.eigenvalues);

        let mut positive = 0;
        let mut negative = 0;
        let mut zero = 0;
        for &lambda in decomposition.eigenvalues.iter() {
            if lambda > threshold {
                positive += 1;
            } else if lambda < -threshold {
                negative += 1;
            } else {
                zero += 1;
            }
        }
        (positive, negative, zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factorized(matrix: &CooSymmetricMatrix) -> EigenSymmetricSolver {
        let mut solver = EigenSymmetricSolver::new(matrix.dimension());
        solver.do_symbolic_factorization(matrix);
        solver.do_numerical_factorization(matrix).unwrap();
        solver
    }

    #[test]
    fn test_inertia_of_indefinite_matrix() {
        // diag(2, -1, 0)
        let mut m = CooSymmetricMatrix::new(3, 4);
        m.insert(0, 0, 2.0);
        m.insert(1, 1, -1.0);

        let solver = factorized(&m);
        assert_eq!(solver.inertia(), (1, 1, 1));
        assert_eq!(solver.number_negative_eigenvalues(), 1);
        assert!(solver.matrix_is_singular());
        assert_eq!(solver.rank(), 2);
    }

    #[test]
    fn test_solve_positive_definite() {
        // [[2, 1], [1, 2]] x = [3, 3] => x = [1, 1]
        let mut m = CooSymmetricMatrix::new(2, 4);
        m.insert(0, 0, 2.0);
        m.insert(1, 0, 1.0);
        m.insert(1, 1, 2.0);

        let solver = factorized(&m);
        assert_eq!(solver.inertia(), (2, 0, 0));

        let mut x = vec![0.0; 2];
        solver.solve(&[3.0, 3.0], &mut x).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_rejects_singular_matrix() {
        let mut m = CooSymmetricMatrix::new(2, 2);
        m.insert(0, 0, 1.0);
        // (1,1) left implicit zero

        let solver = factorized(&m);
        let mut x = vec![0.0; 2];
        assert!(solver.solve(&[1.0, 1.0], &mut x).is_err());
    }

    #[test]
    fn test_duplicate_coordinate_entries_sum_before_factorization() {
        // diag entry assembled from -3 + 4 = 1
        let mut m = CooSymmetricMatrix::new(1, 2);
        m.insert(0, 0, -3.0);
        m.insert(0, 0, 4.0);

        let solver = factorized(&m);
        assert_eq!(solver.inertia(), (1, 0, 0));
    }
}
