//! Linear algebra layer.
//!
//! Sparse iteration containers, residual norms, and the direct
//! symmetric-indefinite solver used by inertia correction.

pub mod coo_symmetric;
pub mod norms;
pub mod rectangular;
pub mod sparse_vector;
pub mod symmetric_solver;

pub use coo_symmetric::CooSymmetricMatrix;
pub use norms::{norm_1, norm_inf, Norm};
pub use rectangular::RectangularMatrix;
pub use sparse_vector::{dot, SparseVector};
pub use symmetric_solver::{DirectSymmetricIndefiniteSolver, EigenSymmetricSolver};
