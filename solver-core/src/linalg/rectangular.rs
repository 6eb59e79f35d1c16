//! Rectangular sparse matrix stored as an array of sparse rows.
//!
//! The constraint Jacobian is one sparse gradient per constraint. Rows are
//! preallocated with the column capacity so that repeated rebuilds of the
//! subproblem do not reallocate.

use super::sparse_vector::SparseVector;

/// Row-major sparse matrix: one [`SparseVector`] per row.
#[derive(Debug, Clone)]
pub struct RectangularMatrix {
    rows: Vec<SparseVector>,
    number_columns: usize,
}

impl RectangularMatrix {
    /// Allocate a matrix with `number_rows` empty rows, each with capacity
    /// for `number_columns` entries.
    pub fn new(number_rows: usize, number_columns: usize) -> Self {
        Self {
            rows: (0..number_rows)
                .map(|_| SparseVector::with_capacity(number_columns))
                .collect(),
            number_columns,
        }
    }

    /// Number of rows.
    pub fn number_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn number_columns(&self) -> usize {
        self.number_columns
    }

    /// Access a row.
    pub fn row(&self, row_index: usize) -> &SparseVector {
        &self.rows[row_index]
    }

    /// Mutable access to a row.
    pub fn row_mut(&mut self, row_index: usize) -> &mut SparseVector {
        &mut self.rows[row_index]
    }

    /// Iterate over the rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &SparseVector> {
        self.rows.iter()
    }

    /// Clear every row, keeping allocations.
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }
}
