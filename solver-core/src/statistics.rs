//! Explicit solve statistics.
//!
//! Evaluation counters live here instead of in process-wide globals, and are
//! threaded through the call stack. The iteration table mimics the usual
//! fixed-width solver log: components register columns at initialization and
//! record values as the iteration progresses.

/// Counters and the per-iteration reporting table.
#[derive(Debug, Default)]
pub struct Statistics {
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

    columns: Vec<Column>,
    row: Vec<Option<String>>,
}

#[derive(Debug)]
struct Column {
    name: String,
    width: usize,
}

impl Statistics {
    /// Fresh statistics with no registered columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reporting column. Registration order is print order.
    pub fn add_column(&mut self, name: &str, width: usize) {
        self.columns.push(Column {
            name: name.to_string(),
            width: width.max(name.len() + 1),
        });
        self.row.push(None);
    }

    /// Record a value for the current iteration row.
    pub fn record(&mut self, name: &str, value: impl std::fmt::Display) {
        if let Some(position) = self.columns.iter().position(|c| c.name == name) {
            self.row[position] = Some(value.to_string());
        }
    }

    /// Print the table header.
    pub fn print_header(&self) {
        let mut line = String::new();
        for column in &self.columns {
            line.push_str(&format!("{:>width$}", column.name, width = column.width));
        }
        println!("{}", line);
        println!("{}", "-".repeat(line.len()));
    }

    /// Print the current row and clear it.
    pub fn print_row(&mut self) {
        let mut line = String::new();
        for (column, value) in self.columns.iter().zip(self.row.iter_mut()) {
            let text = value.take().unwrap_or_default();
            line.push_str(&format!("{:>width$}", text, width = column.width));
        }
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let statistics = Statistics::new();
        assert_eq!(statistics.objective_evaluations, 0);
        assert_eq!(statistics.subproblem_solves, 0);
    }

    #[test]
    fn test_record_ignores_unregistered_columns() {
        let mut statistics = Statistics::new();
        statistics.add_column("iter", 6);
        statistics.record("iter", 3);
        statistics.record("phantom", 1.0);
        assert_eq!(statistics.row[0].as_deref(), Some("3"));
    }
}
