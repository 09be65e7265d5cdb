//! Read-only reference tables
//!
//! Reference data is tabular and numeric: rate tables keyed by some subset
//! of (age, sex, year, draw), distribution parameters, the life table.
//! Tables are loaded once and never mutated.

pub mod loader;

use crate::error::{Error, Result};

/// A small column-oriented numeric table. Column order is preserved from
/// construction, row order from the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    len: usize,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl DataTable {
    pub fn new() -> Self {
        DataTable::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Append a column. The first column establishes the row count.
    pub fn push_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if self.has_column(name) {
            return Err(Error::Schema(name.to_string()));
        }
        if self.names.is_empty() {
            self.len = values.len();
        } else if values.len() != self.len {
            return Err(Error::Size {
                column: name.to_string(),
                expected: self.len,
                actual: values.len(),
            });
        }
        self.names.push(name.to_string());
        self.columns.push(values);
        Ok(())
    }

    /// Builder-style `push_column` for literal tables in code and tests.
    /// Panics on schema or size violations, which are construction bugs.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.push_column(name, values)
            .unwrap_or_else(|e| panic!("bad literal table: {e}"));
        self
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// New table containing only the named columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> Result<DataTable> {
        let mut out = DataTable::new();
        for &name in columns {
            out.push_column(name, self.column(name)?.to_vec())?;
        }
        Ok(out)
    }
}

/// Name of a draw-indexed column, e.g. `log_mean_7` for draw 7.
pub fn draw_column(base: &str, draw: u32) -> String {
    format!("{base}_{draw}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read() {
        let t = DataTable::new()
            .with_column("age", vec![40.0, 50.0])
            .with_column("rate", vec![0.1, 0.2]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("rate").unwrap(), &[0.1, 0.2]);
        assert!(t.column("missing").is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let mut t = DataTable::new();
        t.push_column("age", vec![40.0, 50.0]).unwrap();
        assert!(matches!(
            t.push_column("rate", vec![0.1]).unwrap_err(),
            Error::Size { .. }
        ));
    }

    #[test]
    fn test_select() {
        let t = DataTable::new()
            .with_column("age", vec![40.0])
            .with_column("a", vec![1.0])
            .with_column("b", vec![2.0]);
        let s = t.select(&["age", "b"]).unwrap();
        assert_eq!(s.names(), &["age".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_draw_column_name() {
        assert_eq!(draw_column("log_mean", 3), "log_mean_3");
    }
}
