//! Columnar population store
//!
//! The population is a struct-of-arrays: a mapping from column name to a
//! typed contiguous vector, all sharing one length. Row index is simulant
//! identity and is stable for the whole run; rows are never inserted or
//! removed after load.

use std::collections::HashMap;

use crate::data::DataTable;
use crate::error::{Error, Result};

use super::column::Column;
use super::mask::Mask;
use super::{ALIVE, Sex};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PopulationTable {
    size: usize,
    columns: HashMap<String, Column>,
}

impl PopulationTable {
    pub fn new() -> Self {
        PopulationTable::default()
    }

    /// Number of simulants. Zero until the first column is contributed.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    /// Add a module-contributed column. The first column establishes the
    /// population size; later columns must match it.
    pub fn insert_column(&mut self, name: &str, column: Column) -> Result<()> {
        if self.columns.contains_key(name) {
            return Err(Error::Schema(name.to_string()));
        }
        if self.columns.is_empty() {
            self.size = column.len();
        } else if column.len() != self.size {
            return Err(Error::Size {
                column: name.to_string(),
                expected: self.size,
                actual: column.len(),
            });
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .get_mut(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    pub fn bools(&self, name: &str) -> Result<&[bool]> {
        match self.column(name)? {
            Column::Bool(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn bools_mut(&mut self, name: &str) -> Result<&mut [bool]> {
        match self.column_mut(name)? {
            Column::Bool(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn ints(&self, name: &str) -> Result<&[i32]> {
        match self.column(name)? {
            Column::Int(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn ints_mut(&mut self, name: &str) -> Result<&mut [i32]> {
        match self.column_mut(name)? {
            Column::Int(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Float(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn floats_mut(&mut self, name: &str) -> Result<&mut [f64]> {
        match self.column_mut(name)? {
            Column::Float(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn sexes(&self, name: &str) -> Result<&[Sex]> {
        match self.column(name)? {
            Column::Sex(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: name.to_string(),
                expected: "sex",
            }),
        }
    }

    pub fn set_bool_where(&mut self, name: &str, mask: &Mask, value: bool) -> Result<()> {
        let values = self.bools_mut(name)?;
        for row in mask.indices() {
            values[row] = value;
        }
        Ok(())
    }

    pub fn set_float_where(&mut self, name: &str, mask: &Mask, value: f64) -> Result<()> {
        let values = self.floats_mut(name)?;
        for row in mask.indices() {
            values[row] = value;
        }
        Ok(())
    }

    pub fn add_float_where(&mut self, name: &str, mask: &Mask, delta: f64) -> Result<()> {
        let values = self.floats_mut(name)?;
        for row in mask.indices() {
            values[row] += delta;
        }
        Ok(())
    }

    pub fn set_int_all(&mut self, name: &str, value: i32) -> Result<()> {
        let values = self.ints_mut(name)?;
        values.fill(value);
        Ok(())
    }

    /// Mask of rows where a boolean column is true.
    pub fn bool_mask(&self, name: &str) -> Result<Mask> {
        Ok(Mask::from_vec(self.bools(name)?.to_vec()))
    }

    /// Mask of living simulants.
    pub fn living(&self) -> Result<Mask> {
        self.bool_mask(ALIVE)
    }

    /// Rows where a boolean column is true, restricted to `mask`.
    pub fn count_where(&self, name: &str, mask: &Mask) -> Result<usize> {
        let values = self.bools(name)?;
        Ok(mask.indices().filter(|&row| values[row]).count())
    }

    /// Numeric view of selected columns, used as an interpolation query.
    /// Row order is preserved, so results align to the population row index.
    pub fn query(&self, columns: &[&str]) -> Result<DataTable> {
        let mut table = DataTable::new();
        for &name in columns {
            table.push_column(name, self.column(name)?.to_numeric())?;
        }
        Ok(table)
    }
}
