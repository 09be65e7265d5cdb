//! Typed population columns

use crate::error::{Error, Result};

/// Simulant sex. Reference data encodes this as 1/2 on input; it is
/// normalized to this enum everywhere inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Integer code used in reference tables and interpolation keys.
    pub fn code(self) -> i64 {
        match self {
            Sex::Male => 1,
            Sex::Female => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Sex::Male),
            2 => Ok(Sex::Female),
            other => Err(Error::SexCode(other)),
        }
    }
}

/// One column of the population table: a contiguous, typed vector.
///
/// All columns in a table share the same length. Bulk, mask-driven access is
/// the hot path, so values are stored as plain vectors rather than row
/// objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Float(Vec<f64>),
    Sex(Vec<Sex>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Sex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Bool(_) => "bool",
            Column::Int(_) => "int",
            Column::Float(_) => "float",
            Column::Sex(_) => "sex",
        }
    }

    /// Numeric view used to build interpolation queries. Booleans map to
    /// 0/1, sexes to their reference-data codes.
    pub fn to_numeric(&self) -> Vec<f64> {
        match self {
            Column::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            Column::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Column::Float(v) => v.clone(),
            Column::Sex(v) => v.iter().map(|&s| s.code() as f64).collect(),
        }
    }
}
