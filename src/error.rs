//! Crate-wide error type
//!
//! Every failure the kernel can surface is a variant here. Structural
//! violations (schema, size, module graph) are fatal at load or registration
//! time; interpolation misuse is fatal at construction or call time. Nothing
//! is caught inside the step loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A module contributed a column that already exists in the population.
    #[error("population table already has a column named '{0}'")]
    Schema(String),

    /// A module contributed a column whose length does not match the
    /// established population size.
    #[error("column '{column}' has {actual} rows but the population size is {expected}")]
    Size {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A declared dependency names a module that is not registered.
    #[error("module '{module}' depends on '{dependency}', which is not registered")]
    UnresolvedDependency { module: String, dependency: String },

    /// The module dependency graph contains a cycle.
    #[error("dependency cycle involving module '{0}'")]
    CyclicDependency(String),

    /// A key tuple in an interpolation query was absent when the
    /// interpolation was built. Keys are never extrapolated over.
    #[error("key {0:?} did not appear in the reference table this interpolation was built from")]
    MissingKey(Vec<i64>),

    /// An interpolation query lacks a key or parameter column.
    #[error("query table is missing required column '{0}'")]
    MissingParameter(String),

    /// The reference table has nothing to interpolate.
    #[error("reference table has no value columns")]
    NoValueColumns,

    #[error("interpolation order must be 0 or 1, got {0}")]
    UnsupportedOrder(usize),

    #[error("interpolation supports 1 or 2 continuous parameters, got {0}")]
    UnsupportedParameterCount(usize),

    /// Bilinear interpolation needs a value for every (p1, p2) combination.
    #[error("reference table is not a complete grid over ({0}, {1})")]
    IncompleteGrid(String, String),

    #[error("missing or invalid configuration: {0}")]
    Configuration(String),

    #[error("no column named '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' is not of type {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("unknown sex code {0} (expected 1 for male or 2 for female)")]
    SexCode(i64),

    #[error("failed to parse '{value}' in column '{column}' as a number")]
    Numeric { column: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
