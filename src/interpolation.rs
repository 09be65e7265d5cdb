//! Multi-dimensional lookup and interpolation service
//!
//! Turns a reference table keyed by categorical cohort columns (sex,
//! year, ...) over one or two continuous parameters (age, ...) into a
//! callable evaluated against per-simulant query tables.
//!
//! Categorical keys encode regime changes where interpolating across the
//! boundary would be meaningless, so keys are matched exactly and never
//! extrapolated over. Continuous parameters handle smooth variation within
//! a regime: step lookup at order 0, piecewise-linear at order 1, with
//! endpoint clamping outside the supported range.
//!
//! Construction does the expensive work once (partitioning, per-column
//! function fitting); evaluation is pure and allocates only the result.

use std::collections::HashMap;

use log::warn;

use crate::data::DataTable;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum ValueFn {
    /// All continuous parameters were dropped for lack of support.
    Constant(f64),
    /// Previous-knot step function, endpoints repeated outside the range.
    Step { knots: Vec<f64>, values: Vec<f64> },
    /// Piecewise-linear, clamped to endpoint values outside the range.
    Linear { knots: Vec<f64>, values: Vec<f64> },
    /// Nearest neighbour over two parameters.
    Nearest {
        points: Vec<(f64, f64)>,
        values: Vec<f64>,
    },
    /// Bilinear over a pivoted grid: `xs` as rows, `ys` as columns.
    Bilinear {
        xs: Vec<f64>,
        ys: Vec<f64>,
        grid: Vec<f64>, // row-major, len = xs.len() * ys.len()
    },
}

/// Locate `x` within sorted knots: segment start, segment end, and the
/// interpolation fraction. Out-of-range queries land on an endpoint.
fn segment(knots: &[f64], x: f64) -> (usize, usize, f64) {
    let last = knots.len() - 1;
    let pos = knots.partition_point(|k| *k <= x);
    if pos == 0 {
        return (0, 0, 0.0);
    }
    if pos > last {
        return (last, last, 0.0);
    }
    let i = pos - 1;
    let t = (x - knots[i]) / (knots[i + 1] - knots[i]);
    (i, i + 1, t)
}

impl ValueFn {
    fn eval(&self, params: &[f64]) -> f64 {
        match self {
            ValueFn::Constant(v) => *v,
            ValueFn::Step { knots, values } => {
                let pos = knots.partition_point(|k| *k <= params[0]);
                if pos == 0 {
                    values[0]
                } else {
                    values[pos - 1]
                }
            }
            ValueFn::Linear { knots, values } => {
                let (i0, i1, t) = segment(knots, params[0]);
                values[i0] + t * (values[i1] - values[i0])
            }
            ValueFn::Nearest { points, values } => {
                let (x, y) = (params[0], params[1]);
                let mut best = 0;
                let mut best_dist = f64::INFINITY;
                for (i, (px, py)) in points.iter().enumerate() {
                    let dist = (x - px) * (x - px) + (y - py) * (y - py);
                    if dist < best_dist {
                        best = i;
                        best_dist = dist;
                    }
                }
                values[best]
            }
            ValueFn::Bilinear { xs, ys, grid } => {
                let (x0, x1, tx) = segment(xs, params[0].clamp(xs[0], xs[xs.len() - 1]));
                let (y0, y1, ty) = segment(ys, params[1].clamp(ys[0], ys[ys.len() - 1]));
                let cell = |i: usize, j: usize| grid[i * ys.len() + j];
                let lo = cell(x0, y0) + ty * (cell(x0, y1) - cell(x0, y0));
                let hi = cell(x1, y0) + ty * (cell(x1, y1) - cell(x1, y0));
                lo + tx * (hi - lo)
            }
        }
    }
}

/// A precomputed interpolation over a reference table.
#[derive(Debug, Clone)]
pub struct Interpolation {
    key_columns: Vec<String>,
    parameter_columns: Vec<String>,
    value_columns: Vec<String>,
    partitions: HashMap<Vec<i64>, Vec<ValueFn>>,
}

fn unique_count(values: &[f64]) -> usize {
    let mut bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    bits.sort_unstable();
    bits.dedup();
    bits.len()
}

fn key_tuple(key_columns: &[&[f64]], row: usize) -> Vec<i64> {
    key_columns.iter().map(|c| c[row].round() as i64).collect()
}

impl Interpolation {
    /// Build an interpolation from `table`.
    ///
    /// `key_columns` are matched exactly at evaluation time and must hold
    /// integral codes (sex, year). `parameter_columns` (one or two) are
    /// interpolated at the given `order` (0 or 1). Every remaining column
    /// is a value column. A parameter without enough distinct values to
    /// support the requested order is dropped with a warning.
    pub fn new(
        table: &DataTable,
        key_columns: &[&str],
        parameter_columns: &[&str],
        order: usize,
    ) -> Result<Self> {
        if order > 1 {
            return Err(Error::UnsupportedOrder(order));
        }
        if parameter_columns.is_empty() || parameter_columns.len() > 2 {
            return Err(Error::UnsupportedParameterCount(parameter_columns.len()));
        }
        for name in key_columns.iter().chain(parameter_columns) {
            if !table.has_column(name) {
                return Err(Error::MissingParameter(name.to_string()));
            }
        }

        let mut kept_parameters: Vec<String> = Vec::new();
        for &name in parameter_columns {
            let support = unique_count(table.column(name)?);
            if support > order {
                kept_parameters.push(name.to_string());
            } else {
                warn!(
                    "parameter '{name}' has {support} distinct values, too few for an \
                     order-{order} interpolation; dropping it"
                );
            }
        }

        let mut value_columns: Vec<String> = table
            .names()
            .iter()
            .filter(|n| {
                !key_columns.contains(&n.as_str()) && !parameter_columns.contains(&n.as_str())
            })
            .cloned()
            .collect();
        value_columns.sort();
        if value_columns.is_empty() {
            return Err(Error::NoValueColumns);
        }

        let keys: Vec<&[f64]> = key_columns
            .iter()
            .map(|&name| table.column(name))
            .collect::<Result<_>>()?;
        let params: Vec<&[f64]> = kept_parameters
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<_>>()?;

        let mut partition_rows: HashMap<Vec<i64>, Vec<usize>> = HashMap::new();
        for row in 0..table.len() {
            partition_rows
                .entry(key_tuple(&keys, row))
                .or_default()
                .push(row);
        }

        let mut partitions = HashMap::with_capacity(partition_rows.len());
        for (tuple, rows) in partition_rows {
            let mut funcs = Vec::with_capacity(value_columns.len());
            for name in &value_columns {
                let values = table.column(name)?;
                funcs.push(fit(&params, &rows, values, order, &kept_parameters)?);
            }
            partitions.insert(tuple, funcs);
        }

        Ok(Interpolation {
            key_columns: key_columns.iter().map(|s| s.to_string()).collect(),
            parameter_columns: kept_parameters,
            value_columns,
            partitions,
        })
    }

    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }

    /// Evaluate against a query table carrying the key and parameter
    /// columns. The result holds one column per value column, aligned to
    /// the query's row order.
    pub fn evaluate(&self, query: &DataTable) -> Result<DataTable> {
        for name in self.key_columns.iter().chain(&self.parameter_columns) {
            if !query.has_column(name) {
                return Err(Error::MissingParameter(name.clone()));
            }
        }

        let keys: Vec<&[f64]> = self
            .key_columns
            .iter()
            .map(|name| query.column(name))
            .collect::<Result<_>>()?;
        let params: Vec<&[f64]> = self
            .parameter_columns
            .iter()
            .map(|name| query.column(name))
            .collect::<Result<_>>()?;

        let mut out: Vec<Vec<f64>> = vec![vec![0.0; query.len()]; self.value_columns.len()];
        let mut point = [0.0f64; 2];
        for row in 0..query.len() {
            let tuple = key_tuple(&keys, row);
            let funcs = self
                .partitions
                .get(&tuple)
                .ok_or(Error::MissingKey(tuple))?;
            for (i, p) in params.iter().enumerate() {
                point[i] = p[row];
            }
            for (column, func) in out.iter_mut().zip(funcs) {
                column[row] = func.eval(&point[..params.len()]);
            }
        }

        let mut result = DataTable::new();
        for (name, values) in self.value_columns.iter().zip(out) {
            result.push_column(name, values)?;
        }
        Ok(result)
    }
}

/// Fit one value column over one partition.
fn fit(
    params: &[&[f64]],
    rows: &[usize],
    values: &[f64],
    order: usize,
    parameter_names: &[String],
) -> Result<ValueFn> {
    match params.len() {
        0 => Ok(ValueFn::Constant(values[rows[0]])),
        1 => {
            let mut pairs: Vec<(f64, f64)> =
                rows.iter().map(|&r| (params[0][r], values[r])).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            pairs.dedup_by(|a, b| a.0 == b.0);
            let (knots, values): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            if order == 0 {
                Ok(ValueFn::Step { knots, values })
            } else {
                Ok(ValueFn::Linear { knots, values })
            }
        }
        _ => {
            if order == 0 {
                let points = rows
                    .iter()
                    .map(|&r| (params[0][r], params[1][r]))
                    .collect();
                let values = rows.iter().map(|&r| values[r]).collect();
                return Ok(ValueFn::Nearest { points, values });
            }
            let mut xs: Vec<f64> = rows.iter().map(|&r| params[0][r]).collect();
            xs.sort_by(f64::total_cmp);
            xs.dedup();
            let mut ys: Vec<f64> = rows.iter().map(|&r| params[1][r]).collect();
            ys.sort_by(f64::total_cmp);
            ys.dedup();

            let mut cells: HashMap<(u64, u64), f64> = HashMap::new();
            for &r in rows {
                cells
                    .entry((params[0][r].to_bits(), params[1][r].to_bits()))
                    .or_insert(values[r]);
            }
            let mut grid = Vec::with_capacity(xs.len() * ys.len());
            for &x in &xs {
                for &y in &ys {
                    let cell = cells.get(&(x.to_bits(), y.to_bits())).ok_or_else(|| {
                        Error::IncompleteGrid(
                            parameter_names[0].clone(),
                            parameter_names[1].clone(),
                        )
                    })?;
                    grid.push(*cell);
                }
            }
            Ok(ValueFn::Bilinear { xs, ys, grid })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Reference table with sex strata: value = age for males, 2*age for
    /// females, ages 20..=80 by 10.
    fn stratified_table() -> DataTable {
        let mut age = Vec::new();
        let mut sex = Vec::new();
        let mut value = Vec::new();
        for &s in &[1.0, 2.0] {
            for a in (20..=80).step_by(10) {
                age.push(a as f64);
                sex.push(s);
                value.push(if s == 1.0 { a as f64 } else { 2.0 * a as f64 });
            }
        }
        DataTable::new()
            .with_column("age", age)
            .with_column("sex", sex)
            .with_column("value", value)
    }

    #[test]
    fn test_categorical_strata_do_not_blend() {
        let interp = Interpolation::new(&stratified_table(), &["sex"], &["age"], 1).unwrap();
        let query = DataTable::new()
            .with_column("age", vec![35.0, 35.0])
            .with_column("sex", vec![1.0, 2.0]);
        let result = interp.evaluate(&query).unwrap();
        let values = result.column("value").unwrap();
        assert_relative_eq!(values[0], 35.0, max_relative = 1e-12);
        assert_relative_eq!(values[1], 70.0, max_relative = 1e-12);
    }

    #[test]
    fn test_order_one_matches_reference_at_knots() {
        let interp = Interpolation::new(&stratified_table(), &["sex"], &["age"], 1).unwrap();
        let query = DataTable::new()
            .with_column("age", vec![20.0, 50.0, 80.0])
            .with_column("sex", vec![2.0, 2.0, 2.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_eq!(values.column("value").unwrap(), &[40.0, 100.0, 160.0]);
    }

    #[test]
    fn test_order_one_clamps_out_of_range() {
        let interp = Interpolation::new(&stratified_table(), &["sex"], &["age"], 1).unwrap();
        let query = DataTable::new()
            .with_column("age", vec![5.0, 110.0])
            .with_column("sex", vec![1.0, 1.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_eq!(values.column("value").unwrap(), &[20.0, 80.0]);
    }

    #[test]
    fn test_order_zero_is_previous_knot() {
        let table = DataTable::new()
            .with_column("age", vec![20.0, 30.0, 40.0])
            .with_column("rate", vec![1.0, 2.0, 3.0]);
        let interp = Interpolation::new(&table, &[], &["age"], 0).unwrap();
        let query = DataTable::new().with_column("age", vec![10.0, 20.0, 29.9, 30.0, 99.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_eq!(values.column("rate").unwrap(), &[1.0, 1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let interp = Interpolation::new(&stratified_table(), &["sex"], &["age"], 1).unwrap();
        let query = DataTable::new()
            .with_column("age", vec![35.0])
            .with_column("sex", vec![3.0]);
        assert!(matches!(
            interp.evaluate(&query).unwrap_err(),
            Error::MissingKey(key) if key == vec![3]
        ));
    }

    #[test]
    fn test_missing_parameter_is_an_error() {
        let interp = Interpolation::new(&stratified_table(), &["sex"], &["age"], 1).unwrap();
        let query = DataTable::new().with_column("sex", vec![1.0]);
        assert!(matches!(
            interp.evaluate(&query).unwrap_err(),
            Error::MissingParameter(p) if p == "age"
        ));
    }

    #[test]
    fn test_no_value_columns_is_an_error() {
        let table = DataTable::new()
            .with_column("sex", vec![1.0])
            .with_column("age", vec![40.0]);
        assert!(matches!(
            Interpolation::new(&table, &["sex"], &["age"], 1).unwrap_err(),
            Error::NoValueColumns
        ));
    }

    #[test]
    fn test_unsupported_order_and_parameter_count() {
        let table = stratified_table();
        assert!(matches!(
            Interpolation::new(&table, &["sex"], &["age"], 2).unwrap_err(),
            Error::UnsupportedOrder(2)
        ));
        assert!(matches!(
            Interpolation::new(&table, &["sex"], &[], 1).unwrap_err(),
            Error::UnsupportedParameterCount(0)
        ));
    }

    #[test]
    fn test_insufficient_support_drops_parameter() {
        // One distinct year cannot support order 1; the parameter is
        // dropped and queries no longer need to carry it.
        let table = DataTable::new()
            .with_column("year", vec![1990.0, 1990.0])
            .with_column("sex", vec![1.0, 2.0])
            .with_column("value", vec![7.0, 9.0]);
        let interp = Interpolation::new(&table, &["sex"], &["year"], 1).unwrap();
        let query = DataTable::new().with_column("sex", vec![2.0, 1.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_eq!(values.column("value").unwrap(), &[9.0, 7.0]);
    }

    #[test]
    fn test_bilinear_grid() {
        let mut age = Vec::new();
        let mut year = Vec::new();
        let mut value = Vec::new();
        for &a in &[40.0, 50.0] {
            for &y in &[1990.0, 2000.0] {
                age.push(a);
                year.push(y);
                value.push(a + (y - 1990.0));
            }
        }
        let table = DataTable::new()
            .with_column("age", age)
            .with_column("year", year)
            .with_column("value", value);
        let interp = Interpolation::new(&table, &[], &["age", "year"], 1).unwrap();

        let query = DataTable::new()
            .with_column("age", vec![45.0])
            .with_column("year", vec![1995.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_relative_eq!(values.column("value").unwrap()[0], 50.0, max_relative = 1e-12);
    }

    #[test]
    fn test_bilinear_incomplete_grid_is_an_error() {
        let table = DataTable::new()
            .with_column("age", vec![40.0, 40.0, 50.0])
            .with_column("year", vec![1990.0, 2000.0, 1990.0])
            .with_column("value", vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            Interpolation::new(&table, &[], &["age", "year"], 1).unwrap_err(),
            Error::IncompleteGrid(_, _)
        ));
    }

    #[test]
    fn test_nearest_neighbour_two_parameters() {
        let table = DataTable::new()
            .with_column("age", vec![40.0, 50.0])
            .with_column("year", vec![1990.0, 2000.0])
            .with_column("value", vec![1.0, 2.0]);
        let interp = Interpolation::new(&table, &[], &["age", "year"], 0).unwrap();
        let query = DataTable::new()
            .with_column("age", vec![41.0, 49.0])
            .with_column("year", vec![1991.0, 1999.0]);
        let values = interp.evaluate(&query).unwrap();
        assert_eq!(values.column("value").unwrap(), &[1.0, 2.0]);
    }
}
