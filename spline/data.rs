//! # Sample Table and Data Loading Module
//!
//! This module owns the sample set the builder fits against and the single
//! entry point for user-provided sample files.
//!
//! - Strict Schema: Column names are not configurable. Coordinates live in
//!   `x1`, `x2`, ... (consecutive, starting at one), the response in `y`, and
//!   optional per-sample weights in `weight`. Any other column is ignored.
//! - User-Centric Errors: Failures are assumed to be user-input errors.
//!   The `DataError` enum is designed to provide clear, actionable feedback.
//! - Samples may repeat. Whether the coordinates form a complete grid is a
//!   property of the table that the builder checks, not a loading error.

use crate::knots::unique_sorted;
use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array1;
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

/// A single sample: a coordinate vector and its scalar response.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    x: Vec<f64>,
    y: f64,
}

impl DataPoint {
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }
}

/// An ordered collection of samples sharing one dimensionality.
///
/// The dimensionality is fixed by the first sample added.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    samples: Vec<DataPoint>,
    num_variables: usize,
}

/// A comprehensive error type for all sample loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to read the sample file: {0}")]
    CsvError(#[from] csv::Error),

    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),

    #[error(
        "The value '{value}' in column '{column_name}' (data row {row}) could not be parsed as a number."
    )]
    ColumnWrongType {
        column_name: String,
        row: usize,
        value: String,
    },

    #[error(
        "Non-finite values (NaN or Infinity) were found in column '{0}'. All sample values must be finite."
    )]
    NonFiniteValuesFound(String),

    #[error("A sample has {found} coordinates, but the table holds {expected}-dimensional samples.")]
    DimensionMismatch { found: usize, expected: usize },

    #[error("The input file contains no data rows.")]
    NoSamples,
}

/// A sample table together with the optional weights read from the same file.
#[derive(Debug)]
pub struct LoadedSamples {
    pub table: DataTable,
    pub weights: Option<Array1<f64>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. The first sample fixes the table's dimensionality.
    pub fn add_sample(&mut self, x: Vec<f64>, y: f64) -> Result<(), DataError> {
        let expected = if self.samples.is_empty() {
            x.len().max(1)
        } else {
            self.num_variables
        };
        if x.len() != expected {
            return Err(DataError::DimensionMismatch {
                found: x.len(),
                expected,
            });
        }
        if x.iter().chain(std::iter::once(&y)).any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(if y.is_finite() {
                "x".to_string()
            } else {
                "y".to_string()
            }));
        }

        self.num_variables = expected;
        self.samples.push(DataPoint { x, y });
        Ok(())
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataPoint> {
        self.samples.iter()
    }

    /// All coordinates of dimension `dim`, in sample order (duplicates kept).
    pub fn column(&self, dim: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s.x[dim]).collect()
    }

    /// The smallest and largest coordinate of dimension `dim`, or `None` for
    /// an empty table.
    pub fn extent(&self, dim: usize) -> Option<(f64, f64)> {
        self.samples.iter().map(|s| s.x[dim]).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((low, high)) => Some((low.min(v), high.max(v))),
        })
    }

    /// The responses, in sample order.
    pub fn responses(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.y).collect()
    }

    /// Returns `true` when the distinct sample coordinates cover every point of
    /// the grid spanned by the distinct values of each dimension.
    pub fn is_grid_complete(&self) -> bool {
        if self.samples.is_empty() {
            return false;
        }

        let grid_size = (0..self.num_variables).try_fold(1usize, |acc, dim| {
            acc.checked_mul(unique_sorted(&self.column(dim)).len())
        });

        let mut points: Vec<&[f64]> = self.samples.iter().map(|s| s.x.as_slice()).collect();
        points.sort_by(|a, b| compare_points(a, b));
        points.dedup_by(|a, b| compare_points(a, b) == Ordering::Equal);

        grid_size == Some(points.len())
    }
}

impl<'a> IntoIterator for &'a DataTable {
    type Item = &'a DataPoint;
    type IntoIter = std::slice::Iter<'a, DataPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn compare_points(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(l, r)| l.total_cmp(r))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Loads a tab-separated sample file with columns `x1..xd`, `y` and an
/// optional `weight` column.
pub fn load_samples(path: impl AsRef<Path>) -> Result<LoadedSamples, DataError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let layout = internal::ColumnLayout::from_headers(&headers)?;

    let mut table = DataTable::new();
    let mut weights = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let x = layout
            .coordinates
            .iter()
            .map(|(idx, name)| internal::parse_field(&record, *idx, name, row + 1))
            .collect::<Result<Vec<f64>, _>>()?;
        let y = internal::parse_field(&record, layout.response, "y", row + 1)?;
        if let Some(idx) = layout.weight {
            weights.push(internal::parse_field(&record, idx, "weight", row + 1)?);
        }
        table.add_sample(x, y)?;
    }

    if table.is_empty() {
        return Err(DataError::NoSamples);
    }

    log::info!(
        "Loaded {} samples with {} coordinate column(s){}",
        table.num_samples(),
        table.num_variables(),
        if layout.weight.is_some() { " and weights" } else { "" }
    );

    Ok(LoadedSamples {
        table,
        weights: layout.weight.map(|_| Array1::from_vec(weights)),
    })
}

/// Internal module for header resolution and field parsing.
mod internal {
    use super::*;

    /// Column positions resolved from the header row.
    pub(super) struct ColumnLayout {
        pub coordinates: Vec<(usize, String)>,
        pub response: usize,
        pub weight: Option<usize>,
    }

    impl ColumnLayout {
        pub(super) fn from_headers(headers: &StringRecord) -> Result<Self, DataError> {
            let position = |name: &str| headers.iter().position(|h| h == name);

            let mut coordinates = Vec::new();
            while let Some(idx) = position(&format!("x{}", coordinates.len() + 1)) {
                coordinates.push((idx, format!("x{}", coordinates.len() + 1)));
            }
            if coordinates.is_empty() {
                return Err(DataError::ColumnNotFound("x1".to_string()));
            }

            let response = position("y").ok_or_else(|| DataError::ColumnNotFound("y".to_string()))?;

            Ok(Self {
                coordinates,
                response,
                weight: position("weight"),
            })
        }
    }

    pub(super) fn parse_field(
        record: &StringRecord,
        idx: usize,
        column_name: &str,
        row: usize,
    ) -> Result<f64, DataError> {
        let raw = record.get(idx).unwrap_or("");
        let value: f64 = raw.parse().map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            row,
            value: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(value)
    }
}
