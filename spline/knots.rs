use crate::data::DataTable;
use crate::errors::BuildError;
use itertools::Itertools;
use ndarray::{Array, Array1};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of knot segments used by `KnotSpacing::Buckets`.
pub const MAX_BUCKET_SEGMENTS: usize = 10;

/// Defines the strategy for placing the knots of every dimension.
/// This is part of the public API and can be set from the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnotSpacing {
    /// Mimic the spacing of the samples with a moving average over the unique
    /// coordinates. End knots have multiplicity `degree + 1`.
    #[default]
    AsSampled,
    /// Evenly spaced knots over the (optionally padded) coordinate range.
    /// End knots have multiplicity `degree + 1`.
    Equidistant,
    /// Experimental: knots at the means of contiguous buckets of unique
    /// coordinates, with at most `MAX_BUCKET_SEGMENTS` segments.
    Buckets,
}

/// Sorts the values and removes exact duplicates.
///
/// The output is strictly ascending and the operation is idempotent.
pub fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut unique = values.to_vec();
    unique.sort_unstable_by(f64::total_cmp);
    unique.dedup();
    unique
}

/// Computes one clamped knot vector per dimension of the sample table.
///
/// # Arguments
///
/// * `data`: The samples; the coordinate column of each dimension drives knot placement.
/// * `spacing`: The strategy used for every dimension.
/// * `degrees`: The spline degree of each dimension.
/// * `num_basis_functions`: Requested basis counts per dimension (0 = derive
///   from data). Only `KnotSpacing::Equidistant` honours it.
/// * `bounds`: Either empty or one `(low, high)` pair per dimension overriding
///   the data extent for `KnotSpacing::Equidistant`. `NaN` means "use the data".
/// * `padding`: Relative widening of the equidistant range on both sides.
pub fn compute_knot_vectors(
    data: &DataTable,
    spacing: KnotSpacing,
    degrees: &[usize],
    num_basis_functions: &[usize],
    bounds: &[(f64, f64)],
    padding: f64,
) -> Result<Vec<Array1<f64>>, BuildError> {
    let num_variables = data.num_variables();
    if degrees.len() != num_variables || num_basis_functions.len() != num_variables {
        return Err(BuildError::InvalidConfig(format!(
            "{} degree(s) and {} basis count(s) given for {} variable(s)",
            degrees.len(),
            num_basis_functions.len(),
            num_variables
        )));
    }
    if !bounds.is_empty() && bounds.len() != num_variables {
        return Err(BuildError::InvalidConfig(format!(
            "{} bound pair(s) given for {} variable(s)",
            bounds.len(),
            num_variables
        )));
    }

    (0..num_variables)
        .map(|dim| {
            let column = data.column(dim);
            let dim_bounds = bounds.get(dim).copied().unwrap_or((f64::NAN, f64::NAN));
            let knots = match spacing {
                KnotSpacing::AsSampled => moving_average_knots(&column, degrees[dim]),
                KnotSpacing::Equidistant => equidistant_knots(
                    &column,
                    degrees[dim],
                    num_basis_functions[dim],
                    dim_bounds,
                    padding,
                ),
                KnotSpacing::Buckets => bucket_knots(&column, degrees[dim], MAX_BUCKET_SEGMENTS),
            }
            .map_err(|e| match e {
                BuildError::InsufficientData(msg) => {
                    BuildError::InsufficientData(format!("dimension {dim}: {msg}"))
                }
                other => other,
            })?;

            assert!(
                knots.iter().tuple_windows().all(|(a, b)| a <= b),
                "knot vector for dimension {dim} is not non-decreasing: {knots:?}"
            );
            log::debug!("Knot vector for dimension {dim}: {knots}");
            Ok(knots)
        })
        .collect()
}

/// Moving-average knot vector that mimics the spacing of the samples.
///
/// With `n` unique values and degree `p`, the `n - p - 1` interior knots are
/// means of consecutive windows of `p + 2` unique values, and the end values
/// are repeated `p + 1` times, for `n + p + 1` knots in total.
///
/// For equidistant samples `(a,b,c,d,e,f)` and `p = 3` this gives
/// `(a,a,a,a,c,d,f,f,f,f)`; for `p = 1` it gives `(a,a,b,c,d,e,f,f)`.
pub fn moving_average_knots(values: &[f64], degree: usize) -> Result<Array1<f64>, BuildError> {
    let unique = unique_sorted(values);
    require_unique_points(unique.len(), degree)?;

    let window = degree + 2;
    let num_interior = unique.len() - degree - 1;
    let interior = (0..num_interior).map(|i| mean(&unique[i..i + window]));

    Ok(clamp_ends(
        unique[0],
        unique[unique.len() - 1],
        degree + 1,
        interior,
    ))
}

/// Equidistant knot vector over `[low, high]`.
///
/// `n` is `num_basis_functions` when non-zero and the number of unique
/// values otherwise. `n - degree - 1` evenly spaced knots including both
/// endpoints are generated, and each endpoint is then repeated `degree` more
/// times.
pub fn equidistant_knots(
    values: &[f64],
    degree: usize,
    num_basis_functions: usize,
    bounds: (f64, f64),
    padding: f64,
) -> Result<Array1<f64>, BuildError> {
    let unique = unique_sorted(values);
    let n = if num_basis_functions > 0 {
        num_basis_functions
    } else {
        unique.len()
    };
    require_unique_points(n, degree)?;

    let (mut low, mut high) = (
        if bounds.0.is_nan() { unique[0] } else { bounds.0 },
        if bounds.1.is_nan() { unique[unique.len() - 1] } else { bounds.1 },
    );
    if !(low <= high) {
        return Err(BuildError::InvalidConfig(format!(
            "equidistant knot range is reversed: low {low} > high {high}"
        )));
    }
    let pad = (high - low) * padding;
    low -= pad;
    high += pad;

    let num_evenly_spaced = n - degree - 1;
    if num_evenly_spaced < 2 {
        return Err(BuildError::InsufficientData(format!(
            "{n} basis functions of degree {degree} leave {num_evenly_spaced} equidistant knot(s); \
             at least degree+3 = {} are required for a clamped knot vector",
            degree + 3
        )));
    }

    Ok(clamp_ends(
        low,
        high,
        degree,
        Array::linspace(low, high, num_evenly_spaced),
    ))
}

/// Experimental bucket knot vector.
///
/// The unique values are split into contiguous windows, one per interior
/// knot, and each interior knot is the mean of its window. The number of
/// segments is limited to `max_segments` when that still leaves room for a
/// degree `degree` basis.
pub fn bucket_knots(
    values: &[f64],
    degree: usize,
    max_segments: usize,
) -> Result<Array1<f64>, BuildError> {
    let unique = unique_sorted(values);
    require_unique_points(unique.len(), degree)?;

    let n = unique.len();
    let mut num_interior = n - degree - 1;
    let num_segments = num_interior + degree + 1;
    if num_segments > max_segments && max_segments > degree {
        num_interior = max_segments - degree - 1;
    }

    let mut interior = Vec::with_capacity(num_interior);
    if num_interior > 0 {
        let width = n / num_interior;
        let residual = n - width * num_interior;
        let mut start = 0;
        for i in 0..num_interior {
            let size = if i < residual { width + 1 } else { width };
            interior.push(mean(&unique[start..start + size]));
            start += size;
        }
    }

    Ok(clamp_ends(unique[0], unique[n - 1], degree + 1, interior))
}

fn require_unique_points(n: usize, degree: usize) -> Result<(), BuildError> {
    if n < degree + 1 {
        return Err(BuildError::InsufficientData(format!(
            "only {n} unique points are given; a B-spline basis of degree {degree} \
             requires at least degree+1 = {}",
            degree + 1
        )));
    }
    Ok(())
}

/// Concatenates `[low; repeat] ++ interior ++ [high; repeat]`.
fn clamp_ends(
    low: f64,
    high: f64,
    repeat: usize,
    interior: impl IntoIterator<Item = f64>,
) -> Array1<f64> {
    std::iter::repeat_n(low, repeat)
        .chain(interior)
        .chain(std::iter::repeat_n(high, repeat))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
