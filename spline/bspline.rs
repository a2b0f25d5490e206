use crate::errors::BuildError;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};

/// Nonzero basis values at one point: `(basis index, value)` pairs in
/// ascending index order.
pub type SparseBasisValues = Vec<(usize, f64)>;

/// A tensor-product B-spline: one clamped knot vector and degree per
/// variable, plus one coefficient per tensor-product basis function.
///
/// Basis functions are ordered with the first variable varying slowest, i.e.
/// the basis at a point is the Kronecker product of the per-variable bases in
/// variable order.
#[derive(Debug, Clone, PartialEq)]
pub struct BSpline {
    knot_vectors: Vec<Array1<f64>>,
    degrees: Vec<usize>,
    basis_counts: Vec<usize>,
    coefficients: Array1<f64>,
}

impl BSpline {
    /// Creates a B-spline from per-variable knot vectors and degrees. All
    /// coefficients start at one.
    ///
    /// # Arguments
    ///
    /// * `knot_vectors`: One non-decreasing knot vector per variable. A knot
    ///   vector of length `k` with degree `p` defines `k - p - 1` basis functions,
    ///   so it must hold at least `p + 2` knots. No knot may appear more than
    ///   `p + 1` times.
    /// * `degrees`: The polynomial degree per variable.
    pub fn new(knot_vectors: Vec<Array1<f64>>, degrees: Vec<usize>) -> Result<Self, BuildError> {
        if knot_vectors.is_empty() || knot_vectors.len() != degrees.len() {
            return Err(BuildError::InvalidSpline(format!(
                "{} knot vector(s) given for {} degree(s)",
                knot_vectors.len(),
                degrees.len()
            )));
        }

        let mut basis_counts = Vec::with_capacity(degrees.len());
        for (dim, (knots, &degree)) in knot_vectors.iter().zip(&degrees).enumerate() {
            if knots.len() < degree + 2 {
                return Err(BuildError::InvalidSpline(format!(
                    "knot vector {dim} has {} knots, but degree {degree} needs at least {}",
                    knots.len(),
                    degree + 2
                )));
            }
            if knots.windows(2).into_iter().any(|w| !(w[0] <= w[1])) {
                return Err(BuildError::InvalidSpline(format!(
                    "knot vector {dim} is not non-decreasing"
                )));
            }
            if let Some((count, knot)) = knots
                .iter()
                .dedup_with_count()
                .find(|&(count, _)| count > degree + 1)
            {
                return Err(BuildError::InvalidSpline(format!(
                    "knot {knot} of vector {dim} is repeated {count} times, but degree {degree} \
                     allows at most {}",
                    degree + 1
                )));
            }
            basis_counts.push(knots.len() - degree - 1);
        }

        let total: usize = basis_counts.iter().product();
        Ok(Self {
            knot_vectors,
            degrees,
            basis_counts,
            coefficients: Array1::ones(total),
        })
    }

    pub fn num_variables(&self) -> usize {
        self.degrees.len()
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn knot_vectors(&self) -> &[Array1<f64>] {
        &self.knot_vectors
    }

    /// Total number of tensor-product basis functions.
    pub fn num_basis_functions(&self) -> usize {
        self.basis_counts.iter().product()
    }

    pub fn num_basis_functions_per_variable(&self) -> &[usize] {
        &self.basis_counts
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn set_coefficients(&mut self, coefficients: Array1<f64>) -> Result<(), BuildError> {
        if coefficients.len() != self.num_basis_functions() {
            return Err(BuildError::InvalidSpline(format!(
                "{} coefficients given for {} basis functions",
                coefficients.len(),
                self.num_basis_functions()
            )));
        }
        self.coefficients = coefficients;
        Ok(())
    }

    /// Evaluates the nonzero tensor-product basis functions at `x`.
    ///
    /// Points outside the knot range are clamped to it. Returns at most
    /// `∏(degree + 1)` entries.
    pub fn eval_basis(&self, x: &[f64]) -> Result<SparseBasisValues, BuildError> {
        if x.len() != self.num_variables() {
            return Err(BuildError::InvalidSpline(format!(
                "point has {} coordinates, spline has {} variables",
                x.len(),
                self.num_variables()
            )));
        }

        let mut product: SparseBasisValues = vec![(0, 1.0)];
        for (dim, &xi) in x.iter().enumerate() {
            let (start, values) =
                internal::evaluate_splines_at_point(xi, self.degrees[dim], self.knot_vectors[dim].view());
            let count = self.basis_counts[dim];
            product = product
                .iter()
                .flat_map(|&(idx, v)| {
                    values
                        .iter()
                        .enumerate()
                        .map(move |(offset, &b)| (idx * count + start + offset, v * b))
                })
                .filter(|&(_, v)| v != 0.0)
                .collect();
        }
        Ok(product)
    }

    /// Evaluates the spline at `x`.
    pub fn eval(&self, x: &[f64]) -> Result<f64, BuildError> {
        Ok(self
            .eval_basis(x)?
            .into_iter()
            .map(|(idx, b)| self.coefficients[idx] * b)
            .sum())
    }
}

/// Internal module for implementation details not exposed in the public API.
mod internal {
    use super::*;

    /// Finds the knot span index `mu` with `knots[mu] <= x < knots[mu + 1]`,
    /// restricted to `[degree, num_basis - 1]` so the right end of the domain
    /// belongs to the last non-empty span.
    fn find_span(x: f64, degree: usize, knots: ArrayView1<f64>) -> usize {
        let num_basis = knots.len() - degree - 1;
        if x >= knots[num_basis] {
            return num_basis - 1;
        }
        if x <= knots[degree] {
            return degree;
        }
        // Binary search for the last knot not exceeding x.
        let (mut low, mut high) = (degree, num_basis);
        while high - low > 1 {
            let mid = (low + high) / 2;
            if knots[mid] <= x {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Evaluates the `degree + 1` possibly-nonzero B-spline basis functions of
    /// one variable at a single point `x` with the Cox-de Boor recurrence.
    ///
    /// Returns the index of the first of them and their values. Quotients
    /// with a zero denominator are taken as zero.
    pub(super) fn evaluate_splines_at_point(
        x: f64,
        degree: usize,
        knots: ArrayView1<f64>,
    ) -> (usize, Vec<f64>) {
        let num_basis = knots.len() - degree - 1;
        let x = x.clamp(knots[degree], knots[num_basis]);
        let mu = find_span(x, degree, knots);

        let mut b = vec![0.0; degree + 1];
        let mut left = vec![0.0; degree + 1];
        let mut right = vec![0.0; degree + 1];
        b[0] = 1.0;

        for d in 1..=degree {
            left[d] = x - knots[mu + 1 - d];
            right[d] = knots[mu + d] - x;
            let mut saved = 0.0;
            for r in 0..d {
                let denom = right[r + 1] + left[d - r];
                let temp = if denom != 0.0 { b[r] / denom } else { 0.0 };
                b[r] = saved + right[r + 1] * temp;
                saved = left[d - r] * temp;
            }
            b[d] = saved;
        }

        (mu - degree, b)
    }
}
