use crate::bspline::BSpline;
use crate::data::DataTable;
use crate::errors::BuildError;
use crate::knots::{KnotSpacing, compute_knot_vectors};
use crate::solver::{Smoothing, SmoothingSummary, SolverOptions, compute_coefficients};
use ndarray::Array1;

/// Highest supported polynomial degree.
pub const MAX_DEGREE: usize = 5;

const DEFAULT_DEGREE: usize = 3;
const DEFAULT_ALPHA: f64 = 0.1;

/// Fluent builder that fits a tensor-product B-spline to a sample table.
///
/// The builder owns a copy of the samples. Setters validate their argument and
/// leave the builder untouched when they reject it, so a failed call can be
/// corrected and the chain resumed:
///
/// ```no_run
/// # use splinefit::{Builder, DataTable, KnotSpacing, Smoothing, BuildError};
/// # fn fit(table: &DataTable) -> Result<(), BuildError> {
/// let spline = Builder::new(table)
///     .degree(3)?
///     .knot_spacing(KnotSpacing::Equidistant)
///     .num_basis_functions(12)
///     .smoothing(Smoothing::PSpline)
///     .alpha(0.5)?
///     .hfs_iters(3)
///     .build()?;
/// # let _ = spline; Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    data: DataTable,
    degrees: Vec<usize>,
    num_basis_functions: Vec<usize>,
    knot_spacing: KnotSpacing,
    smoothing: Smoothing,
    alpha: f64,
    padding: f64,
    weights: Option<Array1<f64>>,
    bounds: Vec<(f64, f64)>,
    hfs_iters: usize,
}

impl Builder {
    /// Creates a builder for `data` with cubic degree, automatic basis
    /// counts, `AsSampled` knots and no smoothing.
    pub fn new(data: &DataTable) -> Self {
        let num_variables = data.num_variables();
        Self {
            data: data.clone(),
            degrees: vec![DEFAULT_DEGREE; num_variables],
            num_basis_functions: vec![0; num_variables],
            knot_spacing: KnotSpacing::default(),
            smoothing: Smoothing::default(),
            alpha: DEFAULT_ALPHA,
            padding: 0.0,
            weights: None,
            bounds: Vec::new(),
            hfs_iters: 0,
        }
    }

    /// Sets the same degree for every variable.
    pub fn degree(&mut self, degree: usize) -> Result<&mut Self, BuildError> {
        check_degree(degree)?;
        self.degrees = vec![degree; self.data.num_variables()];
        Ok(self)
    }

    /// Sets one degree per variable.
    pub fn degrees(&mut self, degrees: Vec<usize>) -> Result<&mut Self, BuildError> {
        self.check_per_variable("degrees", degrees.len())?;
        degrees.iter().try_for_each(|&d| check_degree(d))?;
        self.degrees = degrees;
        Ok(self)
    }

    /// Requests the same number of basis functions for every variable
    /// (0 derives the count from the data). Only equidistant knots honour it.
    pub fn num_basis_functions(&mut self, count: usize) -> &mut Self {
        self.num_basis_functions = vec![count; self.data.num_variables()];
        self
    }

    pub fn num_basis_functions_per_variable(
        &mut self,
        counts: Vec<usize>,
    ) -> Result<&mut Self, BuildError> {
        self.check_per_variable("basis function counts", counts.len())?;
        self.num_basis_functions = counts;
        Ok(self)
    }

    pub fn knot_spacing(&mut self, spacing: KnotSpacing) -> &mut Self {
        self.knot_spacing = spacing;
        self
    }

    pub fn smoothing(&mut self, smoothing: Smoothing) -> &mut Self {
        self.smoothing = smoothing;
        self
    }

    /// Sets the ridge parameter, or the initial P-spline smoothing parameter.
    pub fn alpha(&mut self, alpha: f64) -> Result<&mut Self, BuildError> {
        if !(alpha >= 0.0) {
            return Err(BuildError::InvalidConfig(format!(
                "alpha must be non-negative, got {alpha}"
            )));
        }
        self.alpha = alpha;
        Ok(self)
    }

    /// Sets the relative widening of the equidistant knot range.
    pub fn padding(&mut self, padding: f64) -> Result<&mut Self, BuildError> {
        if !(padding >= 0.0) {
            return Err(BuildError::InvalidConfig(format!(
                "padding must be non-negative, got {padding}"
            )));
        }
        self.padding = padding;
        Ok(self)
    }

    /// Sets one weight per sample for P-spline fitting.
    pub fn weights(&mut self, weights: Vec<f64>) -> Result<&mut Self, BuildError> {
        if weights.len() != self.data.num_samples() {
            return Err(BuildError::InvalidConfig(format!(
                "{} weights given for {} samples",
                weights.len(),
                self.data.num_samples()
            )));
        }
        if let Some((idx, w)) = weights
            .iter()
            .enumerate()
            .find(|&(_, &w)| !(w.is_finite() && w >= 0.0))
        {
            return Err(BuildError::InvalidConfig(format!(
                "weight {idx} is {w}; weights must be finite and non-negative"
            )));
        }
        self.weights = Some(Array1::from_vec(weights));
        Ok(self)
    }

    /// Overrides the data extent used by equidistant knots. Pass an empty
    /// vector to clear, or one `(low, high)` pair per variable; `NaN` in
    /// either slot keeps the data extent for that side, and the resolved low
    /// end must not exceed the resolved high end.
    pub fn bounds(&mut self, bounds: Vec<(f64, f64)>) -> Result<&mut Self, BuildError> {
        if !bounds.is_empty() {
            self.check_per_variable("bounds", bounds.len())?;
        }
        if let Some(dim) = bounds.iter().position(|&(low, high)| low.is_infinite() || high.is_infinite()) {
            return Err(BuildError::InvalidConfig(format!(
                "bounds of variable {dim} must be finite or NaN"
            )));
        }
        for (dim, &(low, high)) in bounds.iter().enumerate() {
            let (data_low, data_high) = self.data.extent(dim).unwrap_or((f64::NAN, f64::NAN));
            let low = if low.is_nan() { data_low } else { low };
            let high = if high.is_nan() { data_high } else { high };
            if low > high {
                return Err(BuildError::InvalidConfig(format!(
                    "bounds of variable {dim} are reversed: low {low} > high {high}"
                )));
            }
        }
        self.bounds = bounds;
        Ok(self)
    }

    /// Sets how many times the P-spline smoothing parameter is re-estimated.
    pub fn hfs_iters(&mut self, iterations: usize) -> &mut Self {
        self.hfs_iters = iterations;
        self
    }

    pub fn data(&self) -> &DataTable {
        &self.data
    }

    pub fn degree_values(&self) -> &[usize] {
        &self.degrees
    }

    pub fn basis_function_counts(&self) -> &[usize] {
        &self.num_basis_functions
    }

    pub fn knot_spacing_mode(&self) -> KnotSpacing {
        self.knot_spacing
    }

    pub fn smoothing_mode(&self) -> Smoothing {
        self.smoothing
    }

    pub fn alpha_value(&self) -> f64 {
        self.alpha
    }

    pub fn padding_value(&self) -> f64 {
        self.padding
    }

    pub fn weight_values(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    pub fn bound_values(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn hfs_iteration_count(&self) -> usize {
        self.hfs_iters
    }

    /// Fits the spline and returns it with its coefficients attached.
    pub fn build(&self) -> Result<BSpline, BuildError> {
        self.build_with_summary().map(|(spline, _)| spline)
    }

    /// Fits the spline and also reports the smoothing parameter used and the
    /// HFS diagnostics.
    pub fn build_with_summary(&self) -> Result<(BSpline, SmoothingSummary), BuildError> {
        if self.data.is_empty() {
            return Err(BuildError::InsufficientData(
                "cannot build a B-spline without samples".to_string(),
            ));
        }
        self.check_grid()?;

        log::info!(
            "Building a {}-variate B-spline from {} samples (degrees {:?}, {:?} knots, {:?} smoothing)",
            self.data.num_variables(),
            self.data.num_samples(),
            self.degrees,
            self.knot_spacing,
            self.smoothing
        );
        if self.weights.is_some() && self.smoothing != Smoothing::PSpline {
            log::warn!("Sample weights are only used with P-spline smoothing and will be ignored");
        }

        let knot_vectors = compute_knot_vectors(
            &self.data,
            self.knot_spacing,
            &self.degrees,
            &self.num_basis_functions,
            &self.bounds,
            self.padding,
        )?;
        let mut spline = BSpline::new(knot_vectors, self.degrees.clone())?;

        let options = SolverOptions {
            smoothing: self.smoothing,
            alpha: self.alpha,
            hfs_iters: self.hfs_iters,
        };
        let solution = compute_coefficients(&self.data, &spline, self.weights.as_ref(), &options)?;
        spline.set_coefficients(solution.coefficients)?;

        log::info!(
            "Built B-spline with {} basis functions {:?}",
            spline.num_basis_functions(),
            spline.num_basis_functions_per_variable()
        );
        Ok((spline, solution.summary))
    }

    fn check_per_variable(&self, what: &str, len: usize) -> Result<(), BuildError> {
        if len != self.data.num_variables() {
            return Err(BuildError::InvalidConfig(format!(
                "{len} {what} given for {} variable(s)",
                self.data.num_variables()
            )));
        }
        Ok(())
    }

    #[cfg(not(feature = "allow-scatter"))]
    fn check_grid(&self) -> Result<(), BuildError> {
        if !self.data.is_grid_complete() {
            return Err(BuildError::InsufficientData(
                "the samples do not form a complete grid".to_string(),
            ));
        }
        Ok(())
    }

    #[cfg(feature = "allow-scatter")]
    fn check_grid(&self) -> Result<(), BuildError> {
        if !self.data.is_grid_complete() {
            log::warn!("Fitting scattered samples that do not form a complete grid");
        }
        Ok(())
    }
}

fn check_degree(degree: usize) -> Result<(), BuildError> {
    if degree > MAX_DEGREE {
        return Err(BuildError::InvalidConfig(format!(
            "degree {degree} exceeds the maximum of {MAX_DEGREE}"
        )));
    }
    Ok(())
}
