use thiserror::Error;

/// A comprehensive error type for configuring and building a B-spline.
///
/// Configuration problems are raised synchronously by the offending builder
/// setter; everything else surfaces from `Builder::build`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A builder setter rejected its argument. The builder is left unchanged.
    #[error("Invalid builder configuration: {0}")]
    InvalidConfig(String),

    /// The samples cannot support the requested basis (too few unique
    /// coordinates, too few basis functions for the penalty, incomplete grid).
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The coefficient system could not be solved, even after the dense fallback.
    #[error("Failed to solve for B-spline coefficients: {0}")]
    SolveFailure(String),

    #[error("Sparse matrix assembly failed: {0}")]
    MatrixAssembly(String),

    /// Knot vectors, degrees or coefficients handed to `BSpline` do not agree.
    #[error("Inconsistent B-spline definition: {0}")]
    InvalidSpline(String),
}
