//! # Coefficient Solver
//!
//! Finds the B-spline coefficients `x` minimizing
//!
//! ```text
//! ‖B x - y‖²                     (Smoothing::None)
//! ‖B x - y‖² + α ‖x‖²            (Smoothing::Identity, ridge / Tikhonov)
//! (B x - y)ᵀ W (B x - y) + λ ‖D x‖²  (Smoothing::PSpline)
//! ```
//!
//! where `B` is the design matrix, `y` the sample responses, `W` the sample
//! weights and `D` the second-order difference matrix. For P-splines the
//! smoothing parameter starts at `λ = α` and is re-estimated a fixed number of
//! times with the Harville-Fellner-Schall (HFS) update described in chapter 3.4
//! of Eilers & Marx, "Practical Smoothing: The Joys of P-splines".

use crate::bspline::BSpline;
use crate::data::DataTable;
use crate::design::{basis_function_matrix, sample_responses, weight_matrix};
use crate::errors::BuildError;
use crate::linalg::{dense_inverse, solve_system, trace};
use crate::matrix::SparseMatrix;
use crate::penalty::second_order_difference_matrix;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// The regularization applied when solving for the coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    /// Plain least squares; interpolates when the design matrix is square.
    #[default]
    None,
    /// Adds `α xᵀx` to the objective (ridge regression).
    Identity,
    /// Adds `λ ‖D x‖²`, a second-difference roughness penalty (P-spline).
    PSpline,
}

/// Solver settings taken from the builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub smoothing: Smoothing,
    /// Ridge parameter, or the initial P-spline smoothing parameter.
    pub alpha: f64,
    /// Number of HFS re-estimations of the P-spline smoothing parameter.
    pub hfs_iters: usize,
}

/// Diagnostics of one HFS round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HfsRound {
    pub iteration: usize,
    /// The smoothing parameter produced by this round.
    pub lambda: f64,
    /// Effective model dimension `trace((BᵀWB + λDᵀD)⁻¹ BᵀWB)`.
    pub effective_dimension: f64,
    pub tau_squared: f64,
    pub sigma_squared: f64,
}

/// How the coefficients were regularized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothingSummary {
    pub smoothing: Smoothing,
    /// The regularization parameter of the final solve; `None` without smoothing.
    pub lambda: Option<f64>,
    pub hfs_rounds: Vec<HfsRound>,
}

#[derive(Debug, Clone)]
pub struct CoefficientSolution {
    pub coefficients: Array1<f64>,
    pub summary: SmoothingSummary,
}

/// The matrices of a P-spline fit.
pub struct PenalizedProblem<'a> {
    /// Design matrix `B` (samples × basis functions).
    pub design: &'a SparseMatrix,
    /// Sample responses `y`.
    pub responses: &'a Array1<f64>,
    /// Diagonal weight matrix `W` (samples × samples).
    pub weights: &'a SparseMatrix,
    /// Difference matrix `D` (penalty rows × basis functions).
    pub penalty: &'a SparseMatrix,
    /// Dimensionality of the samples, used in the residual variance estimate.
    pub num_variables: usize,
}

/// Computes the coefficients of `bspline` for the samples in `data`.
///
/// Assembles the design matrix, and for P-splines the weight and penalty
/// matrices, then solves the system selected by `options.smoothing`.
pub fn compute_coefficients(
    data: &DataTable,
    bspline: &BSpline,
    weights: Option<&Array1<f64>>,
    options: &SolverOptions,
) -> Result<CoefficientSolution, BuildError> {
    let design = basis_function_matrix(data, bspline)?;
    let responses = sample_responses(data);

    match options.smoothing {
        Smoothing::None => Ok(CoefficientSolution {
            coefficients: solve_system(&design, &responses)?,
            summary: SmoothingSummary {
                smoothing: Smoothing::None,
                lambda: None,
                hfs_rounds: Vec::new(),
            },
        }),
        Smoothing::Identity => Ok(CoefficientSolution {
            coefficients: solve_ridge(&design, &responses, options.alpha)?,
            summary: SmoothingSummary {
                smoothing: Smoothing::Identity,
                lambda: Some(options.alpha),
                hfs_rounds: Vec::new(),
            },
        }),
        Smoothing::PSpline => {
            let weight_mat = weight_matrix(data.num_samples(), weights)?;
            let penalty =
                second_order_difference_matrix(bspline.num_basis_functions_per_variable())?;
            let problem = PenalizedProblem {
                design: &design,
                responses: &responses,
                weights: &weight_mat,
                penalty: &penalty,
                num_variables: data.num_variables(),
            };
            solve_penalized(&problem, options.alpha, options.hfs_iters)
        }
    }
}

/// Solves the ridge system `(BᵀB + αI) x = Bᵀy`.
pub fn solve_ridge(
    design: &SparseMatrix,
    responses: &Array1<f64>,
    alpha: f64,
) -> Result<Array1<f64>, BuildError> {
    let identity = SparseMatrix::identity(design.ncols())?;
    let lhs = design.weighted_gram(None)?.add_scaled(&identity, alpha)?;
    let rhs = design.transpose_dot(responses);
    solve_system(&lhs, &rhs)
}

/// Solves the P-spline system `(BᵀWB + λDᵀD) x = BᵀWy`, starting from
/// `λ = alpha` and running exactly `hfs_iters` HFS rounds before the final solve.
///
/// Each round inverts `M = BᵀWB + λDᵀD` and computes
///
/// ```text
/// ED = trace(M⁻¹ BᵀWB)
/// x  = M⁻¹ BᵀWy
/// τ² = ‖D x‖² / ED
/// σ² = ‖y - B x‖² / (m - d - ED)
/// λ  = σ² / τ²
/// ```
///
/// with `m` samples of dimension `d`. There is no convergence test, and a
/// negative `λ` (from `ED > m - d`) is carried into the next round as is.
pub fn solve_penalized(
    problem: &PenalizedProblem<'_>,
    alpha: f64,
    hfs_iters: usize,
) -> Result<CoefficientSolution, BuildError> {
    let weights = problem.weights.diagonal();
    let btwb = problem.design.weighted_gram(Some(&weights))?;
    let dtd = problem.penalty.weighted_gram(None)?;
    let btwy = problem.design.transpose_dot(&(&weights * problem.responses));

    let mut lambda = alpha;
    let mut lhs = btwb.add_scaled(&dtd, lambda)?;

    let mut hfs_rounds = Vec::with_capacity(hfs_iters);
    if hfs_iters > 0 {
        let btwb_dense = btwb.to_dense();
        let num_samples = problem.responses.len() as f64;
        let num_variables = problem.num_variables as f64;

        for iteration in 0..hfs_iters {
            let lhs_inv = dense_inverse(&lhs.to_dense())?;
            let effective_dimension = trace(&lhs_inv.dot(&btwb_dense));
            let x = lhs_inv.dot(&btwy);

            let tau_squared = squared_norm(&problem.penalty.dot(&x)) / effective_dimension;
            let residuals = problem.responses - &problem.design.dot(&x);
            let sigma_squared =
                squared_norm(&residuals) / (num_samples - num_variables - effective_dimension);

            lambda = sigma_squared / tau_squared;
            log::debug!(
                "HFS iteration {iteration} new lambda is {lambda} ED={effective_dimension} \
                 tau^2={tau_squared} sigma^2={sigma_squared}"
            );
            if !lambda.is_finite() {
                return Err(BuildError::SolveFailure(format!(
                    "HFS iteration {iteration} produced a non-finite smoothing parameter {lambda} \
                     (ED={effective_dimension}, tau^2={tau_squared}, sigma^2={sigma_squared})"
                )));
            }

            hfs_rounds.push(HfsRound {
                iteration,
                lambda,
                effective_dimension,
                tau_squared,
                sigma_squared,
            });
            lhs = btwb.add_scaled(&dtd, lambda)?;
        }
    }

    Ok(CoefficientSolution {
        coefficients: solve_system(&lhs, &btwy)?,
        summary: SmoothingSummary {
            smoothing: Smoothing::PSpline,
            lambda: Some(lambda),
            hfs_rounds,
        },
    })
}

fn squared_norm(v: &Array1<f64>) -> f64 {
    v.dot(v)
}
