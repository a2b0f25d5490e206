use crate::bspline::BSpline;
use crate::data::DataTable;
use crate::errors::BuildError;
use crate::matrix::{SparseMatrix, TripletBuilder};
use ndarray::Array1;

/// Assembles the sparse design matrix `B` with one row per sample and one
/// column per tensor-product basis function.
///
/// Entry `(i, j)` is basis function `j` evaluated at sample `i`; each row holds
/// at most `∏(degree + 1)` nonzeros.
pub fn basis_function_matrix(
    data: &DataTable,
    bspline: &BSpline,
) -> Result<SparseMatrix, BuildError> {
    let nnz_per_row: usize = bspline.degrees().iter().map(|&d| d + 1).product();
    let mut builder = TripletBuilder::with_capacity(
        data.num_samples(),
        bspline.num_basis_functions(),
        data.num_samples() * nnz_per_row,
    );

    for (row, sample) in data.iter().enumerate() {
        for (col, value) in bspline.eval_basis(sample.x())? {
            builder.push(row, col, value);
        }
    }

    builder.build()
}

/// The sample responses `y`, in table order.
pub fn sample_responses(data: &DataTable) -> Array1<f64> {
    data.responses()
}

/// Diagonal weight matrix `W` for the samples: the identity when no weights
/// are configured, `diag(weights)` otherwise.
///
/// The weight count is validated when the weights are configured.
pub fn weight_matrix(
    num_samples: usize,
    weights: Option<&Array1<f64>>,
) -> Result<SparseMatrix, BuildError> {
    match weights {
        None => SparseMatrix::identity(num_samples),
        Some(w) => {
            debug_assert_eq!(w.len(), num_samples);
            SparseMatrix::from_diagonal(w)
        }
    }
}
