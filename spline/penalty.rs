use crate::errors::BuildError;
use crate::matrix::{SparseMatrix, TripletBuilder};

/// Second-order difference stencil applied along one coefficient axis.
const SECOND_DIFFERENCE: [f64; 3] = [1.0, -2.0, 1.0];

/// Builds the multivariate second-order finite difference matrix `D` used as
/// the P-spline roughness penalty `λ‖D c‖²`.
///
/// `D` stacks one block per dimension. The block of a dimension applies the
/// `[1, -2, 1]` stencil along that dimension's coefficient axis for every fixed
/// combination of the other axes' indices, so it has
/// `∏_{j≠d} dims_j × (dims_d - 2)` rows.
///
/// The coefficient grid is addressed with the last variable varying fastest.
/// The basis counts are therefore reversed internally: in reversed order the
/// stride of dimension `d` is the product of the sizes before it (`left`), and
/// `right` counts the outer repetitions.
///
/// # Arguments
/// * `basis_counts`: The number of basis functions of each variable, in variable order.
///
/// # Returns
/// A sparse matrix with `∏ basis_counts` columns.
pub fn second_order_difference_matrix(basis_counts: &[usize]) -> Result<SparseMatrix, BuildError> {
    if let Some((var, &count)) = basis_counts.iter().enumerate().find(|&(_, &c)| c < 3) {
        return Err(BuildError::InsufficientData(format!(
            "variable {var} has {count} basis function(s); the difference penalty needs at least three per variable"
        )));
    }

    let dims: Vec<usize> = basis_counts.iter().rev().copied().collect();
    let num_cols: usize = dims.iter().product();
    let num_rows: usize = (0..dims.len())
        .map(|d| num_cols / dims[d] * (dims[d] - 2))
        .sum();

    let mut builder = TripletBuilder::with_capacity(num_rows, num_cols, 3 * num_rows);
    let mut row = 0;
    for (d, &size) in dims.iter().enumerate() {
        let left: usize = dims[..d].iter().product();
        let right: usize = dims[d + 1..].iter().product();

        for j in 0..right {
            let block_base = j * left * size;
            for l in 0..size - 2 {
                for m in 0..left {
                    let col = block_base + l * left + m;
                    for (step, &value) in SECOND_DIFFERENCE.iter().enumerate() {
                        builder.push(row, col + step * left, value);
                    }
                    row += 1;
                }
            }
        }
    }
    debug_assert_eq!(row, num_rows);

    builder.build()
}
