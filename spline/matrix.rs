use crate::errors::BuildError;
use ahash::AHashMap;
use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array1, Array2};

/// Sparse matrix in compressed sparse column form.
///
/// Matrices are assembled by accumulating `(row, col, value)` entries and
/// compacting them once; the compressed structure is never mutated in place.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    inner: SparseColMat<usize, f64>,
}

/// Coordinate-list accumulator for a `SparseMatrix`.
///
/// Entries pushed to the same position are summed on compaction.
#[derive(Debug)]
pub struct TripletBuilder {
    nrows: usize,
    ncols: usize,
    entries: AHashMap<(usize, usize), f64>,
}

impl TripletBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: AHashMap::new(),
        }
    }

    pub fn with_capacity(nrows: usize, ncols: usize, capacity: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: AHashMap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.nrows && col < self.ncols);
        *self.entries.entry((row, col)).or_insert(0.0) += value;
    }

    /// Compacts the accumulated entries into CSC storage.
    pub fn build(self) -> Result<SparseMatrix, BuildError> {
        let triplets: Vec<Triplet<usize, usize, f64>> = self
            .entries
            .into_iter()
            .map(|((row, col), value)| Triplet::new(row, col, value))
            .collect();
        SparseColMat::try_new_from_triplets(self.nrows, self.ncols, &triplets)
            .map(|inner| SparseMatrix { inner })
            .map_err(|e| {
                BuildError::MatrixAssembly(format!(
                    "failed to compact {}x{} matrix: {e:?}",
                    self.nrows, self.ncols
                ))
            })
    }
}

impl SparseMatrix {
    pub fn identity(n: usize) -> Result<Self, BuildError> {
        Self::from_diagonal(&Array1::ones(n))
    }

    pub fn from_diagonal(values: &Array1<f64>) -> Result<Self, BuildError> {
        let mut builder = TripletBuilder::with_capacity(values.len(), values.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            builder.push(i, i, v);
        }
        builder.build()
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        let (symbolic, _) = self.inner.parts();
        symbolic.col_ptr()[self.ncols()]
    }

    pub fn as_faer(&self) -> &SparseColMat<usize, f64> {
        &self.inner
    }

    /// Visits every stored entry as `(row, col, value)`, column by column.
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        let (symbolic, values) = self.inner.parts();
        let col_ptr = symbolic.col_ptr();
        let row_idx = symbolic.row_idx();
        for col in 0..self.ncols() {
            for idx in col_ptr[col]..col_ptr[col + 1] {
                f(row_idx[idx], col, values[idx]);
            }
        }
    }

    /// The main diagonal as a dense vector.
    pub fn diagonal(&self) -> Array1<f64> {
        let mut diag = Array1::<f64>::zeros(self.nrows().min(self.ncols()));
        self.for_each_entry(|row, col, value| {
            if row == col {
                diag[row] += value;
            }
        });
        diag
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::<f64>::zeros((self.nrows(), self.ncols()));
        self.for_each_entry(|row, col, value| dense[[row, col]] += value);
        dense
    }

    /// Computes `A x`.
    pub fn dot(&self, vector: &Array1<f64>) -> Array1<f64> {
        let mut output = Array1::<f64>::zeros(self.nrows());
        self.for_each_entry(|row, col, value| output[row] += value * vector[col]);
        output
    }

    /// Computes `Aᵀ x`.
    pub fn transpose_dot(&self, vector: &Array1<f64>) -> Array1<f64> {
        let mut output = Array1::<f64>::zeros(self.ncols());
        self.for_each_entry(|row, col, value| output[col] += value * vector[row]);
        output
    }

    /// Computes the weighted cross product `Aᵀ diag(w) A`, or `Aᵀ A` without weights.
    pub fn weighted_gram(&self, weights: Option<&Array1<f64>>) -> Result<Self, BuildError> {
        let rows = self.row_entries();
        let mut builder = TripletBuilder::new(self.ncols(), self.ncols());
        for (row, entries) in rows.iter().enumerate() {
            let w = weights.map_or(1.0, |w| w[row]);
            if w == 0.0 {
                continue;
            }
            for &(j, a_ij) in entries {
                for &(k, a_ik) in entries {
                    builder.push(j, k, w * a_ij * a_ik);
                }
            }
        }
        builder.build()
    }

    /// Computes `self + scale * other`.
    pub fn add_scaled(&self, other: &Self, scale: f64) -> Result<Self, BuildError> {
        if self.nrows() != other.nrows() || self.ncols() != other.ncols() {
            return Err(BuildError::MatrixAssembly(format!(
                "cannot add a {}x{} matrix to a {}x{} matrix",
                other.nrows(),
                other.ncols(),
                self.nrows(),
                self.ncols()
            )));
        }
        let mut builder =
            TripletBuilder::with_capacity(self.nrows(), self.ncols(), self.nnz() + other.nnz());
        self.for_each_entry(|row, col, value| builder.push(row, col, value));
        other.for_each_entry(|row, col, value| builder.push(row, col, scale * value));
        builder.build()
    }

    /// Stored entries grouped by row, each row sorted by column.
    fn row_entries(&self) -> Vec<Vec<(usize, f64)>> {
        let mut rows = vec![Vec::new(); self.nrows()];
        self.for_each_entry(|row, col, value| rows[row].push((col, value)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn example() -> SparseMatrix {
        let mut builder = TripletBuilder::new(3, 2);
        builder.push(0, 0, 1.0);
        builder.push(1, 0, 2.0);
        builder.push(1, 1, -1.0);
        builder.push(2, 1, 3.0);
        builder.build().unwrap()
    }

    #[test]
    fn test_duplicate_entries_are_summed() {
        let mut builder = TripletBuilder::new(2, 2);
        builder.push(0, 1, 1.5);
        builder.push(0, 1, 2.5);
        let m = builder.build().unwrap();
        assert_eq!(m.nnz(), 1);
        let dense = m.to_dense();
        assert_abs_diff_eq!(dense[[0, 1]], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dense[[1, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_products_match_dense() {
        let a = example();
        let dense = a.to_dense();
        let x = array![0.5, -2.0];
        let y = array![1.0, 2.0, 3.0];

        assert!(a.dot(&x).abs_diff_eq(&dense.dot(&x), 1e-12));
        assert!(a.transpose_dot(&y).abs_diff_eq(&dense.t().dot(&y), 1e-12));
    }

    #[test]
    fn test_weighted_gram_matches_dense() {
        let a = example();
        let dense = a.to_dense();
        let w = array![1.0, 0.5, 2.0];

        let gram = a.weighted_gram(Some(&w)).unwrap().to_dense();
        let expected = dense.t().dot(&Array2::from_diag(&w)).dot(&dense);
        assert!(gram.abs_diff_eq(&expected, 1e-12));

        let plain = a.weighted_gram(None).unwrap().to_dense();
        assert!(plain.abs_diff_eq(&dense.t().dot(&dense), 1e-12));
    }

    #[test]
    fn test_add_scaled_and_identity() {
        let gram = example().weighted_gram(None).unwrap();
        let eye = SparseMatrix::identity(2).unwrap();
        let sum = gram.add_scaled(&eye, 0.25).unwrap();
        assert!(sum
            .diagonal()
            .abs_diff_eq(&(gram.diagonal() + 0.25), 1e-12));
        assert!(matches!(
            gram.add_scaled(&example(), 1.0),
            Err(BuildError::MatrixAssembly(_))
        ));
    }
}
