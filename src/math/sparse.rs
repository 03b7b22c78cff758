//! Sparse assembly of global rotor matrices
//!
//! Element contributions are collected as COO triplets. Before summation the
//! triplets are put in a canonical order, so the assembled matrix does not
//! depend on the order in which elements were added.

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Sparse matrix builder using COO format
pub struct SparseMatrixBuilder {
    size: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseMatrixBuilder {
    /// Create a new builder for a `size x size` matrix
    pub fn new(size: usize) -> Self {
        // Shaft elements dominate: 12x12 blocks, roughly one per node
        let estimated_nnz = size * 24;
        Self {
            size,
            entries: Vec::with_capacity(estimated_nnz),
        }
    }

    /// Matrix dimension
    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a value to the matrix (accumulates if already exists)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Add an element matrix at the given global DOF indices
    pub fn add_element_matrix(&mut self, dofs: &[usize], k_elem: &DMatrix<f64>) {
        for (i, &di) in dofs.iter().enumerate() {
            for (j, &dj) in dofs.iter().enumerate() {
                self.add(di, dj, k_elem[(i, j)]);
            }
        }
    }

    fn canonical_entries(&self) -> Vec<(usize, usize, f64)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.total_cmp(&b.2))
        });
        sorted
    }

    /// Convert to CSR format, summing duplicates in canonical order
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);
        for (row, col, val) in self.canonical_entries() {
            coo.push(row, col, val);
        }
        CsrMatrix::from(&coo)
    }

    /// Convert to a dense matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.size, self.size);
        for (row, col, val) in self.canonical_entries() {
            mat[(row, col)] += val;
        }
        mat
    }

    /// Number of stored triplets (duplicates included)
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_accumulate() {
        let mut b = SparseMatrixBuilder::new(3);
        b.add(0, 0, 1.0);
        b.add(0, 0, 2.5);
        b.add(2, 1, -1.0);
        let d = b.to_dense();
        assert_eq!(d[(0, 0)], 3.5);
        assert_eq!(d[(2, 1)], -1.0);
        assert_eq!(b.to_csr().nnz(), 2);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let values = [0.1, 1e-17, 3.3, -2.2, 7.0e5];
        let mut forward = SparseMatrixBuilder::new(1);
        let mut backward = SparseMatrixBuilder::new(1);
        for v in values {
            forward.add(0, 0, v);
        }
        for v in values.iter().rev() {
            backward.add(0, 0, *v);
        }
        assert_eq!(forward.to_dense()[(0, 0)].to_bits(), backward.to_dense()[(0, 0)].to_bits());
    }
}
