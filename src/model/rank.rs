//! # Rank Transform
//!
//! ## Role
//! Per-row, per-subset ranks feeding rank-based (Spearman) correlation.
//!
//! ## Tie handling
//! Ranks are 0-based positions after a *stable* sort of the subset by value, so
//! tied values receive distinct consecutive ranks in subset order rather than
//! the averaged ranks of textbook Spearman.
//!
//! ## Layout
//! [`rank_rows_into`] writes a compact `rows x |subset|` matrix: column `p` of
//! the output is the rank of the subset's `p`-th sample. Correlating that
//! matrix over `SampleSubset::all(|subset|)` is Spearman over the subset.

use tracing::info_span;

use crate::data::matrix::{MatrixView, SampleMatrix, SampleSubset};
use crate::utils::threading::BatchExecutor;

/// Rank one row's values over `subset` into `out` (length `subset.len()`).
///
/// `order` is scratch space reused between calls.
pub fn rank_into(row: &[f32], subset: &SampleSubset<'_>, order: &mut Vec<usize>, out: &mut [f32]) {
    let n = subset.len();
    debug_assert_eq!(out.len(), n);

    order.clear();
    order.extend(0..n);
    order.sort_by(|&a, &b| row[subset.column(a)].total_cmp(&row[subset.column(b)]));

    for (rank, &position) in order.iter().enumerate() {
        out[position] = rank as f32;
    }
}

/// Ranks of one row over `subset`, allocated
pub fn rank_row(row: &[f32], subset: &SampleSubset<'_>) -> Vec<f32> {
    let mut out = vec![0.0; subset.len()];
    let mut order = Vec::with_capacity(subset.len());
    rank_into(row, subset, &mut order, &mut out);
    out
}

/// Rank every row of `view` over `subset` into `out`, batched across rows.
///
/// `out` must be `view.n_rows() x subset.len()`; it is overwritten in place so
/// the same buffer can be reused for every bootstrap round.
pub fn rank_rows_into(
    view: MatrixView<'_>,
    subset: &SampleSubset<'_>,
    out: &mut SampleMatrix,
    executor: &BatchExecutor,
) {
    let width = subset.len();
    debug_assert_eq!(out.n_entities(), view.n_rows());
    debug_assert_eq!(out.n_samples(), width);
    if width == 0 {
        return;
    }

    let _span = info_span!("rank_rows", rows = view.n_rows(), width).entered();
    executor.for_each_batch(out.as_mut_slice(), width, |rows, chunk| {
        let mut order = Vec::with_capacity(width);
        for (row_idx, dst) in rows.zip(chunk.chunks_exact_mut(width)) {
            rank_into(view.row(row_idx), subset, &mut order, dst);
        }
    });
}

/// Allocate and fill a compact rank matrix for `subset`
pub fn rank_rows(view: MatrixView<'_>, subset: &SampleSubset<'_>, executor: &BatchExecutor) -> SampleMatrix {
    let mut out = SampleMatrix::zeros(view.n_rows(), subset.len());
    rank_rows_into(view, subset, &mut out, executor);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ids::SampleIdx;

    #[test]
    fn test_rank_full_row() {
        let row = [3.0, 1.0, 2.0, 10.0];
        assert_eq!(rank_row(&row, &SampleSubset::all(4)), vec![2.0, 0.0, 1.0, 3.0]);
    }

    #[test]
    fn test_ties_broken_by_position() {
        let row = [5.0, 1.0, 5.0, 5.0];
        assert_eq!(rank_row(&row, &SampleSubset::all(4)), vec![1.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rank_indexed_subset() {
        let row = [9.0, 0.5, 4.0, -1.0, 7.0];
        let idx = [SampleIdx::new(4), SampleIdx::new(0), SampleIdx::new(3)];
        // values visited: 7.0, 9.0, -1.0
        assert_eq!(rank_row(&row, &SampleSubset::Indices(&idx)), vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_rank_rows_batched() {
        let m = SampleMatrix::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0],
            vec![4.0, 3.0, 2.0, 1.0],
            vec![0.0, 0.0, 1.0, -1.0],
        ])
        .unwrap();
        let executor = BatchExecutor::new(2).unwrap();
        let ranks = rank_rows(m.view(), &SampleSubset::Range(1..4), &executor);

        assert_eq!(ranks.n_samples(), 3);
        assert_eq!(ranks.view().row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(ranks.view().row(1), &[2.0, 1.0, 0.0]);
        assert_eq!(ranks.view().row(2), &[1.0, 2.0, 0.0]);
    }
}
