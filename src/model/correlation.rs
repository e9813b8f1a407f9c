//! # Correlation Engine
//!
//! ## Role
//! Pearson and Spearman coefficients between two matrix rows over an
//! arbitrary sample subset, plus batched drivers over a [`PairSet`].
//!
//! ## Numerics
//! - Single pass over the subset accumulating `Σx, Σy, Σxy, Σx², Σy²` in `f32`.
//! - Population normalisation (divide by the subset size, not `n - 1`).
//! - A side whose variance is not strictly positive yields
//!   [`UNDEFINED_CORRELATION`] for that pair only.
//!
//! Spearman is Pearson over within-subset ranks (see [`crate::model::rank`]).
//! Pipelines rank each condition once per round and call [`pearson`] on the
//! rank matrix; [`spearman`] ranks locally and exists for one-off pairs.

use std::ops::Range;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::data::matrix::{MatrixView, SampleSubset};
use crate::data::pairs::PairSet;
use crate::error::{DiffCorrError, Result};
use crate::model::rank;
use crate::utils::threading::BatchExecutor;

/// Marks a pair whose correlation is undefined on the subset
pub const UNDEFINED_CORRELATION: f32 = -2.0;

/// Correlation measure
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correlation {
    Pearson,
    #[default]
    Spearman,
}

impl Correlation {
    /// Rank-based measures get a wider standard error in the z-test
    pub fn is_rank_based(self) -> bool {
        matches!(self, Correlation::Spearman)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Correlation::Pearson => "pearson",
            Correlation::Spearman => "spearman",
        }
    }
}

impl std::fmt::Display for Correlation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pearson coefficient of `x` and `y` over `subset`.
#[inline]
pub fn pearson(x: &[f32], y: &[f32], subset: &SampleSubset<'_>) -> f32 {
    let n = subset.len();
    if n == 0 {
        return UNDEFINED_CORRELATION;
    }

    let (mut sx, mut sy, mut sxy, mut sxx, mut syy) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for col in subset.columns() {
        let a = x[col];
        let b = y[col];
        sx += a;
        sy += b;
        sxy += a * b;
        sxx += a * a;
        syy += b * b;
    }

    let nf = n as f32;
    let mean_x = sx / nf;
    let mean_y = sy / nf;
    let var_x = sxx / nf - mean_x * mean_x;
    let var_y = syy / nf - mean_y * mean_y;
    if var_x <= 0.0 || var_y <= 0.0 {
        return UNDEFINED_CORRELATION;
    }

    let cov = sxy / nf - mean_x * mean_y;
    cov / (var_x * var_y).sqrt()
}

/// Spearman coefficient of `x` and `y` over `subset`, ranking both sides locally.
pub fn spearman(x: &[f32], y: &[f32], subset: &SampleSubset<'_>) -> f32 {
    let rx = rank::rank_row(x, subset);
    let ry = rank::rank_row(y, subset);
    pearson(&rx, &ry, &SampleSubset::all(subset.len()))
}

/// Pearson over `pairs[range]`, written to `out` (length `range.len()`).
///
/// This is the per-batch kernel shared by [`correlate`] and the bootstrap rounds.
pub fn pearson_range(
    view: MatrixView<'_>,
    pairs: &PairSet,
    subset: &SampleSubset<'_>,
    range: Range<usize>,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), range.len());
    for (slot, k) in out.iter_mut().zip(range) {
        let (i, j) = pairs.pair(k);
        *slot = pearson(view.row(i), view.row(j), subset);
    }
}

/// Check a subset only references columns of `view`.
pub(crate) fn check_subset(view: MatrixView<'_>, subset: &SampleSubset<'_>) -> Result<()> {
    match subset.max_column() {
        Some(col) if col >= view.n_cols() => Err(DiffCorrError::config(format!(
            "sample index {} out of range for {} samples",
            col,
            view.n_cols()
        ))),
        _ => Ok(()),
    }
}

/// Correlation of every pair in `pairs` over `subset`, batched across workers.
///
/// Explicit pair sets give one value per `(source, target)` position; exhaustive
/// sets give the triangular vector of all `base*(base-1)/2` pairs.
pub fn correlate(
    view: MatrixView<'_>,
    pairs: &PairSet,
    method: Correlation,
    subset: &SampleSubset<'_>,
    executor: &BatchExecutor,
) -> Result<Vec<f32>> {
    pairs.validate(view.n_rows())?;
    check_subset(view, subset)?;

    let mut out = vec![0.0f32; pairs.len()];
    executor.note_clamp(out.len());

    match method {
        Correlation::Pearson => {
            let _span = info_span!("correlate", method = "pearson", pairs = out.len()).entered();
            executor.for_each_batch(&mut out, 1, |range, chunk| {
                pearson_range(view, pairs, subset, range, chunk)
            });
        }
        Correlation::Spearman => {
            let ranks = rank::rank_rows(view, subset, executor);
            let rank_view = ranks.view();
            let rank_subset = SampleSubset::all(subset.len());
            let _span = info_span!("correlate", method = "spearman", pairs = out.len()).entered();
            executor.for_each_batch(&mut out, 1, |range, chunk| {
                pearson_range(rank_view, pairs, &rank_subset, range, chunk)
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ids::{EntityIdx, SampleIdx};
    use crate::data::matrix::SampleMatrix;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_pearson_hand_value() {
        let x = [1.0, 2.0, 3.0, 9.0];
        let y = [2.0, 4.0, 7.0, 0.0];
        let r = pearson(&x, &y, &SampleSubset::Range(0..3));
        // cov = 5/3, var_x = 2/3, var_y = 38/9
        let expected = (5.0f64 / 3.0) / ((2.0f64 / 3.0) * (38.0 / 9.0)).sqrt();
        assert!(approx(r, expected as f32), "r = {}", r);
    }

    #[test]
    fn test_self_correlation_is_one() {
        let x = [0.3, -1.2, 4.5, 2.0, 0.0];
        let idx = [SampleIdx::new(0), SampleIdx::new(2), SampleIdx::new(4)];
        assert!(approx(pearson(&x, &x, &SampleSubset::all(5)), 1.0));
        assert!(approx(pearson(&x, &x, &SampleSubset::Indices(&idx)), 1.0));
    }

    #[test]
    fn test_zero_variance_is_undefined() {
        let x = [2.0, 2.0, 2.0, 5.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(pearson(&x, &y, &SampleSubset::Range(0..3)), UNDEFINED_CORRELATION);
        assert_eq!(pearson(&y, &x, &SampleSubset::Range(0..3)), UNDEFINED_CORRELATION);
        assert_eq!(pearson(&x, &y, &SampleSubset::all(0)), UNDEFINED_CORRELATION);
    }

    #[test]
    fn test_spearman_monotone_invariance() {
        let x: [f32; 6] = [0.5, 2.0, -1.0, 3.5, 1.0, 0.25];
        let y = [1.0, 0.0, 2.0, 5.0, -3.0, 4.0];
        let x_exp: Vec<f32> = x.iter().map(|v| v.exp()).collect();
        let subset = SampleSubset::all(6);
        assert!(approx(spearman(&x, &y, &subset), spearman(&x_exp, &y, &subset)));
    }

    #[test]
    fn test_spearman_perfect_monotone() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 8.0, 27.0, 64.0];
        assert!(approx(spearman(&x, &y, &SampleSubset::all(4)), 1.0));
    }

    #[test]
    fn test_correlate_exhaustive_and_indexed_agree() {
        let m = SampleMatrix::from_rows(&[
            vec![1.0, 2.0, 3.0, 4.0, 2.0, 0.0],
            vec![2.0, 4.0, 7.0, 1.0, 1.0, 3.0],
            vec![0.0, 1.0, 0.0, 2.0, 3.0, 1.0],
            vec![5.0, 3.0, 2.0, 2.0, 9.0, 1.0],
        ])
        .unwrap();
        let executor = BatchExecutor::new(3).unwrap();
        let subset = SampleSubset::Range(0..6);

        for method in [Correlation::Pearson, Correlation::Spearman] {
            let all = correlate(m.view(), &PairSet::exhaustive(4), method, &subset, &executor).unwrap();
            assert_eq!(all.len(), 6);

            let explicit = PairSet::explicit(
                vec![EntityIdx::new(2), EntityIdx::new(0)],
                vec![EntityIdx::new(3), EntityIdx::new(1)],
            )
            .unwrap();
            let some = correlate(m.view(), &explicit, method, &subset, &executor).unwrap();
            assert!(approx(some[0], all[5]));
            assert!(approx(some[1], all[0]));
        }
    }

    #[test]
    fn test_correlate_rejects_bad_subset() {
        let m = SampleMatrix::zeros(2, 3);
        let executor = BatchExecutor::new(1).unwrap();
        let idx = [SampleIdx::new(3)];
        let err = correlate(
            m.view(),
            &PairSet::exhaustive(2),
            Correlation::Pearson,
            &SampleSubset::Indices(&idx),
            &executor,
        )
        .unwrap_err();
        assert!(matches!(err, DiffCorrError::Config { .. }));
    }
}
