//! # Sample Matrix
//!
//! The main data structure: a dense matrix of measurements (entities x samples),
//! stored row-major in single precision. Immutable for the duration of a run.
//!
//! Algorithms never touch the owning `SampleMatrix` directly; they receive a
//! `MatrixView`, a `Copy` handle that can be passed by value into worker tasks.
//! Rank buffers produced during the bootstrap use the same view type.

use std::ops::Range;

use crate::data::ids::{EntityIdx, SampleIdx};
use crate::error::{DiffCorrError, Result};

/// Owned entity x sample matrix (row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct SampleMatrix {
    data: Vec<f32>,
    n_entities: usize,
    n_samples: usize,
}

impl SampleMatrix {
    /// Wrap a flat row-major buffer.
    ///
    /// Fails when the buffer length is not `n_entities * n_samples`.
    pub fn new(data: Vec<f32>, n_entities: usize, n_samples: usize) -> Result<Self> {
        if data.len() != n_entities * n_samples {
            return Err(DiffCorrError::config(format!(
                "matrix buffer has {} values, expected {} entities x {} samples",
                data.len(),
                n_entities,
                n_samples
            )));
        }
        Ok(Self {
            data,
            n_entities,
            n_samples,
        })
    }

    /// Build from equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let n_samples = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * n_samples);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_samples {
                return Err(DiffCorrError::invalid_data(format!(
                    "row {} has {} samples, expected {}",
                    i,
                    row.len(),
                    n_samples
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, rows.len(), n_samples)
    }

    /// Zero-filled matrix (used for rank scratch buffers)
    pub fn zeros(n_entities: usize, n_samples: usize) -> Self {
        Self {
            data: vec![0.0; n_entities * n_samples],
            n_entities,
            n_samples,
        }
    }

    /// Number of entities (rows)
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Number of samples (columns)
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Get one entity's row
    #[inline]
    pub fn row(&self, entity: EntityIdx) -> &[f32] {
        let start = entity.as_usize() * self.n_samples;
        &self.data[start..start + self.n_samples]
    }

    /// Flat row-major values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flat row-major values
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Borrow as a copyable view
    pub fn view(&self) -> MatrixView<'_> {
        MatrixView {
            data: &self.data,
            n_rows: self.n_entities,
            n_cols: self.n_samples,
        }
    }
}

/// Read-only row-major view, cheap to copy into worker closures.
#[derive(Clone, Copy, Debug)]
pub struct MatrixView<'a> {
    data: &'a [f32],
    n_rows: usize,
    n_cols: usize,
}

impl<'a> MatrixView<'a> {
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Row `i` (entity index)
    #[inline]
    pub fn row(&self, i: usize) -> &'a [f32] {
        let start = i * self.n_cols;
        &self.data[start..start + self.n_cols]
    }
}

/// A subset of sample columns: either an explicit index list or a contiguous range.
#[derive(Clone, Debug)]
pub enum SampleSubset<'a> {
    /// Contiguous columns `start..end`
    Range(Range<usize>),
    /// Explicit column indices, in the order they should be visited
    Indices(&'a [SampleIdx]),
}

impl<'a> SampleSubset<'a> {
    /// Every column of a row of width `n`
    pub fn all(n: usize) -> Self {
        SampleSubset::Range(0..n)
    }

    /// Number of selected columns
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            SampleSubset::Range(r) => r.len(),
            SampleSubset::Indices(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column index of the `p`-th selected sample
    #[inline]
    pub fn column(&self, p: usize) -> usize {
        match self {
            SampleSubset::Range(r) => r.start + p,
            SampleSubset::Indices(idx) => idx[p].as_usize(),
        }
    }

    /// Iterate over selected column indices
    pub fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |p| self.column(p))
    }

    /// Largest column index referenced, if any
    pub fn max_column(&self) -> Option<usize> {
        match self {
            SampleSubset::Range(r) if r.is_empty() => None,
            SampleSubset::Range(r) => Some(r.end - 1),
            SampleSubset::Indices(idx) => idx.iter().map(|s| s.as_usize()).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(SampleMatrix::new(vec![0.0; 5], 2, 3).is_err());
        assert!(SampleMatrix::new(vec![0.0; 6], 2, 3).is_ok());
    }

    #[test]
    fn test_from_rows_and_view() {
        let m = SampleMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.n_entities(), 2);
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.row(EntityIdx::new(1)), &[4.0, 5.0, 6.0]);

        let view = m.view();
        assert_eq!(view.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(view.n_cols(), 3);
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = SampleMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, DiffCorrError::InvalidData { .. }));
    }

    #[test]
    fn test_subset_columns() {
        let idx = [SampleIdx::new(4), SampleIdx::new(1)];
        let subset = SampleSubset::Indices(&idx);
        assert_eq!(subset.columns().collect::<Vec<_>>(), vec![4, 1]);
        assert_eq!(subset.max_column(), Some(4));

        let range = SampleSubset::Range(2..5);
        assert_eq!(range.len(), 3);
        assert_eq!(range.column(0), 2);
        assert_eq!(range.max_column(), Some(4));
        assert_eq!(SampleSubset::all(0).max_column(), None);
    }
}
