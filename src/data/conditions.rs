//! # Condition Assignment
//!
//! Which sample columns belong to the reference and experimental conditions.
//! The observed assignment comes from the caller; each resampled bootstrap
//! round re-derives both sets from consecutive slices of one permutation of
//! the sample universe, so resampled sets are always disjoint and keep the
//! original sizes.

use crate::data::ids::SampleIdx;
use crate::error::{DiffCorrError, Result};

/// Reference / experimental column membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionAssignment {
    reference: Vec<SampleIdx>,
    experimental: Vec<SampleIdx>,
}

impl ConditionAssignment {
    pub fn new(reference: Vec<SampleIdx>, experimental: Vec<SampleIdx>) -> Self {
        Self {
            reference,
            experimental,
        }
    }

    /// Convenience constructor from plain column numbers
    pub fn from_columns(reference: &[usize], experimental: &[usize]) -> Self {
        Self::new(
            reference.iter().copied().map(SampleIdx::from).collect(),
            experimental.iter().copied().map(SampleIdx::from).collect(),
        )
    }

    pub fn reference(&self) -> &[SampleIdx] {
        &self.reference
    }

    pub fn experimental(&self) -> &[SampleIdx] {
        &self.experimental
    }

    pub fn n_reference(&self) -> usize {
        self.reference.len()
    }

    pub fn n_experimental(&self) -> usize {
        self.experimental.len()
    }

    /// Check the assignment against a matrix with `n_samples` columns.
    ///
    /// Both conditions must be non-empty, reference only existing columns, and
    /// fit together into the sample universe (resampling splits one
    /// permutation of it into the two sets).
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.reference.is_empty() || self.experimental.is_empty() {
            return Err(DiffCorrError::config(format!(
                "both conditions need samples (reference: {}, experimental: {})",
                self.reference.len(),
                self.experimental.len()
            )));
        }

        let out_of_range = self
            .reference
            .iter()
            .chain(self.experimental.iter())
            .find(|s| s.as_usize() >= n_samples);
        if let Some(s) = out_of_range {
            return Err(DiffCorrError::config(format!(
                "sample index {} out of range for {} samples",
                s.0, n_samples
            )));
        }

        let total = self.reference.len() + self.experimental.len();
        if total > n_samples {
            return Err(DiffCorrError::config(format!(
                "{} reference + {} experimental samples exceed the {} available columns",
                self.reference.len(),
                self.experimental.len(),
                n_samples
            )));
        }
        Ok(())
    }

    /// Overwrite both sets with consecutive slices of `permutation`:
    /// the first `n_reference` entries, then the next `n_experimental`.
    pub fn fill_from_permutation(&mut self, permutation: &[SampleIdx]) {
        let n_ref = self.reference.len();
        let n_exp = self.experimental.len();
        debug_assert!(permutation.len() >= n_ref + n_exp);

        self.reference.copy_from_slice(&permutation[..n_ref]);
        self.experimental
            .copy_from_slice(&permutation[n_ref..n_ref + n_exp]);
    }
}
