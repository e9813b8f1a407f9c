//! # Score Aggregator
//!
//! ## Role
//! Collapse per-pair statistics into one score per source entity.
//!
//! ## Grouping
//! - **Indexed:** statistics arrive sorted by source so each source's partners
//!   form one contiguous run. [`SourceRuns::detect`] finds the runs.
//! - **Exhaustive:** an entity's partners are found through
//!   [`pair_index::neighbor_iter`] over the triangular vector; no grouping pass.
//!
//! ## Aggregates
//! - `mean`: arithmetic mean, optionally of absolute values.
//! - `median`: the value at position `floor(count / 2)` after an ascending sort.
//!   For even counts this is the upper median; there is no interpolation.
//!
//! Undefined positions (the diagonal in exhaustive mode) are skipped. An entity
//! with no defined partners scores 0.

use std::ops::Range;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info_span, warn};

use crate::data::ids::EntityIdx;
use crate::error::{DiffCorrError, Result};
use crate::model::pair_index;
use crate::utils::threading::{split_by_ranges, BatchExecutor};

/// Aggregate applied to each source's statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    #[default]
    Mean,
    Median,
}

impl ScoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreKind::Mean => "mean",
            ScoreKind::Median => "median",
        }
    }
}

impl std::fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn magnitude(v: f32, absolute: bool) -> f32 {
    if absolute {
        v.abs()
    } else {
        v
    }
}

/// Mean of `values` at the defined `positions`.
pub fn mean<I>(values: &[f32], positions: I, absolute: bool) -> f32
where
    I: IntoIterator<Item = Option<usize>>,
{
    let mut sum = 0.0f32;
    let mut count = 0.0f32;
    for k in positions.into_iter().flatten() {
        sum += magnitude(values[k], absolute);
        count += 1.0;
    }
    if count > 0.0 {
        sum / count
    } else {
        0.0
    }
}

/// Median of `values` at the defined `positions`, using `scratch` for sorting.
pub fn median<I>(values: &[f32], positions: I, absolute: bool, scratch: &mut Vec<f32>) -> f32
where
    I: IntoIterator<Item = Option<usize>>,
{
    scratch.clear();
    scratch.extend(
        positions
            .into_iter()
            .flatten()
            .map(|k| magnitude(values[k], absolute)),
    );
    if scratch.is_empty() {
        return 0.0;
    }
    scratch.sort_unstable_by(f32::total_cmp);
    scratch[scratch.len() / 2]
}

/// Apply `kind` to the defined `positions` of `values`.
#[inline]
pub fn aggregate<I>(
    kind: ScoreKind,
    values: &[f32],
    positions: I,
    absolute: bool,
    scratch: &mut Vec<f32>,
) -> f32
where
    I: IntoIterator<Item = Option<usize>>,
{
    match kind {
        ScoreKind::Mean => mean(values, positions, absolute),
        ScoreKind::Median => median(values, positions, absolute, scratch),
    }
}

/// Contiguous runs of equal sources in a source-sorted pair list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRuns {
    /// One entry per run, strictly increasing
    pub sources: Vec<EntityIdx>,
    /// Pair positions of each run
    pub runs: Vec<Range<usize>>,
    /// Pairs that did not start a new, larger run
    pub skipped: usize,
}

impl SourceRuns {
    /// Scan `sources` for runs. A run starts only where the source exceeds the
    /// previous run's source; anything else out of order is skipped.
    pub fn detect(sources: &[EntityIdx]) -> Self {
        let mut out = SourceRuns {
            sources: Vec::new(),
            runs: Vec::new(),
            skipped: 0,
        };

        let mut i = 0;
        while i < sources.len() {
            let starts_run = out.sources.last().map_or(true, |&last| last < sources[i]);
            if !starts_run {
                out.skipped += 1;
                i += 1;
                continue;
            }
            let start = i;
            while i < sources.len() && sources[i] == sources[start] {
                i += 1;
            }
            out.sources.push(sources[start]);
            out.runs.push(start..i);
        }

        if out.skipped > 0 {
            warn!(
                skipped = out.skipped,
                "source indices are not sorted; out-of-order pairs were left out of the scores"
            );
        }
        out
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Kernel: score `runs[range]` into `out`.
pub fn score_runs_range(
    values: &[f32],
    runs: &[Range<usize>],
    kind: ScoreKind,
    absolute: bool,
    range: Range<usize>,
    out: &mut [f32],
) {
    let mut scratch = Vec::new();
    for (slot, r) in out.iter_mut().zip(&runs[range]) {
        *slot = aggregate(kind, values, r.clone().map(Some), absolute, &mut scratch);
    }
}

/// Kernel: score entities `range` of an exhaustive triangular vector into `out`.
pub fn score_neighbors_range(
    values: &[f32],
    base: usize,
    kind: ScoreKind,
    absolute: bool,
    range: Range<usize>,
    out: &mut [f32],
) {
    let mut scratch = Vec::with_capacity(base);
    for (slot, entity) in out.iter_mut().zip(range) {
        *slot = aggregate(
            kind,
            values,
            pair_index::neighbor_iter(entity, base),
            absolute,
            &mut scratch,
        );
    }
}

/// Per-source scores from [`score_indexed`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceScores {
    pub sources: Vec<EntityIdx>,
    pub scores: Vec<f32>,
}

/// Score source-sorted pair statistics, one score per distinct source.
pub fn score_indexed(
    values: &[f32],
    sources: &[EntityIdx],
    kind: ScoreKind,
    absolute: bool,
    executor: &BatchExecutor,
) -> Result<SourceScores> {
    if values.len() != sources.len() {
        return Err(DiffCorrError::config(format!(
            "statistic array has {} entries but {} sources",
            values.len(),
            sources.len()
        )));
    }
    let runs = SourceRuns::detect(sources);
    let mut scores = vec![0.0f32; runs.len()];

    let _span = info_span!("score_indexed", sources = runs.len(), kind = kind.as_str()).entered();
    executor.note_clamp(runs.len());
    score_runs_batched(values, &runs.runs, kind, absolute, &mut scores, executor);

    Ok(SourceScores {
        sources: runs.sources,
        scores,
    })
}

/// Score every entity of an exhaustive triangular vector over `base` entities.
pub fn score_exhaustive(
    values: &[f32],
    base: usize,
    kind: ScoreKind,
    absolute: bool,
    executor: &BatchExecutor,
) -> Result<Vec<f32>> {
    if values.len() != pair_index::n_pairs(base) {
        return Err(DiffCorrError::config(format!(
            "statistic array has {} entries, expected {} pairs over {} entities",
            values.len(),
            pair_index::n_pairs(base),
            base
        )));
    }
    let mut scores = vec![0.0f32; base];

    let _span = info_span!("score_exhaustive", entities = base, kind = kind.as_str()).entered();
    executor.note_clamp(base);
    score_neighbors_batched(values, base, kind, absolute, &mut scores, executor);
    Ok(scores)
}

pub(crate) fn score_runs_batched(
    values: &[f32],
    runs: &[Range<usize>],
    kind: ScoreKind,
    absolute: bool,
    out: &mut [f32],
    executor: &BatchExecutor,
) {
    let ranges = executor.partition(out.len());
    let chunks = split_by_ranges(out, &ranges);
    let batches: Vec<_> = ranges.into_iter().zip(chunks).collect();
    executor.scope(batches, |(range, chunk)| {
        score_runs_range(values, runs, kind, absolute, range, chunk)
    });
}

pub(crate) fn score_neighbors_batched(
    values: &[f32],
    base: usize,
    kind: ScoreKind,
    absolute: bool,
    out: &mut [f32],
    executor: &BatchExecutor,
) {
    executor.for_each_batch(out, 1, |range, chunk| {
        score_neighbors_range(values, base, kind, absolute, range, chunk)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u32]) -> Vec<EntityIdx> {
        v.iter().copied().map(EntityIdx::new).collect()
    }

    #[test]
    fn test_single_element_run() {
        let values = [-0.7];
        let mut scratch = Vec::new();
        assert_eq!(mean(&values, [Some(0)], false), -0.7);
        assert_eq!(mean(&values, [Some(0)], true), 0.7);
        assert_eq!(median(&values, [Some(0)], false, &mut scratch), -0.7);
        assert_eq!(median(&values, [Some(0)], true, &mut scratch), 0.7);
    }

    #[test]
    fn test_median_is_upper_for_even_counts() {
        let values = [4.0, 1.0, 3.0, 2.0];
        let mut scratch = Vec::new();
        let positions = (0..4).map(Some);
        assert_eq!(median(&values, positions, false, &mut scratch), 3.0);
        assert_eq!(median(&values, [Some(0), Some(1), Some(2)], false, &mut scratch), 3.0);
    }

    #[test]
    fn test_undefined_positions_skipped() {
        let values = [1.0, 3.0];
        assert_eq!(mean(&values, [None, Some(0), Some(1)], false), 2.0);
        assert_eq!(mean(&values, [None], false), 0.0);
    }

    #[test]
    fn test_detect_runs() {
        let runs = SourceRuns::detect(&ids(&[0, 0, 2, 5, 5, 5]));
        assert_eq!(runs.sources, ids(&[0, 2, 5]));
        assert_eq!(runs.runs, vec![0..2, 2..3, 3..6]);
        assert_eq!(runs.skipped, 0);
    }

    #[test]
    fn test_detect_runs_skips_unsorted() {
        let runs = SourceRuns::detect(&ids(&[1, 1, 0, 3, 1, 3]));
        assert_eq!(runs.sources, ids(&[1, 3]));
        assert_eq!(runs.runs, vec![0..2, 3..4]);
        assert_eq!(runs.skipped, 3);
    }

    #[test]
    fn test_score_indexed() {
        let executor = BatchExecutor::new(2).unwrap();
        let values = [1.0, -3.0, 2.0, 0.5, 0.5, 4.0];
        let sources = ids(&[0, 0, 1, 2, 2, 2]);

        let result = score_indexed(&values, &sources, ScoreKind::Mean, true, &executor).unwrap();
        assert_eq!(result.sources, ids(&[0, 1, 2]));
        assert_eq!(result.scores, vec![2.0, 2.0, 5.0 / 3.0]);

        let result = score_indexed(&values, &sources, ScoreKind::Median, false, &executor).unwrap();
        assert_eq!(result.scores, vec![1.0, 2.0, 0.5]);
    }

    #[test]
    fn test_score_exhaustive() {
        let executor = BatchExecutor::new(3).unwrap();
        // (0,1)=1 (0,2)=2 (0,3)=3 (1,2)=4 (1,3)=5 (2,3)=6
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let scores = score_exhaustive(&values, 4, ScoreKind::Mean, false, &executor).unwrap();
        assert_eq!(scores, vec![2.0, 10.0 / 3.0, 4.0, 14.0 / 3.0]);

        let medians = score_exhaustive(&values, 4, ScoreKind::Median, false, &executor).unwrap();
        assert_eq!(medians, vec![2.0, 4.0, 4.0, 5.0]);

        assert!(score_exhaustive(&values, 5, ScoreKind::Mean, false, &executor).is_err());
    }
}
