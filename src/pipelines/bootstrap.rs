//! # Bootstrap Round Machinery
//!
//! ## Role
//! The state machine shared by the z-test and score pipelines.
//!
//! A run has `repeats + 1` rounds:
//! - **Round 0 (observed):** the caller's reference/experimental columns. Its
//!   statistics are the primary outputs, and it alone gets analytic p-values.
//! - **Rounds 1..=repeats (resampled):** one seeded shuffle of the pooled
//!   observed columns (reference then experimental) per round; the first `|reference|` columns become the resampled
//!   reference set and the next `|experimental|` the experimental set. Each
//!   resampled statistic is compared with the observed one and the matching
//!   [`EmpiricalCounter`] slot is bumped.
//!
//! ## Determinism
//! The shuffle runs on the orchestrating thread between rounds, never inside a
//! worker, and the permutation carries over from round to round. Results depend
//! only on the seed, never on the worker count.
//!
//! ## Cancellation
//! The interrupt flag is polled before every round. A raised flag ends the run
//! with [`DiffCorrError::Cancelled`]; every round buffer is owned by the run and
//! dropped on that path, and nothing partial is returned.

use std::ops::Range;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::data::conditions::ConditionAssignment;
use crate::data::ids::SampleIdx;
use crate::data::matrix::{MatrixView, SampleMatrix, SampleSubset};
use crate::data::pairs::PairSet;
use crate::error::{DiffCorrError, Result};
use crate::model::correlation::{pearson_range, Correlation};
use crate::model::rank;
use crate::model::score::ScoreKind;
use crate::model::ztest::{ztest_range, Alternative, SubsetSizes, ZTestSettings};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};
use crate::utils::threading::{split_by_ranges, BatchExecutor};

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 733;

/// Bootstrap repeats used when none is configured
pub const DEFAULT_REPEATS: usize = 1000;

/// Everything the core reads from configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub correlation: Correlation,
    pub alternative: Alternative,
    pub score: ScoreKind,
    /// Resampled rounds after the observed one
    pub repeats: usize,
    /// Worker count per stage
    pub process_num: usize,
    pub seed: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            correlation: Correlation::Spearman,
            alternative: Alternative::TwoSided,
            score: ScoreKind::Mean,
            repeats: DEFAULT_REPEATS,
            process_num: 1,
            seed: DEFAULT_SEED,
        }
    }
}

impl PipelineOptions {
    /// Reject settings no round could run with.
    pub fn validate(&self) -> Result<()> {
        if self.process_num == 0 {
            return Err(DiffCorrError::config("process number must be at least 1"));
        }
        Ok(())
    }

    /// Total rounds including the observed one
    pub fn total_rounds(&self) -> usize {
        self.repeats + 1
    }
}

/// Which round is running, with that round's own destination buffers.
///
/// The observed round writes the primary outputs; resampled rounds write into
/// reusable scratch that is only compared against the observed values.
pub enum RoundContext<O, R> {
    Observed(O),
    Resampled(R),
}

/// Seeded, cumulative permutation of the sample universe.
pub struct Permuter {
    universe: Vec<SampleIdx>,
    rng: StdRng,
}

impl Permuter {
    /// Universe: the observed reference columns followed by the observed
    /// experimental columns, shuffled by a generator seeded with `seed`.
    /// Columns outside both conditions never enter a resampled round.
    pub fn new(observed: &ConditionAssignment, seed: u64) -> Self {
        Self {
            universe: observed
                .reference()
                .iter()
                .chain(observed.experimental())
                .copied()
                .collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Shuffle the universe in place (continuing from the previous round's
    /// order) and split it into the two condition sets.
    pub fn draw(&mut self, conditions: &mut ConditionAssignment) {
        self.universe.shuffle(&mut self.rng);
        conditions.fill_from_permutation(&self.universe);
    }
}

/// Matrix view and column subset one condition is correlated over.
#[derive(Clone, Debug)]
pub struct ConditionInput<'a> {
    pub view: MatrixView<'a>,
    pub subset: SampleSubset<'a>,
}

/// Per-round inputs of both conditions
#[derive(Clone, Debug)]
pub struct RoundInputs<'a> {
    pub reference: ConditionInput<'a>,
    pub experimental: ConditionInput<'a>,
}

/// Rank scratch for rank-based measures.
///
/// Each condition gets its own compact `entities x |condition|` buffer,
/// allocated once and overwritten every round.
pub struct RankStage {
    buffers: Option<(SampleMatrix, SampleMatrix)>,
}

impl RankStage {
    pub fn new(method: Correlation, n_entities: usize, conditions: &ConditionAssignment) -> Self {
        let buffers = method.is_rank_based().then(|| {
            (
                SampleMatrix::zeros(n_entities, conditions.n_reference()),
                SampleMatrix::zeros(n_entities, conditions.n_experimental()),
            )
        });
        Self { buffers }
    }

    /// Rank this round's columns if needed and hand back what to correlate.
    pub fn prepare<'a>(
        &'a mut self,
        data: MatrixView<'a>,
        conditions: &'a ConditionAssignment,
        executor: &BatchExecutor,
        telemetry: Option<&TelemetryBlackboard>,
    ) -> RoundInputs<'a> {
        let reference_subset = SampleSubset::Indices(conditions.reference());
        let experimental_subset = SampleSubset::Indices(conditions.experimental());

        match &mut self.buffers {
            None => RoundInputs {
                reference: ConditionInput {
                    view: data,
                    subset: reference_subset,
                },
                experimental: ConditionInput {
                    view: data,
                    subset: experimental_subset,
                },
            },
            Some((ref_ranks, exp_ranks)) => {
                if let Some(bb) = telemetry {
                    bb.set_stage(Stage::Ranking);
                }
                let _span = info_span!("rank_stage").entered();
                rank::rank_rows_into(data, &reference_subset, ref_ranks, executor);
                rank::rank_rows_into(data, &experimental_subset, exp_ranks, executor);

                let (ref_ranks, exp_ranks): (&'a SampleMatrix, &'a SampleMatrix) =
                    (ref_ranks, exp_ranks);
                RoundInputs {
                    reference: ConditionInput {
                        view: ref_ranks.view(),
                        subset: SampleSubset::all(ref_ranks.n_samples()),
                    },
                    experimental: ConditionInput {
                        view: exp_ranks.view(),
                        subset: SampleSubset::all(exp_ranks.n_samples()),
                    },
                }
            }
        }
    }
}

/// Per-pair statistics of one round
#[derive(Clone, Debug, Default)]
pub struct PairBuffers {
    pub reference_corrs: Vec<f32>,
    pub experimental_corrs: Vec<f32>,
    pub statistic: Vec<f32>,
}

impl PairBuffers {
    pub fn zeros(n_pairs: usize) -> Self {
        Self {
            reference_corrs: vec![0.0; n_pairs],
            experimental_corrs: vec![0.0; n_pairs],
            statistic: vec![0.0; n_pairs],
        }
    }
}

/// Correlation + z-test stage over every pair, one worker per batch.
///
/// `pvalue` is filled only when given (the observed round).
pub fn pair_stage(
    pairs: &PairSet,
    inputs: &RoundInputs<'_>,
    settings: ZTestSettings,
    executor: &BatchExecutor,
    dest: &mut PairBuffers,
    pvalue: Option<&mut [f32]>,
) {
    let n = pairs.len();
    let sizes = SubsetSizes::Fixed {
        reference: inputs.reference.subset.len(),
        experimental: inputs.experimental.subset.len(),
    };

    let _span = info_span!("correlation_stage", pairs = n).entered();
    let ranges = executor.partition(n);
    let ref_chunks = split_by_ranges(&mut dest.reference_corrs, &ranges);
    let exp_chunks = split_by_ranges(&mut dest.experimental_corrs, &ranges);
    let stat_chunks = split_by_ranges(&mut dest.statistic, &ranges);
    let p_chunks: Vec<Option<&mut [f32]>> = match pvalue {
        Some(p) => split_by_ranges(p, &ranges).into_iter().map(Some).collect(),
        None => ranges.iter().map(|_| None).collect(),
    };

    let batches: Vec<PairBatch<'_>> = ranges
        .into_iter()
        .zip(ref_chunks)
        .zip(exp_chunks)
        .zip(stat_chunks)
        .zip(p_chunks)
        .map(|((((range, r), e), s), p)| PairBatch {
            range,
            reference: r,
            experimental: e,
            statistic: s,
            pvalue: p,
        })
        .collect();

    executor.scope(batches, |batch| {
        let PairBatch {
            range,
            reference,
            experimental,
            statistic,
            pvalue,
        } = batch;
        pearson_range(
            inputs.reference.view,
            pairs,
            &inputs.reference.subset,
            range.clone(),
            reference,
        );
        pearson_range(
            inputs.experimental.view,
            pairs,
            &inputs.experimental.subset,
            range.clone(),
            experimental,
        );
        ztest_range(reference, experimental, sizes, settings, range, statistic, pvalue);
    });
}

/// One worker's disjoint share of the round's output buffers
struct PairBatch<'a> {
    range: Range<usize>,
    reference: &'a mut [f32],
    experimental: &'a mut [f32],
    statistic: &'a mut [f32],
    pvalue: Option<&'a mut [f32]>,
}

/// Direction of the empirical comparison for `less` / `greater`.
///
/// `Score` flips both one-sided comparisons relative to `Pairwise`; two-sided
/// is `|observed| <= |resampled|` under either convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailConvention {
    Pairwise,
    Score,
}

/// Per-slot count of resampled statistics at least as extreme as the observed one.
#[derive(Clone, Debug)]
pub struct EmpiricalCounter {
    counts: Vec<u32>,
    alternative: Alternative,
    convention: TailConvention,
}

impl EmpiricalCounter {
    pub fn new(slots: usize, alternative: Alternative, convention: TailConvention) -> Self {
        Self {
            counts: vec![0; slots],
            alternative,
            convention,
        }
    }

    #[inline]
    fn exceeds(&self, observed: f32, resampled: f32) -> bool {
        match (self.alternative, self.convention) {
            (Alternative::TwoSided, _) => observed.abs() <= resampled.abs(),
            (Alternative::Less, TailConvention::Pairwise) => observed <= resampled,
            (Alternative::Greater, TailConvention::Pairwise) => observed >= resampled,
            (Alternative::Less, TailConvention::Score) => observed >= resampled,
            (Alternative::Greater, TailConvention::Score) => observed <= resampled,
        }
    }

    /// Compare one resampled round with the observed statistics.
    pub fn update(&mut self, observed: &[f32], resampled: &[f32]) {
        debug_assert_eq!(observed.len(), self.counts.len());
        debug_assert_eq!(resampled.len(), self.counts.len());
        for k in 0..self.counts.len() {
            if self.exceeds(observed[k], resampled[k]) {
                self.counts[k] += 1;
            }
        }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// `count / repeats`, or all zeros when no resampled round ran
    pub fn pvalues(&self, repeats: usize) -> Vec<f32> {
        if repeats == 0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts
            .iter()
            .map(|&c| c as f32 / repeats as f32)
            .collect()
    }
}

/// Per-round progress callback: `(rounds completed, total rounds)`
pub type ProgressCallback<'a> = Box<dyn FnMut(usize, usize) + 'a>;

/// Drives the round loop: cancellation poll, permutation draw, progress.
pub struct RoundDriver<'a, 'p> {
    options: &'a PipelineOptions,
    telemetry: Option<&'a TelemetryBlackboard>,
    progress: Option<&'p mut dyn FnMut(usize, usize)>,
}

impl<'a, 'p> RoundDriver<'a, 'p> {
    pub fn new(
        options: &'a PipelineOptions,
        telemetry: Option<&'a TelemetryBlackboard>,
        progress: Option<&'p mut dyn FnMut(usize, usize)>,
    ) -> Self {
        Self {
            options,
            telemetry,
            progress,
        }
    }

    /// Run every round. `round_fn(round, conditions)` computes one round's
    /// statistics; round 0 receives the observed assignment.
    pub fn run<F>(
        &mut self,
        observed: &ConditionAssignment,
        items: usize,
        mut round_fn: F,
    ) -> Result<()>
    where
        F: FnMut(usize, &ConditionAssignment),
    {
        let total = self.options.total_rounds();
        let mut permuter = Permuter::new(observed, self.options.seed);
        let mut conditions = observed.clone();

        if let Some(bb) = self.telemetry {
            bb.begin_rounds(total as u64, items as u64);
        }

        for round in 0..total {
            if self.telemetry.is_some_and(|bb| bb.is_cancelled()) {
                debug!(round, "interrupt observed, abandoning run");
                return Err(DiffCorrError::Cancelled { round });
            }
            if round > 0 {
                permuter.draw(&mut conditions);
            }

            round_fn(round, &conditions);

            if let Some(bb) = self.telemetry {
                bb.round_done();
            }
            if let Some(progress) = self.progress.as_mut() {
                progress(round + 1, total);
            }
            debug!(round, total, "round complete");
        }
        Ok(())
    }
}
