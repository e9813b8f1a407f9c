//! # Pairwise Z-Test Pipeline
//!
//! For every pair: reference and experimental correlation with their own
//! two-sided significance against zero, the Fisher z difference statistic and
//! its analytic p-value (observed round), plus an empirical p-value from
//! `repeats` resampled rounds.
//!
//! Pairs are either explicit (`PairSet::Explicit`) or every unordered pair of
//! matrix rows (`PairSet::Exhaustive`), in which case outputs follow the
//! triangular order of [`crate::model::pair_index`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::data::conditions::ConditionAssignment;
use crate::data::ids::EntityIdx;
use crate::data::matrix::{MatrixView, SampleMatrix};
use crate::data::pairs::PairSet;
use crate::error::Result;
use crate::model::ztest::{correlation_pvalues, ZTestSettings};
use crate::model::{Alternative, Correlation};
use crate::pipelines::bootstrap::{
    pair_stage, EmpiricalCounter, PairBuffers, PipelineOptions, ProgressCallback, RankStage,
    RoundContext, RoundDriver, RoundInputs, TailConvention,
};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};
use crate::utils::threading::BatchExecutor;

/// Per-pair outputs, all in pair order
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZTestOutput {
    pub reference_corrs: Vec<f32>,
    /// Two-sided p-value of each reference coefficient against zero
    pub reference_pvalue: Vec<f32>,
    pub experimental_corrs: Vec<f32>,
    pub experimental_pvalue: Vec<f32>,
    pub statistic: Vec<f32>,
    /// Analytic p-value of the observed round
    pub pvalue: Vec<f32>,
    /// Fraction of resampled rounds at least as extreme as the observed one
    pub permutation_pvalue: Vec<f32>,
}

impl ZTestOutput {
    pub fn len(&self) -> usize {
        self.statistic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statistic.is_empty()
    }
}

/// Observed destinations: pair statistics plus analytic p-values
type ObservedDest<'b> = (&'b mut PairBuffers, &'b mut [f32]);

/// Pairwise differential correlation with bootstrap calibration
pub struct ZTestPipeline<'a> {
    options: PipelineOptions,
    telemetry: Option<Arc<TelemetryBlackboard>>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a> ZTestPipeline<'a> {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            telemetry: None,
            progress: None,
        }
    }

    /// Report stage and round progress, and watch this blackboard's interrupt flag
    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryBlackboard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Called after every round with `(completed, total)`
    pub fn with_progress(mut self, callback: impl FnMut(usize, usize) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Explicit `(sources[k], targets[k])` pairs
    pub fn run_indexed(
        &mut self,
        matrix: &SampleMatrix,
        sources: Vec<EntityIdx>,
        targets: Vec<EntityIdx>,
        conditions: &ConditionAssignment,
    ) -> Result<ZTestOutput> {
        let pairs = PairSet::explicit(sources, targets)?;
        self.run(matrix, &pairs, conditions)
    }

    /// Every unordered pair of matrix rows
    pub fn run_exhaustive(
        &mut self,
        matrix: &SampleMatrix,
        conditions: &ConditionAssignment,
    ) -> Result<ZTestOutput> {
        let pairs = PairSet::exhaustive(matrix.n_entities());
        self.run(matrix, &pairs, conditions)
    }

    /// Run all `repeats + 1` rounds over `pairs`.
    ///
    /// Configuration is checked before the first round; a cancelled run
    /// returns the error and no output.
    #[instrument(
        name = "ztest_pipeline",
        skip_all,
        fields(pairs = pairs.len(), repeats = self.options.repeats, method = %self.options.correlation)
    )]
    pub fn run(
        &mut self,
        matrix: &SampleMatrix,
        pairs: &PairSet,
        conditions: &ConditionAssignment,
    ) -> Result<ZTestOutput> {
        self.options.validate()?;
        pairs.validate(matrix.n_entities())?;
        conditions.validate(matrix.n_samples())?;

        let executor = BatchExecutor::new(self.options.process_num)?;
        let n_pairs = pairs.len();
        executor.note_clamp(n_pairs);

        info!(
            pairs = n_pairs,
            workers = executor.effective_workers(n_pairs),
            repeats = self.options.repeats,
            correlation = %self.options.correlation,
            alternative = %self.options.alternative,
            "starting z-test pipeline"
        );

        let view = matrix.view();
        let method = self.options.correlation;
        let alternative = self.options.alternative;

        let mut observed = PairBuffers::zeros(n_pairs);
        let mut pvalue = vec![0.0f32; n_pairs];
        let mut resampled = PairBuffers::zeros(n_pairs);
        let mut counter = EmpiricalCounter::new(n_pairs, alternative, TailConvention::Pairwise);
        let mut ranks = RankStage::new(method, matrix.n_entities(), conditions);

        let telemetry = self.telemetry.as_deref();
        let progress: Option<&mut dyn FnMut(usize, usize)> = match self.progress.as_mut() {
            Some(cb) => Some(&mut **cb),
            None => None,
        };
        let mut driver = RoundDriver::new(&self.options, telemetry, progress);

        driver.run(conditions, n_pairs, |round, round_conditions| {
            let inputs = ranks.prepare(view, round_conditions, &executor, telemetry);
            if let Some(bb) = telemetry {
                bb.set_stage(Stage::Correlating);
            }

            let ctx = if round == 0 {
                RoundContext::Observed((&mut observed, pvalue.as_mut_slice()))
            } else {
                RoundContext::Resampled(&mut resampled)
            };
            run_round(ctx, pairs, &inputs, method, alternative, &executor);

            if round > 0 {
                counter.update(&observed.statistic, &resampled.statistic);
            }
        })?;

        let permutation_pvalue = counter.pvalues(self.options.repeats);
        info!(pairs = n_pairs, "z-test pipeline finished");

        Ok(assemble(
            observed,
            pvalue,
            permutation_pvalue,
            conditions,
            method,
            &executor,
        ))
    }
}

/// Attach per-side coefficient p-values to the observed round.
fn assemble(
    observed: PairBuffers,
    pvalue: Vec<f32>,
    permutation_pvalue: Vec<f32>,
    conditions: &ConditionAssignment,
    method: Correlation,
    executor: &BatchExecutor,
) -> ZTestOutput {
    let reference_pvalue = correlation_pvalues(
        &observed.reference_corrs,
        conditions.n_reference(),
        method,
        Alternative::TwoSided,
        executor,
    );
    let experimental_pvalue = correlation_pvalues(
        &observed.experimental_corrs,
        conditions.n_experimental(),
        method,
        Alternative::TwoSided,
        executor,
    );
    ZTestOutput {
        reference_corrs: observed.reference_corrs,
        reference_pvalue,
        experimental_corrs: observed.experimental_corrs,
        experimental_pvalue,
        statistic: observed.statistic,
        pvalue,
        permutation_pvalue,
    }
}

/// One round: correlations and statistics into the round's own destination;
/// analytic p-values only for the observed round.
fn run_round(
    ctx: RoundContext<ObservedDest<'_>, &mut PairBuffers>,
    pairs: &PairSet,
    inputs: &RoundInputs<'_>,
    method: Correlation,
    alternative: Alternative,
    executor: &BatchExecutor,
) {
    match ctx {
        RoundContext::Observed((dest, pvalue)) => {
            let settings = ZTestSettings {
                method,
                alternative: Some(alternative),
            };
            pair_stage(pairs, inputs, settings, executor, dest, Some(pvalue));
        }
        RoundContext::Resampled(dest) => {
            let settings = ZTestSettings {
                method,
                alternative: None,
            };
            pair_stage(pairs, inputs, settings, executor, dest, None);
        }
    }
}

/// Correlate and test the observed assignment only, without resampling.
///
/// Equivalent to a pipeline run with zero repeats: the empirical column is
/// all zeros.
pub fn observed_ztest(
    view: MatrixView<'_>,
    pairs: &PairSet,
    conditions: &ConditionAssignment,
    options: &PipelineOptions,
) -> Result<ZTestOutput> {
    options.validate()?;
    pairs.validate(view.n_rows())?;
    conditions.validate(view.n_cols())?;

    let executor = BatchExecutor::new(options.process_num)?;
    let mut dest = PairBuffers::zeros(pairs.len());
    let mut pvalue = vec![0.0f32; pairs.len()];
    let mut ranks = RankStage::new(options.correlation, view.n_rows(), conditions);
    let inputs = ranks.prepare(view, conditions, &executor, None);
    run_round(
        RoundContext::Observed((&mut dest, pvalue.as_mut_slice())),
        pairs,
        &inputs,
        options.correlation,
        options.alternative,
        &executor,
    );
    let permutation_pvalue = vec![0.0f32; pairs.len()];
    Ok(assemble(
        dest,
        pvalue,
        permutation_pvalue,
        conditions,
        options.correlation,
        &executor,
    ))
}
