//! # Score Pipeline
//!
//! Aggregates each source entity's pairwise z statistics into one score
//! (mean or median, of absolute values for two-sided tests) and calibrates the
//! score with the same bootstrap rounds as the z-test pipeline.
//!
//! Explicit pairs must be sorted by source (see [`PairSet::sort_by_source`]);
//! each run of equal sources becomes one output row. Exhaustive pair sets
//! score every matrix row against all others.
//!
//! The empirical comparison uses [`TailConvention::Score`], whose one-sided
//! directions are flipped relative to the z-test pipeline.

use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, instrument};

use crate::data::conditions::ConditionAssignment;
use crate::data::ids::EntityIdx;
use crate::data::matrix::SampleMatrix;
use crate::data::pairs::PairSet;
use crate::error::Result;
use crate::model::score::{score_neighbors_batched, score_runs_batched, SourceRuns};
use crate::model::ztest::ZTestSettings;
use crate::model::{Alternative, ScoreKind};
use crate::pipelines::bootstrap::{
    pair_stage, EmpiricalCounter, PairBuffers, PipelineOptions, ProgressCallback, RankStage,
    RoundDriver, TailConvention,
};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};
use crate::utils::threading::BatchExecutor;

/// Per-source outputs
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreOutput {
    pub sources: Vec<EntityIdx>,
    pub scores: Vec<f32>,
    /// Fraction of resampled rounds at least as extreme as the observed score
    pub permutation_pvalue: Vec<f32>,
}

impl ScoreOutput {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// How pair statistics map onto sources
enum Grouping {
    Runs(Vec<Range<usize>>),
    Neighbors { base: usize },
}

impl Grouping {
    fn aggregate(
        &self,
        statistic: &[f32],
        kind: ScoreKind,
        absolute: bool,
        out: &mut [f32],
        executor: &BatchExecutor,
    ) {
        let _span = info_span!("score_stage", sources = out.len()).entered();
        match self {
            Grouping::Runs(runs) => score_runs_batched(statistic, runs, kind, absolute, out, executor),
            Grouping::Neighbors { base } => {
                score_neighbors_batched(statistic, *base, kind, absolute, out, executor)
            }
        }
    }
}

/// Per-source differential correlation scores with bootstrap calibration
pub struct ScorePipeline<'a> {
    options: PipelineOptions,
    telemetry: Option<Arc<TelemetryBlackboard>>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a> ScorePipeline<'a> {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            telemetry: None,
            progress: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryBlackboard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_progress(mut self, callback: impl FnMut(usize, usize) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Explicit pairs, sorted by source
    pub fn run_indexed(
        &mut self,
        matrix: &SampleMatrix,
        sources: Vec<EntityIdx>,
        targets: Vec<EntityIdx>,
        conditions: &ConditionAssignment,
    ) -> Result<ScoreOutput> {
        let pairs = PairSet::explicit(sources, targets)?;
        self.run(matrix, &pairs, conditions)
    }

    /// Every matrix row scored against all others
    pub fn run_exhaustive(
        &mut self,
        matrix: &SampleMatrix,
        conditions: &ConditionAssignment,
    ) -> Result<ScoreOutput> {
        let pairs = PairSet::exhaustive(matrix.n_entities());
        self.run(matrix, &pairs, conditions)
    }

    #[instrument(
        name = "score_pipeline",
        skip_all,
        fields(pairs = pairs.len(), repeats = self.options.repeats, score = %self.options.score)
    )]
    pub fn run(
        &mut self,
        matrix: &SampleMatrix,
        pairs: &PairSet,
        conditions: &ConditionAssignment,
    ) -> Result<ScoreOutput> {
        self.options.validate()?;
        pairs.validate(matrix.n_entities())?;
        conditions.validate(matrix.n_samples())?;

        let (sources, grouping) = match pairs {
            PairSet::Explicit { sources, .. } => {
                let runs = SourceRuns::detect(sources);
                (runs.sources, Grouping::Runs(runs.runs))
            }
            PairSet::Exhaustive { base } => (
                (0..*base).map(EntityIdx::from).collect(),
                Grouping::Neighbors { base: *base },
            ),
        };

        let executor = BatchExecutor::new(self.options.process_num)?;
        let n_pairs = pairs.len();
        let n_sources = sources.len();
        executor.note_clamp(n_sources.min(n_pairs));

        let method = self.options.correlation;
        let alternative = self.options.alternative;
        let kind = self.options.score;
        let absolute = alternative == Alternative::TwoSided;

        info!(
            pairs = n_pairs,
            sources = n_sources,
            workers = executor.effective_workers(n_pairs),
            repeats = self.options.repeats,
            correlation = %method,
            alternative = %alternative,
            score = %kind,
            "starting score pipeline"
        );

        let view = matrix.view();
        let settings = ZTestSettings {
            method,
            alternative: None,
        };

        let mut pair_scratch = PairBuffers::zeros(n_pairs);
        let mut observed = vec![0.0f32; n_sources];
        let mut resampled = vec![0.0f32; n_sources];
        let mut counter = EmpiricalCounter::new(n_sources, alternative, TailConvention::Score);
        let mut ranks = RankStage::new(method, matrix.n_entities(), conditions);

        let telemetry = self.telemetry.as_deref();
        let progress: Option<&mut dyn FnMut(usize, usize)> = match self.progress.as_mut() {
            Some(cb) => Some(&mut **cb),
            None => None,
        };
        let mut driver = RoundDriver::new(&self.options, telemetry, progress);

        driver.run(conditions, n_sources, |round, round_conditions| {
            let inputs = ranks.prepare(view, round_conditions, &executor, telemetry);
            if let Some(bb) = telemetry {
                bb.set_stage(Stage::Correlating);
            }
            pair_stage(pairs, &inputs, settings, &executor, &mut pair_scratch, None);

            if let Some(bb) = telemetry {
                bb.set_stage(Stage::Scoring);
            }
            let dest: &mut [f32] = if round == 0 {
                &mut observed
            } else {
                &mut resampled
            };
            grouping.aggregate(&pair_scratch.statistic, kind, absolute, dest, &executor);

            if round > 0 {
                counter.update(&observed, &resampled);
            }
        })?;

        let permutation_pvalue = counter.pvalues(self.options.repeats);
        info!(sources = n_sources, "score pipeline finished");

        Ok(ScoreOutput {
            sources,
            scores: observed,
            permutation_pvalue,
        })
    }
}
