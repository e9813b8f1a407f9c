//! # diffcorr Library
//!
//! Differential correlation analysis: for pairs of entities measured across
//! samples from two conditions, test whether their correlation differs between
//! conditions, calibrate the test by resampling, and aggregate per-entity
//! scores over each entity's partners or test entities for enrichment among
//! the significantly changed pairs.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: Sample matrix, pair sets, condition assignments
//! - `error`: Error types and result aliases
//! - `io`: Delimited table reading/writing
//! - `model`: Pair indexing, ranks, correlations, z-test, scores, enrichment
//! - `pipelines`: Bootstrap-calibrated z-test and score workflows
//! - `utils`: Batch executor and telemetry

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use data::{ConditionAssignment, EntityIdx, Labels, PairSet, SampleIdx, SampleMatrix};
pub use error::{DiffCorrError, Result};
pub use model::{Alternative, Correlation, ScoreKind};
pub use pipelines::{PipelineOptions, ScoreOutput, ScorePipeline, ZTestOutput, ZTestPipeline};
pub use utils::threading::BatchExecutor;
