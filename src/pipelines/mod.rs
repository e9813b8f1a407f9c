//! # Pipeline Module
//!
//! High-level orchestration of the z-test and score workflows.
//! Both share the bootstrap round machinery in [`bootstrap`].

pub mod bootstrap;
pub mod score;
pub mod ztest;

pub use bootstrap::PipelineOptions;
pub use score::{ScoreOutput, ScorePipeline};
pub use ztest::{ZTestOutput, ZTestPipeline};
