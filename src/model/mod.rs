//! # Model Module
//!
//! Statistical kernels for differential correlation.
//!
//! ## Core Algorithms
//! - `pair_index`: triangular enumeration of unordered entity pairs
//! - `rank`: per-row ranks over a sample subset
//! - `correlation`: Pearson / Spearman coefficients and batched drivers
//! - `ztest`: Fisher z difference test between two coefficients
//! - `score`: per-source aggregation of pair statistics
//! - `adjust`: multiple-testing adjusted p-values
//! - `hypergeom`: entity enrichment among significant pairs
//!
//! Every batched driver takes a [`BatchExecutor`](crate::utils::threading::BatchExecutor)
//! and writes disjoint output slices from its workers; the single-item kernels
//! are plain functions and can be called directly.

pub mod adjust;
pub mod correlation;
pub mod hypergeom;
pub mod pair_index;
pub mod rank;
pub mod score;
pub mod ztest;

pub use correlation::{Correlation, UNDEFINED_CORRELATION};
pub use score::ScoreKind;
pub use ztest::{Alternative, UNDEFINED_TEST_VALUE};
