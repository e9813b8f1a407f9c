//! # Data Module
//!
//! In-memory representations of the inputs to a differential-correlation run.
//!
//! - **Zero-cost newtypes:** `EntityIdx` (matrix row) and `SampleIdx` (matrix
//!   column) keep the two index spaces apart at compile time.
//! - **Flat storage:** the sample matrix is one row-major `Vec<f32>`; algorithms
//!   borrow it through a copyable `MatrixView`.
//! - **Enum-based polymorphism:** `PairSet` (explicit vs exhaustive) and
//!   `SampleSubset` (range vs index list) replace nullable pointer arguments.

pub mod conditions;
pub mod ids;
pub mod matrix;
pub mod pairs;

// Re-export commonly used types
pub use conditions::ConditionAssignment;
pub use ids::{EntityIdx, Labels, SampleIdx};
pub use matrix::{MatrixView, SampleMatrix, SampleSubset};
pub use pairs::PairSet;
