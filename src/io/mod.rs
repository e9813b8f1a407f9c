//! # I/O Module
//!
//! File reading/writing boundaries. Converts between delimited text tables and
//! the in-memory `SampleMatrix`, condition assignment and pair arrays.

pub mod table;

pub use table::{
    read_description, read_interactions, read_matrix, write_hypergeom, write_scores, write_ztest,
    DataTable, Description, Interactions,
};
