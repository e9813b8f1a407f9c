//! # Utilities Module
//!
//! ## Role
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! ## Sub-modules
//! - `threading`: the batch executor every pipeline stage fans out through
//! - `telemetry`: progress blackboard, heartbeat thread and interrupt flag

pub mod telemetry;
pub mod threading;
