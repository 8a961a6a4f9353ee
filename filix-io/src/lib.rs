//! File formats and configuration for the filix workspace.
//!
//! This crate provides:
//!
//! - **Trait tables**: CSV tables mapping species to binary trait states
//!   ([`table`]), with missing-data handling and duplicate resolution.
//! - **Chain traces**: append-safe CSV traces of MCMC samples ([`trace`]),
//!   plus a reader for downstream analysis.
//! - **Configuration**: the JSON pipeline configuration ([`config`]) with
//!   defaults and validation.

pub mod config;
pub mod table;
pub mod trace;

pub use config::PipelineConfig;
pub use table::{read_trait_table, ColumnSelection, TraitRecord, TraitTable};
pub use trace::{read_trace, TraceRow, TraceWriter};
