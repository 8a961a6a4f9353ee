//! Shared primitives for the filix diversification-analysis workspace.
//!
//! `filix-core` provides the foundation the other filix crates build on:
//!
//! - **Error types** — [`FilixError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for one-line reporting of analysis results

pub mod error;
pub mod traits;

pub use error::{FilixError, Result};
pub use traits::*;
