//! Descriptive statistics for the filix workspace.
//!
//! Small, dependency-light kernels shared by the MCMC calibration,
//! convergence diagnostics, and posterior summaries:
//!
//! - **Moments**: [`descriptive::mean`], [`descriptive::variance`],
//!   [`descriptive::std_dev`].
//! - **Order statistics**: [`descriptive::quantile`] with linear
//!   interpolation.

pub mod descriptive;

pub use descriptive::{mean, quantile, std_dev, variance};
