//! Trait-dependent diversification analysis for the filix workspace.
//!
//! Implements the Multi-State Speciation and Extinction (MuSSE) model over
//! the four states formed by two binary traits:
//!
//! - **States**: trait-pair encoding ([`states`])
//! - **Parameters**: rate vectors and constraint views ([`params`])
//! - **Likelihood**: E/D ODE integration combined by tree pruning
//!   ([`likelihood`])
//! - **Optimization**: Nelder-Mead maximum likelihood ([`optim`])
//! - **Prior**: exponential rate prior scaled from the MLE ([`prior`])
//! - **Sampling**: Metropolis-Hastings chains with window calibration
//!   ([`mcmc`])
//! - **Diagnostics**: effective sample size and Gelman-Rubin ([`diagnostics`])
//! - **Summaries**: pooled posterior statistics ([`summary`])
//! - **Pipeline**: end-to-end orchestration ([`pipeline`])

pub mod diagnostics;
pub mod likelihood;
pub mod mcmc;
pub mod optim;
pub mod params;
pub mod pipeline;
pub mod prior;
pub mod states;
pub mod summary;

pub use likelihood::MusseLikelihood;
pub use params::{Constraints, MusseParams, PARAM_COUNT, PARAM_NAMES};
pub use pipeline::{run, MusseAnalysis};
pub use prior::ExponentialPrior;
pub use states::{decode_state, encode_state, STATE_COUNT};
