//! End-to-end analysis orchestration.
//!
//! `run` wires the stages in dependency order: load tree and trait table,
//! inner-join them by species, force the tree ultrametric, encode tip
//! states, build the likelihood, fit the MLE, scale the prior, calibrate
//! proposal windows, run the production chains (writing one trace file
//! each), then compute convergence diagnostics and the posterior summary.
//! Non-fatal conditions accumulate as warnings on the returned analysis.

use crate::diagnostics::{diagnose, ConvergenceReport};
use crate::likelihood::MusseLikelihood;
use crate::mcmc::{calibrate_windows, run_chain, ChainResult, ChainSettings};
use crate::optim::{maximize, starting_point, OptimConfig, OptimResult};
use crate::params::{Constraints, PARAM_NAMES};
use crate::prior::ExponentialPrior;
use crate::states::encode_state;
use crate::summary::{summarize, PosteriorSummary, DEFAULT_COMPARISONS};
use filix_core::{FilixError, Result, Summarizable};
use filix_io::{read_trait_table, PipelineConfig, TraceRow, TraceWriter, TraitRecord};
use filix_phylo::{force_ultrametric, tree_height, PhyloTree, UltrametricReport};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// One completed production chain.
#[derive(Debug, Clone)]
pub struct ChainRun {
    /// Zero-based chain index.
    pub index: usize,
    pub seed: u64,
    pub acceptance_rate: f64,
    pub trace_path: PathBuf,
    /// Number of retained rows.
    pub retained: usize,
}

/// Result of a full analysis run.
#[derive(Debug, Clone)]
pub struct MusseAnalysis {
    /// Tips in the matched, pruned tree.
    pub tree_tips: usize,
    pub ultrametric: UltrametricReport,
    pub mle: OptimResult,
    pub chains: Vec<ChainRun>,
    /// Chains that failed, as (index, error message); the rest continued.
    pub failed_chains: Vec<(usize, String)>,
    /// Present when at least two chains completed.
    pub diagnostics: Option<ConvergenceReport>,
    pub posterior: PosteriorSummary,
    pub warnings: Vec<String>,
}

impl Summarizable for MusseAnalysis {
    fn summary(&self) -> String {
        format!(
            "MusseAnalysis: {} tips, MLE logL {:.3}, {}/{} chains completed, {} warnings",
            self.tree_tips,
            self.mle.log_likelihood,
            self.chains.len(),
            self.chains.len() + self.failed_chains.len(),
            self.warnings.len()
        )
    }
}

fn io_context(path: &std::path::Path, e: std::io::Error) -> FilixError {
    FilixError::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {}", path.display(), e),
    ))
}

/// Runs the full MuSSE analysis described by `config`.
pub fn run(config: &PipelineConfig) -> Result<MusseAnalysis> {
    config.validate()?;
    let mut warnings = Vec::new();

    // Load inputs.
    let newick =
        fs::read_to_string(&config.tree_path).map_err(|e| io_context(&config.tree_path, e))?;
    let tree = PhyloTree::from_newick(&newick)?;
    let table = read_trait_table(&config.trait_path, &config.state_columns)?;
    if table.dropped > 0 {
        warnings.push(format!(
            "{} trait rows dropped while loading {}",
            table.dropped,
            config.trait_path.display()
        ));
    }

    // Inner join on species names.
    let tip_names: HashSet<String> = tree.leaf_names().into_iter().collect();
    let matched: Vec<String> = table
        .records
        .iter()
        .filter(|r| tip_names.contains(&r.species))
        .map(|r| r.species.clone())
        .collect();
    if matched.is_empty() {
        return Err(FilixError::InvalidInput(
            "run: tree tips and trait table share no species".into(),
        ));
    }
    let unmatched_rows = table.records.len() - matched.len();
    if unmatched_rows > 0 {
        warnings.push(format!(
            "{} trait rows without a matching tree tip dropped",
            unmatched_rows
        ));
    }
    let tips_before = tree.leaf_count();
    let mut tree = tree.prune_to_tips(&matched)?;
    let tips_pruned = tips_before - tree.leaf_count();
    if tips_pruned > 0 {
        warnings.push(format!(
            "{} tree tips without trait data pruned",
            tips_pruned
        ));
    }

    let ultrametric = force_ultrametric(&mut tree)?;
    if ultrametric.adjusted_tips > 0 {
        warnings.push(format!(
            "ultrametric forcing extended {} terminal branches (total adjustment {:.6})",
            ultrametric.adjusted_tips, ultrametric.total_adjustment
        ));
    }

    // Encode tip states in the tree's leaf order.
    let by_species: HashMap<&str, &TraitRecord> = table
        .records
        .iter()
        .map(|r| (r.species.as_str(), r))
        .collect();
    let mut tip_states = Vec::with_capacity(tree.leaf_count());
    for id in tree.leaves() {
        let name = tree
            .get_node(id)
            .and_then(|n| n.name.as_deref())
            .ok_or_else(|| FilixError::InvalidInput("run: unnamed tip after pruning".into()))?;
        let record = by_species.get(name).ok_or_else(|| {
            FilixError::InvalidInput(format!("run: no trait record for tip '{}'", name))
        })?;
        tip_states.push(encode_state(record.trait_a, record.trait_b)?);
    }

    // Likelihood, MLE, prior, calibration.
    let lik = MusseLikelihood::new(&tree, &tip_states, config.sampling_fractions)?;
    let constraints = Constraints::fern_default();
    let root_age = tree_height(&tree)?;
    let start = starting_point(tree.leaf_count(), root_age, &constraints)?;
    let mle = maximize(&lik, &constraints, &start, &OptimConfig::default())?;
    if !mle.converged {
        warnings.push(format!(
            "optimizer did not converge within {} iterations; MLE is provisional",
            mle.iterations
        ));
    }
    let prior = ExponentialPrior::from_mle(&mle.free)?;
    let windows = calibrate_windows(
        &lik,
        &constraints,
        &prior,
        &mle.free,
        config.calibration_steps,
        config.random_seeds[0],
    )?;

    // Production chains, one trace file each.
    fs::create_dir_all(&config.output_dir).map_err(|e| io_context(&config.output_dir, e))?;
    let run_one = |index: usize| -> Result<(ChainResult, PathBuf)> {
        let path = config.output_dir.join(format!("chain_{}.csv", index + 1));
        let mut writer = TraceWriter::create(&path, &PARAM_NAMES)?;
        let settings = ChainSettings {
            steps: config.production_steps,
            retention_interval: config.retention_interval,
            seed: config.random_seeds[index],
        };
        let result = run_chain(
            &lik,
            &constraints,
            &prior,
            &mle.free,
            &windows,
            &settings,
            Some(&mut writer),
        )?;
        Ok((result, path))
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Result<(ChainResult, PathBuf)>> = {
        use rayon::prelude::*;
        (0..config.chain_count)
            .into_par_iter()
            .map(run_one)
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Result<(ChainResult, PathBuf)>> =
        (0..config.chain_count).map(run_one).collect();

    let mut chains = Vec::new();
    let mut chain_samples: Vec<Vec<TraceRow>> = Vec::new();
    let mut failed_chains = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok((result, trace_path)) => {
                chains.push(ChainRun {
                    index,
                    seed: result.seed,
                    acceptance_rate: result.acceptance_rate,
                    trace_path,
                    retained: result.samples.len(),
                });
                chain_samples.push(result.samples);
            }
            Err(e) => {
                warnings.push(format!("chain {} failed: {}", index + 1, e));
                failed_chains.push((index, e.to_string()));
            }
        }
    }
    if chains.is_empty() {
        return Err(FilixError::Numeric("run: every chain failed".into()));
    }

    // Diagnostics and posterior summary.
    let slices: Vec<&[TraceRow]> = chain_samples.iter().map(|s| s.as_slice()).collect();
    let diagnostics = if slices.len() >= 2 {
        let report = diagnose(&PARAM_NAMES, &slices)?;
        warnings.extend(report.warnings.iter().cloned());
        Some(report)
    } else {
        warnings.push("fewer than two chains completed; convergence diagnostics skipped".into());
        None
    };
    let posterior = summarize(&PARAM_NAMES, &slices, config.burn_in, &DEFAULT_COMPARISONS)?;

    Ok(MusseAnalysis {
        tree_tips: tree.leaf_count(),
        ultrametric,
        mle,
        chains,
        failed_chains,
        diagnostics,
        posterior,
        warnings,
    })
}
