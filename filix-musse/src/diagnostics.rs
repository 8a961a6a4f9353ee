//! Convergence diagnostics over retained chain traces.
//!
//! Diagnostics only read chain output; they never feed back into the
//! sampler. Thresholds produce advisory warnings, never errors: whether to
//! extend a run is a human decision.

use filix_core::{FilixError, Result, Summarizable};
use filix_io::TraceRow;
use filix_stats::{mean, variance};

/// Parameters with a pooled effective sample size below this are flagged.
pub const ESS_WARN_THRESHOLD: f64 = 200.0;
/// Parameters with a potential-scale-reduction factor above this are
/// flagged.
pub const PSRF_WARN_THRESHOLD: f64 = 1.1;

/// Diagnostics for one model parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDiagnostic {
    pub name: String,
    /// Effective sample size of the pooled retained samples.
    pub ess: f64,
    /// Gelman-Rubin potential scale reduction factor across chains.
    pub psrf: f64,
}

/// Diagnostics across all parameters, with advisory warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    pub parameters: Vec<ParamDiagnostic>,
    pub warnings: Vec<String>,
}

impl Summarizable for ConvergenceReport {
    fn summary(&self) -> String {
        let min_ess = self
            .parameters
            .iter()
            .map(|p| p.ess)
            .fold(f64::INFINITY, f64::min);
        let max_psrf = self
            .parameters
            .iter()
            .map(|p| p.psrf)
            .fold(f64::NEG_INFINITY, f64::max);
        format!(
            "Convergence: {} parameters, min ESS {:.1}, max R-hat {:.3}, {} warnings",
            self.parameters.len(),
            min_ess,
            max_psrf,
            self.warnings.len()
        )
    }
}

/// Effective sample size via the autocorrelation sum, truncated at the
/// first negative lag. Near-constant sequences count as fully independent.
pub fn effective_sample_size(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return n as f64;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let var: f64 = values.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / n as f64;
    if var < 1e-30 {
        return n as f64;
    }
    let mut sum_rho = 0.0;
    for lag in 1..n {
        let mut rho = 0.0;
        for i in 0..(n - lag) {
            rho += (values[i] - m) * (values[i + lag] - m);
        }
        rho /= n as f64 * var;
        if rho < 0.0 {
            break;
        }
        sum_rho += rho;
    }
    (n as f64 / (1.0 + 2.0 * sum_rho)).max(1.0)
}

/// Gelman-Rubin potential scale reduction factor across chains.
///
/// Requires at least two chains of equal length (>= 2). Chains with
/// negligible within-chain variance (constrained or stuck parameters)
/// report exactly 1.
pub fn gelman_rubin(chains: &[&[f64]]) -> Result<f64> {
    let m = chains.len();
    if m < 2 {
        return Err(FilixError::InvalidInput(format!(
            "gelman_rubin: need at least 2 chains, got {}",
            m
        )));
    }
    let n = chains[0].len();
    if n < 2 {
        return Err(FilixError::InvalidInput(format!(
            "gelman_rubin: need at least 2 samples per chain, got {}",
            n
        )));
    }
    if chains.iter().any(|c| c.len() != n) {
        return Err(FilixError::InvalidInput(
            "gelman_rubin: chains must have equal length".into(),
        ));
    }

    let chain_means: Vec<f64> = chains
        .iter()
        .map(|c| mean(c))
        .collect::<Result<Vec<f64>>>()?;
    let within = chains
        .iter()
        .map(|c| variance(c, 1))
        .collect::<Result<Vec<f64>>>()?
        .iter()
        .sum::<f64>()
        / m as f64;
    if within < 1e-30 {
        return Ok(1.0);
    }
    // B/n is the variance of the chain means.
    let between_over_n = variance(&chain_means, 1)?;
    let pooled = (n - 1) as f64 / n as f64 * within + between_over_n;
    Ok((pooled / within).sqrt())
}

/// Computes per-parameter ESS and PSRF over the retained traces of two or
/// more chains, flagging advisory threshold violations.
pub fn diagnose(names: &[&str], chains: &[&[TraceRow]]) -> Result<ConvergenceReport> {
    if chains.len() < 2 {
        return Err(FilixError::InvalidInput(format!(
            "diagnose: need at least 2 chains, got {}",
            chains.len()
        )));
    }
    for (k, chain) in chains.iter().enumerate() {
        if chain.is_empty() {
            return Err(FilixError::InvalidInput(format!(
                "diagnose: chain {} has no retained samples",
                k + 1
            )));
        }
        if let Some(row) = chain.iter().find(|row| row.params.len() != names.len()) {
            return Err(FilixError::InvalidInput(format!(
                "diagnose: trace row has {} parameters, expected {}",
                row.params.len(),
                names.len()
            )));
        }
    }

    let mut parameters = Vec::with_capacity(names.len());
    let mut warnings = Vec::new();
    for (idx, name) in names.iter().enumerate() {
        let per_chain: Vec<Vec<f64>> = chains
            .iter()
            .map(|chain| chain.iter().map(|row| row.params[idx]).collect())
            .collect();
        let pooled: Vec<f64> = per_chain.iter().flatten().copied().collect();
        let ess = effective_sample_size(&pooled);
        let slices: Vec<&[f64]> = per_chain.iter().map(|c| c.as_slice()).collect();
        let psrf = gelman_rubin(&slices)?;

        if ess < ESS_WARN_THRESHOLD {
            warnings.push(format!(
                "{}: effective sample size {:.1} below {}",
                name, ess, ESS_WARN_THRESHOLD
            ));
        }
        if psrf > PSRF_WARN_THRESHOLD {
            warnings.push(format!(
                "{}: R-hat {:.3} above {}",
                name, psrf, PSRF_WARN_THRESHOLD
            ));
        }
        parameters.push(ParamDiagnostic {
            name: name.to_string(),
            ess,
            psrf,
        });
    }
    Ok(ConvergenceReport {
        parameters,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-noise in [0, 1).
    fn noise(seed: u64, n: usize) -> Vec<f64> {
        let mut state = seed.max(1);
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 53) as f64
            })
            .collect()
    }

    #[test]
    fn ess_of_independent_samples_is_large() {
        let values = noise(3, 500);
        let ess = effective_sample_size(&values);
        assert!(ess > 250.0, "ESS {} too small for white noise", ess);
    }

    #[test]
    fn ess_of_a_random_walk_is_small() {
        let steps = noise(9, 200);
        let walk: Vec<f64> = steps
            .iter()
            .scan(0.0, |acc, &s| {
                *acc += s - 0.5;
                Some(*acc)
            })
            .collect();
        let ess = effective_sample_size(&walk);
        assert!(ess < 50.0, "ESS {} too large for a random walk", ess);
    }

    #[test]
    fn ess_of_constant_sequence_is_the_length() {
        let values = vec![2.5; 40];
        assert_eq!(effective_sample_size(&values), 40.0);
    }

    #[test]
    fn psrf_near_one_for_matching_chains() {
        let a = noise(21, 400);
        let b = noise(22, 400);
        let r = gelman_rubin(&[&a, &b]).unwrap();
        assert!(r < 1.1, "R-hat {} too large for matched chains", r);
    }

    #[test]
    fn psrf_flags_shifted_chains() {
        let a = noise(31, 200);
        let b: Vec<f64> = noise(32, 200).iter().map(|x| x + 10.0).collect();
        let r = gelman_rubin(&[&a, &b]).unwrap();
        assert!(r > 1.5, "R-hat {} too small for shifted chains", r);
    }

    #[test]
    fn psrf_of_constant_chains_is_one() {
        let a = vec![0.0; 50];
        let b = vec![0.0; 50];
        assert_eq!(gelman_rubin(&[&a, &b]).unwrap(), 1.0);
    }

    #[test]
    fn psrf_input_validation() {
        let a = noise(1, 10);
        assert!(gelman_rubin(&[&a]).is_err());
        let short = noise(2, 5);
        assert!(gelman_rubin(&[&a, &short]).is_err());
    }

    fn rows_from(values: &[f64]) -> Vec<TraceRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| TraceRow {
                step: (i + 1) * 5,
                params: vec![v, 0.0],
                log_likelihood: -1.0,
                log_prior: -0.5,
                log_posterior: -1.5,
            })
            .collect()
    }

    #[test]
    fn diagnose_reports_per_parameter() {
        let a = rows_from(&noise(41, 300));
        let b = rows_from(&noise(42, 300));
        let report = diagnose(&["lambda1", "q14"], &[&a, &b]).unwrap();
        assert_eq!(report.parameters.len(), 2);
        // The pinned-zero column is constant: full ESS, R-hat exactly 1.
        let pinned = &report.parameters[1];
        assert_eq!(pinned.ess, 600.0);
        assert_eq!(pinned.psrf, 1.0);
        assert!(report.summary().starts_with("Convergence: 2 parameters"));
    }

    #[test]
    fn diagnose_warns_on_small_samples() {
        let a = rows_from(&noise(51, 30));
        let b = rows_from(&noise(52, 30));
        let report = diagnose(&["lambda1", "q14"], &[&a, &b]).unwrap();
        assert!(
            report.warnings.iter().any(|w| w.contains("lambda1")),
            "expected an ESS warning, got {:?}",
            report.warnings
        );
    }

    #[test]
    fn diagnose_rejects_single_chain() {
        let a = rows_from(&noise(61, 20));
        assert!(diagnose(&["lambda1", "q14"], &[&a]).is_err());
    }
}
