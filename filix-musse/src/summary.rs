//! Posterior summaries over pooled chain traces.
//!
//! Rows below the burn-in step are discarded and the remaining rows of all
//! chains are pooled. The pool is treated as exchangeable: chains are
//! assumed converged and mixed, which the summarizer documents but does
//! not enforce.

use filix_core::{FilixError, Result, Summarizable};
use filix_io::TraceRow;
use filix_stats::{mean, quantile};

/// Cross-parameter probabilities reported by default: the
/// chlorophyllous-spore/habit transition contrast in both directions.
pub const DEFAULT_COMPARISONS: [(&str, &str); 2] = [("q24", "q42"), ("q42", "q24")];

/// Posterior location and interval for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub median: f64,
    /// 2.5th percentile.
    pub lower95: f64,
    /// 97.5th percentile.
    pub upper95: f64,
}

/// An empirical probability that one rate exceeds another.
#[derive(Debug, Clone, PartialEq)]
pub struct RateComparison {
    pub label: String,
    /// Exact count fraction over the pooled samples.
    pub probability: f64,
}

/// Posterior summary over the pooled post-burn-in samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSummary {
    pub parameters: Vec<ParameterSummary>,
    pub comparisons: Vec<RateComparison>,
    /// Number of pooled rows the summary is computed from.
    pub pooled_samples: usize,
}

impl Summarizable for PosteriorSummary {
    fn summary(&self) -> String {
        format!(
            "PosteriorSummary: {} parameters, {} comparisons, {} pooled samples",
            self.parameters.len(),
            self.comparisons.len(),
            self.pooled_samples
        )
    }
}

/// Summarizes chains: burn-in removal, pooling, per-parameter statistics,
/// and named cross-parameter probabilities computed as exact count
/// fractions.
pub fn summarize(
    names: &[&str],
    chains: &[&[TraceRow]],
    burn_in: usize,
    comparisons: &[(&str, &str)],
) -> Result<PosteriorSummary> {
    let pool: Vec<&TraceRow> = chains
        .iter()
        .flat_map(|chain| chain.iter())
        .filter(|row| row.step >= burn_in)
        .collect();
    if pool.is_empty() {
        return Err(FilixError::InvalidInput(format!(
            "summarize: no samples remain after burn-in {}",
            burn_in
        )));
    }
    for row in &pool {
        if row.params.len() != names.len() {
            return Err(FilixError::InvalidInput(format!(
                "summarize: trace row has {} parameters, expected {}",
                row.params.len(),
                names.len()
            )));
        }
    }

    let mut parameters = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let values: Vec<f64> = pool.iter().map(|row| row.params[idx]).collect();
        parameters.push(ParameterSummary {
            name: name.to_string(),
            mean: mean(&values)?,
            median: quantile(&values, 0.5)?,
            lower95: quantile(&values, 0.025)?,
            upper95: quantile(&values, 0.975)?,
        });
    }

    let index_of = |name: &str| -> Result<usize> {
        names
            .iter()
            .position(|&n| n == name)
            .ok_or_else(|| FilixError::InvalidInput(format!("summarize: unknown parameter '{}'", name)))
    };
    let mut rate_comparisons = Vec::with_capacity(comparisons.len());
    for &(a, b) in comparisons {
        let ia = index_of(a)?;
        let ib = index_of(b)?;
        let count = pool
            .iter()
            .filter(|row| row.params[ia] > row.params[ib])
            .count();
        rate_comparisons.push(RateComparison {
            label: format!("P({} > {})", a, b),
            probability: count as f64 / pool.len() as f64,
        });
    }

    Ok(PosteriorSummary {
        parameters,
        comparisons: rate_comparisons,
        pooled_samples: pool.len(),
    })
}
