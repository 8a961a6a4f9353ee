//! Maximum-likelihood estimation of the constrained parameter vector.
//!
//! The objective is derivative-free (an ODE-backed likelihood), so the
//! optimizer is a Nelder-Mead simplex over the free parameter vector. The
//! lower bound of zero is enforced by the domain itself: the likelihood
//! returns negative infinity for negative rates, which the simplex treats
//! as an infinitely bad vertex.

use crate::likelihood::MusseLikelihood;
use crate::params::{Constraints, MusseParams};
use filix_core::{FilixError, Result};

/// Optimizer settings.
#[derive(Debug, Clone)]
pub struct OptimConfig {
    /// Maximum simplex iterations.
    pub max_iters: usize,
    /// Convergence threshold on the spread of objective values across the
    /// simplex.
    pub f_tol: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        OptimConfig {
            max_iters: 2000,
            f_tol: 1e-8,
        }
    }
}

/// Outcome of a maximization run.
#[derive(Debug, Clone)]
pub struct OptimResult {
    /// Free parameter vector at the optimum.
    pub free: Vec<f64>,
    /// Expanded full parameter vector at the optimum.
    pub params: MusseParams,
    /// Log-likelihood at the optimum.
    pub log_likelihood: f64,
    /// Iterations actually taken.
    pub iterations: usize,
    /// False when the iteration budget ran out before the simplex
    /// collapsed; the result is then provisional.
    pub converged: bool,
}

/// Birth-death moment starting point.
///
/// Net diversification is estimated as `r = ln(n/2) / root_age`, split
/// into `lambda = 2r, mu = r` (extinction fraction one half); transition
/// rates default to a tenth of the speciation rate. The full vector is
/// projected through `constraints` to give the free starting vector.
pub fn starting_point(
    n_tips: usize,
    root_age: f64,
    constraints: &Constraints,
) -> Result<Vec<f64>> {
    if n_tips < 2 {
        return Err(FilixError::InvalidInput(format!(
            "starting_point: need at least 2 tips, got {}",
            n_tips
        )));
    }
    if !(root_age > 0.0) {
        return Err(FilixError::InvalidInput(format!(
            "starting_point: root age must be positive, got {}",
            root_age
        )));
    }
    let mut r = (n_tips as f64 / 2.0).ln() / root_age;
    if r <= 0.0 {
        r = 1.0 / root_age;
    }
    let lambda0 = 2.0 * r;
    let full = MusseParams::uniform(lambda0, r, lambda0 / 10.0);
    Ok(constraints.reduce(&full))
}

/// Maximizes the constrained log-likelihood from `start`.
pub fn maximize(
    lik: &MusseLikelihood,
    constraints: &Constraints,
    start: &[f64],
    config: &OptimConfig,
) -> Result<OptimResult> {
    if start.len() != constraints.free_len() {
        return Err(FilixError::InvalidInput(format!(
            "maximize: start has {} values, constraints have {} free parameters",
            start.len(),
            constraints.free_len()
        )));
    }
    let objective = |free: &[f64]| -> f64 {
        match constraints.expand(free) {
            Ok(params) => -lik.log_likelihood(&params),
            Err(_) => f64::INFINITY,
        }
    };
    if !objective(start).is_finite() {
        return Err(FilixError::InvalidInput(
            "maximize: objective is not finite at the starting point".into(),
        ));
    }

    let (best, f_best, iterations, converged) = nelder_mead(&objective, start, config);
    if !f_best.is_finite() {
        return Err(FilixError::Numeric(
            "maximize: objective not finite at the reported optimum".into(),
        ));
    }
    let params = constraints.expand(&best)?;
    Ok(OptimResult {
        free: best,
        params,
        log_likelihood: -f_best,
        iterations,
        converged,
    })
}

/// Nelder-Mead minimization with standard coefficients.
///
/// Returns the best vertex, its objective value, the iteration count, and
/// whether the value spread fell below `f_tol` within the budget.
fn nelder_mead<F>(f: &F, x0: &[f64], config: &OptimConfig) -> (Vec<f64>, f64, usize, bool)
where
    F: Fn(&[f64]) -> f64,
{
    const ALPHA: f64 = 1.0; // reflection
    const GAMMA: f64 = 2.0; // expansion
    const RHO: f64 = 0.5; // contraction
    const SIGMA: f64 = 0.5; // shrink

    let n = x0.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for j in 0..n {
        let mut vertex = x0.to_vec();
        if vertex[j].abs() > 1e-12 {
            vertex[j] *= 1.05;
        } else {
            vertex[j] = 2.5e-4;
        }
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| f(x)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iters {
        // Order vertices best-first.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let reordered: Vec<Vec<f64>> = order.iter().map(|&k| simplex[k].clone()).collect();
        let reordered_values: Vec<f64> = order.iter().map(|&k| values[k]).collect();
        simplex = reordered;
        values = reordered_values;

        let spread = values[n] - values[0];
        if spread.is_finite() && spread.abs() < config.f_tol {
            converged = true;
            break;
        }
        iterations += 1;

        let mut centroid = vec![0.0; n];
        for vertex in &simplex[..n] {
            for (c, &v) in centroid.iter_mut().zip(vertex) {
                *c += v;
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f64;
        }

        let reflected: Vec<f64> = centroid
            .iter()
            .zip(&simplex[n])
            .map(|(&c, &w)| c + ALPHA * (c - w))
            .collect();
        let f_reflected = f(&reflected);

        if f_reflected < values[0] {
            let expanded: Vec<f64> = centroid
                .iter()
                .zip(&reflected)
                .map(|(&c, &r)| c + GAMMA * (r - c))
                .collect();
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let (contracted, f_contracted) = if f_reflected < values[n] {
                let outside: Vec<f64> = centroid
                    .iter()
                    .zip(&reflected)
                    .map(|(&c, &r)| c + RHO * (r - c))
                    .collect();
                let fv = f(&outside);
                (outside, fv)
            } else {
                let inside: Vec<f64> = centroid
                    .iter()
                    .zip(&simplex[n])
                    .map(|(&c, &w)| c - RHO * (c - w))
                    .collect();
                let fv = f(&inside);
                (inside, fv)
            };
            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                // Shrink everything toward the best vertex.
                let best = simplex[0].clone();
                for k in 1..=n {
                    for (v, &b) in simplex[k].iter_mut().zip(&best) {
                        *v = b + SIGMA * (*v - b);
                    }
                    values[k] = f(&simplex[k]);
                }
            }
        }
    }

    let mut best_idx = 0;
    for k in 1..=n {
        if values[k] < values[best_idx] {
            best_idx = k;
        }
    }
    (
        simplex[best_idx].clone(),
        values[best_idx],
        iterations,
        converged,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PARAM_NAMES;
    use filix_phylo::PhyloTree;

    /// Single speciation rate, single extinction rate, no transitions.
    fn two_parameter_constraints() -> Constraints {
        let mut constraints = Constraints::identity();
        for name in ["lambda2", "lambda3", "lambda4"] {
            constraints.tie(name, "lambda1").unwrap();
        }
        for name in ["mu2", "mu3", "mu4"] {
            constraints.tie(name, "mu1").unwrap();
        }
        for &name in PARAM_NAMES.iter().filter(|n| n.starts_with('q')) {
            constraints.fix_zero(name).unwrap();
        }
        constraints
    }

    #[test]
    fn simplex_minimizes_a_quadratic() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2) + 5.0;
        let config = OptimConfig::default();
        let (best, f_best, iterations, converged) = nelder_mead(&f, &[0.0, 0.0], &config);
        assert!(converged, "no convergence after {} iterations", iterations);
        assert!((best[0] - 3.0).abs() < 1e-3, "x0 = {}", best[0]);
        assert!((best[1] + 1.0).abs() < 1e-3, "x1 = {}", best[1]);
        assert!((f_best - 5.0).abs() < 1e-6);
    }

    #[test]
    fn simplex_climbs_out_of_infinite_vertices() {
        // Negative coordinates are out of the domain, as with rates.
        let f = |x: &[f64]| {
            if x[0] < 0.0 {
                f64::INFINITY
            } else {
                (x[0] - 0.5).powi(2)
            }
        };
        let (best, _, _, _) = nelder_mead(&f, &[0.01], &OptimConfig::default());
        assert!((best[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn starting_point_uses_moment_heuristics() {
        let constraints = Constraints::identity();
        let start = starting_point(100, 10.0, &constraints).unwrap();
        let r = (50.0f64).ln() / 10.0;
        assert_eq!(start.len(), 20);
        assert!((start[0] - 2.0 * r).abs() < 1e-12, "lambda1 = {}", start[0]);
        assert!((start[4] - r).abs() < 1e-12, "mu1 = {}", start[4]);
        assert!((start[8] - 0.2 * r).abs() < 1e-12, "q12 = {}", start[8]);
    }

    #[test]
    fn starting_point_rejects_degenerate_inputs() {
        let constraints = Constraints::identity();
        assert!(starting_point(1, 10.0, &constraints).is_err());
        assert!(starting_point(10, 0.0, &constraints).is_err());
    }

    #[test]
    fn toy_tree_two_parameter_mle_is_positive_and_reproducible() {
        let tree = PhyloTree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let lik = MusseLikelihood::new(&tree, &[1, 1, 1, 1], [1.0; 4]).unwrap();
        let constraints = two_parameter_constraints();
        let root_age = filix_phylo::tree_height(&tree).unwrap();
        let start = starting_point(4, root_age, &constraints).unwrap();
        let result = maximize(&lik, &constraints, &start, &OptimConfig::default()).unwrap();

        let lambda_hat = result.params.lambda[0];
        assert!(lambda_hat > 0.0 && lambda_hat.is_finite(), "lambda = {}", lambda_hat);
        assert!(result.log_likelihood.is_finite());
        assert!(result.iterations > 0);

        let recomputed = lik.log_likelihood(&result.params);
        assert!(
            (recomputed - result.log_likelihood).abs() < 1e-6,
            "reported {} vs recomputed {}",
            result.log_likelihood,
            recomputed
        );
    }

    #[test]
    fn all_four_states_need_a_transition_rate() {
        // With one tip in each state, some transition rate must be free or
        // the pruning product is zero everywhere. One shared rate class
        // keeps the model at three parameters.
        let tree = PhyloTree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let lik = MusseLikelihood::new(&tree, &[1, 2, 3, 4], [1.0; 4]).unwrap();
        let mut constraints = two_parameter_constraints();
        // Dead end with zero transitions:
        let start2 = starting_point(4, 2.0, &constraints).unwrap();
        assert!(maximize(&lik, &constraints, &start2, &OptimConfig::default()).is_err());

        constraints = Constraints::identity();
        for name in ["lambda2", "lambda3", "lambda4"] {
            constraints.tie(name, "lambda1").unwrap();
        }
        for name in ["mu2", "mu3", "mu4"] {
            constraints.tie(name, "mu1").unwrap();
        }
        for &name in PARAM_NAMES.iter().filter(|n| n.starts_with('q') && **n != "q12") {
            constraints.tie(name, "q12").unwrap();
        }
        assert_eq!(constraints.free_names(), vec!["lambda1", "mu1", "q12"]);
        let start = starting_point(4, 2.0, &constraints).unwrap();
        let result = maximize(&lik, &constraints, &start, &OptimConfig::default()).unwrap();
        assert!(result.params.lambda[0] > 0.0 && result.params.lambda[0].is_finite());
        let recomputed = lik.log_likelihood(&result.params);
        assert!((recomputed - result.log_likelihood).abs() < 1e-6);
    }

    #[test]
    fn mle_improves_on_the_starting_point() {
        let tree = PhyloTree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let lik = MusseLikelihood::new(&tree, &[1, 1, 2, 2], [1.0; 4]).unwrap();
        let constraints = Constraints::fern_default();
        let start = starting_point(4, 2.0, &constraints).unwrap();
        let start_ll = lik.log_likelihood(&constraints.expand(&start).unwrap());
        let result = maximize(&lik, &constraints, &start, &OptimConfig::default()).unwrap();
        assert!(
            result.log_likelihood >= start_ll,
            "MLE {} worse than start {}",
            result.log_likelihood,
            start_ll
        );
    }

    #[test]
    fn maximize_rejects_infinite_start() {
        let tree = PhyloTree::from_newick("(A:1,B:1);").unwrap();
        let lik = MusseLikelihood::new(&tree, &[1, 1], [1.0; 4]).unwrap();
        let constraints = Constraints::identity();
        let start = vec![-1.0; 20];
        assert!(maximize(&lik, &constraints, &start, &OptimConfig::default()).is_err());
    }
}
