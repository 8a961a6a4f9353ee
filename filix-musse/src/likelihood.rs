//! MuSSE log-likelihood over a dated tree.
//!
//! For each branch the extinction probabilities `E_i(t)` and partial
//! likelihoods `D_i(t)` evolve under the coupled ODE system
//!
//! ```text
//! dE_i/dt = mu_i - (lambda_i + mu_i + sum_j q_ij) E_i
//!           + lambda_i E_i^2 + sum_j q_ij E_j
//! dD_i/dt = -(lambda_i + mu_i + sum_j q_ij) D_i
//!           + 2 lambda_i E_i D_i + sum_j q_ij D_j
//! ```
//!
//! integrated tip-to-root with classical fixed-step RK4 and combined at
//! internal nodes by post-order pruning. Tips start at `D_i = f_i` for the
//! observed state and `E_i = 1 - f_i`, where `f_i` is the per-state
//! sampling fraction. The root is treated with observed-frequency
//! weighting. Partial likelihoods are rescaled at internal nodes, with the
//! log factors accumulated, so deep trees do not underflow.

use crate::params::MusseParams;
use crate::states::STATE_COUNT;
use filix_core::{FilixError, Result};
use filix_phylo::ultrametric::node_depths;
use filix_phylo::PhyloTree;

/// Branch length is divided into at most this fraction of the tree height
/// per RK4 step.
const STEPS_PER_HEIGHT: f64 = 200.0;
/// Every branch gets at least this many RK4 steps.
const MIN_STEPS: usize = 4;

/// E and D stacked into one ODE state: `E` in slots `0..4`, `D` in `4..8`.
type EdState = [f64; 2 * STATE_COUNT];

/// A MuSSE log-likelihood function bound to a tree, tip states, and
/// sampling fractions.
///
/// Construction validates and flattens the tree once; evaluation is a pure
/// function of the parameter vector.
pub struct MusseLikelihood {
    postorder: Vec<usize>,
    children: Vec<Vec<usize>>,
    branch_length: Vec<Option<f64>>,
    root: usize,
    tip_state: Vec<Option<u8>>,
    sampling: [f64; STATE_COUNT],
    max_step: f64,
    n_tips: usize,
}

impl MusseLikelihood {
    /// Binds the likelihood to a tree, one state per tip (in the tree's
    /// leaf order), and per-state sampling fractions.
    pub fn new(
        tree: &PhyloTree,
        tip_states: &[u8],
        sampling_fractions: [f64; STATE_COUNT],
    ) -> Result<Self> {
        let leaves = tree.leaves();
        if leaves.is_empty() {
            return Err(FilixError::InvalidInput(
                "MusseLikelihood::new: tree has no tips".into(),
            ));
        }
        if tip_states.len() != leaves.len() {
            return Err(FilixError::InvalidInput(format!(
                "MusseLikelihood::new: {} tip states for {} tips",
                tip_states.len(),
                leaves.len()
            )));
        }
        for (k, &state) in tip_states.iter().enumerate() {
            if !(1..=STATE_COUNT as u8).contains(&state) {
                return Err(FilixError::InvalidInput(format!(
                    "MusseLikelihood::new: tip {} has state {}, expected 1..={}",
                    k, state, STATE_COUNT
                )));
            }
        }
        for (i, &f) in sampling_fractions.iter().enumerate() {
            if !(f > 0.0 && f <= 1.0) {
                return Err(FilixError::InvalidInput(format!(
                    "MusseLikelihood::new: sampling fraction for state {} must be in (0, 1], got {}",
                    i + 1,
                    f
                )));
            }
        }

        let n = tree.node_count();
        let mut children = vec![Vec::new(); n];
        let mut branch_length = vec![None; n];
        for id in 0..n {
            let node = tree.get_node(id).ok_or_else(|| {
                FilixError::InvalidInput(format!("MusseLikelihood::new: missing node {}", id))
            })?;
            children[id] = node.children.clone();
            if !node.is_root() {
                let len = node.branch_length.ok_or_else(|| {
                    FilixError::InvalidInput(format!(
                        "MusseLikelihood::new: node {} has no branch length",
                        id
                    ))
                })?;
                if !len.is_finite() || len < 0.0 {
                    return Err(FilixError::InvalidInput(format!(
                        "MusseLikelihood::new: node {} has branch length {}",
                        id, len
                    )));
                }
                branch_length[id] = Some(len);
            }
        }

        let depths = node_depths(tree)?;
        let height = leaves.iter().map(|&id| depths[id]).fold(0.0f64, f64::max);
        let max_step = if height > 0.0 {
            height / STEPS_PER_HEIGHT
        } else {
            1.0
        };

        let mut tip_state = vec![None; n];
        for (k, &id) in leaves.iter().enumerate() {
            tip_state[id] = Some(tip_states[k]);
        }

        Ok(MusseLikelihood {
            postorder: tree.iter_postorder().collect(),
            children,
            branch_length,
            root: tree.root(),
            tip_state,
            sampling: sampling_fractions,
            max_step,
            n_tips: leaves.len(),
        })
    }

    /// Number of tips the likelihood is bound to.
    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    /// Log-likelihood of the data under `params`.
    ///
    /// Returns `f64::NEG_INFINITY` when any rate is negative or the
    /// computation degenerates (zero or non-finite partial likelihood).
    pub fn log_likelihood(&self, params: &MusseParams) -> f64 {
        if params.has_negative() {
            return f64::NEG_INFINITY;
        }
        let mut total = [0.0; STATE_COUNT];
        for i in 0..STATE_COUNT {
            let q_out: f64 = (0..STATE_COUNT)
                .filter(|&j| j != i)
                .map(|j| params.q[i][j])
                .sum();
            total[i] = params.lambda[i] + params.mu[i] + q_out;
        }

        let n = self.children.len();
        let mut e = vec![[0.0f64; STATE_COUNT]; n];
        let mut d = vec![[0.0f64; STATE_COUNT]; n];
        let mut log_comp = 0.0;

        for &id in &self.postorder {
            if let Some(state) = self.tip_state[id] {
                let s = (state - 1) as usize;
                for i in 0..STATE_COUNT {
                    e[id][i] = 1.0 - self.sampling[i];
                }
                d[id][s] = self.sampling[s];
            } else {
                let kids = &self.children[id];
                // E depends only on elapsed time and state, so any child's
                // vector serves at the junction.
                e[id] = e[kids[0]];
                let mut combined = d[kids[0]];
                for &child in &kids[1..] {
                    for i in 0..STATE_COUNT {
                        combined[i] = params.lambda[i] * combined[i] * d[child][i];
                    }
                }
                let sum: f64 = combined.iter().sum();
                if !(sum > 0.0) || !sum.is_finite() {
                    return f64::NEG_INFINITY;
                }
                for value in combined.iter_mut() {
                    *value /= sum;
                }
                log_comp += sum.ln();
                d[id] = combined;
            }

            if let Some(len) = self.branch_length[id] {
                if len > 0.0 {
                    let (ne, nd) = self.integrate(params, &total, e[id], d[id], len);
                    e[id] = ne;
                    d[id] = nd;
                }
            }
        }

        let root_d = &d[self.root];
        let sum: f64 = root_d.iter().sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return f64::NEG_INFINITY;
        }
        // Observed-frequency root weighting: L = sum_i D_i * (D_i / sum_j D_j).
        let weighted: f64 = root_d.iter().map(|&x| x * x).sum::<f64>() / sum;
        let ll = weighted.ln() + log_comp;
        if ll.is_nan() {
            f64::NEG_INFINITY
        } else {
            ll
        }
    }

    /// Integrates the E/D system along one branch of length `len`.
    fn integrate(
        &self,
        params: &MusseParams,
        total: &[f64; STATE_COUNT],
        e0: [f64; STATE_COUNT],
        d0: [f64; STATE_COUNT],
        len: f64,
    ) -> ([f64; STATE_COUNT], [f64; STATE_COUNT]) {
        let steps = ((len / self.max_step).ceil() as usize).max(MIN_STEPS);
        let dt = len / steps as f64;
        let mut y: EdState = [0.0; 2 * STATE_COUNT];
        y[..STATE_COUNT].copy_from_slice(&e0);
        y[STATE_COUNT..].copy_from_slice(&d0);
        for _ in 0..steps {
            y = rk4_step(params, total, &y, dt);
        }
        let mut e = [0.0; STATE_COUNT];
        let mut d = [0.0; STATE_COUNT];
        e.copy_from_slice(&y[..STATE_COUNT]);
        d.copy_from_slice(&y[STATE_COUNT..]);
        (e, d)
    }
}

/// Right-hand side of the E/D system. The equations are autonomous, so no
/// time argument is needed.
fn derivative(params: &MusseParams, total: &[f64; STATE_COUNT], y: &EdState) -> EdState {
    let mut out = [0.0; 2 * STATE_COUNT];
    for i in 0..STATE_COUNT {
        let mut q_e = 0.0;
        let mut q_d = 0.0;
        for j in 0..STATE_COUNT {
            if j != i {
                q_e += params.q[i][j] * y[j];
                q_d += params.q[i][j] * y[STATE_COUNT + j];
            }
        }
        let e_i = y[i];
        let d_i = y[STATE_COUNT + i];
        out[i] = params.mu[i] - total[i] * e_i + params.lambda[i] * e_i * e_i + q_e;
        out[STATE_COUNT + i] = -total[i] * d_i + 2.0 * params.lambda[i] * e_i * d_i + q_d;
    }
    out
}

/// One classical RK4 step of size `dt`.
fn rk4_step(params: &MusseParams, total: &[f64; STATE_COUNT], y: &EdState, dt: f64) -> EdState {
    let half = 0.5 * dt;
    let k1 = derivative(params, total, y);
    let mut y2 = *y;
    for (yi, ki) in y2.iter_mut().zip(&k1) {
        *yi += half * ki;
    }
    let k2 = derivative(params, total, &y2);
    let mut y3 = *y;
    for (yi, ki) in y3.iter_mut().zip(&k2) {
        *yi += half * ki;
    }
    let k3 = derivative(params, total, &y3);
    let mut y4 = *y;
    for (yi, ki) in y4.iter_mut().zip(&k3) {
        *yi += dt * ki;
    }
    let k4 = derivative(params, total, &y4);
    let sixth = dt / 6.0;
    let mut out = *y;
    for i in 0..out.len() {
        out[i] += sixth * (k1[i] + 2.0 * (k2[i] + k3[i]) + k4[i]);
    }
    out
}
