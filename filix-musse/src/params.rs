//! Model parameters and the constraint layer.
//!
//! A full MuSSE parameter vector over four states holds four speciation
//! rates, four extinction rates, and twelve directed transition rates.
//! Constraints (rate aliasing and hard zeros) are applied as a view: a
//! shorter free vector expands into the full vector before the likelihood
//! sees it, so the equations themselves are never special-cased.

use crate::states::STATE_COUNT;
use filix_core::{FilixError, Result};

/// Number of entries in the full parameter vector.
pub const PARAM_COUNT: usize = 2 * STATE_COUNT + STATE_COUNT * (STATE_COUNT - 1);

/// Canonical parameter order: speciation rates, extinction rates, then
/// transition rates row by row with the diagonal skipped.
pub const PARAM_NAMES: [&str; PARAM_COUNT] = [
    "lambda1", "lambda2", "lambda3", "lambda4", "mu1", "mu2", "mu3", "mu4", "q12", "q13", "q14",
    "q21", "q23", "q24", "q31", "q32", "q34", "q41", "q42", "q43",
];

/// Flat index of a parameter name, if it exists.
pub fn param_index(name: &str) -> Option<usize> {
    PARAM_NAMES.iter().position(|&n| n == name)
}

/// Ordered transition-rate index pairs, matching the tail of
/// [`PARAM_NAMES`].
fn q_pairs() -> impl Iterator<Item = (usize, usize)> {
    (0..STATE_COUNT)
        .flat_map(|i| (0..STATE_COUNT).filter(move |&j| j != i).map(move |j| (i, j)))
}

/// A full MuSSE parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct MusseParams {
    /// Per-state speciation rates.
    pub lambda: [f64; STATE_COUNT],
    /// Per-state extinction rates.
    pub mu: [f64; STATE_COUNT],
    /// `q[i][j]` is the transition rate from state `i+1` to state `j+1`;
    /// the diagonal is unused and held at zero.
    pub q: [[f64; STATE_COUNT]; STATE_COUNT],
}

impl MusseParams {
    /// Builds a vector with uniform speciation, extinction, and transition
    /// rates.
    pub fn uniform(lambda: f64, mu: f64, q: f64) -> Self {
        let mut qm = [[0.0; STATE_COUNT]; STATE_COUNT];
        for (i, j) in q_pairs() {
            qm[i][j] = q;
        }
        MusseParams {
            lambda: [lambda; STATE_COUNT],
            mu: [mu; STATE_COUNT],
            q: qm,
        }
    }

    /// True if any rate is negative.
    pub fn has_negative(&self) -> bool {
        self.lambda.iter().any(|&x| x < 0.0)
            || self.mu.iter().any(|&x| x < 0.0)
            || q_pairs().any(|(i, j)| self.q[i][j] < 0.0)
    }

    /// Largest rate in the vector.
    pub fn max_rate(&self) -> f64 {
        self.to_flat().iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Flattens into canonical order.
    pub fn to_flat(&self) -> [f64; PARAM_COUNT] {
        let mut flat = [0.0; PARAM_COUNT];
        flat[..STATE_COUNT].copy_from_slice(&self.lambda);
        flat[STATE_COUNT..2 * STATE_COUNT].copy_from_slice(&self.mu);
        for (k, (i, j)) in q_pairs().enumerate() {
            flat[2 * STATE_COUNT + k] = self.q[i][j];
        }
        flat
    }

    /// Rebuilds from a canonical-order slice.
    pub fn from_flat(flat: &[f64]) -> Result<Self> {
        if flat.len() != PARAM_COUNT {
            return Err(FilixError::InvalidInput(format!(
                "from_flat: expected {} values, got {}",
                PARAM_COUNT,
                flat.len()
            )));
        }
        let mut lambda = [0.0; STATE_COUNT];
        let mut mu = [0.0; STATE_COUNT];
        lambda.copy_from_slice(&flat[..STATE_COUNT]);
        mu.copy_from_slice(&flat[STATE_COUNT..2 * STATE_COUNT]);
        let mut q = [[0.0; STATE_COUNT]; STATE_COUNT];
        for (k, (i, j)) in q_pairs().enumerate() {
            q[i][j] = flat[2 * STATE_COUNT + k];
        }
        Ok(MusseParams { lambda, mu, q })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Free,
    Alias(usize),
    Zero,
}

/// A view mapping a shorter free parameter vector onto the full vector.
///
/// Each full-vector entry is either free, aliased to another (free) entry,
/// or pinned to zero. Expansion is exact, so aliased entries are bitwise
/// equal and pinned entries are exactly zero in every expanded vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    bindings: Vec<Binding>,
}

impl Constraints {
    /// All parameters free.
    pub fn identity() -> Self {
        Constraints {
            bindings: vec![Binding::Free; PARAM_COUNT],
        }
    }

    /// The constraint set of the fern analysis: extinction rates 2..4 tied
    /// to `mu1`, and the four disallowed double-trait transitions (`q14`,
    /// `q41`, `q23`, `q32`) pinned to zero. Leaves 13 free parameters.
    pub fn fern_default() -> Self {
        let mut bindings = vec![Binding::Free; PARAM_COUNT];
        // mu1 sits at flat index 4; mu2..mu4 follow it.
        for k in STATE_COUNT + 1..2 * STATE_COUNT {
            bindings[k] = Binding::Alias(STATE_COUNT);
        }
        for name in ["q14", "q41", "q23", "q32"] {
            if let Some(k) = param_index(name) {
                bindings[k] = Binding::Zero;
            }
        }
        Constraints { bindings }
    }

    fn index_of(name: &str) -> Result<usize> {
        param_index(name)
            .ok_or_else(|| FilixError::InvalidInput(format!("unknown parameter '{}'", name)))
    }

    /// Ties `target` to `source`: every expansion copies the source value
    /// into the target slot. The source must be free and the target must
    /// not itself be the source of another alias.
    pub fn tie(&mut self, target: &str, source: &str) -> Result<()> {
        let t = Self::index_of(target)?;
        let s = Self::index_of(source)?;
        if t == s {
            return Err(FilixError::InvalidInput(format!(
                "tie: '{}' cannot alias itself",
                target
            )));
        }
        if self.bindings[s] != Binding::Free {
            return Err(FilixError::InvalidInput(format!(
                "tie: source '{}' is not a free parameter",
                source
            )));
        }
        if self.bindings.iter().any(|b| *b == Binding::Alias(t)) {
            return Err(FilixError::InvalidInput(format!(
                "tie: '{}' is the source of another alias",
                target
            )));
        }
        self.bindings[t] = Binding::Alias(s);
        Ok(())
    }

    /// Pins `name` to exactly zero in every expansion.
    pub fn fix_zero(&mut self, name: &str) -> Result<()> {
        let k = Self::index_of(name)?;
        if self.bindings.iter().any(|b| *b == Binding::Alias(k)) {
            return Err(FilixError::InvalidInput(format!(
                "fix_zero: '{}' is the source of an alias",
                name
            )));
        }
        self.bindings[k] = Binding::Zero;
        Ok(())
    }

    /// Flat indices of the free parameters, in canonical order.
    pub fn free_indices(&self) -> Vec<usize> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == Binding::Free)
            .map(|(k, _)| k)
            .collect()
    }

    /// Names of the free parameters, in canonical order.
    pub fn free_names(&self) -> Vec<&'static str> {
        self.free_indices().into_iter().map(|k| PARAM_NAMES[k]).collect()
    }

    /// Number of free parameters.
    pub fn free_len(&self) -> usize {
        self.bindings.iter().filter(|b| **b == Binding::Free).count()
    }

    /// Expands a free vector into a full parameter vector.
    pub fn expand(&self, free: &[f64]) -> Result<MusseParams> {
        if free.len() != self.free_len() {
            return Err(FilixError::InvalidInput(format!(
                "expand: expected {} free values, got {}",
                self.free_len(),
                free.len()
            )));
        }
        let mut flat = [0.0; PARAM_COUNT];
        let mut next = 0;
        for (k, binding) in self.bindings.iter().enumerate() {
            if *binding == Binding::Free {
                flat[k] = free[next];
                next += 1;
            }
        }
        for (k, binding) in self.bindings.iter().enumerate() {
            match binding {
                Binding::Alias(s) => flat[k] = flat[*s],
                Binding::Zero => flat[k] = 0.0,
                Binding::Free => {}
            }
        }
        MusseParams::from_flat(&flat)
    }

    /// Projects a full parameter vector down to its free entries.
    pub fn reduce(&self, params: &MusseParams) -> Vec<f64> {
        let flat = params.to_flat();
        self.free_indices().into_iter().map(|k| flat[k]).collect()
    }
}
