//! Means, variances, and quantiles over `f64` slices.

use filix_core::{FilixError, Result};

/// Arithmetic mean.
pub fn mean(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(FilixError::InvalidInput(
            "mean: data must not be empty".into(),
        ));
    }
    Ok(data.iter().sum::<f64>() / data.len() as f64)
}

/// Variance with `ddof` delta degrees of freedom (0 = population, 1 = sample).
pub fn variance(data: &[f64], ddof: usize) -> Result<f64> {
    if data.len() <= ddof {
        return Err(FilixError::InvalidInput(format!(
            "variance: need more than {} observations, got {}",
            ddof,
            data.len()
        )));
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|x| (x - m) * (x - m)).sum();
    Ok(ss / (data.len() - ddof) as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(data: &[f64], ddof: usize) -> Result<f64> {
    Ok(variance(data, ddof)?.sqrt())
}

/// Quantile `q` in `[0, 1]` with linear interpolation between order
/// statistics.
pub fn quantile(data: &[f64], q: f64) -> Result<f64> {
    if data.is_empty() {
        return Err(FilixError::InvalidInput(
            "quantile: data must not be empty".into(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(FilixError::InvalidInput(
            "quantile: q must be in [0, 1]".into(),
        ));
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(compute_quantile_sorted(&sorted, q))
}

fn compute_quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = lo + 1;
    let frac = pos - lo as f64;
    if hi >= n {
        sorted[n - 1]
    } else {
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn mean_of_known_values() {
        let v = mean(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((v - 2.5).abs() < TOL);
    }

    #[test]
    fn mean_rejects_empty() {
        assert!(mean(&[]).is_err());
    }

    #[test]
    fn variance_population_and_sample() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let pop = variance(&data, 0).unwrap();
        let sample = variance(&data, 1).unwrap();
        assert!((pop - 4.0).abs() < TOL);
        assert!((sample - 32.0 / 7.0).abs() < TOL);
    }

    #[test]
    fn variance_needs_enough_observations() {
        assert!(variance(&[1.0], 1).is_err());
    }

    #[test]
    fn std_dev_is_sqrt_of_variance() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sd = std_dev(&data, 0).unwrap();
        assert!((sd - 2.0).abs() < TOL);
    }

    #[test]
    fn quantile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&data, 0.0).unwrap() - 1.0).abs() < TOL);
        assert!((quantile(&data, 0.5).unwrap() - 2.5).abs() < TOL);
        assert!((quantile(&data, 1.0).unwrap() - 4.0).abs() < TOL);
        assert!((quantile(&data, 0.25).unwrap() - 1.75).abs() < TOL);
    }

    #[test]
    fn quantile_single_value() {
        assert!((quantile(&[7.0], 0.9).unwrap() - 7.0).abs() < TOL);
    }

    #[test]
    fn quantile_ignores_input_order() {
        let shuffled = [3.0, 1.0, 4.0, 2.0];
        assert!((quantile(&shuffled, 0.5).unwrap() - 2.5).abs() < TOL);
    }

    #[test]
    fn quantile_rejects_out_of_range_q() {
        assert!(quantile(&[1.0, 2.0], 1.5).is_err());
        assert!(quantile(&[1.0, 2.0], -0.1).is_err());
    }
}
