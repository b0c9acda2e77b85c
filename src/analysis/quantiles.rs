//! Sample quantiles with the plotting positions of `scipy.stats.mstats.mquantiles`
//! (alphap = betap = 0.4, approximately unbiased for normal samples).

const ALPHAP: f64 = 0.4;
const BETAP: f64 = 0.4;

/// Quantiles of the finite values in `values` at each probability in `probs`.
/// Returns NaN for every probability when there are no finite values.
pub fn mquantiles(values: &[f64], probs: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    mquantiles_sorted(&sorted, probs)
}

pub fn mquantiles_sorted(sorted: &[f64], probs: &[f64]) -> Vec<f64> {
    let n = sorted.len();
    if n == 0 {
        return vec![f64::NAN; probs.len()];
    }
    if n == 1 {
        return vec![sorted[0]; probs.len()];
    }
    let nf = n as f64;
    probs
        .iter()
        .map(|&p| {
            let m = ALPHAP + p * (1.0 - ALPHAP - BETAP);
            let aleph = nf * p + m;
            let k = aleph.clamp(1.0, nf - 1.0).floor();
            let gamma = (aleph - k).clamp(0.0, 1.0);
            let k = k as usize;
            (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k]
        })
        .collect()
}

/// The default probabilities, 0.1 through 0.9.
pub fn default_quantiles() -> Vec<f64> {
    (1..10).map(|i| i as f64 / 10.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_scipy_mquantiles() {
        // scipy.stats.mstats.mquantiles([1,2,3,4,5], [.1,.5,.9]) -> [1.0, 3.0, 5.0]
        let q = mquantiles(&[5.0, 1.0, 3.0, 2.0, 4.0], &[0.1, 0.5, 0.9]);
        assert!((q[0] - 1.0).abs() < 1e-12);
        assert!((q[1] - 3.0).abs() < 1e-12);
        assert!((q[2] - 5.0).abs() < 1e-12);

        // mquantiles(arange(1, 11), [.25, .75]) -> [2.95, 8.05]
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let q = mquantiles(&values, &[0.25, 0.75]);
        assert!((q[0] - 2.95).abs() < 1e-9);
        assert!((q[1] - 8.05).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_nan_and_handles_empty() {
        let q = mquantiles(&[f64::NAN, 0.4], &[0.5]);
        assert_eq!(q, vec![0.4]);
        assert!(mquantiles(&[], &[0.5, 0.9]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_default_quantiles() {
        let q = default_quantiles();
        assert_eq!(q.len(), 9);
        assert!((q[0] - 0.1).abs() < 1e-12);
        assert!((q[8] - 0.9).abs() < 1e-12);
    }
}
