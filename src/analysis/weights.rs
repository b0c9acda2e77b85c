//! Cost-function weights.
//!
//! Each entry is weighted by how reliably it is estimated across subjects:
//! `w = median(sd of its block) / sd`, computed separately for the accuracy
//! block and the quantile block, then clipped to `[0.1, 10]`.

const MIN_WEIGHT: f64 = 0.1;
const MAX_WEIGHT: f64 = 10.0;

fn column_sd(rows: &[Vec<f64>], j: usize) -> f64 {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.get(j).copied())
        .filter(|v| v.is_finite())
        .collect();
    if values.len() < 2 {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Weights for `avg`, given per-subject rows and the accuracy/quantile mask.
/// Entries whose observed value is NaN get weight 0.
pub fn compute_weights(
    per_subject: &[Vec<f64>],
    avg: &[f64],
    accuracy: &[bool],
    weighted: bool,
) -> Vec<f64> {
    let mut wts = vec![1.0; avg.len()];

    if weighted && per_subject.len() > 1 {
        let sds: Vec<f64> = (0..avg.len()).map(|j| column_sd(per_subject, j)).collect();
        for block in [true, false] {
            let mut block_sds: Vec<f64> = sds
                .iter()
                .zip(accuracy)
                .filter(|(sd, acc)| **acc == block && sd.is_finite() && **sd > 0.0)
                .map(|(sd, _)| *sd)
                .collect();
            let Some(med) = median(&mut block_sds) else {
                continue;
            };
            for (j, w) in wts.iter_mut().enumerate() {
                if accuracy.get(j) == Some(&block) && sds[j].is_finite() && sds[j] > 0.0 {
                    *w = (med / sds[j]).clamp(MIN_WEIGHT, MAX_WEIGHT);
                }
            }
        }
    }

    for (w, y) in wts.iter_mut().zip(avg) {
        if !y.is_finite() {
            *w = 0.0;
        }
    }
    wts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unweighted_is_ones_except_missing() {
        let rows = vec![vec![0.9, 0.4, f64::NAN], vec![0.8, 0.5, f64::NAN]];
        let avg = vec![0.85, 0.45, f64::NAN];
        let wts = compute_weights(&rows, &avg, &[true, false, false], false);
        assert_eq!(wts, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_noisier_entries_get_less_weight() {
        let rows = vec![
            vec![0.90, 0.40, 0.50, 0.60],
            vec![0.80, 0.42, 0.60, 0.62],
            vec![0.85, 0.41, 0.70, 0.61],
        ];
        let avg = vec![0.85, 0.41, 0.60, 0.61];
        let wts = compute_weights(&rows, &avg, &[true, false, false, false], true);

        // a lone accuracy entry is its own median
        assert!((wts[0] - 1.0).abs() < 1e-12);
        // quantile block median sd is 0.01; the noisy column (sd 0.1) is down-weighted
        assert!((wts[1] - 1.0).abs() < 1e-9);
        assert!((wts[2] - 0.1).abs() < 1e-9);
        assert!((wts[3] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_subject_is_unweighted() {
        let rows = vec![vec![0.9, 0.4]];
        let wts = compute_weights(&rows, &rows[0], &[true, false], true);
        assert_eq!(wts, vec![1.0, 1.0]);
    }
}
