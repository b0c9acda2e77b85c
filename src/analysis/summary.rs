//! Observed data vectors entered into the cost function.
//!
//! For stop-signal kinds each level contributes
//! `[go acc, P(stop | ssd_1..k), go RT quantiles, stop-failure RT quantiles]`.
//! For `pro` each level contributes `[P(respond), RT quantiles]`.
//! Levels are concatenated in condition order.

use crate::analysis::quantiles::mquantiles;
use crate::analysis::weights::compute_weights;
use crate::domain::model::Trial;
use crate::models::conditions::Conditions;
use crate::models::kind::ModelKind;
use crate::utils::error::{RaddError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How stop-signal delays are grouped when summarizing stop accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsdMethod {
    /// Every distinct SSD of the level.
    #[default]
    All,
    /// A single pooled SSD at the mean stop-trial delay.
    Mean,
}

/// Distinct SSDs (seconds) of the stop trials in `trials`, ascending.
pub fn level_ssds(trials: &[&Trial], method: SsdMethod) -> Vec<f64> {
    let ssds: Vec<f64> = trials
        .iter()
        .filter(|t| t.is_stop())
        .filter_map(|t| t.ssd)
        .collect();
    if ssds.is_empty() {
        return Vec::new();
    }
    match method {
        SsdMethod::Mean => vec![ssds.iter().sum::<f64>() / ssds.len() as f64],
        SsdMethod::All => {
            // millisecond keys keep float noise from splitting delays
            let unique: BTreeSet<i64> = ssds.iter().map(|&s| ssd_key(s)).collect();
            unique.into_iter().map(|ms| ms as f64 / 1000.0).collect()
        }
    }
}

/// Millisecond key of a delay. Trials and listed SSDs are matched on it.
fn ssd_key(ssd: f64) -> i64 {
    (ssd * 1000.0).round() as i64
}

/// Number of accuracy entries at the front of one level's vector.
pub fn accuracy_len(kind: ModelKind, nssd: usize) -> usize {
    if kind.has_stop_process() {
        1 + nssd
    } else {
        1
    }
}

/// Length of one level's vector.
pub fn level_len(kind: ModelKind, nssd: usize, nquantiles: usize) -> usize {
    if kind.has_stop_process() {
        accuracy_len(kind, nssd) + 2 * nquantiles
    } else {
        1 + nquantiles
    }
}

/// `true` for accuracy entries, `false` for quantile entries, across levels.
pub fn accuracy_mask(kind: ModelKind, ssds: &[Vec<f64>], nquantiles: usize) -> Vec<bool> {
    ssds.iter()
        .flat_map(|level| {
            let nacc = accuracy_len(kind, level.len());
            let n = level_len(kind, level.len(), nquantiles);
            (0..n).map(move |i| i < nacc)
        })
        .collect()
}

fn fraction<I: Iterator<Item = bool>>(iter: I) -> f64 {
    let (hits, n) = iter.fold((0usize, 0usize), |(h, n), b| (h + b as usize, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        hits as f64 / n as f64
    }
}

/// Summary vector of one level. Entries with no supporting trials are NaN.
pub fn summarize_level(
    trials: &[&Trial],
    ssds: &[f64],
    quantiles: &[f64],
    kind: ModelKind,
    method: SsdMethod,
) -> Vec<f64> {
    if !kind.has_stop_process() {
        let presp = fraction(trials.iter().map(|t| t.response));
        let rts: Vec<f64> = trials.iter().filter_map(|t| t.responded_rt()).collect();
        let mut y = vec![presp];
        y.extend(mquantiles(&rts, quantiles));
        return y;
    }

    let go: Vec<&&Trial> = trials.iter().filter(|t| t.is_go()).collect();
    let stop: Vec<&&Trial> = trials.iter().filter(|t| t.is_stop()).collect();

    let mut y = vec![fraction(go.iter().map(|t| t.response))];
    for &ssd in ssds {
        let key = ssd_key(ssd);
        let at_delay = stop.iter().filter(|t| match method {
            SsdMethod::Mean => true,
            SsdMethod::All => t.ssd.is_some_and(|s| ssd_key(s) == key),
        });
        y.push(fraction(at_delay.map(|t| !t.response)));
    }
    let go_rts: Vec<f64> = go.iter().filter_map(|t| t.responded_rt()).collect();
    let err_rts: Vec<f64> = stop.iter().filter_map(|t| t.responded_rt()).collect();
    y.extend(mquantiles(&go_rts, quantiles));
    y.extend(mquantiles(&err_rts, quantiles));
    y
}

/// Mean over finite values per column; NaN when a column has none.
pub fn nanmean_columns(rows: &[Vec<f64>]) -> Vec<f64> {
    let ncols = rows.first().map_or(0, Vec::len);
    (0..ncols)
        .map(|j| {
            let (sum, n) = rows
                .iter()
                .filter_map(|r| r.get(j).copied())
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                f64::NAN
            } else {
                sum / n as f64
            }
        })
        .collect()
}

/// Settings that shape the observed vectors.
#[derive(Debug, Clone)]
pub struct SummarySettings {
    pub kind: ModelKind,
    pub quantiles: Vec<f64>,
    pub ssd_method: SsdMethod,
    pub weighted: bool,
}

/// Observed vectors and cost weights, per subject and averaged.
#[derive(Debug, Clone)]
pub struct ObservedData {
    pub subjects: Vec<String>,
    /// Per subject, the data collapsed across conditions.
    pub flat: Vec<Vec<f64>>,
    /// Per subject, level vectors concatenated in condition order.
    pub cond: Vec<Vec<f64>>,
    pub avg_flat: Vec<f64>,
    pub avg_cond: Vec<f64>,
    pub flat_wts: Vec<f64>,
    pub cond_wts: Vec<f64>,
    pub flat_ssds: Vec<Vec<f64>>,
    pub cond_ssds: Vec<Vec<f64>>,
}

impl ObservedData {
    pub fn build(
        trials: &[Trial],
        conditions: &Conditions,
        settings: &SummarySettings,
    ) -> Result<Self> {
        if trials.is_empty() {
            return Err(RaddError::data("no trials to summarize"));
        }
        let kind = settings.kind;
        let q = &settings.quantiles;

        let subjects: Vec<String> = trials
            .iter()
            .map(|t| t.idx.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let all: Vec<&Trial> = trials.iter().collect();
        let mut by_level: Vec<Vec<&Trial>> = vec![Vec::new(); conditions.nlevels];
        for trial in trials {
            let level = conditions.level_of(trial).ok_or_else(|| {
                RaddError::data(format!(
                    "trial of subject {} matches no condition level",
                    trial.idx
                ))
            })?;
            by_level[level].push(trial);
        }

        let flat_ssds = vec![level_ssds(&all, settings.ssd_method)];
        let cond_ssds: Vec<Vec<f64>> = by_level
            .iter()
            .map(|lvl| level_ssds(lvl, settings.ssd_method))
            .collect();
        if kind.has_stop_process() {
            if flat_ssds[0].is_empty() {
                return Err(RaddError::data(format!(
                    "kind {} needs stop trials with an ssd",
                    kind
                )));
            }
            if let Some(i) = cond_ssds.iter().position(Vec::is_empty) {
                return Err(RaddError::data(format!(
                    "condition level '{}' has no stop trials",
                    conditions.level_names()[i]
                )));
            }
        }

        let mut flat = Vec::with_capacity(subjects.len());
        let mut cond = Vec::with_capacity(subjects.len());
        for idx in &subjects {
            let own: Vec<&Trial> = all.iter().copied().filter(|t| &t.idx == idx).collect();
            flat.push(summarize_level(&own, &flat_ssds[0], q, kind, settings.ssd_method));

            let mut levels = Vec::new();
            for (level, ssds) in by_level.iter().zip(&cond_ssds) {
                let own_level: Vec<&Trial> =
                    level.iter().copied().filter(|t| &t.idx == idx).collect();
                levels.extend(summarize_level(&own_level, ssds, q, kind, settings.ssd_method));
            }
            cond.push(levels);
        }

        let avg_flat = nanmean_columns(&flat);
        let avg_cond = nanmean_columns(&cond);
        let flat_wts = compute_weights(
            &flat,
            &avg_flat,
            &accuracy_mask(kind, &flat_ssds, q.len()),
            settings.weighted,
        );
        let cond_wts = compute_weights(
            &cond,
            &avg_cond,
            &accuracy_mask(kind, &cond_ssds, q.len()),
            settings.weighted,
        );

        tracing::debug!(
            "Observed data: {} subjects, {} levels, flat length {}, conditional length {}",
            subjects.len(),
            conditions.nlevels,
            avg_flat.len(),
            avg_cond.len()
        );

        Ok(Self {
            subjects,
            flat,
            cond,
            avg_flat,
            avg_cond,
            flat_wts,
            cond_wts,
            flat_ssds,
            cond_ssds,
        })
    }

    pub fn nsubjects(&self) -> usize {
        self.subjects.len()
    }
}
