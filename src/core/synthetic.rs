//! Synthetic stop-signal datasets drawn from known parameters.

use crate::analysis::summary::SsdMethod;
use crate::core::model::FitParams;
use crate::core::results::{bootstrap_rows, pandaify_results, sim_rows_to_trials};
use crate::domain::model::{SimTrialRow, Trial};
use crate::models::conditions::{LevelIndex, FLAT};
use crate::models::simulator::{SimConfig, Simulator};
use crate::models::theta::{Intervar, Theta};
use crate::models::ModelKind;
use crate::utils::error::{RaddError, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SyntheticSettings {
    pub kind: ModelKind,
    /// One parameter set per condition level. A single level named `flat`
    /// produces data without a condition column.
    pub levels: Vec<(String, Theta)>,
    pub ssds: Vec<f64>,
    pub ntrials: usize,
    pub tb: f64,
    pub dt: f64,
    pub si: f64,
    pub intervar: Intervar,
    pub seed: u64,
    /// Resample into this many subjects; `None` keeps one subject with every
    /// simulated trial.
    pub nsubjects: Option<usize>,
    pub trials_per_cell: usize,
}

impl SyntheticSettings {
    pub fn flat(kind: ModelKind, theta: Theta, ssds: Vec<f64>) -> Self {
        let fit = FitParams::default();
        Self {
            kind,
            levels: vec![(FLAT.to_string(), theta)],
            ssds,
            ntrials: 2000,
            tb: 0.65,
            dt: fit.dt,
            si: fit.si,
            intervar: Intervar::default(),
            seed: fit.seed,
            nsubjects: None,
            trials_per_cell: 50,
        }
    }
}

/// Simulated trial rows for every level, before any resampling.
pub fn simulate_rows(settings: &SyntheticSettings) -> Result<Vec<SimTrialRow>> {
    if settings.levels.is_empty() {
        return Err(RaddError::param("levels", "at least one parameter set is required"));
    }
    if settings.kind.has_stop_process() && settings.ssds.is_empty() {
        return Err(RaddError::data(format!(
            "kind {} needs at least one SSD",
            settings.kind
        )));
    }

    let mut rows = Vec::new();
    for (i, (name, theta)) in settings.levels.iter().enumerate() {
        theta.check_bounds(settings.kind)?;
        let config = SimConfig {
            kind: settings.kind,
            ntrials: settings.ntrials,
            dt: settings.dt,
            si: settings.si,
            tb: settings.tb,
            quantiles: Vec::new(),
            seed: settings.seed.wrapping_add(i as u64),
            intervar: settings.intervar,
            ssd_method: SsdMethod::All,
        };
        let simulator = Simulator::new(config, vec![settings.ssds.clone()], LevelIndex::default());
        let sim = simulator.simulate_trials(theta)?;
        rows.extend(pandaify_results(&sim, settings.tb, &[name.clone()], "1"));
    }

    tracing::debug!(
        "Simulated {} rows over {} levels",
        rows.len(),
        settings.levels.len()
    );
    Ok(rows)
}

/// Trials ready to be written with [`crate::core::data::write_trials`].
pub fn simulate_dataset(settings: &SyntheticSettings) -> Result<Vec<Trial>> {
    let rows = simulate_rows(settings)?;
    let rows = match settings.nsubjects {
        Some(nsubjects) => {
            let mut rng = SmallRng::seed_from_u64(settings.seed);
            bootstrap_rows(&rows, nsubjects, settings.trials_per_cell, &mut rng)
        }
        None => rows,
    };
    Ok(sim_rows_to_trials(&rows))
}
