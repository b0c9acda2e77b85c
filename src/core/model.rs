//! The fitting model: data, conditions, parameters and optimizer in one place.

use crate::analysis::outliers::{estimate_timeboundary, remove_outliers};
use crate::analysis::quantiles::default_quantiles;
use crate::analysis::summary::{ObservedData, SsdMethod, SummarySettings};
use crate::domain::model::{SubjectFit, Trial};
use crate::models::conditions::{generate_model_id, Conditions, DependsOn, LevelIndex};
use crate::models::simulator::{SimConfig, SimOutput, Simulator};
use crate::models::theta::{check_inits, get_default_inits, Intervar, Param, Theta};
use crate::models::{FitOn, ModelKind};
use crate::optimize::{BasinParams, NelderMeadOptions, Optimizer};
use crate::utils::error::{RaddError, Result};
use crate::utils::logger;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTLIER_SD: f64 = 2.5;

/// What is being fit and how the data are summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub kind: ModelKind,
    pub inits: Option<Theta>,
    pub depends_on: DependsOn,
    pub fit_on: FitOn,
    pub ssd_method: SsdMethod,
    pub weighted: bool,
    pub quantiles: Vec<f64>,
    /// Fit a stop-onset delay (`sso`).
    pub ssdelay: bool,
    /// `None` keeps every trial.
    pub outlier_sd: Option<f64>,
    pub intervar: Intervar,
    /// Suffix appended to the model id.
    pub append: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            inits: None,
            depends_on: DependsOn::new(),
            fit_on: FitOn::Average,
            ssd_method: SsdMethod::All,
            weighted: true,
            quantiles: default_quantiles(),
            ssdelay: false,
            outlier_sd: Some(DEFAULT_OUTLIER_SD),
            intervar: Intervar::default(),
            append: None,
        }
    }
}

/// Simulation and local-optimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Index of the data vector being fit (subject index for `fit_on = subjects`).
    pub ix: usize,
    pub ntrials: usize,
    pub si: f64,
    pub dt: f64,
    pub tol: f64,
    pub maxfev: usize,
    pub maxiter: usize,
    pub quantiles: Vec<f64>,
    pub nlevels: usize,
    pub seed: u64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            ix: 0,
            ntrials: 20000,
            si: 0.1,
            dt: 0.002,
            tol: 1e-30,
            maxfev: 450,
            maxiter: 450,
            quantiles: default_quantiles(),
            nlevels: 1,
            seed: 2016,
        }
    }
}

impl FitParams {
    fn local_options(&self) -> NelderMeadOptions {
        NelderMeadOptions {
            maxiter: self.maxiter,
            maxfev: self.maxfev,
            xtol: self.tol,
            ftol: self.tol,
        }
    }
}

/// Bootstrap resampling of simulated trials into synthetic subjects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSettings {
    pub nsubjects: usize,
    /// Trials drawn per condition, trial type and SSD.
    pub ntrials: usize,
}

/// Everything a run needs besides the data.
#[derive(Debug, Clone, Default)]
pub struct FitSettings {
    pub model: ModelSettings,
    pub fit: FitParams,
    pub basin: BasinParams,
    pub testing: Option<TestingParams>,
    pub bootstrap: Option<BootstrapSettings>,
}

/// Partial update for [`Model::set_fitparams`].
#[derive(Debug, Clone, Default)]
pub struct FitParamsUpdate {
    pub ix: Option<usize>,
    pub ntrials: Option<usize>,
    pub si: Option<f64>,
    pub dt: Option<f64>,
    pub tol: Option<f64>,
    pub maxfev: Option<usize>,
    pub maxiter: Option<usize>,
    pub quantiles: Option<Vec<f64>>,
    pub depends_on: Option<DependsOn>,
    pub seed: Option<u64>,
}

/// Cheaper settings for quick runs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingParams {
    pub tol: f64,
    pub nsuccess: usize,
    pub nsamples: usize,
    pub ninits: usize,
    pub maxfev: usize,
    pub progress: bool,
}

impl Default for TestingParams {
    fn default() -> Self {
        Self {
            tol: 1e-20,
            nsuccess: 50,
            nsamples: 1000,
            ninits: 2,
            maxfev: 1000,
            progress: true,
        }
    }
}

/// Stop-signal delays and trial counts handed to the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SsdInfo {
    pub ssds: Vec<Vec<f64>>,
    pub nssd: usize,
    pub nss: usize,
    pub nss_per_ssd: usize,
}

/// One subject (or the average) after fitting.
#[derive(Debug, Clone)]
pub struct FittedSubject {
    pub fit: SubjectFit,
    /// Best parameters, per level when conditional.
    pub popt: Theta,
}

#[derive(Debug, Clone)]
pub struct Model {
    settings: ModelSettings,
    trials: Vec<Trial>,
    tb: f64,
    conditions: Conditions,
    inits: Theta,
    model_id: String,
    observed: ObservedData,
    fitparams: FitParams,
    basinparams: BasinParams,
    optimizer: Optimizer,
    y: Vec<f64>,
    wts: Vec<f64>,
    sampled: Option<Vec<(Theta, Vec<f64>)>>,
    param_sets: Vec<Theta>,
}

impl Model {
    pub fn new(trials: Vec<Trial>, settings: ModelSettings) -> Result<Self> {
        Self::with_params(trials, settings, FitParams::default(), BasinParams::default())
    }

    pub fn with_params(
        trials: Vec<Trial>,
        settings: ModelSettings,
        mut fitparams: FitParams,
        basinparams: BasinParams,
    ) -> Result<Self> {
        if trials.is_empty() {
            return Err(RaddError::data("no trials to fit"));
        }
        let trials = match settings.outlier_sd {
            Some(sd) => remove_outliers(trials, sd),
            None => trials,
        };
        let tb = estimate_timeboundary(&trials);
        let conditions = build_conditions(&settings.depends_on, &trials)?;

        let inits = match &settings.inits {
            Some(inits) => check_inits(inits.clone(), &settings.depends_on, settings.kind),
            None => check_inits(
                get_default_inits(settings.kind, settings.ssdelay),
                &settings.depends_on,
                settings.kind,
            ),
        };
        if inits.is_empty() {
            return Err(RaddError::param("inits", "no parameters to fit"));
        }

        let model_id = generate_model_id(
            settings.kind,
            &settings.depends_on,
            settings.fit_on,
            settings.append.as_deref(),
        );
        fitparams.quantiles = settings.quantiles.clone();
        let observed = ObservedData::build(&trials, &conditions, &summary_settings(&settings))?;
        let optimizer = Optimizer::new(
            settings.kind,
            basinparams.clone(),
            fitparams.local_options(),
            fitparams.seed,
        );

        tracing::info!(
            "📐 Model {}: {} trials, {} subjects, {} levels, tb {:.2}",
            model_id,
            trials.len(),
            observed.nsubjects(),
            conditions.nlevels,
            tb
        );

        let mut model = Self {
            settings,
            trials,
            tb,
            conditions,
            inits,
            model_id,
            observed,
            fitparams,
            basinparams,
            optimizer,
            y: Vec::new(),
            wts: Vec::new(),
            sampled: None,
            param_sets: Vec::new(),
        };
        model.update_data(1);
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        self.settings.kind
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn tb(&self) -> f64 {
        self.tb
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn inits(&self) -> &Theta {
        &self.inits
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn observed(&self) -> &ObservedData {
        &self.observed
    }

    pub fn fitparams(&self) -> &FitParams {
        &self.fitparams
    }

    pub fn basinparams(&self) -> &BasinParams {
        &self.basinparams
    }

    pub fn param_sets(&self) -> &[Theta] {
        &self.param_sets
    }

    /// The data vector and weights currently being fit.
    pub fn target(&self) -> (&[f64], &[f64]) {
        (&self.y, &self.wts)
    }

    /// Identifier of the data vector at `ix`: a subject id or `avg`.
    pub fn fit_idx(&self) -> String {
        match self.settings.fit_on {
            FitOn::Average => "avg".to_string(),
            FitOn::Subjects => self
                .observed
                .subjects
                .get(self.fitparams.ix)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn set_fitparams(&mut self, update: FitParamsUpdate) -> Result<()> {
        // sampled sets were scored under the old simulator
        if update.ntrials.is_some_and(|v| v != self.fitparams.ntrials)
            || update.si.is_some_and(|v| v != self.fitparams.si)
            || update.dt.is_some_and(|v| v != self.fitparams.dt)
        {
            self.sampled = None;
        }
        let fp = &mut self.fitparams;
        if let Some(ix) = update.ix {
            let n = match self.settings.fit_on {
                FitOn::Average => 1,
                FitOn::Subjects => self.observed.nsubjects(),
            };
            if ix >= n {
                return Err(RaddError::InvalidConfigValueError {
                    field: "fit.ix".to_string(),
                    value: ix.to_string(),
                    reason: format!("Only {} data vectors to fit", n),
                });
            }
            fp.ix = ix;
        }
        if let Some(v) = update.ntrials {
            fp.ntrials = v;
        }
        if let Some(v) = update.si {
            fp.si = v;
        }
        if let Some(v) = update.dt {
            fp.dt = v;
        }
        if let Some(v) = update.tol {
            fp.tol = v;
        }
        if let Some(v) = update.maxfev {
            fp.maxfev = v;
        }
        if let Some(v) = update.maxiter {
            fp.maxiter = v;
        }
        if let Some(v) = update.seed {
            if v != fp.seed {
                self.sampled = None;
            }
            fp.seed = v;
        }

        if let Some(quantiles) = update.quantiles {
            self.settings.quantiles = quantiles.clone();
            self.fitparams.quantiles = quantiles;
            self.rebuild_observed()?;
        }
        if let Some(depends_on) = update.depends_on {
            self.set_conditions(depends_on)?;
        }

        self.optimizer
            .update(self.basinparams.clone(), self.fitparams.local_options());
        self.update_data(self.fitparams.nlevels);
        Ok(())
    }

    pub fn set_basinparams(&mut self, basinparams: BasinParams) {
        if basinparams.nsamples != self.basinparams.nsamples {
            self.sampled = None;
        }
        self.basinparams = basinparams;
        self.optimizer
            .update(self.basinparams.clone(), self.fitparams.local_options());
    }

    /// Selects the observed vector and weights for `ix`: flat when
    /// `nlevels == 1`, conditional otherwise.
    pub fn update_data(&mut self, nlevels: usize) {
        let ix = self.fitparams.ix;
        let conditional = nlevels > 1;
        self.fitparams.nlevels = nlevels.max(1);
        let (y, wts) = match (self.settings.fit_on, conditional) {
            (FitOn::Average, false) => (&self.observed.avg_flat, &self.observed.flat_wts),
            (FitOn::Average, true) => (&self.observed.avg_cond, &self.observed.cond_wts),
            (FitOn::Subjects, false) => (&self.observed.flat[ix], &self.observed.flat_wts),
            (FitOn::Subjects, true) => (&self.observed.cond[ix], &self.observed.cond_wts),
        };
        self.y = y.clone();
        self.wts = wts.clone();
    }

    /// Replaces the conditional structure and everything derived from it.
    pub fn set_conditions(&mut self, depends_on: DependsOn) -> Result<()> {
        self.conditions = build_conditions(&depends_on, &self.trials)?;
        self.settings.depends_on = depends_on;
        self.inits = check_inits(self.inits.clone(), &self.settings.depends_on, self.kind());
        let append = self.settings.append.clone();
        self.generate_model_id(append.as_deref());
        self.rebuild_observed()
    }

    pub fn generate_model_id(&mut self, append: Option<&str>) -> &str {
        self.settings.append = append.map(str::to_string);
        self.model_id = generate_model_id(
            self.settings.kind,
            &self.settings.depends_on,
            self.settings.fit_on,
            append,
        );
        &self.model_id
    }

    pub fn set_testing_params(&mut self, testing: TestingParams) -> Result<()> {
        self.set_fitparams(FitParamsUpdate {
            tol: Some(testing.tol),
            maxfev: Some(testing.maxfev),
            ..Default::default()
        })?;
        let basinparams = BasinParams {
            tol: testing.tol,
            ninits: testing.ninits,
            nsamples: testing.nsamples,
            nsuccess: testing.nsuccess,
            progress: testing.progress,
            ..self.basinparams.clone()
        };
        self.set_basinparams(basinparams);
        Ok(())
    }

    fn rebuild_observed(&mut self) -> Result<()> {
        self.observed = ObservedData::build(
            &self.trials,
            &self.conditions,
            &summary_settings(&self.settings),
        )?;
        self.sampled = None;
        self.update_data(self.fitparams.nlevels);
        Ok(())
    }

    pub fn ssd_info(&self) -> SsdInfo {
        let ssds = if self.fitparams.nlevels > 1 {
            self.observed.cond_ssds.clone()
        } else {
            self.observed.flat_ssds.clone()
        };
        let nssd = ssds.iter().map(Vec::len).max().unwrap_or(0);
        let nss = if nssd == 0 { 0 } else { self.fitparams.ntrials / 2 };
        SsdInfo {
            nss_per_ssd: if nssd == 0 { 0 } else { nss / nssd },
            ssds,
            nssd,
            nss,
        }
    }

    /// Simulator for the current data vector. Conditional when
    /// `fitparams.nlevels > 1`.
    pub fn simulator(&self) -> Simulator {
        let info = self.ssd_info();
        let level_index = if self.fitparams.nlevels > 1 {
            self.conditions.level_index()
        } else {
            LevelIndex::default()
        };
        let config = SimConfig {
            kind: self.kind(),
            ntrials: self.fitparams.ntrials,
            dt: self.fitparams.dt,
            si: self.fitparams.si,
            tb: self.tb,
            quantiles: self.fitparams.quantiles.clone(),
            seed: self.fitparams.seed,
            intervar: self.settings.intervar,
            ssd_method: self.settings.ssd_method,
        };
        let mut sim = Simulator::new(config, info.ssds, level_index);
        sim.set_target(self.y.clone(), self.wts.clone());
        sim
    }

    fn flat_keys(&self) -> Vec<Param> {
        self.inits.keys()
    }

    /// Samples parameter sets once (or again with `force`) and keeps the
    /// `ninits` best for the current flat data vector.
    pub fn sample_param_sets(&mut self, force: bool) -> Result<&[Theta]> {
        self.update_data(1);
        if self.basinparams.nsamples == 0 {
            self.param_sets = vec![self.inits.scalarize()];
            return Ok(&self.param_sets);
        }
        if self.sampled.is_none() || force {
            let sim = self.simulator();
            self.sampled = Some(self.optimizer.sample_param_sets(&sim, &self.flat_keys())?);
        }
        let sampled = self.sampled.as_deref().unwrap_or_default();
        let mut kept = self.optimizer.filter_params(sampled, &self.y, &self.wts);
        if kept.is_empty() {
            tracing::warn!("No usable sampled parameter sets, starting from inits");
            kept.push(self.inits.scalarize());
        }
        self.param_sets = kept;
        Ok(&self.param_sets)
    }

    /// Flat fit, then a conditional fit when any parameter depends on a condition.
    pub fn optimize(&mut self) -> Result<FittedSubject> {
        let idx = self.fit_idx();
        let _span = logger::fit_span(&self.model_id, &idx).entered();
        tracing::info!("🎯 Fitting {} ({})", self.model_id, idx);

        self.sample_param_sets(false)?;
        let flat_sim = self.simulator();
        let flat = self.optimizer.optimize_flat(
            &flat_sim,
            &self.param_sets,
            &self.flat_keys(),
            &idx,
            &self.model_id,
        )?;

        if self.conditions.is_flat {
            return Ok(FittedSubject {
                fit: SubjectFit {
                    idx,
                    flat: flat.stage,
                    cond: None,
                },
                popt: flat.popt,
            });
        }

        self.update_data(self.conditions.nlevels);
        let cond_sim = self.simulator();
        let cond = self.optimizer.optimize_conditional(
            &cond_sim,
            &flat.popt,
            self.conditions.pcmap(),
            &idx,
            &self.model_id,
        );
        self.update_data(1);
        let cond = cond?;

        Ok(FittedSubject {
            fit: SubjectFit {
                idx,
                flat: flat.stage,
                cond: Some(cond.stage),
            },
            popt: cond.popt,
        })
    }

    /// Fits the average once, or every subject in turn.
    pub fn fit(&mut self) -> Result<Vec<FittedSubject>> {
        let n = match self.settings.fit_on {
            FitOn::Average => 1,
            FitOn::Subjects => self.observed.nsubjects(),
        };
        let mut fits = Vec::with_capacity(n);
        for ix in 0..n {
            self.set_fitparams(FitParamsUpdate {
                ix: Some(ix),
                ..Default::default()
            })?;
            fits.push(self.optimize()?);
        }
        self.fitparams.ix = 0;
        self.update_data(1);
        Ok(fits)
    }

    /// Simulates `popt` in the model's most detailed layout.
    pub fn simulate(&mut self, popt: &Theta) -> Result<SimOutput> {
        self.update_data(self.conditions.nlevels);
        let out = self.simulator().simulate_trials(popt);
        self.update_data(1);
        out
    }
}

fn build_conditions(depends_on: &DependsOn, trials: &[Trial]) -> Result<Conditions> {
    if depends_on.is_empty() {
        Ok(Conditions::flat())
    } else {
        Conditions::new(depends_on.clone(), trials)
    }
}

fn summary_settings(settings: &ModelSettings) -> SummarySettings {
    SummarySettings {
        kind: settings.kind,
        quantiles: settings.quantiles.clone(),
        ssd_method: settings.ssd_method,
        weighted: settings.weighted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TrialType;
    use std::collections::BTreeMap;

    fn trial(idx: &str, cue: &str, stop: Option<f64>, rt: Option<f64>) -> Trial {
        Trial {
            idx: idx.to_string(),
            ttype: if stop.is_some() { TrialType::Stop } else { TrialType::Go },
            ssd: stop,
            response: rt.is_some(),
            acc: rt.is_some() != stop.is_some(),
            rt,
            conds: BTreeMap::from([("cue".to_string(), cue.to_string())]),
        }
    }

    fn dataset() -> Vec<Trial> {
        let mut trials = Vec::new();
        for idx in ["1", "2"] {
            for cue in ["hi", "lo"] {
                for i in 0..20 {
                    let rt = 0.4 + 0.01 * i as f64;
                    trials.push(trial(idx, cue, None, Some(rt)));
                }
                for &ssd in &[0.2, 0.3] {
                    trials.push(trial(idx, cue, Some(ssd), None));
                    trials.push(trial(idx, cue, Some(ssd), Some(0.45)));
                }
            }
        }
        trials
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            kind: "xdpm".parse().unwrap(),
            outlier_sd: None,
            quantiles: vec![0.1, 0.5, 0.9],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_model_is_flat_average() {
        let model = Model::new(dataset(), settings()).unwrap();
        assert_eq!(model.model_id(), "xdpm_flat_avg");
        assert!(model.conditions().is_flat);
        assert_eq!(model.fit_idx(), "avg");
        assert!(model.inits().contains(Param::Xb));
        assert!((model.tb() - 0.59).abs() < 1e-9);
        let (y, wts) = model.target();
        assert_eq!(y.len(), 1 + 2 + 3 + 3);
        assert_eq!(wts.len(), y.len());
    }

    #[test]
    fn test_set_conditions_rebuilds_data() {
        let mut model = Model::new(dataset(), settings()).unwrap();
        let depends_on = DependsOn::from([(Param::V, vec!["cue".to_string()])]);
        model
            .set_fitparams(FitParamsUpdate {
                depends_on: Some(depends_on),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(model.model_id(), "xdpm_v_avg");
        assert_eq!(model.conditions().nlevels, 2);
        assert_eq!(model.observed().avg_cond.len(), 2 * 9);

        model.update_data(2);
        assert_eq!(model.target().0.len(), 18);
        assert_eq!(model.ssd_info().ssds.len(), 2);
    }

    #[test]
    fn test_ssd_info_counts() {
        let mut model = Model::new(dataset(), settings()).unwrap();
        model
            .set_fitparams(FitParamsUpdate {
                ntrials: Some(1000),
                ..Default::default()
            })
            .unwrap();
        let info = model.ssd_info();
        assert_eq!(info.nssd, 2);
        assert_eq!(info.nss, 500);
        assert_eq!(info.nss_per_ssd, 250);
    }

    #[test]
    fn test_ix_out_of_range_is_rejected() {
        let mut model = Model::new(dataset(), settings()).unwrap();
        let err = model.set_fitparams(FitParamsUpdate {
            ix: Some(3),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_subject_fit_uses_subject_vector() {
        let mut s = settings();
        s.fit_on = FitOn::Subjects;
        let mut model = Model::new(dataset(), s).unwrap();
        assert_eq!(model.model_id(), "xdpm_flat_idx");
        model
            .set_fitparams(FitParamsUpdate {
                ix: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(model.fit_idx(), "2");
    }

    #[test]
    fn test_sampling_keeps_ninits() {
        let mut model = Model::new(dataset(), settings()).unwrap();
        model
            .set_fitparams(FitParamsUpdate {
                ntrials: Some(200),
                ..Default::default()
            })
            .unwrap();
        model
            .set_testing_params(TestingParams {
                nsamples: 20,
                ninits: 2,
                progress: false,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(model.sample_param_sets(false).unwrap().len(), 2);
    }

    #[test]
    fn test_simulator_changes_drop_sampled_sets() {
        let mut model = Model::new(dataset(), settings()).unwrap();
        model
            .set_fitparams(FitParamsUpdate {
                ntrials: Some(200),
                ..Default::default()
            })
            .unwrap();
        model
            .set_testing_params(TestingParams {
                nsamples: 10,
                ninits: 1,
                progress: false,
                ..Default::default()
            })
            .unwrap();
        model.sample_param_sets(false).unwrap();
        assert!(model.sampled.is_some());

        model
            .set_fitparams(FitParamsUpdate {
                ix: Some(0),
                ..Default::default()
            })
            .unwrap();
        assert!(model.sampled.is_some());

        model
            .set_fitparams(FitParamsUpdate {
                dt: Some(0.001),
                ..Default::default()
            })
            .unwrap();
        assert!(model.sampled.is_none());

        model.sample_param_sets(false).unwrap();
        model
            .set_fitparams(FitParamsUpdate {
                ntrials: Some(300),
                ..Default::default()
            })
            .unwrap();
        assert!(model.sampled.is_none());
    }
}
