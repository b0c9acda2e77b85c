use crate::domain::model::{FitInfo, FitStage};
use crate::models::kind::ModelKind;
use crate::models::simulator::{weighted_sse, Simulator};
use crate::models::theta::{random_inits, Param, ParamLayout, Theta};
use crate::optimize::basin::{basinhopping, BasinOptions};
use crate::optimize::callbacks::{BasinTracker, LocalTracker};
use crate::optimize::evolution::{differential_evolution, EvolutionOptions};
use crate::optimize::nelder_mead::{nelder_mead, Minimum, NelderMeadOptions, SearchBounds};
use crate::optimize::{BasinParams, GlobalMethod, InitSampleMethod};
use crate::utils::error::{RaddError, Result};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Cost assigned to parameter vectors the simulator rejects.
const FAILED_COST: f64 = 1e12;

/// Result of one optimization stage.
#[derive(Debug, Clone)]
pub struct StageFit {
    pub stage: FitStage,
    pub popt: Theta,
}

/// Goodness of fit of `yhat` against `y`, counting only finite observations.
pub fn fit_info(
    idx: &str,
    model_id: &str,
    y: &[f64],
    wts: &[f64],
    yhat: &[f64],
    nvary: usize,
    nfev: usize,
    cnvrg: bool,
) -> FitInfo {
    let mut chi = 0.0;
    let mut ndata = 0usize;
    for ((y, w), yh) in y.iter().zip(wts).zip(yhat) {
        if y.is_finite() {
            chi += w * (yh - y).powi(2);
            ndata += 1;
        }
    }
    let n = ndata as f64;
    let k = nvary as f64;
    let rchi = if ndata > nvary { chi / (n - k) } else { f64::NAN };
    let logp = n * (chi / n).ln();
    FitInfo {
        idx: idx.to_string(),
        model_id: model_id.to_string(),
        nfev,
        nvary,
        ndata,
        chi,
        rchi,
        logp,
        aic: logp + 2.0 * k,
        bic: logp + n.ln() * k,
        cnvrg,
    }
}

/// Runs sampling, global optimization and polishing for one data vector.
#[derive(Debug, Clone)]
pub struct Optimizer {
    kind: ModelKind,
    basinparams: BasinParams,
    local: NelderMeadOptions,
    seed: u64,
}

impl Optimizer {
    pub fn new(
        kind: ModelKind,
        basinparams: BasinParams,
        local: NelderMeadOptions,
        seed: u64,
    ) -> Self {
        Self {
            kind,
            basinparams,
            local,
            seed,
        }
    }

    pub fn update(&mut self, basinparams: BasinParams, local: NelderMeadOptions) {
        self.basinparams = basinparams;
        self.local = local;
    }

    pub fn basinparams(&self) -> &BasinParams {
        &self.basinparams
    }

    fn objective<'a>(
        sim: &'a Simulator,
        layout: &'a ParamLayout,
    ) -> impl Fn(&[f64]) -> f64 + Sync + 'a {
        move |x: &[f64]| sim.cost_fx(&layout.to_theta(x)).unwrap_or(FAILED_COST)
    }

    /// Draws `nsamples` random parameter sets over `keys` and simulates
    /// each. Sets the simulator rejects are dropped.
    pub fn sample_param_sets(
        &self,
        sim: &Simulator,
        keys: &[Param],
    ) -> Result<Vec<(Theta, Vec<f64>)>> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let psets = random_inits(keys, self.basinparams.nsamples, self.kind, &mut rng)?;
        tracing::info!("🎲 Sampling {} parameter sets", psets.len());
        let sampled: Vec<(Theta, Vec<f64>)> = psets
            .into_par_iter()
            .filter_map(|p| match sim.sim_fx(&p) {
                Ok(yhat) => Some((p, yhat)),
                Err(e) => {
                    tracing::warn!("Dropping sampled parameter set: {}", e);
                    None
                }
            })
            .collect();
        Ok(sampled)
    }

    /// Keeps `ninits` of the sampled sets: the ones closest to `y`, or a
    /// random selection under `InitSampleMethod::Random`.
    pub fn filter_params(
        &self,
        sampled: &[(Theta, Vec<f64>)],
        y: &[f64],
        wts: &[f64],
    ) -> Vec<Theta> {
        let nkeep = self.basinparams.ninits.min(sampled.len());
        let mut order: Vec<usize> = (0..sampled.len()).collect();
        match self.basinparams.init_sample_method {
            InitSampleMethod::Best => {
                let costs: Vec<f64> = sampled
                    .iter()
                    .map(|(_, yhat)| weighted_sse(y, wts, yhat))
                    .collect();
                order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));
            }
            InitSampleMethod::Random => {
                let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(1));
                order.shuffle(&mut rng);
            }
        }
        order
            .into_iter()
            .take(nkeep)
            .map(|i| sampled[i].0.clone())
            .collect()
    }

    fn global(
        &self,
        f: &(impl Fn(&[f64]) -> f64 + Sync),
        x0: &[f64],
        bounds: &SearchBounds,
        scalars: &[f64],
        label: &str,
        rng: &mut SmallRng,
    ) -> Minimum {
        let bp = &self.basinparams;
        match bp.method {
            GlobalMethod::Basin => {
                let opts = BasinOptions {
                    niter: bp.niter,
                    temperature: bp.temperature,
                    stepsize: bp.stepsize,
                    interval: bp.interval,
                    nsuccess: bp.nsuccess,
                    local: NelderMeadOptions {
                        maxiter: bp.maxiter,
                        maxfev: self.local.maxfev,
                        xtol: bp.tol,
                        ftol: bp.tol,
                    },
                };
                let mut tracker = BasinTracker::new(label, bp.progress);
                basinhopping(f, x0, bounds, scalars, &opts, rng, &mut tracker)
            }
            GlobalMethod::Evolution => {
                let opts = EvolutionOptions {
                    popsize: bp.popsize,
                    recombination: bp.recombination,
                    maxiter: bp.maxiter,
                    tol: bp.tol,
                };
                differential_evolution(f, bounds, &opts, Some(x0), rng)
            }
        }
    }

    fn polish(
        &self,
        f: &(impl Fn(&[f64]) -> f64 + Sync),
        x0: &[f64],
        bounds: &SearchBounds,
        label: &str,
    ) -> Minimum {
        let opts = NelderMeadOptions {
            maxiter: self.local.maxiter,
            maxfev: self.local.maxfev,
            xtol: self.basinparams.polish_tol,
            ftol: self.basinparams.polish_tol,
        };
        let mut tracker = LocalTracker::new(label, self.basinparams.progress);
        let res = nelder_mead(
            |x| {
                let v = f(x);
                tracker.record(x, v);
                v
            },
            x0,
            bounds,
            &opts,
        );
        tracker.finish();
        res
    }

    fn run_stage(
        &self,
        sim: &Simulator,
        layout: &ParamLayout,
        starts: &[Vec<f64>],
        idx: &str,
        model_id: &str,
        label: &str,
    ) -> Result<StageFit> {
        if starts.is_empty() {
            return Err(RaddError::OptimizationError {
                message: format!("no starting points for {} fit", label),
            });
        }
        let (lo, hi) = layout.bounds();
        let bounds = SearchBounds::new(lo, hi);
        let scalars = layout.stepsize_scalars();
        let f = Self::objective(sim, layout);
        let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(2));

        let mut nfev = 0;
        let mut best: Option<Minimum> = None;
        for (i, x0) in starts.iter().enumerate() {
            let init_label = format!("{} init {}", label, i + 1);
            let res = self.global(&f, x0, &bounds, &scalars, &init_label, &mut rng);
            nfev += res.nfev;
            tracing::debug!("{} init {}: fmin {:.6}", label, i + 1, res.fun);
            if best.as_ref().is_none_or(|b| res.fun < b.fun) {
                best = Some(res);
            }
        }
        let global = best.ok_or_else(|| RaddError::OptimizationError {
            message: format!("{} fit produced no minimum", label),
        })?;

        let polished = self.polish(&f, &global.x, &bounds, label);
        nfev += polished.nfev;
        let x = if polished.fun <= global.fun {
            polished.x
        } else {
            global.x
        };

        let popt = layout.to_theta(&x);
        let yhat = sim.sim_fx(&popt)?;
        let (y, wts) = sim.target();
        let finfo = fit_info(idx, model_id, y, wts, &yhat, layout.len(), nfev, global.converged);
        tracing::info!(
            "✅ {} fit: chi {:.6}, AIC {:.2}, {} evaluations",
            label,
            finfo.chi,
            finfo.aic,
            finfo.nfev
        );

        Ok(StageFit {
            stage: FitStage {
                finfo,
                popt: layout.named_values(&popt),
                y: y.to_vec(),
                wts: wts.to_vec(),
                yhat,
            },
            popt,
        })
    }

    /// Fits every parameter in `keys` with one value each, from every init.
    pub fn optimize_flat(
        &self,
        sim: &Simulator,
        inits: &[Theta],
        keys: &[Param],
        idx: &str,
        model_id: &str,
    ) -> Result<StageFit> {
        let layout = ParamLayout::flat(keys, self.kind);
        let starts = inits
            .iter()
            .map(|theta| layout.from_theta(theta))
            .collect::<Result<Vec<_>>>()?;
        self.run_stage(sim, &layout, &starts, idx, model_id, "flat")
    }

    /// Fits the condition-dependent parameters per level, holding the rest
    /// at `flat_popt`.
    pub fn optimize_conditional(
        &self,
        sim: &Simulator,
        flat_popt: &Theta,
        pcmap: &BTreeMap<Param, Vec<String>>,
        idx: &str,
        model_id: &str,
    ) -> Result<StageFit> {
        let layout = ParamLayout::conditional(pcmap, flat_popt, self.kind);
        let x0 = layout.from_theta(&flat_popt.scalarize())?;
        self.run_stage(sim, &layout, &[x0], idx, model_id, "conditional")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_info_statistics() {
        let y = [0.5, 0.4, f64::NAN, 0.3];
        let wts = [1.0, 2.0, 1.0, 1.0];
        let yhat = [0.6, 0.4, 0.1, 0.1];
        let info = fit_info("avg", "dpm_flat_avg", &y, &wts, &yhat, 2, 10, true);
        let chi = 0.01 + 0.0 + 0.04;
        assert_eq!(info.ndata, 3);
        assert!((info.chi - chi).abs() < 1e-12);
        assert!((info.rchi - chi).abs() < 1e-12);
        let logp = 3.0 * (chi / 3.0).ln();
        assert!((info.logp - logp).abs() < 1e-12);
        assert!((info.aic - (logp + 4.0)).abs() < 1e-12);
        assert!((info.bic - (logp + 3f64.ln() * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_filter_params_keeps_lowest_cost() {
        let opt = Optimizer::new(
            "dpm".parse().unwrap(),
            BasinParams {
                ninits: 2,
                ..Default::default()
            },
            NelderMeadOptions::default(),
            0,
        );
        let sampled: Vec<(Theta, Vec<f64>)> = [3.0, 1.0, 2.0, 0.5]
            .iter()
            .map(|&c| (Theta::from_scalars([(Param::A, c)]), vec![c, 0.0]))
            .collect();
        let kept = opt.filter_params(&sampled, &[0.0, 0.0], &[1.0, 1.0]);
        let costs: Vec<f64> = kept.iter().map(|t| t.scalar(Param::A).unwrap()).collect();
        assert_eq!(costs, vec![0.5, 1.0]);
    }

    #[test]
    fn test_filter_params_random_keeps_ninits() {
        let opt = Optimizer::new(
            "dpm".parse().unwrap(),
            BasinParams {
                ninits: 3,
                init_sample_method: InitSampleMethod::Random,
                ..Default::default()
            },
            NelderMeadOptions::default(),
            7,
        );
        let sampled: Vec<(Theta, Vec<f64>)> = (0..10)
            .map(|i| (Theta::from_scalars([(Param::A, i as f64)]), vec![i as f64]))
            .collect();
        assert_eq!(opt.filter_params(&sampled, &[0.0], &[1.0]).len(), 3);
    }
}
