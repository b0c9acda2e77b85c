//! Stochastic simulation of go and stop accumulators.
//!
//! Each accumulator is a random walk approximating a diffusion process with
//! drift `μ` and diffusion coefficient `si`:
//!
//!   dx = √(si·dt),   P(up) = ½ (1 + μ·dx / si)
//!
//! so the walk has mean rate `μ` and variance `si` per second. For `x` kinds
//! each go step is scaled by the temporal gain `cosh(xb·t)`.
//!
//! Stop trials come first: `nss = ntrials / 2` trials split evenly across
//! the level's SSDs. They are followed by `ntrials - nss` go trials. A stop
//! trial yields a response when the go process finishes before the
//! deadline and no later than the stop process.
//!
//! Random numbers are common across calls. Every level draws from a
//! `SmallRng` seeded by `(seed, level)`, so the cost surface is a
//! deterministic function of the parameters.

use crate::analysis::quantiles::mquantiles;
use crate::analysis::summary::SsdMethod;
use crate::models::conditions::LevelIndex;
use crate::models::kind::ModelKind;
use crate::models::theta::{Intervar, Param, Theta, TrialParams};
use crate::utils::error::{RaddError, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub kind: ModelKind,
    pub ntrials: usize,
    pub dt: f64,
    pub si: f64,
    pub tb: f64,
    pub quantiles: Vec<f64>,
    pub seed: u64,
    pub intervar: Intervar,
    pub ssd_method: SsdMethod,
}

/// Parameter values resolved for one condition level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    pub a: f64,
    pub tr: f64,
    pub v: f64,
    pub ssv: f64,
    pub z: f64,
    pub xb: f64,
    pub si: f64,
    pub sso: f64,
}

/// Raw simulated response times of one level. `f64::INFINITY` means the
/// process never finished.
#[derive(Debug, Clone)]
pub struct LevelSim {
    /// Go finishing times: stop trials (ssd-major), then go trials.
    pub go_rt: Vec<f64>,
    /// Stop finishing times, `[ssd][trial]`.
    pub ss_rt: Vec<Vec<f64>>,
    pub ssds: Vec<f64>,
    pub nss_per_ssd: usize,
}

impl LevelSim {
    pub fn nstop(&self) -> usize {
        self.ssds.len() * self.nss_per_ssd
    }

    pub fn go_trials(&self) -> &[f64] {
        &self.go_rt[self.nstop()..]
    }

    /// Go finishing times of the stop trials at `ssd_index`.
    pub fn stop_trial_go_rt(&self, ssd_index: usize) -> &[f64] {
        let start = ssd_index * self.nss_per_ssd;
        &self.go_rt[start..start + self.nss_per_ssd]
    }
}

#[derive(Debug, Clone)]
pub struct SimOutput {
    pub levels: Vec<LevelSim>,
}

struct Walk {
    dx: f64,
    p_up: f64,
}

impl Walk {
    fn new(drift: f64, si: f64, dt: f64) -> Self {
        let dx = (si * dt).sqrt();
        let p_up = (0.5 * (1.0 + drift * dx / si)).clamp(0.0, 1.0);
        Self { dx, p_up }
    }

    #[inline(always)]
    fn step<R: Rng>(&self, rng: &mut R) -> f64 {
        if rng.random::<f64>() < self.p_up {
            self.dx
        } else {
            -self.dx
        }
    }
}

/// `Σ w (yhat - y)²` over the finite entries of `y`.
pub fn weighted_sse(y: &[f64], wts: &[f64], yhat: &[f64]) -> f64 {
    y.iter()
        .zip(wts)
        .zip(yhat)
        .filter(|((y, _), _)| y.is_finite())
        .map(|((y, w), yh)| w * (yh - y).powi(2))
        .sum()
}

#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimConfig,
    ssds: Vec<Vec<f64>>,
    level_index: LevelIndex,
    y: Vec<f64>,
    wts: Vec<f64>,
}

impl Simulator {
    pub fn new(config: SimConfig, ssds: Vec<Vec<f64>>, level_index: LevelIndex) -> Self {
        Self {
            config,
            ssds,
            level_index,
            y: Vec::new(),
            wts: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn nlevels(&self) -> usize {
        self.ssds.len().max(1)
    }

    pub fn ssds(&self) -> &[Vec<f64>] {
        &self.ssds
    }

    /// Observed vector and weights that `cost_fx` compares against.
    pub fn set_target(&mut self, y: Vec<f64>, wts: Vec<f64>) {
        self.y = y;
        self.wts = wts;
    }

    pub fn target(&self) -> (&[f64], &[f64]) {
        (&self.y, &self.wts)
    }

    pub fn level_params(&self, theta: &Theta, level: usize) -> Result<LevelParams> {
        let kind = self.config.kind;
        let get = |p: Param| theta.get(p, self.level_index.get(p, level));
        let required = |p: Param| {
            get(p).ok_or_else(|| RaddError::param(p.as_str(), format!("required by kind {}", kind)))
        };
        Ok(LevelParams {
            a: required(Param::A)?,
            tr: required(Param::Tr)?,
            v: required(Param::V)?,
            ssv: if kind.has_stop_process() {
                required(Param::Ssv)?
            } else {
                0.0
            },
            z: if kind.is_dpm() {
                get(Param::Z).unwrap_or(0.0)
            } else {
                0.0
            },
            xb: if kind.dynamic {
                get(Param::Xb).unwrap_or(0.0)
            } else {
                0.0
            },
            si: get(Param::Si).unwrap_or(self.config.si),
            sso: get(Param::Sso).unwrap_or(0.0),
        })
    }

    fn level_rng(&self, level: usize) -> SmallRng {
        SmallRng::seed_from_u64(
            self.config
                .seed
                .wrapping_add((level as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        )
    }

    /// Simulates every level in parallel.
    pub fn simulate_trials(&self, theta: &Theta) -> Result<SimOutput> {
        let levels = (0..self.nlevels())
            .into_par_iter()
            .map(|level| {
                let params = self.level_params(theta, level)?;
                Ok(self.simulate_level(&params, level))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SimOutput { levels })
    }

    pub fn simulate_level(&self, p: &LevelParams, level: usize) -> LevelSim {
        let cfg = &self.config;
        let mut rng = self.level_rng(level);
        let ssds = if cfg.kind.has_stop_process() {
            self.ssds.get(level).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        let nss = if ssds.is_empty() { 0 } else { cfg.ntrials / 2 };
        let nss_per_ssd = if ssds.is_empty() { 0 } else { nss / ssds.len() };
        let ngo = cfg.ntrials - nss;

        let max_steps = (cfg.tb / cfg.dt).ceil() as usize + 2;
        let gain: Vec<f64> = (0..=max_steps)
            .map(|n| {
                if cfg.kind.dynamic {
                    (p.xb * n as f64 * cfg.dt).cosh()
                } else {
                    1.0
                }
            })
            .collect();

        let mut go_rt = Vec::with_capacity(ssds.len() * nss_per_ssd + ngo);
        let mut ss_rt = Vec::with_capacity(ssds.len());
        for &ssd in &ssds {
            let onset = ssd + p.sso;
            let mut block = Vec::with_capacity(nss_per_ssd);
            for _ in 0..nss_per_ssd {
                let tp = self.trial_params(p, &mut rng);
                let (rt, ssrt) = self.stop_trial(p, tp, onset, &gain, &mut rng);
                go_rt.push(rt);
                block.push(ssrt);
            }
            ss_rt.push(block);
        }
        for _ in 0..ngo {
            let tp = self.trial_params(p, &mut rng);
            go_rt.push(self.run_go(p, tp, &gain, None, &mut rng).0);
        }

        LevelSim {
            go_rt,
            ss_rt,
            ssds,
            nss_per_ssd,
        }
    }

    fn trial_params<R: Rng>(&self, p: &LevelParams, rng: &mut R) -> TrialParams {
        let base = TrialParams {
            tr: p.tr,
            z: p.z,
            v: p.v,
        };
        if self.config.intervar.is_empty() {
            base
        } else {
            self.config.intervar.update_params(base, rng)
        }
    }

    /// Runs the go walk. Returns its finishing time and the walk's value at
    /// step `handoff` (or its last value when it stopped earlier).
    fn run_go<R: Rng>(
        &self,
        p: &LevelParams,
        tp: TrialParams,
        gain: &[f64],
        handoff: Option<usize>,
        rng: &mut R,
    ) -> (f64, f64) {
        let dt = self.config.dt;
        let walk = Walk::new(tp.v, p.si, dt);
        let nsteps = ((self.config.tb - tp.tr) / dt).ceil().max(0.0) as usize;
        let last = gain.len() - 1;

        let mut dv = tp.z;
        let mut at_handoff = tp.z;
        for n in 1..=nsteps {
            dv += walk.step(rng) * gain[n.min(last)];
            if handoff.is_some_and(|k| n <= k) {
                at_handoff = dv;
            }
            if dv >= p.a {
                return (tp.tr + n as f64 * dt, at_handoff);
            }
        }
        (f64::INFINITY, at_handoff)
    }

    /// One stop trial: `(go finishing time, stop finishing time)`.
    fn stop_trial<R: Rng>(
        &self,
        p: &LevelParams,
        tp: TrialParams,
        onset: f64,
        gain: &[f64],
        rng: &mut R,
    ) -> (f64, f64) {
        let cfg = &self.config;
        if cfg.kind.is_interactive() {
            return self.interactive_trial(p, tp, onset, gain, rng);
        }

        let stop_walk = Walk::new(p.ssv, p.si, cfg.dt);
        let stop_steps = ((cfg.tb - onset) / cfg.dt).ceil().max(0.0) as usize;

        if cfg.kind.is_dpm() {
            // stop process takes over the go accumulator's state at onset
            let handoff = ((onset - tp.tr) / cfg.dt).floor().max(0.0) as usize;
            let (rt, start) = self.run_go(p, tp, gain, Some(handoff), rng);
            let mut dv = start;
            if dv <= 0.0 {
                return (rt, onset);
            }
            for m in 1..=stop_steps {
                dv += stop_walk.step(rng);
                if dv <= 0.0 {
                    return (rt, onset + m as f64 * cfg.dt);
                }
            }
            (rt, f64::INFINITY)
        } else {
            let (rt, _) = self.run_go(p, tp, gain, None, rng);
            let mut dv = 0.0;
            for m in 1..=stop_steps {
                dv += stop_walk.step(rng);
                if dv >= p.a {
                    return (rt, onset + m as f64 * cfg.dt);
                }
            }
            (rt, f64::INFINITY)
        }
    }

    /// Interactive race: once active, stop activity is subtracted from go.
    /// The stop only counts when the inhibited go never reaches threshold,
    /// so a go crossing returns no stop finishing time.
    fn interactive_trial<R: Rng>(
        &self,
        p: &LevelParams,
        tp: TrialParams,
        onset: f64,
        gain: &[f64],
        rng: &mut R,
    ) -> (f64, f64) {
        let dt = self.config.dt;
        let go_walk = Walk::new(tp.v, p.si, dt);
        let stop_walk = Walk::new(p.ssv, p.si, dt);
        let nsteps = ((self.config.tb - tp.tr) / dt).ceil().max(0.0) as usize;
        let last = gain.len() - 1;

        let mut go = tp.z;
        let mut stop = 0.0_f64;
        let mut ssrt = f64::INFINITY;
        for n in 1..=nsteps {
            let t = tp.tr + n as f64 * dt;
            go += go_walk.step(rng) * gain[n.min(last)];
            if t >= onset {
                stop += stop_walk.step(rng);
                if stop >= p.a && ssrt.is_infinite() {
                    ssrt = t;
                }
            }
            if go - stop.max(0.0) >= p.a {
                return (t, f64::INFINITY);
            }
        }
        (f64::INFINITY, ssrt)
    }

    /// Summary vector in the observed-data layout. Quantiles of empty
    /// response sets are filled with the deadline.
    pub fn summarize(&self, sim: &SimOutput) -> Vec<f64> {
        let cfg = &self.config;
        let tb = cfg.tb;
        let q = &cfg.quantiles;
        let fill = |v: Vec<f64>| -> Vec<f64> {
            v.into_iter()
                .map(|x| if x.is_finite() { x } else { tb })
                .collect()
        };
        let rate = |hits: usize, n: usize| if n == 0 { 0.0 } else { hits as f64 / n as f64 };

        let mut yhat = Vec::new();
        for level in &sim.levels {
            let go_resp: Vec<f64> = level
                .go_trials()
                .iter()
                .copied()
                .filter(|rt| *rt < tb)
                .collect();

            if !cfg.kind.has_stop_process() {
                yhat.push(rate(go_resp.len(), level.go_trials().len()));
                yhat.extend(fill(mquantiles(&go_resp, q)));
                continue;
            }

            yhat.push(rate(go_resp.len(), level.go_trials().len()));
            let mut err_rts = Vec::new();
            for (j, ssrts) in level.ss_rt.iter().enumerate() {
                let mut responded = 0;
                for (&rt, &ssrt) in level.stop_trial_go_rt(j).iter().zip(ssrts) {
                    if rt < tb && rt <= ssrt {
                        responded += 1;
                        err_rts.push(rt);
                    }
                }
                yhat.push(1.0 - rate(responded, ssrts.len()));
            }
            yhat.extend(fill(mquantiles(&go_resp, q)));
            yhat.extend(fill(mquantiles(&err_rts, q)));
        }
        yhat
    }

    /// Simulated summary vector for `theta`.
    pub fn sim_fx(&self, theta: &Theta) -> Result<Vec<f64>> {
        let sim = self.simulate_trials(theta)?;
        Ok(self.summarize(&sim))
    }

    /// Weighted sum of squared residuals against the target.
    pub fn cost(&self, yhat: &[f64]) -> f64 {
        weighted_sse(&self.y, &self.wts, yhat)
    }

    pub fn cost_fx(&self, theta: &Theta) -> Result<f64> {
        let yhat = self.sim_fx(theta)?;
        if yhat.len() != self.y.len() {
            return Err(RaddError::SimulationError {
                message: format!(
                    "simulated vector has {} entries, observed has {}",
                    yhat.len(),
                    self.y.len()
                ),
            });
        }
        Ok(self.cost(&yhat))
    }
}
