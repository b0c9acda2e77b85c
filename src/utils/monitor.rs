//! Resource and progress reporting for fit runs.
//!
//! [`FitTally`] summarizes what the optimizer did and is always available.
//! [`FitMonitor`] adds process CPU and memory readings through `sysinfo`
//! when the `cli` feature is on.

use crate::domain::model::{FitStage, SubjectFit};
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Optimizer effort across every fitted data vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitTally {
    pub nvectors: usize,
    pub nstages: usize,
    pub nfev: usize,
    pub unconverged: usize,
    /// Lowest chi-square among the final stages.
    pub best_chi: Option<f64>,
}

impl FitTally {
    pub fn from_fits(fits: &[SubjectFit]) -> Self {
        let mut tally = FitTally {
            nvectors: fits.len(),
            ..Default::default()
        };
        for fit in fits {
            for (_, stage) in stages(fit) {
                tally.nstages += 1;
                tally.nfev += stage.finfo.nfev;
                if !stage.finfo.cnvrg {
                    tally.unconverged += 1;
                }
            }
            let chi = fit.best().finfo.chi;
            if chi.is_finite() {
                tally.best_chi = Some(tally.best_chi.map_or(chi, |b| b.min(chi)));
            }
        }
        tally
    }
}

/// `(name, stage)` pairs in fitting order.
fn stages(fit: &SubjectFit) -> impl Iterator<Item = (&'static str, &FitStage)> {
    std::iter::once(("flat", &fit.flat)).chain(fit.cond.iter().map(|c| ("cond", c)))
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy)]
pub struct ProcessStats {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

#[cfg(feature = "cli")]
pub struct FitMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    peak_memory_mb: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl FitMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Process monitoring unavailable: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
            start_time: Instant::now(),
            peak_memory_mb: Mutex::new(0),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> Option<ProcessStats> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory_mb.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            peak_memory_mb: *peak,
            elapsed: self.start_time.elapsed(),
        })
    }

    pub fn log_phase(&self, phase: &str) {
        if let Some(stats) = self.stats() {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                stats.cpu_usage,
                stats.memory_mb,
                stats.peak_memory_mb,
                stats.elapsed
            );
        }
    }

    /// One line per fitted stage, then the run totals.
    pub fn log_fits(&self, fits: &[SubjectFit]) -> FitTally {
        let tally = FitTally::from_fits(fits);
        if !self.enabled {
            return tally;
        }
        for fit in fits {
            for (name, stage) in stages(fit) {
                tracing::info!(
                    idx = %fit.idx,
                    stage = name,
                    nfev = stage.finfo.nfev,
                    chi = stage.finfo.chi,
                    converged = stage.finfo.cnvrg,
                    "📊 Fitted {} ({})",
                    fit.idx,
                    name
                );
            }
        }
        self.log_phase("fit");
        tally
    }

    pub fn log_final(&self, tally: &FitTally) {
        if let Some(stats) = self.stats() {
            tracing::info!(
                "📊 Final Stats - {} evaluations over {} stages, Total Time: {:?}, Peak Memory: {}MB",
                tally.nfev,
                tally.nstages,
                stats.elapsed,
                stats.peak_memory_mb
            );
        }
    }
}

#[cfg(feature = "cli")]
impl Default for FitMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// Library builds without the cli feature only keep the tally.
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct FitMonitor;

#[cfg(not(feature = "cli"))]
impl FitMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn log_phase(&self, _phase: &str) {}

    pub fn log_fits(&self, fits: &[SubjectFit]) -> FitTally {
        FitTally::from_fits(fits)
    }

    pub fn log_final(&self, _tally: &FitTally) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FitInfo;
    use std::collections::BTreeMap;

    fn stage(nfev: usize, chi: f64, cnvrg: bool) -> FitStage {
        FitStage {
            finfo: FitInfo {
                idx: "1".to_string(),
                model_id: "dpm_v_idx".to_string(),
                nfev,
                nvary: 2,
                ndata: 18,
                chi,
                rchi: chi / 16.0,
                logp: 0.0,
                aic: 0.0,
                bic: 0.0,
                cnvrg,
            },
            popt: BTreeMap::new(),
            y: Vec::new(),
            wts: Vec::new(),
            yhat: Vec::new(),
        }
    }

    fn fits() -> Vec<SubjectFit> {
        vec![
            SubjectFit {
                idx: "1".to_string(),
                flat: stage(120, 0.4, true),
                cond: Some(stage(80, 0.2, false)),
            },
            SubjectFit {
                idx: "2".to_string(),
                flat: stage(100, 0.3, true),
                cond: Some(stage(60, f64::NAN, true)),
            },
        ]
    }

    #[test]
    fn test_tally_counts_every_stage() {
        let tally = FitTally::from_fits(&fits());
        assert_eq!(tally.nvectors, 2);
        assert_eq!(tally.nstages, 4);
        assert_eq!(tally.nfev, 360);
        assert_eq!(tally.unconverged, 1);
        // only final stages count, and the NaN one is skipped
        assert_eq!(tally.best_chi, Some(0.2));
    }

    #[test]
    fn test_disabled_monitor_still_tallies() {
        let monitor = FitMonitor::new(false);
        assert!(!monitor.is_enabled());
        let tally = monitor.log_fits(&fits());
        assert_eq!(tally.nfev, 360);
        assert_eq!(FitTally::from_fits(&[]), FitTally::default());
    }
}
