//! Progress tracking for global and local optimization.

use crate::utils::format::{basin_status, trim_leading_zero};

/// Follows a basin-hopping run: the global basin, the basin of the most
/// recent hop and every accepted minimum.
#[derive(Debug, Clone)]
pub struct BasinTracker {
    label: String,
    progress: bool,
    pub fmin_history: Vec<f64>,
    pub xhistory: Vec<Vec<f64>>,
    pub global_basin: f64,
    pub local_basin: f64,
    pub nhops: usize,
}

impl BasinTracker {
    pub fn new(label: impl Into<String>, progress: bool) -> Self {
        Self {
            label: label.into(),
            progress,
            fmin_history: Vec::new(),
            xhistory: Vec::new(),
            global_basin: f64::INFINITY,
            local_basin: f64::INFINITY,
            nhops: 0,
        }
    }

    /// Records one local minimum. Returns `true` when it is a new global one.
    pub fn on_minimum(&mut self, x: &[f64], fun: f64, accepted: bool) -> bool {
        self.nhops += 1;
        self.local_basin = fun;
        if accepted {
            self.fmin_history.push(fun);
            self.xhistory.push(x.to_vec());
        }
        let improved = fun < self.global_basin;
        if improved {
            self.global_basin = fun;
        }
        if self.progress {
            tracing::debug!(
                "{} hop {}: {}{}",
                self.label,
                self.nhops,
                basin_status(self.global_basin, self.local_basin),
                if improved { " *" } else { "" }
            );
        }
        improved
    }

    pub fn finish(&self) {
        if self.progress {
            tracing::info!(
                "🏔️  {} finished after {} hops, global basin {}",
                self.label,
                self.nhops,
                trim_leading_zero(self.global_basin, 5)
            );
        }
    }
}

/// Follows a local (polishing) minimization through its objective calls.
#[derive(Debug, Clone)]
pub struct LocalTracker {
    label: String,
    progress: bool,
    pub fmin: f64,
    pub history: Vec<f64>,
    pub xhistory: Vec<Vec<f64>>,
    pub nfev: usize,
}

impl LocalTracker {
    pub fn new(label: impl Into<String>, progress: bool) -> Self {
        Self {
            label: label.into(),
            progress,
            fmin: f64::INFINITY,
            history: Vec::new(),
            xhistory: Vec::new(),
            nfev: 0,
        }
    }

    pub fn record(&mut self, x: &[f64], fun: f64) {
        self.nfev += 1;
        if fun < self.fmin {
            self.fmin = fun;
            self.history.push(fun);
            self.xhistory.push(x.to_vec());
        }
    }

    pub fn finish(&self) {
        if self.progress {
            tracing::info!(
                "🔧 {} polished to {} in {} evaluations",
                self.label,
                trim_leading_zero(self.fmin, 5),
                self.nfev
            );
        }
    }
}
