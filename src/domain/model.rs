use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialType {
    Go,
    Stop,
}

impl TrialType {
    /// 1 for go and 0 for stop, as in the trial-level output files.
    pub fn code(self) -> u8 {
        match self {
            TrialType::Go => 1,
            TrialType::Stop => 0,
        }
    }
}

/// One behavioral trial. Everything outside the fixed columns is a condition factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub idx: String,
    pub ttype: TrialType,
    pub ssd: Option<f64>,
    pub response: bool,
    pub acc: bool,
    pub rt: Option<f64>,
    pub conds: BTreeMap<String, String>,
}

impl Trial {
    pub fn is_go(&self) -> bool {
        self.ttype == TrialType::Go
    }

    pub fn is_stop(&self) -> bool {
        self.ttype == TrialType::Stop
    }

    /// RT of a trial that produced a response.
    pub fn responded_rt(&self) -> Option<f64> {
        if self.response {
            self.rt
        } else {
            None
        }
    }

    pub fn cond(&self, name: &str) -> Option<&str> {
        self.conds.get(name).map(String::as_str)
    }
}

/// Goodness-of-fit summary for one optimized model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitInfo {
    pub idx: String,
    pub model_id: String,
    pub nfev: usize,
    pub nvary: usize,
    pub ndata: usize,
    pub chi: f64,
    pub rchi: f64,
    pub logp: f64,
    #[serde(rename = "AIC")]
    pub aic: f64,
    #[serde(rename = "BIC")]
    pub bic: f64,
    pub cnvrg: bool,
}

/// Result of one optimization stage (flat or conditional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitStage {
    pub finfo: FitInfo,
    pub popt: BTreeMap<String, f64>,
    pub y: Vec<f64>,
    pub wts: Vec<f64>,
    pub yhat: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectFit {
    pub idx: String,
    pub flat: FitStage,
    pub cond: Option<FitStage>,
}

impl SubjectFit {
    /// The most specific stage: conditional when present, otherwise flat.
    pub fn best(&self) -> &FitStage {
        self.cond.as_ref().unwrap_or(&self.flat)
    }
}

/// A simulated trial, as written to `<model_id>_simdf.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimTrialRow {
    pub idx: String,
    pub cond: String,
    pub ttype: u8,
    pub ssd: f64,
    pub response: u8,
    pub acc: u8,
    pub rt: Option<f64>,
    pub ssrt: Option<f64>,
    pub trial: usize,
}

#[derive(Debug, Clone)]
pub struct FitOutput {
    pub model_id: String,
    pub kind: String,
    pub tb: f64,
    pub fits: Vec<SubjectFit>,
    pub simulated: Vec<SimTrialRow>,
}
