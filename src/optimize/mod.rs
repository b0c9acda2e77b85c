pub mod basin;
pub mod callbacks;
pub mod evolution;
pub mod nelder_mead;
pub mod optimizer;

pub use basin::{basinhopping, BasinOptions};
pub use callbacks::{BasinTracker, LocalTracker};
pub use evolution::{differential_evolution, EvolutionOptions};
pub use nelder_mead::{nelder_mead, Minimum, NelderMeadOptions, SearchBounds};
pub use optimizer::{fit_info, Optimizer, StageFit};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalMethod {
    #[default]
    Basin,
    Evolution,
}

/// How the starting points for global optimization are chosen from the
/// sampled parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSampleMethod {
    #[default]
    Best,
    Random,
}

/// Settings of the global optimization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinParams {
    pub ninits: usize,
    pub nsamples: usize,
    pub interval: usize,
    #[serde(rename = "T")]
    pub temperature: f64,
    pub stepsize: f64,
    pub niter: usize,
    pub maxiter: usize,
    pub nsuccess: usize,
    pub polish_tol: f64,
    pub tol: f64,
    pub method: GlobalMethod,
    pub init_sample_method: InitSampleMethod,
    pub popsize: usize,
    pub recombination: f64,
    pub progress: bool,
}

impl Default for BasinParams {
    fn default() -> Self {
        Self {
            ninits: 3,
            nsamples: 1200,
            interval: 10,
            temperature: 0.05,
            stepsize: 0.035,
            niter: 400,
            maxiter: 400,
            nsuccess: 100,
            polish_tol: 1e-20,
            tol: 0.01,
            method: GlobalMethod::Basin,
            init_sample_method: InitSampleMethod::Best,
            popsize: 15,
            recombination: 0.7,
            progress: true,
        }
    }
}
