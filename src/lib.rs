//! Fitting race, drift-diffusion and dependent-process models of
//! stop-signal task data.

pub mod analysis;
#[cfg(feature = "cli")]
pub mod config;
pub mod core;
pub mod domain;
pub mod models;
pub mod optimize;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, toml_config::TomlConfig, CliConfig};

pub use core::{engine::FitEngine, model::Model, pipeline::FitPipeline};
pub use models::{ModelKind, Param, Simulator, Theta};
pub use utils::error::{RaddError, Result};
