pub mod cli;
pub mod toml_config;

use crate::analysis::quantiles::default_quantiles;
use crate::analysis::summary::SsdMethod;
use crate::core::model::{
    BootstrapSettings, FitParams, FitSettings, ModelSettings, TestingParams, DEFAULT_OUTLIER_SD,
};
use crate::core::{ConfigProvider, OUTPUT_KINDS};
use crate::models::conditions::parse_depends_on;
use crate::models::{DependsOn, FitOn, ModelKind};
use crate::optimize::{BasinParams, GlobalMethod};
use crate::utils::error::{RaddError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "radd")]
#[command(about = "Fit race and drift-diffusion models of stop-signal data")]
pub struct CliConfig {
    /// Trial-level CSV (idx, ttype, ssd, response, acc, rt, conditions...)
    pub data_path: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    /// Model kind: dpm, race, irace, iact, pro, optionally prefixed with x
    #[arg(long, default_value = "xdpm")]
    pub kind: String,

    /// Conditional parameters as param=cond[:cond], e.g. v=cue
    #[arg(long, value_delimiter = ',')]
    pub depends_on: Vec<String>,

    #[arg(long, default_value = "average", value_parser = ["average", "subjects"])]
    pub fit_on: String,

    #[arg(long, value_delimiter = ',')]
    pub quantiles: Vec<f64>,

    #[arg(long, default_value = "all", value_parser = ["all", "mean"])]
    pub ssd_method: String,

    #[arg(long, default_value = "basin", value_parser = ["basin", "evolution"])]
    pub method: String,

    #[arg(long, default_value_t = 2016)]
    pub seed: u64,

    /// Simulated trials per condition level
    #[arg(long)]
    pub ntrials: Option<usize>,

    #[arg(long)]
    pub nsamples: Option<usize>,

    #[arg(long)]
    pub ninits: Option<usize>,

    /// Basin hopping iterations
    #[arg(long)]
    pub niter: Option<usize>,

    /// Iterations per local search while hopping (or evolution generations)
    #[arg(long)]
    pub maxiter: Option<usize>,

    /// Function evaluations per local search
    #[arg(long)]
    pub maxfev: Option<usize>,

    /// Fit a stop-signal onset delay
    #[arg(long)]
    pub ssdelay: bool,

    #[arg(long, default_value_t = DEFAULT_OUTLIER_SD)]
    pub outlier_sd: f64,

    #[arg(long, help = "Keep slow outlier trials")]
    pub keep_outliers: bool,

    #[arg(long, help = "Use unit weights instead of variance-based weights")]
    pub unweighted: bool,

    /// Suffix for the model id
    #[arg(long)]
    pub append: Option<String>,

    #[arg(long, help = "Short, low-precision fit settings for quick checks")]
    pub testing: bool,

    /// Resample simulated trials into this many synthetic subjects
    #[arg(long)]
    pub bootstrap_subjects: Option<usize>,

    #[arg(long, default_value_t = 50)]
    pub bootstrap_trials: usize,

    #[arg(long, value_delimiter = ',', default_value = "popt,fits,finfo")]
    pub outputs: Vec<String>,

    #[arg(long, help = "Bundle all outputs into one zip archive")]
    pub compress: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, value_parser = ["text", "json"])]
    pub log_format: Option<String>,
}

/// Parses `param=cond[:cond]` entries.
pub fn parse_depends_on_args(args: &[String]) -> Result<DependsOn> {
    let mut raw = BTreeMap::new();
    for arg in args {
        let (param, conds) = arg.split_once('=').ok_or_else(|| RaddError::InvalidConfigValueError {
            field: "depends_on".to_string(),
            value: arg.clone(),
            reason: "Expected param=condition, e.g. v=cue".to_string(),
        })?;
        let conds: Vec<String> = conds
            .split(':')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        raw.insert(param.trim().to_string(), conds);
    }
    parse_depends_on(&raw)
}

pub fn parse_fit_on(value: &str) -> Result<FitOn> {
    match value {
        "average" | "avg" => Ok(FitOn::Average),
        "subjects" | "idx" => Ok(FitOn::Subjects),
        other => Err(RaddError::InvalidConfigValueError {
            field: "fit_on".to_string(),
            value: other.to_string(),
            reason: "Use 'average' or 'subjects'".to_string(),
        }),
    }
}

pub fn parse_ssd_method(value: &str) -> Result<SsdMethod> {
    match value {
        "all" => Ok(SsdMethod::All),
        "mean" => Ok(SsdMethod::Mean),
        other => Err(RaddError::InvalidConfigValueError {
            field: "ssd_method".to_string(),
            value: other.to_string(),
            reason: "Use 'all' or 'mean'".to_string(),
        }),
    }
}

pub fn parse_method(value: &str) -> Result<GlobalMethod> {
    match value {
        "basin" => Ok(GlobalMethod::Basin),
        "evolution" => Ok(GlobalMethod::Evolution),
        other => Err(RaddError::InvalidConfigValueError {
            field: "method".to_string(),
            value: other.to_string(),
            reason: "Use 'basin' or 'evolution'".to_string(),
        }),
    }
}

pub fn validate_outputs(field_name: &str, outputs: &[String]) -> Result<()> {
    for output in outputs {
        if !OUTPUT_KINDS.contains(&output.as_str()) {
            return Err(RaddError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: output.clone(),
                reason: format!("Unsupported output. Valid outputs: {}", OUTPUT_KINDS.join(", ")),
            });
        }
    }
    Ok(())
}

impl CliConfig {
    fn quantiles(&self) -> Vec<f64> {
        if self.quantiles.is_empty() {
            default_quantiles()
        } else {
            self.quantiles.clone()
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("data_path", &self.data_path)?;
        validation::validate_file_extensions("data_path", &[self.data_path.clone()], &["csv"])?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_probabilities("quantiles", &self.quantiles())?;
        validation::validate_range("outlier_sd", self.outlier_sd, 0.5, 10.0)?;
        validate_outputs("outputs", &self.outputs)?;

        self.kind.parse::<ModelKind>()?;
        parse_depends_on_args(&self.depends_on)?;
        if let Some(n) = self.ntrials {
            validation::validate_positive_number("ntrials", n, 2)?;
        }
        if let Some(n) = self.bootstrap_subjects {
            validation::validate_positive_number("bootstrap_subjects", n, 1)?;
            validation::validate_positive_number("bootstrap_trials", self.bootstrap_trials, 1)?;
        }
        Ok(())
    }
}

impl ConfigProvider for CliConfig {
    fn data_path(&self) -> &str {
        &self.data_path
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.outputs
    }

    fn compress(&self) -> bool {
        self.compress
    }

    fn fit_settings(&self) -> Result<FitSettings> {
        let model = ModelSettings {
            kind: self.kind.parse()?,
            depends_on: parse_depends_on_args(&self.depends_on)?,
            fit_on: parse_fit_on(&self.fit_on)?,
            ssd_method: parse_ssd_method(&self.ssd_method)?,
            weighted: !self.unweighted,
            quantiles: self.quantiles(),
            ssdelay: self.ssdelay,
            outlier_sd: (!self.keep_outliers).then_some(self.outlier_sd),
            append: self.append.clone(),
            ..Default::default()
        };

        let defaults = FitParams::default();
        let fit = FitParams {
            ntrials: self.ntrials.unwrap_or(defaults.ntrials),
            maxfev: self.maxfev.unwrap_or(defaults.maxfev),
            seed: self.seed,
            ..defaults
        };

        let defaults = BasinParams::default();
        let basin = BasinParams {
            method: parse_method(&self.method)?,
            nsamples: self.nsamples.unwrap_or(defaults.nsamples),
            ninits: self.ninits.unwrap_or(defaults.ninits),
            niter: self.niter.unwrap_or(defaults.niter),
            maxiter: self.maxiter.unwrap_or(defaults.maxiter),
            ..defaults
        };

        Ok(FitSettings {
            model,
            fit,
            basin,
            testing: self.testing.then(TestingParams::default),
            bootstrap: self.bootstrap_subjects.map(|nsubjects| BootstrapSettings {
                nsubjects,
                ntrials: self.bootstrap_trials,
            }),
        })
    }
}
