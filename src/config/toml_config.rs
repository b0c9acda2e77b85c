use crate::analysis::quantiles::default_quantiles;
use crate::analysis::summary::SsdMethod;
use crate::core::model::{
    BootstrapSettings, FitParams, FitSettings, ModelSettings, TestingParams, DEFAULT_OUTLIER_SD,
};
use crate::core::ConfigProvider;
use crate::models::conditions::parse_depends_on;
use crate::models::theta::{Intervar, Theta};
use crate::models::{FitOn, ModelKind};
use crate::optimize::BasinParams;
use crate::utils::error::{RaddError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub project: ProjectConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fit: FitParams,
    #[serde(default)]
    pub basin: BasinParams,
    pub testing: Option<TestingParams>,
    pub bootstrap: Option<BootstrapSettings>,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub path: String,
}

/// `[model]` as written in the file. Parameter names are checked when the
/// settings are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: String,
    pub depends_on: BTreeMap<String, Vec<String>>,
    pub fit_on: FitOn,
    pub ssd_method: SsdMethod,
    pub weighted: bool,
    pub quantiles: Option<Vec<f64>>,
    pub ssdelay: bool,
    /// Set to 0 to keep every trial.
    pub outlier_sd: f64,
    pub intervar: Intervar,
    pub inits: BTreeMap<String, Vec<f64>>,
    pub append: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: "xdpm".to_string(),
            depends_on: BTreeMap::new(),
            fit_on: FitOn::Average,
            ssd_method: SsdMethod::All,
            weighted: true,
            quantiles: None,
            ssdelay: false,
            outlier_sd: DEFAULT_OUTLIER_SD,
            intervar: Intervar::default(),
            inits: BTreeMap::new(),
            append: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub compress: bool,
}

fn default_outputs() -> Vec<String> {
    ["popt", "fits", "finfo"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub verbose: Option<bool>,
    /// `text` or `json`.
    pub log_format: Option<String>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// Replaces `${VAR}` with the environment value. Unset variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RaddError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn quantiles(&self) -> Vec<f64> {
        self.model.quantiles.clone().unwrap_or_else(default_quantiles)
    }

    fn inits(&self, kind: ModelKind) -> Result<Option<Theta>> {
        if self.model.inits.is_empty() {
            return Ok(None);
        }
        let mut theta = Theta::new();
        for (name, values) in &self.model.inits {
            theta.insert(name.parse()?, values.clone());
        }
        theta.check_bounds(kind)?;
        Ok(Some(theta))
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("project.name", &self.project.name)?;
        validation::validate_path("data.path", &self.data.path)?;
        validation::validate_file_extensions("data.path", &[self.data.path.clone()], &["csv"])?;
        validation::validate_path("output.path", &self.output.path)?;
        super::validate_outputs("output.outputs", &self.output.outputs)?;
        validation::validate_probabilities("model.quantiles", &self.quantiles())?;
        validation::validate_range("model.outlier_sd", self.model.outlier_sd, 0.0, 10.0)?;
        validation::validate_positive_number("fit.ntrials", self.fit.ntrials, 2)?;
        validation::validate_range("fit.dt", self.fit.dt, 1e-5, 0.05)?;
        validation::validate_positive_float("fit.si", self.fit.si)?;
        validation::validate_positive_number("basin.ninits", self.basin.ninits, 1)?;
        validation::validate_positive_float("basin.stepsize", self.basin.stepsize)?;
        validation::validate_positive_float("basin.T", self.basin.temperature)?;
        validation::validate_positive_number("basin.interval", self.basin.interval, 1)?;
        validation::validate_positive_number("basin.popsize", self.basin.popsize, 1)?;

        let kind: ModelKind = self.model.kind.parse()?;
        parse_depends_on(&self.model.depends_on)?;
        self.inits(kind)?;

        if let Some(format) = self.log_format() {
            if format != "text" && format != "json" {
                return Err(RaddError::InvalidConfigValueError {
                    field: "monitoring.log_format".to_string(),
                    value: format.to_string(),
                    reason: "Use 'text' or 'json'".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.verbose)
            .unwrap_or(false)
    }

    pub fn log_format(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_format.as_deref())
    }
}

impl ConfigProvider for TomlConfig {
    fn data_path(&self) -> &str {
        &self.data.path
    }

    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn output_formats(&self) -> &[String] {
        &self.output.outputs
    }

    fn compress(&self) -> bool {
        self.output.compress
    }

    fn fit_settings(&self) -> Result<FitSettings> {
        let kind: ModelKind = self.model.kind.parse()?;
        let model = ModelSettings {
            kind,
            inits: self.inits(kind)?,
            depends_on: parse_depends_on(&self.model.depends_on)?,
            fit_on: self.model.fit_on,
            ssd_method: self.model.ssd_method,
            weighted: self.model.weighted,
            quantiles: self.quantiles(),
            ssdelay: self.model.ssdelay,
            outlier_sd: (self.model.outlier_sd > 0.0).then_some(self.model.outlier_sd),
            intervar: self.model.intervar,
            append: self.model.append.clone(),
        };

        Ok(FitSettings {
            model,
            fit: self.fit.clone(),
            basin: self.basin.clone(),
            testing: self.testing,
            bootstrap: self.bootstrap,
        })
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Param;
    use crate::optimize::GlobalMethod;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[project]
name = "stop-signal"

[data]
path = "data/trials.csv"

[model]
kind = "xirace"
depends_on = { v = ["cue"] }
fit_on = "subjects"
quantiles = [0.3, 0.5, 0.7]

[model.inits]
a = [0.4]
v = [1.1, 1.0]

[fit]
ntrials = 5000

[basin]
nsamples = 200
T = 0.1
method = "evolution"

[output]
path = "./fits"
outputs = ["popt", "finfo", "report"]
compress = true
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap();
        config.validate().unwrap();

        assert_eq!(config.project.name, "stop-signal");
        assert_eq!(config.data_path(), "data/trials.csv");
        assert!(config.compress());
        assert!(!config.monitoring_enabled());

        let settings = config.fit_settings().unwrap();
        assert_eq!(settings.model.kind.to_string(), "xirace");
        assert_eq!(settings.model.fit_on, FitOn::Subjects);
        assert_eq!(settings.model.depends_on[&Param::V], vec!["cue".to_string()]);
        assert_eq!(settings.model.quantiles, vec![0.3, 0.5, 0.7]);
        let inits = settings.model.inits.unwrap();
        assert_eq!(inits.values(Param::V), Some(&[1.1, 1.0][..]));
        assert_eq!(settings.fit.ntrials, 5000);
        assert_eq!(settings.fit.seed, 2016);
        assert_eq!(settings.basin.nsamples, 200);
        assert_eq!(settings.basin.temperature, 0.1);
        assert_eq!(settings.basin.method, GlobalMethod::Evolution);
        assert!(settings.testing.is_none());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RADD_TEST_DATA_PATH", "/tmp/radd/trials.csv");

        let toml_content = r#"
[project]
name = "env"

[data]
path = "${RADD_TEST_DATA_PATH}"

[output]
path = "${RADD_TEST_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.data.path, "/tmp/radd/trials.csv");
        assert_eq!(config.output.path, "${RADD_TEST_UNSET_VAR}");
        assert_eq!(config.output_formats(), ["popt", "fits", "finfo"]);

        std::env::remove_var("RADD_TEST_DATA_PATH");
    }

    #[test]
    fn test_config_validation() {
        let bad_kind = BASIC.replace("xirace", "lba");
        let config = TomlConfig::from_toml_str(&bad_kind).unwrap();
        assert!(config.validate().is_err());

        let bad_init = BASIC.replace("a = [0.4]", "a = [9.0]");
        let config = TomlConfig::from_toml_str(&bad_init).unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            RaddError::ParameterError { .. }
        ));

        let bad_output = BASIC.replace("\"report\"", "\"plots\"");
        let config = TomlConfig::from_toml_str(&bad_output).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_search_settings_must_be_positive() {
        for (from, to) in [
            ("T = 0.1", "T = 0.1\nstepsize = -0.2"),
            ("T = 0.1", "T = 0.0"),
            ("T = 0.1", "T = 0.1\ninterval = 0"),
            ("T = 0.1", "T = 0.1\npopsize = 0"),
            ("ntrials = 5000", "ntrials = 5000\nsi = 0.0"),
        ] {
            let content = BASIC.replace(from, to);
            let config = TomlConfig::from_toml_str(&content).unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, RaddError::InvalidConfigValueError { .. }),
                "{} accepted",
                to
            );
        }
    }

    #[test]
    fn test_testing_section_and_outliers_off() {
        let content = format!(
            "{}\n[testing]\nnsamples = 10\n\n[monitoring]\nenabled = true\nlog_format = \"json\"\n",
            BASIC.replace("quantiles = [0.3, 0.5, 0.7]", "outlier_sd = 0.0")
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        config.validate().unwrap();

        let settings = config.fit_settings().unwrap();
        assert_eq!(settings.model.outlier_sd, None);
        assert_eq!(settings.testing.unwrap().nsamples, 10);
        assert_eq!(settings.testing.unwrap().ninits, 2);
        assert!(config.monitoring_enabled());
        assert_eq!(config.log_format(), Some("json"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.project.name, "stop-signal");
    }
}
