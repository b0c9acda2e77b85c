use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaddError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Data error: {message}")]
    DataError { message: String },

    #[error("Parameter error for '{param}': {message}")]
    ParameterError { param: String, message: String },

    #[error("Simulation error: {message}")]
    SimulationError { message: String },

    #[error("Optimization error: {message}")]
    OptimizationError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    Model,
    Io,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code for a run that failed with this severity.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl RaddError {
    pub fn data(message: impl Into<String>) -> Self {
        RaddError::DataError {
            message: message.into(),
        }
    }

    pub fn param(param: impl Into<String>, message: impl Into<String>) -> Self {
        RaddError::ParameterError {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RaddError::ConfigError { .. }
            | RaddError::ConfigValidationError { .. }
            | RaddError::InvalidConfigValueError { .. }
            | RaddError::MissingConfigError { .. } => ErrorCategory::Configuration,
            RaddError::CsvError(_) | RaddError::DataError { .. } => ErrorCategory::Data,
            RaddError::ParameterError { .. }
            | RaddError::SimulationError { .. }
            | RaddError::OptimizationError { .. } => ErrorCategory::Model,
            RaddError::IoError(_) | RaddError::ZipError(_) => ErrorCategory::Io,
            RaddError::SerializationError(_) | RaddError::ProcessingError { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Model => ErrorSeverity::Medium,
            ErrorCategory::Io => ErrorSeverity::Critical,
            ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            RaddError::CsvError(_) => {
                "Check that the data file is a CSV with idx, ttype, ssd, response, acc and rt columns".to_string()
            }
            RaddError::DataError { .. } => {
                "Inspect the trial data: every subject needs responded go trials and, for stop-signal kinds, stop trials".to_string()
            }
            RaddError::IoError(_) | RaddError::ZipError(_) => {
                "Check file paths and write permissions for the output directory".to_string()
            }
            RaddError::ConfigError { .. }
            | RaddError::ConfigValidationError { .. }
            | RaddError::InvalidConfigValueError { .. }
            | RaddError::MissingConfigError { .. } => {
                "Review the configuration file or command line flags".to_string()
            }
            RaddError::ParameterError { param, .. } => {
                format!("Provide a valid initial value for '{}' within its bounds", param)
            }
            RaddError::SimulationError { .. } => {
                "Lower dt or raise ntrials so every condition produces responses".to_string()
            }
            RaddError::OptimizationError { .. } => {
                "Increase nsamples or ninits, or loosen the tolerance".to_string()
            }
            RaddError::SerializationError(_) | RaddError::ProcessingError { .. } => {
                "Re-run with --verbose and report the log".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Could not use the trial data: {}", self),
            ErrorCategory::Model => format!("Model fitting failed: {}", self),
            ErrorCategory::Io => format!("File access failed: {}", self),
            ErrorCategory::Internal => format!("Internal error: {}", self),
        }
    }
}

impl From<toml::de::Error> for RaddError {
    fn from(e: toml::de::Error) -> Self {
        RaddError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, RaddError>;
