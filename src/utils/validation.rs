use crate::utils::error::{RaddError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        match std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some(extension) if allowed_set.contains(extension) => {}
            Some(extension) => {
                return Err(RaddError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        extension,
                        allowed_extensions.join(", ")
                    ),
                });
            }
            None => {
                return Err(RaddError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: "File has no extension or invalid filename".to_string(),
                });
            }
        }
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_positive_float(field_name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value must be a positive number".to_string(),
        });
    }
    Ok(())
}

/// Quantile probabilities must lie strictly inside (0, 1) and increase.
pub fn validate_probabilities(field_name: &str, probs: &[f64]) -> Result<()> {
    if probs.is_empty() {
        return Err(RaddError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: "[]".to_string(),
            reason: "At least one quantile is required".to_string(),
        });
    }
    for (i, &p) in probs.iter().enumerate() {
        if !(p > 0.0 && p < 1.0) {
            return Err(RaddError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: p.to_string(),
                reason: "Quantiles must be between 0 and 1 (exclusive)".to_string(),
            });
        }
        if i > 0 && p <= probs[i - 1] {
            return Err(RaddError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: p.to_string(),
                reason: "Quantiles must be strictly increasing".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("data.path", "trials.csv").is_ok());
        assert!(validate_path("data.path", "").is_err());
        assert!(validate_path("data.path", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("fit.ntrials", 5, 1).is_ok());
        assert!(validate_positive_number("fit.ntrials", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["trials.csv".to_string()];
        assert!(validate_file_extensions("data.path", &files, &["csv"]).is_ok());

        let invalid_files = vec!["trials.xlsx".to_string()];
        assert!(validate_file_extensions("data.path", &invalid_files, &["csv"]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("fit.dt", 0.002, 0.0001, 0.05).is_ok());
        assert!(validate_range("fit.dt", 0.5, 0.0001, 0.05).is_err());
    }

    #[test]
    fn test_validate_positive_float() {
        assert!(validate_positive_float("basin.stepsize", 0.035).is_ok());
        assert!(validate_positive_float("basin.stepsize", 0.0).is_err());
        assert!(validate_positive_float("basin.stepsize", -0.1).is_err());
        assert!(validate_positive_float("fit.si", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_probabilities() {
        assert!(validate_probabilities("model.quantiles", &[0.1, 0.5, 0.9]).is_ok());
        assert!(validate_probabilities("model.quantiles", &[]).is_err());
        assert!(validate_probabilities("model.quantiles", &[0.5, 0.3]).is_err());
        assert!(validate_probabilities("model.quantiles", &[0.0, 0.5]).is_err());
    }
}
