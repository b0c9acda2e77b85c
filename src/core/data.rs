//! Trial-level CSV reading and writing.
//!
//! Required columns are `idx, ttype, ssd, response, acc, rt`. Every other
//! column is read as a condition factor.

use crate::domain::model::{Trial, TrialType};
use crate::utils::error::{RaddError, Result};
use std::collections::BTreeMap;

const REQUIRED: [&str; 6] = ["idx", "ttype", "ssd", "response", "acc", "rt"];

/// SSD written for go trials.
pub const GO_SSD: f64 = 1000.0;

fn parse_bool(field: &str, value: &str, row: usize) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" | "" => Ok(false),
        other => Err(RaddError::data(format!(
            "row {}: cannot read '{}' as {}",
            row, other, field
        ))),
    }
}

fn parse_float(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_ttype(value: &str, row: usize) -> Result<TrialType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "go" | "1" | "1.0" => Ok(TrialType::Go),
        "stop" | "0" | "0.0" => Ok(TrialType::Stop),
        other => Err(RaddError::data(format!(
            "row {}: unknown trial type '{}'",
            row, other
        ))),
    }
}

/// Parses trial-level CSV bytes.
pub fn read_trials(bytes: &[u8]) -> Result<Vec<Trial>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut columns = BTreeMap::new();
    for name in REQUIRED {
        let pos = headers.iter().position(|h| h == name).ok_or_else(|| {
            RaddError::data(format!("trial data is missing the '{}' column", name))
        })?;
        columns.insert(name, pos);
    }
    let cond_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !REQUIRED.contains(h) && !h.is_empty())
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut trials = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2;
        let get = |name: &str| record.get(columns[name]).unwrap_or("");

        let ttype = parse_ttype(get("ttype"), row)?;
        let ssd = match ttype {
            TrialType::Go => None,
            TrialType::Stop => Some(parse_float(get("ssd")).ok_or_else(|| {
                RaddError::data(format!("row {}: stop trial without an ssd", row))
            })?),
        };
        let rt = parse_float(get("rt")).filter(|rt| *rt > 0.0);
        let response = parse_bool("response", get("response"), row)? && rt.is_some();

        trials.push(Trial {
            idx: get("idx").to_string(),
            ttype,
            ssd,
            response,
            acc: parse_bool("acc", get("acc"), row)?,
            rt,
            conds: cond_columns
                .iter()
                .map(|(pos, name)| (name.clone(), record.get(*pos).unwrap_or("").to_string()))
                .collect(),
        });
    }

    if trials.is_empty() {
        return Err(RaddError::data("trial data has no rows"));
    }
    tracing::debug!(
        "Read {} trials with condition columns {:?}",
        trials.len(),
        cond_columns.iter().map(|(_, n)| n).collect::<Vec<_>>()
    );
    Ok(trials)
}

/// Serializes trials in the format [`read_trials`] accepts.
pub fn write_trials(trials: &[Trial]) -> Result<Vec<u8>> {
    let cond_names: Vec<String> = trials
        .first()
        .map(|t| t.conds.keys().cloned().collect())
        .unwrap_or_default();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<&str> = REQUIRED.to_vec();
    header.extend(cond_names.iter().map(String::as_str));
    writer.write_record(&header)?;

    for t in trials {
        let mut row = vec![
            t.idx.clone(),
            t.ttype.code().to_string(),
            t.ssd.unwrap_or(GO_SSD).to_string(),
            u8::from(t.response).to_string(),
            u8::from(t.acc).to_string(),
            t.rt.map(|rt| rt.to_string()).unwrap_or_default(),
        ];
        row.extend(cond_names.iter().map(|c| t.cond(c).unwrap_or("").to_string()));
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| RaddError::ProcessingError {
            message: format!("failed to flush trial CSV: {}", e),
        })
}
