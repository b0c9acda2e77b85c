//! Fit results on disk: parameter estimates, fitted vectors, fit statistics
//! and simulated trial-level data.

use crate::analysis::bootstrap::bootstrap_data;
use crate::core::data::GO_SSD;
use crate::domain::model::{FitInfo, SimTrialRow, SubjectFit, Trial, TrialType};
use crate::models::conditions::FLAT;
use crate::models::simulator::SimOutput;
use crate::models::theta::{Param, Theta};
use crate::utils::error::{RaddError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const FLAT_STAGE: &str = "flat";
const COND_STAGE: &str = "cond";

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.into_inner().map_err(|e| RaddError::ProcessingError {
        message: format!("failed to flush CSV: {}", e),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRow {
    pub idx: String,
    pub name: String,
    pub value: f64,
}

/// Writes the best parameters of every fit as `idx,name,value` rows.
pub fn write_params(fits: &[SubjectFit]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for fit in fits {
        for (name, &value) in &fit.best().popt {
            writer.serialize(ParamRow {
                idx: fit.idx.clone(),
                name: name.clone(),
                value,
            })?;
        }
    }
    finish(writer)
}

/// Reads `idx,name,value` rows, grouped by `idx`.
pub fn read_params(bytes: &[u8]) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut out: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for row in reader.deserialize::<ParamRow>() {
        let row = row?;
        out.entry(row.idx).or_default().insert(row.name, row.value);
    }
    Ok(out)
}

/// Rebuilds a [`Theta`] from named values. Conditional names are ordered by
/// `pcmap`; every other name must be a plain parameter.
pub fn params_to_theta(
    named: &BTreeMap<String, f64>,
    pcmap: &BTreeMap<Param, Vec<String>>,
) -> Result<Theta> {
    let mut theta = Theta::new();
    for (&param, names) in pcmap {
        let values = names
            .iter()
            .map(|n| {
                named
                    .get(n)
                    .copied()
                    .ok_or_else(|| RaddError::param(n.as_str(), "missing from saved parameters"))
            })
            .collect::<Result<Vec<_>>>()?;
        theta.insert(param, values);
    }
    let conditional: Vec<&String> = pcmap.values().flatten().collect();
    for (name, &value) in named {
        if conditional.contains(&name) {
            continue;
        }
        let param: Param = name.parse()?;
        if !theta.contains(param) {
            theta.set_scalar(param, value);
        }
    }
    Ok(theta)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRow {
    pub idx: String,
    pub stage: String,
    pub y: Option<f64>,
    pub wts: f64,
    pub yhat: f64,
}

/// Writes `idx,stage,y,wts,yhat` rows for every stage of every fit.
pub fn write_fits(fits: &[SubjectFit]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for fit in fits {
        let stages = std::iter::once((FLAT_STAGE, &fit.flat))
            .chain(fit.cond.as_ref().map(|c| (COND_STAGE, c)));
        for (stage, data) in stages {
            for ((y, w), yhat) in data.y.iter().zip(&data.wts).zip(&data.yhat) {
                writer.serialize(FitRow {
                    idx: fit.idx.clone(),
                    stage: stage.to_string(),
                    y: y.is_finite().then_some(*y),
                    wts: *w,
                    yhat: *yhat,
                })?;
            }
        }
    }
    finish(writer)
}

pub fn read_fits(bytes: &[u8]) -> Result<Vec<FitRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize::<FitRow>()
        .map(|r| r.map_err(RaddError::from))
        .collect()
}

const FINFO_HEADER: [&str; 13] = [
    "idx", "stage", "model_id", "nfev", "nvary", "ndata", "chi", "rchi", "logp", "AIC", "BIC",
    "cnvrg", "kind",
];

/// Writes one fit-statistics row per stage.
pub fn write_finfo(fits: &[SubjectFit], kind: &str) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FINFO_HEADER)?;
    for fit in fits {
        let stages = std::iter::once((FLAT_STAGE, &fit.flat.finfo))
            .chain(fit.cond.as_ref().map(|c| (COND_STAGE, &c.finfo)));
        for (stage, info) in stages {
            writer.write_record(finfo_record(stage, info, kind))?;
        }
    }
    finish(writer)
}

fn finfo_record(stage: &str, info: &FitInfo, kind: &str) -> Vec<String> {
    vec![
        info.idx.clone(),
        stage.to_string(),
        info.model_id.clone(),
        info.nfev.to_string(),
        info.nvary.to_string(),
        info.ndata.to_string(),
        info.chi.to_string(),
        info.rchi.to_string(),
        info.logp.to_string(),
        info.aic.to_string(),
        info.bic.to_string(),
        info.cnvrg.to_string(),
        kind.to_string(),
    ]
}

/// Turns simulated response times into trial rows, one block per level.
pub fn pandaify_results(
    sim: &SimOutput,
    tb: f64,
    level_names: &[String],
    idx: &str,
) -> Vec<SimTrialRow> {
    let mut rows = Vec::new();
    for (l, level) in sim.levels.iter().enumerate() {
        let cond = level_names
            .get(l)
            .cloned()
            .unwrap_or_else(|| l.to_string());
        // trials are numbered from 1 within each level
        let mut trial = 1;

        for (j, (&ssd, ssrts)) in level.ssds.iter().zip(&level.ss_rt).enumerate() {
            for (&rt, &ssrt) in level.stop_trial_go_rt(j).iter().zip(ssrts) {
                let responded = rt < tb && rt <= ssrt;
                rows.push(SimTrialRow {
                    idx: idx.to_string(),
                    cond: cond.clone(),
                    ttype: 0,
                    ssd,
                    response: responded as u8,
                    acc: (!responded) as u8,
                    rt: responded.then_some(rt),
                    ssrt: ssrt.is_finite().then_some(ssrt),
                    trial,
                });
                trial += 1;
            }
        }
        for &rt in level.go_trials() {
            let responded = rt < tb;
            rows.push(SimTrialRow {
                idx: idx.to_string(),
                cond: cond.clone(),
                ttype: 1,
                ssd: GO_SSD,
                response: responded as u8,
                acc: responded as u8,
                rt: responded.then_some(rt),
                ssrt: None,
                trial,
            });
            trial += 1;
        }
    }
    rows
}

/// Synthetic subjects drawn from simulated rows, `n` rows per condition,
/// trial type and SSD.
pub fn bootstrap_rows<R: Rng + ?Sized>(
    rows: &[SimTrialRow],
    nsubjects: usize,
    n: usize,
    rng: &mut R,
) -> Vec<SimTrialRow> {
    bootstrap_data(
        rows,
        nsubjects,
        n,
        |r: &SimTrialRow| (r.cond.clone(), r.ttype, (r.ssd * 1000.0).round() as i64),
        |r: &mut SimTrialRow, subject| r.idx = subject.to_string(),
        rng,
    )
}

/// Simulated rows as trials, with the level name under the `cond` column.
/// Rows of a flat model carry no condition column.
pub fn sim_rows_to_trials(rows: &[SimTrialRow]) -> Vec<Trial> {
    rows.iter()
        .map(|r| Trial {
            idx: r.idx.clone(),
            ttype: if r.ttype == 1 {
                TrialType::Go
            } else {
                TrialType::Stop
            },
            ssd: (r.ttype == 0).then_some(r.ssd),
            response: r.response == 1,
            acc: r.acc == 1,
            rt: r.rt,
            conds: if r.cond == FLAT {
                BTreeMap::new()
            } else {
                BTreeMap::from([("cond".to_string(), r.cond.clone())])
            },
        })
        .collect()
}

pub fn write_sim_rows(rows: &[SimTrialRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    finish(writer)
}
