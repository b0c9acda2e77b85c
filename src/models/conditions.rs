//! Experimental conditions and how parameters vary across them.
//!
//! `depends_on` maps parameters to condition columns. Levels are the
//! cartesian product of all condition columns (first column slowest). A
//! parameter that depends on a subset of columns gets one value per level of
//! that subset. `pcmap` names those values, e.g. `v_bsl`, `v_pnl`.

use crate::domain::model::Trial;
use crate::models::kind::ModelKind;
use crate::models::theta::Param;
use crate::models::FitOn;
use crate::utils::error::{RaddError, Result};
use std::collections::{BTreeMap, BTreeSet};

pub type DependsOn = BTreeMap<Param, Vec<String>>;

pub const FLAT: &str = "flat";

/// Parses raw `depends_on` entries. The key `all` and the condition `flat`
/// both mean "no conditional parameters".
pub fn parse_depends_on(raw: &BTreeMap<String, Vec<String>>) -> Result<DependsOn> {
    let mut depends_on = DependsOn::new();
    for (key, conds) in raw {
        if key == "all" || conds.iter().any(|c| c == FLAT) {
            continue;
        }
        if conds.is_empty() {
            return Err(RaddError::InvalidConfigValueError {
                field: format!("model.depends_on.{}", key),
                value: "[]".to_string(),
                reason: "List at least one condition column".to_string(),
            });
        }
        depends_on.insert(key.parse()?, conds.clone());
    }
    Ok(depends_on)
}

/// `{kind}_{params|flat}_{avg|idx}[_{append}]`.
pub fn generate_model_id(
    kind: ModelKind,
    depends_on: &DependsOn,
    fit_on: FitOn,
    append: Option<&str>,
) -> String {
    let mut parts = vec![kind.to_string()];
    if depends_on.is_empty() {
        parts.push(FLAT.to_string());
    } else {
        parts.extend(depends_on.keys().map(|p| p.as_str().to_string()));
    }
    parts.push(
        match fit_on {
            FitOn::Average => "avg",
            FitOn::Subjects => "idx",
        }
        .to_string(),
    );
    if let Some(s) = append {
        parts.push(s.to_string());
    }
    parts.join("_")
}

#[derive(Debug, Clone)]
pub struct Conditions {
    pub depends_on: DependsOn,
    pub conds: Vec<String>,
    pub clmap: BTreeMap<String, Vec<String>>,
    pub levels: Vec<Vec<String>>,
    pub nlevels: usize,
    pub is_flat: bool,
    pcmap: BTreeMap<Param, Vec<String>>,
    param_index: BTreeMap<Param, Vec<usize>>,
}

impl Conditions {
    pub fn new(depends_on: DependsOn, trials: &[Trial]) -> Result<Self> {
        let conds: Vec<String> = depends_on
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut clmap = BTreeMap::new();
        for cond in &conds {
            let mut levels = BTreeSet::new();
            for trial in trials {
                let level = trial.cond(cond).ok_or_else(|| {
                    RaddError::data(format!("trial data has no condition column '{}'", cond))
                })?;
                levels.insert(level.to_string());
            }
            if levels.is_empty() {
                return Err(RaddError::data(format!(
                    "condition column '{}' has no levels",
                    cond
                )));
            }
            clmap.insert(cond.clone(), levels.into_iter().collect::<Vec<_>>());
        }

        let level_lists: Vec<&Vec<String>> = conds.iter().map(|c| &clmap[c]).collect();
        let levels = cartesian(&level_lists);
        let nlevels = levels.len();

        let mut conditions = Self {
            is_flat: depends_on.is_empty(),
            depends_on,
            conds,
            clmap,
            levels,
            nlevels,
            pcmap: BTreeMap::new(),
            param_index: BTreeMap::new(),
        };
        conditions.format_pcmap();
        Ok(conditions)
    }

    pub fn flat() -> Self {
        Self {
            depends_on: DependsOn::new(),
            conds: Vec::new(),
            clmap: BTreeMap::new(),
            levels: vec![Vec::new()],
            nlevels: 1,
            is_flat: true,
            pcmap: BTreeMap::new(),
            param_index: BTreeMap::new(),
        }
    }

    fn format_pcmap(&mut self) {
        let mut pcmap = BTreeMap::new();
        let mut param_index = BTreeMap::new();
        for (&param, pconds) in &self.depends_on {
            let own: Vec<&Vec<String>> = pconds.iter().map(|c| &self.clmap[c]).collect();
            let own_levels = cartesian(&own);
            pcmap.insert(
                param,
                own_levels
                    .iter()
                    .map(|lvls| format!("{}_{}", param.as_str(), lvls.join("_")))
                    .collect(),
            );

            let positions: Vec<usize> = pconds
                .iter()
                .filter_map(|c| self.conds.iter().position(|x| x == c))
                .collect();
            let index = self
                .levels
                .iter()
                .map(|level| {
                    let projected: Vec<&String> = positions.iter().map(|&i| &level[i]).collect();
                    own_levels
                        .iter()
                        .position(|o| o.iter().zip(&projected).all(|(a, b)| a == *b))
                        .unwrap_or(0)
                })
                .collect();
            param_index.insert(param, index);
        }
        self.pcmap = pcmap;
        self.param_index = param_index;
    }

    pub fn pcmap(&self) -> &BTreeMap<Param, Vec<String>> {
        &self.pcmap
    }

    /// Index into `param`'s own values for full level `level`.
    pub fn param_level_index(&self, param: Param, level: usize) -> usize {
        self.param_index
            .get(&param)
            .and_then(|idx| idx.get(level).copied())
            .unwrap_or(0)
    }

    pub fn level_index(&self) -> LevelIndex {
        LevelIndex {
            index: self.param_index.clone(),
        }
    }

    pub fn level_names(&self) -> Vec<String> {
        if self.is_flat {
            return vec![FLAT.to_string()];
        }
        self.levels.iter().map(|l| l.join("_")).collect()
    }

    pub fn level_of(&self, trial: &Trial) -> Option<usize> {
        if self.is_flat {
            return Some(0);
        }
        self.levels.iter().position(|level| {
            self.conds
                .iter()
                .zip(level)
                .all(|(cond, value)| trial.cond(cond) == Some(value.as_str()))
        })
    }
}

/// Per-level lookup of each conditional parameter's own index, handed to the simulator.
#[derive(Debug, Clone, Default)]
pub struct LevelIndex {
    index: BTreeMap<Param, Vec<usize>>,
}

impl LevelIndex {
    pub fn get(&self, param: Param, level: usize) -> usize {
        self.index
            .get(&param)
            .and_then(|idx| idx.get(level).copied())
            .unwrap_or(0)
    }
}

fn cartesian(lists: &[&Vec<String>]) -> Vec<Vec<String>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut next = prefix.clone();
                    next.push(item.clone());
                    next
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TrialType;

    fn trial(cond: &str, block: &str) -> Trial {
        Trial {
            idx: "1".to_string(),
            ttype: TrialType::Go,
            ssd: None,
            response: true,
            acc: true,
            rt: Some(0.5),
            conds: [
                ("cond".to_string(), cond.to_string()),
                ("block".to_string(), block.to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn trials() -> Vec<Trial> {
        vec![
            trial("bsl", "1"),
            trial("pnl", "1"),
            trial("bsl", "2"),
            trial("pnl", "3"),
        ]
    }

    #[test]
    fn test_flat_conditions() {
        let conditions = Conditions::new(DependsOn::new(), &trials()).unwrap();
        assert!(conditions.is_flat);
        assert_eq!(conditions.nlevels, 1);
        assert_eq!(conditions.level_names(), vec!["flat"]);
        assert!(conditions.pcmap().is_empty());
    }

    #[test]
    fn test_single_condition_pcmap() {
        let mut depends_on = DependsOn::new();
        depends_on.insert(Param::V, vec!["cond".to_string()]);
        let conditions = Conditions::new(depends_on, &trials()).unwrap();

        assert_eq!(conditions.nlevels, 2);
        assert_eq!(conditions.clmap["cond"], vec!["bsl", "pnl"]);
        assert_eq!(conditions.pcmap()[&Param::V], vec!["v_bsl", "v_pnl"]);
        assert_eq!(conditions.level_of(&trial("pnl", "2")), Some(1));
    }

    #[test]
    fn test_projection_onto_parameter_levels() {
        let mut depends_on = DependsOn::new();
        depends_on.insert(Param::V, vec!["cond".to_string()]);
        depends_on.insert(Param::A, vec!["block".to_string()]);
        let conditions = Conditions::new(depends_on, &trials()).unwrap();

        // conds sorted: block, cond -> 3 x 2 levels, block slowest
        assert_eq!(conditions.conds, vec!["block", "cond"]);
        assert_eq!(conditions.nlevels, 6);
        assert_eq!(conditions.level_names()[3], "2_pnl");
        assert_eq!(conditions.param_level_index(Param::V, 3), 1);
        assert_eq!(conditions.param_level_index(Param::A, 3), 1);
        assert_eq!(conditions.param_level_index(Param::Tr, 3), 0);
        assert_eq!(conditions.pcmap()[&Param::A], vec!["a_1", "a_2", "a_3"]);
    }

    #[test]
    fn test_missing_condition_column() {
        let mut depends_on = DependsOn::new();
        depends_on.insert(Param::V, vec!["pgo".to_string()]);
        assert!(Conditions::new(depends_on, &trials()).is_err());
    }

    #[test]
    fn test_parse_depends_on_and_model_id() {
        let mut raw = BTreeMap::new();
        raw.insert("all".to_string(), vec!["flat".to_string()]);
        let depends_on = parse_depends_on(&raw).unwrap();
        assert!(depends_on.is_empty());
        let kind: ModelKind = "xdpm".parse().unwrap();
        assert_eq!(
            generate_model_id(kind, &depends_on, FitOn::Average, None),
            "xdpm_flat_avg"
        );

        let mut raw = BTreeMap::new();
        raw.insert("v".to_string(), vec!["cond".to_string()]);
        let depends_on = parse_depends_on(&raw).unwrap();
        assert_eq!(
            generate_model_id(kind, &depends_on, FitOn::Subjects, Some("boot")),
            "xdpm_v_idx_boot"
        );
    }
}
