//! Model parameters: names, bounds, initial values and random sampling.
//!
//! | param | meaning                                   |
//! |-------|-------------------------------------------|
//! | `a`   | go (and race stop) decision boundary      |
//! | `tr`  | non-decision time of the go process       |
//! | `v`   | go drift rate                             |
//! | `ssv` | stop drift rate (negative for dpm)        |
//! | `z`   | go starting point (dpm only)              |
//! | `xb`  | temporal gain of the go drift (`x` kinds) |
//! | `si`  | diffusion noise                           |
//! | `sso` | stop onset delay after the stop signal    |

use crate::models::conditions::DependsOn;
use crate::models::kind::ModelKind;
use crate::utils::error::{RaddError, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Redraws per variate before falling back to a uniform draw over the bounds.
const MAX_REDRAWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    A,
    Tr,
    V,
    Ssv,
    Z,
    Xb,
    Si,
    Sso,
}

impl Param {
    pub const ALL: [Param; 8] = [
        Param::A,
        Param::Tr,
        Param::V,
        Param::Ssv,
        Param::Z,
        Param::Xb,
        Param::Si,
        Param::Sso,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Param::A => "a",
            Param::Tr => "tr",
            Param::V => "v",
            Param::Ssv => "ssv",
            Param::Z => "z",
            Param::Xb => "xb",
            Param::Si => "si",
            Param::Sso => "sso",
        }
    }

    /// Relative size of basin hopping steps for this parameter.
    pub fn stepsize_scalar(self) -> f64 {
        match self {
            Param::A => 0.5,
            Param::Tr => 0.1,
            Param::V => 1.5,
            Param::Ssv => 1.5,
            Param::Z => 0.1,
            Param::Xb => 1.5,
            Param::Si => 0.1,
            Param::Sso => 0.1,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Param {
    type Err = RaddError;

    fn from_str(s: &str) -> Result<Self> {
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| RaddError::param(s, "unknown parameter name"))
    }
}

pub type Bounds = (f64, f64);

pub fn bounds_for(param: Param, kind: ModelKind) -> Bounds {
    match param {
        Param::A => (0.05, 1.5),
        Param::Tr => (0.01, 0.5),
        Param::V => (0.1, 5.0),
        Param::Ssv if kind.is_race() => (0.1, 5.0),
        Param::Ssv => (-5.0, -0.1),
        Param::Z => (0.01, 0.79),
        Param::Xb => (0.1, 5.0),
        Param::Si => (0.001, 0.2),
        Param::Sso => (0.01, 0.5),
    }
}

/// Search space limits for every parameter under `kind`.
pub fn get_bounds(kind: ModelKind) -> BTreeMap<Param, Bounds> {
    Param::ALL
        .iter()
        .map(|&p| (p, bounds_for(p, kind)))
        .collect()
}

/// Parameter values. A vector of length one applies to every level;
/// longer vectors hold one value per level of the parameter's own conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Theta {
    values: BTreeMap<Param, Vec<f64>>,
}

impl Theta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scalars<I: IntoIterator<Item = (Param, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(p, v)| (p, vec![v])).collect(),
        }
    }

    pub fn insert(&mut self, param: Param, values: Vec<f64>) {
        self.values.insert(param, values);
    }

    pub fn set_scalar(&mut self, param: Param, value: f64) {
        self.values.insert(param, vec![value]);
    }

    pub fn remove(&mut self, param: Param) -> Option<Vec<f64>> {
        self.values.remove(&param)
    }

    pub fn contains(&self, param: Param) -> bool {
        self.values.contains_key(&param)
    }

    pub fn values(&self, param: Param) -> Option<&[f64]> {
        self.values.get(&param).map(Vec::as_slice)
    }

    /// Value of `param` at `index`, broadcasting single values.
    pub fn get(&self, param: Param, index: usize) -> Option<f64> {
        let values = self.values.get(&param)?;
        match values.len() {
            0 => None,
            1 => Some(values[0]),
            _ => values.get(index).copied(),
        }
    }

    pub fn scalar(&self, param: Param) -> Option<f64> {
        self.get(param, 0)
    }

    pub fn keys(&self) -> Vec<Param> {
        self.values.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Param, &Vec<f64>)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Collapses every vector to its mean.
    pub fn scalarize(&self) -> Theta {
        Theta {
            values: self
                .values
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(&p, v)| (p, vec![v.iter().sum::<f64>() / v.len() as f64]))
                .collect(),
        }
    }

    pub fn check_bounds(&self, kind: ModelKind) -> Result<()> {
        for (&param, values) in &self.values {
            let (lo, hi) = bounds_for(param, kind);
            if let Some(v) = values.iter().find(|v| !(lo..=hi).contains(*v)) {
                return Err(RaddError::param(
                    param.as_str(),
                    format!("value {} outside bounds [{}, {}]", v, lo, hi),
                ));
            }
        }
        Ok(())
    }
}

/// Initial parameters used when none are provided.
pub fn get_default_inits(kind: ModelKind, ssdelay: bool) -> Theta {
    let mut inits = Theta::from_scalars([
        (Param::A, 0.5),
        (Param::V, 1.2),
        (Param::Xb, 1.5),
        (Param::Tr, 0.2),
    ]);
    if kind.is_dpm() {
        inits.set_scalar(Param::Ssv, -1.0);
    } else if kind.is_race() {
        inits.set_scalar(Param::Ssv, 1.0);
    }
    if ssdelay {
        inits.set_scalar(Param::Sso, 0.15);
    }
    inits
}

/// Adapts user inits to `kind`: sign of `ssv`, presence of `z`, `xb` and `si`.
pub fn check_inits(mut inits: Theta, depends_on: &DependsOn, kind: ModelKind) -> Theta {
    if let Some(ssv) = inits.remove(Param::Ssv) {
        if kind.is_race() {
            inits.insert(Param::Ssv, ssv.iter().map(|v| v.abs()).collect());
        } else if kind.is_dpm() {
            inits.insert(Param::Ssv, ssv.iter().map(|v| -v.abs()).collect());
        }
    }
    if kind.dynamic && !inits.contains(Param::Xb) {
        inits.set_scalar(Param::Xb, 1.5);
    }
    if depends_on.contains_key(&Param::Si) && !inits.contains(Param::Si) {
        inits.set_scalar(Param::Si, 0.01);
    }
    if !kind.is_dpm() {
        inits.remove(Param::Z);
    }
    if !kind.dynamic {
        inits.remove(Param::Xb);
    }
    if !kind.has_stop_process() {
        inits.remove(Param::Sso);
    }
    inits
}

enum Prior {
    Normal(Normal<f64>),
    Gamma { dist: Gamma<f64>, loc: f64 },
    Uniform(Uniform<f64>),
}

impl Prior {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Prior::Normal(dist) => dist.sample(rng),
            Prior::Gamma { dist, loc } => loc + dist.sample(rng),
            Prior::Uniform(dist) => dist.sample(rng),
        }
    }
}

fn prior_for(param: Param, kind: ModelKind) -> Result<Prior> {
    let race = kind.is_race();
    let mu = match param {
        Param::A => Some(0.2),
        Param::Tr => Some(0.02),
        Param::V => Some(1.0),
        Param::Ssv if race => Some(1.0),
        Param::Ssv => Some(-1.0),
        Param::Z => Some(0.1),
        Param::Xb => Some(1.0),
        Param::Sso => Some(0.15),
        Param::Si => None,
    };
    let sigma = match param {
        Param::A => 0.3,
        Param::Tr => 0.2,
        Param::V => 0.3,
        Param::Ssv if race => 1.0,
        Param::Ssv => 0.3,
        Param::Z => 0.05,
        Param::Xb => 0.5,
        Param::Sso => 0.01,
        Param::Si => 0.0,
    };
    let invalid = |e: &dyn fmt::Display| RaddError::param(param.as_str(), e.to_string());

    match (param, mu) {
        (Param::A, Some(loc)) => Ok(Prior::Gamma {
            dist: Gamma::new(0.8, sigma).map_err(|e| invalid(&e))?,
            loc,
        }),
        (_, Some(loc)) => Ok(Prior::Normal(
            Normal::new(loc, sigma).map_err(|e| invalid(&e))?,
        )),
        (_, None) => {
            let (lo, hi) = bounds_for(param, kind);
            Ok(Prior::Uniform(
                Uniform::new_inclusive(lo, hi).map_err(|e| invalid(&e))?,
            ))
        }
    }
}

/// Draws `n` values of `param` from its prior, truncated to the bounds.
pub fn init_distributions<R: Rng + ?Sized>(
    param: Param,
    kind: ModelKind,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let (lo, hi) = bounds_for(param, kind);
    let prior = prior_for(param, kind)?;
    let fallback = Uniform::new_inclusive(lo, hi)
        .map_err(|e| RaddError::param(param.as_str(), e.to_string()))?;

    let mut draws = Vec::with_capacity(n);
    for _ in 0..n {
        let mut value = prior.sample(rng);
        let mut redraws = 0;
        while !(lo..=hi).contains(&value) {
            if redraws == MAX_REDRAWS {
                value = fallback.sample(rng);
                break;
            }
            value = prior.sample(rng);
            redraws += 1;
        }
        if param == Param::Tr {
            value = value.abs();
        }
        draws.push(value);
    }
    Ok(draws)
}

/// `n` random parameter sets over `keys`.
pub fn random_inits<R: Rng + ?Sized>(
    keys: &[Param],
    n: usize,
    kind: ModelKind,
    rng: &mut R,
) -> Result<Vec<Theta>> {
    let mut columns = BTreeMap::new();
    for &key in keys {
        columns.insert(key, init_distributions(key, kind, n, rng)?);
    }
    Ok((0..n)
        .map(|i| Theta::from_scalars(columns.iter().map(|(&p, draws)| (p, draws[i]))))
        .collect())
}

/// Stepsize scalars in key-major order, each repeated `nlevels` times.
pub fn get_stepsize_scalars(keys: &[Param], nlevels: usize) -> Vec<f64> {
    keys.iter()
        .flat_map(|k| std::iter::repeat(k.stepsize_scalar()).take(nlevels))
        .collect()
}

/// Lower and upper bounds in key-major order, each repeated `nlevels` times.
pub fn format_basinhopping_bounds(
    keys: &[Param],
    nlevels: usize,
    kind: ModelKind,
) -> (Vec<f64>, Vec<f64>) {
    let mut xmin = Vec::with_capacity(keys.len() * nlevels);
    let mut xmax = Vec::with_capacity(keys.len() * nlevels);
    for &key in keys {
        let (lo, hi) = bounds_for(key, kind);
        xmin.extend(std::iter::repeat(lo).take(nlevels));
        xmax.extend(std::iter::repeat(hi).take(nlevels));
    }
    (xmin, xmax)
}

/// Across-trial variability of non-decision time (`st`), starting point
/// (`sz`) and drift (`sv`). These are held fixed during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Intervar {
    pub st: Option<f64>,
    pub sz: Option<f64>,
    pub sv: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervarRanges {
    pub t: Option<Bounds>,
    pub z: Option<Bounds>,
}

/// Per-trial go parameters after applying across-trial variability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialParams {
    pub tr: f64,
    pub z: f64,
    pub v: f64,
}

impl Intervar {
    pub fn is_empty(&self) -> bool {
        self.st.is_none() && self.sz.is_none() && self.sv.is_none()
    }

    pub fn get_intervar_ranges(&self, tr: f64, z: f64) -> IntervarRanges {
        IntervarRanges {
            t: self.st.map(|st| (tr - st / 2.0, tr + st / 2.0)),
            z: self.sz.map(|sz| (z - sz / 2.0, z + sz / 2.0)),
        }
    }

    pub fn update_params<R: Rng + ?Sized>(&self, base: TrialParams, rng: &mut R) -> TrialParams {
        let ranges = self.get_intervar_ranges(base.tr, base.z);
        let mut out = base;
        if let Some((lo, hi)) = ranges.t {
            out.tr = lo + rng.random::<f64>() * (hi - lo);
        }
        if let Some((lo, hi)) = ranges.z {
            out.z = lo + rng.random::<f64>() * (hi - lo);
        }
        if let Some(sv) = self.sv {
            let noise: f64 = rng.sample(rand_distr::StandardNormal);
            out.v = sv * noise + base.v;
        }
        out
    }
}

#[derive(Debug, Clone)]
struct LayoutEntry {
    param: Param,
    names: Vec<String>,
}

/// Maps between optimizer vectors and [`Theta`].
///
/// Flat layouts vary every parameter with a single value. Conditional layouts
/// vary only the parameters in `depends_on`, one value per level of their
/// own conditions, and hold the rest at the flat optimum.
#[derive(Debug, Clone)]
pub struct ParamLayout {
    kind: ModelKind,
    entries: Vec<LayoutEntry>,
    fixed: Theta,
}

impl ParamLayout {
    pub fn flat(keys: &[Param], kind: ModelKind) -> Self {
        Self {
            kind,
            entries: keys
                .iter()
                .map(|&param| LayoutEntry {
                    param,
                    names: vec![param.as_str().to_string()],
                })
                .collect(),
            fixed: Theta::new(),
        }
    }

    pub fn conditional(
        pcmap: &BTreeMap<Param, Vec<String>>,
        flat_popt: &Theta,
        kind: ModelKind,
    ) -> Self {
        let mut fixed = flat_popt.scalarize();
        let entries = pcmap
            .iter()
            .map(|(&param, names)| {
                fixed.remove(param);
                LayoutEntry {
                    param,
                    names: names.clone(),
                }
            })
            .collect();
        Self {
            kind,
            entries,
            fixed,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.names.iter().cloned())
            .collect()
    }

    pub fn varying(&self) -> Vec<Param> {
        self.entries.iter().map(|e| e.param).collect()
    }

    pub fn fixed(&self) -> &Theta {
        &self.fixed
    }

    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut xmin = Vec::with_capacity(self.len());
        let mut xmax = Vec::with_capacity(self.len());
        for entry in &self.entries {
            let (lo, hi) = bounds_for(entry.param, self.kind);
            xmin.extend(std::iter::repeat(lo).take(entry.names.len()));
            xmax.extend(std::iter::repeat(hi).take(entry.names.len()));
        }
        (xmin, xmax)
    }

    pub fn stepsize_scalars(&self) -> Vec<f64> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::repeat(e.param.stepsize_scalar()).take(e.names.len()))
            .collect()
    }

    pub fn to_theta(&self, x: &[f64]) -> Theta {
        let mut theta = self.fixed.clone();
        let mut offset = 0;
        for entry in &self.entries {
            let n = entry.names.len();
            theta.insert(entry.param, x[offset..offset + n].to_vec());
            offset += n;
        }
        theta
    }

    /// Optimizer vector for `theta`, broadcasting single values across levels.
    pub fn from_theta(&self, theta: &Theta) -> Result<Vec<f64>> {
        let mut x = Vec::with_capacity(self.len());
        for entry in &self.entries {
            for i in 0..entry.names.len() {
                let value = theta.get(entry.param, i).ok_or_else(|| {
                    RaddError::param(entry.param.as_str(), "missing from parameter set")
                })?;
                x.push(value);
            }
        }
        Ok(x)
    }

    /// Named values for writing `popt`: conditional names plus fixed scalars.
    pub fn named_values(&self, theta: &Theta) -> BTreeMap<String, f64> {
        let mut named = BTreeMap::new();
        for entry in &self.entries {
            for (i, name) in entry.names.iter().enumerate() {
                if let Some(v) = theta.get(entry.param, i) {
                    named.insert(name.clone(), v);
                }
            }
        }
        for (param, values) in self.fixed.iter() {
            if let Some(&v) = values.first() {
                named.insert(param.as_str().to_string(), v);
            }
        }
        named
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn kind(s: &str) -> ModelKind {
        s.parse().unwrap()
    }

    #[test]
    fn test_race_kinds_flip_ssv_bounds() {
        assert_eq!(bounds_for(Param::Ssv, kind("xdpm")), (-5.0, -0.1));
        assert_eq!(bounds_for(Param::Ssv, kind("irace")), (0.1, 5.0));
        assert_eq!(get_bounds(kind("iact"))[&Param::Ssv], (0.1, 5.0));
    }

    #[test]
    fn test_default_inits() {
        let inits = get_default_inits(kind("xdpm"), false);
        assert_eq!(inits.scalar(Param::A), Some(0.5));
        assert_eq!(inits.scalar(Param::Ssv), Some(-1.0));
        assert!(!inits.contains(Param::Sso));

        let inits = get_default_inits(kind("race"), true);
        assert_eq!(inits.scalar(Param::Ssv), Some(1.0));
        assert_eq!(inits.scalar(Param::Sso), Some(0.15));
    }

    #[test]
    fn test_check_inits_adapts_to_kind() {
        let inits = Theta::from_scalars([
            (Param::A, 0.4),
            (Param::Ssv, -1.2),
            (Param::Z, 0.1),
            (Param::Xb, 1.0),
        ]);
        let checked = check_inits(inits.clone(), &DependsOn::new(), kind("race"));
        assert_eq!(checked.scalar(Param::Ssv), Some(1.2));
        assert!(!checked.contains(Param::Z));
        assert!(!checked.contains(Param::Xb));

        let checked = check_inits(inits.clone(), &DependsOn::new(), kind("xdpm"));
        assert_eq!(checked.scalar(Param::Ssv), Some(-1.2));
        assert!(checked.contains(Param::Z));
        assert_eq!(checked.scalar(Param::Xb), Some(1.0));

        let checked = check_inits(inits, &DependsOn::new(), kind("pro"));
        assert!(!checked.contains(Param::Ssv));
    }

    #[test]
    fn test_check_inits_adds_conditional_si() {
        let mut depends_on = DependsOn::new();
        depends_on.insert(Param::Si, vec!["cond".to_string()]);
        let checked = check_inits(Theta::new(), &depends_on, kind("xdpm"));
        assert_eq!(checked.scalar(Param::Si), Some(0.01));
        assert_eq!(checked.scalar(Param::Xb), Some(1.5));
    }

    #[test]
    fn test_init_distributions_respect_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        for k in ["xdpm", "race"] {
            for param in Param::ALL {
                let draws = init_distributions(param, kind(k), 200, &mut rng).unwrap();
                let (lo, hi) = bounds_for(param, kind(k));
                assert_eq!(draws.len(), 200);
                assert!(draws.iter().all(|v| *v >= lo && *v <= hi), "{} {}", k, param);
            }
        }
    }

    #[test]
    fn test_random_inits_shape() {
        let mut rng = SmallRng::seed_from_u64(1);
        let keys = [Param::A, Param::Tr, Param::V];
        let sets = random_inits(&keys, 5, kind("xdpm"), &mut rng).unwrap();
        assert_eq!(sets.len(), 5);
        assert!(sets.iter().all(|t| t.keys() == keys.to_vec()));
    }

    #[test]
    fn test_stepsizes_and_bounds_are_key_major() {
        let keys = [Param::A, Param::V];
        assert_eq!(get_stepsize_scalars(&keys, 2), vec![0.5, 0.5, 1.5, 1.5]);
        let (xmin, xmax) = format_basinhopping_bounds(&keys, 2, kind("dpm"));
        assert_eq!(xmin, vec![0.05, 0.05, 0.1, 0.1]);
        assert_eq!(xmax, vec![1.5, 1.5, 5.0, 5.0]);
    }

    #[test]
    fn test_intervar_ranges() {
        let iv = Intervar {
            st: Some(0.1),
            sz: None,
            sv: None,
        };
        let ranges = iv.get_intervar_ranges(0.2, 0.0);
        let (lo, hi) = ranges.t.unwrap();
        assert!((lo - 0.15).abs() < 1e-12 && (hi - 0.25).abs() < 1e-12);
        assert!(ranges.z.is_none());

        let mut rng = SmallRng::seed_from_u64(3);
        let base = TrialParams { tr: 0.2, z: 0.0, v: 1.0 };
        for _ in 0..50 {
            let p = iv.update_params(base, &mut rng);
            assert!(p.tr >= 0.15 && p.tr <= 0.25);
            assert_eq!(p.v, 1.0);
        }
    }

    #[test]
    fn test_conditional_layout() {
        let flat = Theta::from_scalars([(Param::A, 0.4), (Param::V, 1.1), (Param::Tr, 0.25)]);
        let mut pcmap = BTreeMap::new();
        pcmap.insert(Param::V, vec!["v_bsl".to_string(), "v_pnl".to_string()]);
        let layout = ParamLayout::conditional(&pcmap, &flat, kind("dpm"));

        assert_eq!(layout.len(), 2);
        assert_eq!(layout.names(), vec!["v_bsl", "v_pnl"]);
        assert_eq!(layout.from_theta(&flat).unwrap(), vec![1.1, 1.1]);

        let theta = layout.to_theta(&[0.9, 1.3]);
        assert_eq!(theta.values(Param::V), Some(&[0.9, 1.3][..]));
        assert_eq!(theta.scalar(Param::A), Some(0.4));

        let named = layout.named_values(&theta);
        assert_eq!(named["v_pnl"], 1.3);
        assert_eq!(named["tr"], 0.25);
        assert!(!named.contains_key("v"));
    }
}
