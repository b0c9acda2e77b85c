//! Model kinds.
//!
//! A kind string is an optional `x` prefix followed by an architecture:
//!
//! - `dpm`: dependent process model. The stop process starts from the current
//!   state of the go accumulator and drives it back toward zero.
//! - `race` / `irace`: independent race between a go and a stop accumulator.
//! - `iact`: interactive race. Once active, the stop accumulator inhibits go.
//! - `pro`: proactive go/no-go, go process only.
//!
//! The `x` prefix adds the temporal gain `cosh(xb·t)` to go drift, the
//! growing urgency of the direct pathway.

use crate::utils::error::{RaddError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Dpm,
    Race,
    IRace,
    Iact,
    Pro,
}

impl Architecture {
    fn as_str(self) -> &'static str {
        match self {
            Architecture::Dpm => "dpm",
            Architecture::Race => "race",
            Architecture::IRace => "irace",
            Architecture::Iact => "iact",
            Architecture::Pro => "pro",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKind {
    pub architecture: Architecture,
    pub dynamic: bool,
}

impl ModelKind {
    pub fn new(architecture: Architecture, dynamic: bool) -> Self {
        Self {
            architecture,
            dynamic,
        }
    }

    pub fn is_dpm(&self) -> bool {
        self.architecture == Architecture::Dpm
    }

    /// Kinds whose stop accumulator climbs toward `a` with positive drift.
    pub fn is_race(&self) -> bool {
        matches!(
            self.architecture,
            Architecture::Race | Architecture::IRace | Architecture::Iact
        )
    }

    pub fn is_interactive(&self) -> bool {
        self.architecture == Architecture::Iact
    }

    pub fn is_proactive(&self) -> bool {
        self.architecture == Architecture::Pro
    }

    pub fn has_stop_process(&self) -> bool {
        !self.is_proactive()
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::new(Architecture::Dpm, true)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dynamic {
            write!(f, "x")?;
        }
        write!(f, "{}", self.architecture.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = RaddError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let (dynamic, rest) = match lowered.strip_prefix('x') {
            Some(rest) => (true, rest),
            None => (false, lowered.as_str()),
        };
        let architecture = match rest {
            "dpm" => Architecture::Dpm,
            "race" => Architecture::Race,
            "irace" => Architecture::IRace,
            "iact" => Architecture::Iact,
            "pro" => Architecture::Pro,
            _ => {
                return Err(RaddError::InvalidConfigValueError {
                    field: "model.kind".to_string(),
                    value: s.to_string(),
                    reason: "Expected [x]dpm, [x]race, [x]irace, [x]iact or [x]pro".to_string(),
                })
            }
        };
        Ok(Self::new(architecture, dynamic))
    }
}

impl Serialize for ModelKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
