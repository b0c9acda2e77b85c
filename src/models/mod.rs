pub mod conditions;
pub mod kind;
pub mod simulator;
pub mod theta;

use serde::{Deserialize, Serialize};

pub use conditions::{Conditions, DependsOn};
pub use kind::ModelKind;
pub use simulator::Simulator;
pub use theta::{Param, Theta};

/// Fit the group-average data once, or every subject separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitOn {
    #[default]
    Average,
    Subjects,
}
