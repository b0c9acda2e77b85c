pub mod data;
pub mod engine;
pub mod model;
pub mod pipeline;
pub mod results;
pub mod synthetic;

pub use crate::domain::model::{FitOutput, Trial};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage, OUTPUT_KINDS};
pub use crate::utils::error::Result;
