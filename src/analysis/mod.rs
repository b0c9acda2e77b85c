pub mod bootstrap;
pub mod outliers;
pub mod quantiles;
pub mod summary;
pub mod weights;

pub use outliers::{estimate_timeboundary, remove_outliers};
pub use quantiles::mquantiles;
pub use summary::{ObservedData, SsdMethod, SummarySettings};
