use crate::core::model::FitSettings;
use crate::domain::model::{FitOutput, Trial};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Output files a run can produce.
pub const OUTPUT_KINDS: [&str; 5] = ["popt", "fits", "finfo", "simdf", "report"];

pub trait ConfigProvider: Send + Sync {
    fn data_path(&self) -> &str;
    fn output_path(&self) -> &str;
    /// Subset of [`OUTPUT_KINDS`] to write.
    fn output_formats(&self) -> &[String];
    /// Bundle every output into one zip archive.
    fn compress(&self) -> bool;
    fn fit_settings(&self) -> Result<FitSettings>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Trial>>;
    async fn transform(&self, data: Vec<Trial>) -> Result<FitOutput>;
    async fn load(&self, result: FitOutput) -> Result<String>;
}
