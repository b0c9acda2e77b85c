use crate::core::data::read_trials;
use crate::core::model::{FitSettings, Model};
use crate::core::results::{
    bootstrap_rows, pandaify_results, write_finfo, write_fits, write_params, write_sim_rows,
};
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{FitOutput, SubjectFit, Trial};
use crate::utils::error::{RaddError, Result};
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Serialize)]
struct FitReport<'a> {
    model_id: &'a str,
    kind: &'a str,
    tb: f64,
    generated_at: DateTime<Utc>,
    fits: &'a [SubjectFit],
}

pub struct FitPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> FitPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    fn wants(&self, output: &str) -> bool {
        self.config.output_formats().iter().any(|f| f == output)
    }
}

/// Builds the model, fits it and simulates the fitted parameters.
pub fn run_fit(trials: Vec<Trial>, settings: FitSettings, simulate: bool) -> Result<FitOutput> {
    let mut model = Model::with_params(trials, settings.model, settings.fit, settings.basin)?;
    if let Some(testing) = settings.testing {
        model.set_testing_params(testing)?;
    }
    let fitted = model.fit()?;

    let mut simulated = Vec::new();
    if simulate {
        let level_names = model.conditions().level_names();
        for subject in &fitted {
            let sim = model.simulate(&subject.popt)?;
            simulated.extend(pandaify_results(
                &sim,
                model.tb(),
                &level_names,
                &subject.fit.idx,
            ));
        }
        if let Some(boot) = settings.bootstrap {
            let mut rng = SmallRng::seed_from_u64(model.fitparams().seed);
            simulated = bootstrap_rows(&simulated, boot.nsubjects, boot.ntrials, &mut rng);
        }
    }

    Ok(FitOutput {
        model_id: model.model_id().to_string(),
        kind: model.kind().to_string(),
        tb: model.tb(),
        fits: fitted.into_iter().map(|f| f.fit).collect(),
        simulated,
    })
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FitPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<Trial>> {
        tracing::debug!("Reading trial data from: {}", self.config.data_path());
        let bytes = self.storage.read_file(self.config.data_path()).await?;
        read_trials(&bytes)
    }

    async fn transform(&self, data: Vec<Trial>) -> Result<FitOutput> {
        let settings = self.config.fit_settings()?;
        let simulate = self.wants("simdf");

        // fitting is CPU bound; keep it off the async workers
        tokio::task::spawn_blocking(move || run_fit(data, settings, simulate))
            .await
            .map_err(|e| RaddError::ProcessingError {
                message: format!("fit task failed: {}", e),
            })?
    }

    async fn load(&self, result: FitOutput) -> Result<String> {
        let id = &result.model_id;
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        if self.wants("popt") {
            files.push((format!("{}_popt.csv", id), write_params(&result.fits)?));
        }
        if self.wants("fits") {
            files.push((format!("{}_fits.csv", id), write_fits(&result.fits)?));
        }
        if self.wants("finfo") {
            files.push((
                format!("{}_finfo.csv", id),
                write_finfo(&result.fits, &result.kind)?,
            ));
        }
        if self.wants("simdf") && !result.simulated.is_empty() {
            files.push((format!("{}_simdf.csv", id), write_sim_rows(&result.simulated)?));
        }
        if self.wants("report") {
            let report = FitReport {
                model_id: id,
                kind: &result.kind,
                tb: result.tb,
                generated_at: Utc::now(),
                fits: &result.fits,
            };
            files.push((
                format!("{}_report.json", id),
                serde_json::to_vec_pretty(&report)?,
            ));
        }

        if !self.config.compress() {
            for (name, data) in &files {
                tracing::debug!("Writing {} ({} bytes)", name, data.len());
                self.storage.write_file(name, data).await?;
            }
            return Ok(self.config.output_path().to_string());
        }

        tracing::debug!("Creating ZIP file with {} files", files.len());
        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, data) in &files {
                zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
                zip.write_all(data)?;
            }
            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        let zip_name = format!("{}.zip", id);
        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(&zip_name, &zip_data).await?;
        Ok(format!("{}/{}", self.config.output_path(), zip_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ModelSettings, TestingParams};
    use crate::optimize::BasinParams;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn put(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                RaddError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.put(path, data).await;
            Ok(())
        }
    }

    struct MockConfig {
        outputs: Vec<String>,
        compress: bool,
    }

    impl MockConfig {
        fn new(outputs: &[&str], compress: bool) -> Self {
            Self {
                outputs: outputs.iter().map(|s| s.to_string()).collect(),
                compress,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn data_path(&self) -> &str {
            "trials.csv"
        }

        fn output_path(&self) -> &str {
            "out"
        }

        fn output_formats(&self) -> &[String] {
            &self.outputs
        }

        fn compress(&self) -> bool {
            self.compress
        }

        fn fit_settings(&self) -> Result<FitSettings> {
            Ok(FitSettings {
                model: ModelSettings {
                    kind: "dpm".parse()?,
                    outlier_sd: None,
                    quantiles: vec![0.3, 0.5, 0.7],
                    ..Default::default()
                },
                basin: BasinParams {
                    niter: 2,
                    maxiter: 20,
                    progress: false,
                    ..Default::default()
                },
                testing: Some(TestingParams {
                    nsamples: 4,
                    ninits: 1,
                    maxfev: 20,
                    nsuccess: 1,
                    progress: false,
                    ..Default::default()
                }),
                ..Default::default()
            })
        }
    }

    fn trials_csv() -> String {
        let mut csv = String::from("idx,ttype,ssd,response,acc,rt\n");
        for i in 0..30 {
            csv.push_str(&format!("1,go,1000,1,1,{:.3}\n", 0.40 + 0.005 * i as f64));
        }
        for &ssd in &[0.2, 0.3] {
            csv.push_str(&format!("1,stop,{},0,1,\n", ssd));
            csv.push_str(&format!("1,stop,{},1,0,0.43\n", ssd));
        }
        csv
    }

    fn output() -> FitOutput {
        let settings = MockConfig::new(&[], false).fit_settings().unwrap();
        let trials = read_trials(trials_csv().as_bytes()).unwrap();
        let mut settings = settings;
        settings.fit.ntrials = 200;
        run_fit(trials, settings, true).unwrap()
    }

    #[tokio::test]
    async fn test_extract_reads_trials() {
        let storage = MockStorage::new();
        storage.put("trials.csv", trials_csv().as_bytes()).await;
        let pipeline = FitPipeline::new(storage, MockConfig::new(&[], false));

        let trials = pipeline.extract().await.unwrap();
        assert_eq!(trials.len(), 34);
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let pipeline = FitPipeline::new(MockStorage::new(), MockConfig::new(&[], false));
        let err = pipeline.extract().await.unwrap_err();
        assert!(matches!(err, RaddError::IoError(_)));
    }

    #[tokio::test]
    async fn test_load_writes_requested_files() {
        let storage = MockStorage::new();
        let pipeline = FitPipeline::new(
            storage.clone(),
            MockConfig::new(&["popt", "finfo", "simdf", "report"], false),
        );

        let path = pipeline.load(output()).await.unwrap();
        assert_eq!(path, "out");
        assert!(storage.get_file("dpm_flat_avg_popt.csv").await.is_some());
        assert!(storage.get_file("dpm_flat_avg_finfo.csv").await.is_some());
        assert!(storage.get_file("dpm_flat_avg_simdf.csv").await.is_some());
        assert!(storage.get_file("dpm_flat_avg_fits.csv").await.is_none());

        let report = storage.get_file("dpm_flat_avg_report.json").await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&report).unwrap();
        assert_eq!(json["model_id"], "dpm_flat_avg");
        assert!(json["generated_at"].is_string());
    }

    #[tokio::test]
    async fn test_load_compresses_into_zip() {
        let storage = MockStorage::new();
        let pipeline = FitPipeline::new(storage.clone(), MockConfig::new(&["popt", "fits"], true));

        let path = pipeline.load(output()).await.unwrap();
        assert_eq!(path, "out/dpm_flat_avg.zip");

        let zip_data = storage.get_file("dpm_flat_avg.zip").await.unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["dpm_flat_avg_fits.csv", "dpm_flat_avg_popt.csv"]);
    }
}
