use anyhow::Result;
use clap::Parser;
use radd::core::data::write_trials;
use radd::core::results::{read_fits, read_params};
use radd::core::synthetic::{simulate_dataset, SyntheticSettings};
use radd::{CliConfig, FitEngine, FitPipeline, LocalStorage, Param, RaddError, Theta, TomlConfig};
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn theta(v: f64) -> Theta {
    Theta::from_scalars([
        (Param::A, 0.4),
        (Param::Tr, 0.25),
        (Param::V, v),
        (Param::Ssv, -1.2),
        (Param::Z, 0.1),
    ])
}

fn write_dataset(dir: &Path, levels: &[(&str, f64)]) -> Result<String> {
    let mut settings = SyntheticSettings::flat("dpm".parse()?, theta(1.1), vec![0.2, 0.3]);
    if !levels.is_empty() {
        settings.levels = levels
            .iter()
            .map(|(name, v)| (name.to_string(), theta(*v)))
            .collect();
    }
    settings.ntrials = 400;
    settings.nsubjects = Some(2);
    settings.trials_per_cell = 30;

    let trials = simulate_dataset(&settings)?;
    let path = dir.join("trials.csv");
    std::fs::write(&path, write_trials(&trials)?)?;
    Ok(path.to_string_lossy().to_string())
}

fn quick_args<'a>(data: &'a str, output: &'a str) -> Vec<&'a str> {
    vec![
        "radd",
        data,
        "--output-path",
        output,
        "--kind",
        "dpm",
        "--ntrials",
        "400",
        "--nsamples",
        "6",
        "--ninits",
        "1",
        "--niter",
        "2",
        "--maxfev",
        "30",
        "--keep-outliers",
    ]
}

#[tokio::test]
async fn test_flat_fit_writes_every_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = write_dataset(temp_dir.path(), &[])?;
    let output = temp_dir.path().join("out");
    let output = output.to_string_lossy().to_string();

    let mut args = quick_args(&data, &output);
    args.extend(["--outputs", "popt,fits,finfo,simdf,report"]);
    let config = CliConfig::parse_from(args);

    let storage = LocalStorage::new(output.clone());
    let engine = FitEngine::new(FitPipeline::new(storage, config));
    let output_path = engine.run().await?;
    assert_eq!(output_path, output);

    let out = Path::new(&output);
    let popt = read_params(&std::fs::read(out.join("dpm_flat_avg_popt.csv"))?)?;
    let avg = &popt["avg"];
    for name in ["a", "tr", "v", "ssv"] {
        assert!(avg.contains_key(name), "missing {}", name);
    }
    assert!(avg["a"] > 0.0 && avg["a"] <= 1.5);

    let fits = read_fits(&std::fs::read(out.join("dpm_flat_avg_fits.csv"))?)?;
    assert!(!fits.is_empty());
    assert!(fits.iter().all(|row| row.yhat.is_finite()));

    let finfo = std::fs::read_to_string(out.join("dpm_flat_avg_finfo.csv"))?;
    assert!(finfo.contains("AIC"));

    let simdf = std::fs::read_to_string(out.join("dpm_flat_avg_simdf.csv"))?;
    assert!(simdf.lines().count() > 400);

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("dpm_flat_avg_report.json"))?)?;
    assert_eq!(report["kind"], "dpm");
    Ok(())
}

#[tokio::test]
async fn test_conditional_fit_names_levels() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = write_dataset(temp_dir.path(), &[("hi", 1.4), ("lo", 0.9)])?;
    let output = temp_dir.path().join("out");
    let output = output.to_string_lossy().to_string();

    let mut args = quick_args(&data, &output);
    args.extend(["--depends-on", "v=cond", "--outputs", "popt"]);
    let config = CliConfig::parse_from(args);

    let engine = FitEngine::new(FitPipeline::new(LocalStorage::new(output.clone()), config));
    engine.run().await?;

    let popt = read_params(&std::fs::read(Path::new(&output).join("dpm_v_avg_popt.csv"))?)?;
    let avg = &popt["avg"];
    assert!(avg.contains_key("v_hi"));
    assert!(avg.contains_key("v_lo"));
    assert!(!avg.contains_key("v"));
    Ok(())
}

#[tokio::test]
async fn test_toml_config_writes_zip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = write_dataset(temp_dir.path(), &[])?;
    let output = temp_dir.path().join("zipped");
    let output = output.to_string_lossy().to_string();

    let content = format!(
        r#"
[project]
name = "integration"

[data]
path = "{data}"

[model]
kind = "dpm"
outlier_sd = 0.0

[fit]
ntrials = 400
maxfev = 30
maxiter = 30

[basin]
nsamples = 6
ninits = 1
niter = 2
maxiter = 2

[output]
path = "{output}"
outputs = ["popt", "finfo"]
compress = true
"#
    );
    let config = TomlConfig::from_toml_str(&content)?;

    let engine = FitEngine::new_with_monitoring(
        FitPipeline::new(LocalStorage::new(output.clone()), config),
        false,
    );
    let output_path = engine.run().await?;
    assert!(output_path.ends_with("dpm_flat_avg.zip"));

    let zip_data = std::fs::read(Path::new(&output).join("dpm_flat_avg.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    assert_eq!(archive.len(), 2);

    let mut popt = String::new();
    archive.by_name("dpm_flat_avg_popt.csv")?.read_to_string(&mut popt)?;
    assert!(popt.starts_with("idx,name,value"));
    Ok(())
}

#[tokio::test]
async fn test_missing_data_file_is_an_io_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let missing = temp_dir.path().join("missing.csv");
    let missing = missing.to_string_lossy().to_string();
    let output = temp_dir.path().to_string_lossy().to_string();

    let config = CliConfig::parse_from(quick_args(&missing, &output));
    let engine = FitEngine::new(FitPipeline::new(LocalStorage::new(output.clone()), config));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, RaddError::IoError(_)));
    assert_eq!(err.severity().exit_code(), 3);
    Ok(())
}
