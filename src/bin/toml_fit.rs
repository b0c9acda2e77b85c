use clap::Parser;
use radd::config::toml_config::TomlConfig;
use radd::core::ConfigProvider;
use radd::utils::{logger, validation::Validate};
use radd::{FitEngine, FitPipeline, LocalStorage};

#[derive(Parser)]
#[command(name = "radd-toml")]
#[command(about = "Fit stop-signal models from a TOML configuration")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "radd.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Use the short testing settings regardless of the config
    #[arg(long)]
    testing: bool,

    /// Show the resolved settings without fitting
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    logger::init_logger(config.log_format(), args.verbose || config.verbose());
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if args.testing && config.testing.is_none() {
        config.testing = Some(Default::default());
        tracing::info!("🔧 Testing settings enabled from the command line");
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config, &args)?;

    if args.dry_run {
        println!("🔍 Dry run complete, no fit performed.");
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = FitPipeline::new(storage, config);
    let engine = FitEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Fit completed successfully!");
            println!("✅ Fit completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Fit failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            std::process::exit(e.severity().exit_code());
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) -> radd::Result<()> {
    let settings = config.fit_settings()?;

    println!("📋 Configuration Summary:");
    match &config.project.version {
        Some(version) => println!("  Project: {} v{}", config.project.name, version),
        None => println!("  Project: {}", config.project.name),
    }
    println!("  Data: {}", config.data_path());
    println!("  Output: {}", config.output_path());
    println!("  Kind: {}", settings.model.kind);
    if settings.model.depends_on.is_empty() {
        println!("  Depends on: flat");
    } else {
        for (param, conds) in &settings.model.depends_on {
            println!("  Depends on: {} -> {}", param, conds.join(", "));
        }
    }
    println!("  Fit on: {:?}", settings.model.fit_on);
    println!("  Global method: {:?}", settings.basin.method);
    println!("  Trials per level: {}", settings.fit.ntrials);
    println!("  Outputs: {}", config.output_formats().join(", "));
    if config.compress() {
        println!("  Compression: ZIP");
    }
    if settings.testing.is_some() {
        println!("  🧪 Testing settings");
    }
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
    Ok(())
}
