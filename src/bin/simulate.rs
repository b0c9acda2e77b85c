use clap::Parser;
use radd::core::data::write_trials;
use radd::core::synthetic::{simulate_dataset, SyntheticSettings};
use radd::core::Storage;
use radd::models::theta::get_default_inits;
use radd::utils::logger;
use radd::{LocalStorage, ModelKind, Param, RaddError, Theta};

#[derive(Parser, Debug)]
#[command(name = "radd-simulate")]
#[command(about = "Simulate stop-signal trial data from known parameters")]
struct Args {
    /// Model kind: dpm, race, irace, iact, pro, optionally prefixed with x
    #[arg(long, default_value = "xdpm")]
    kind: String,

    /// Parameter values as name=value, e.g. a=0.4,v=1.1
    #[arg(long, value_delimiter = ',')]
    params: Vec<String>,

    /// Conditions with their drift, as level=v, e.g. hi=1.3,lo=0.9
    #[arg(long, value_delimiter = ',')]
    levels: Vec<String>,

    /// Stop-signal delays in seconds
    #[arg(long, value_delimiter = ',', default_value = "0.2,0.25,0.3,0.35,0.4")]
    ssds: Vec<f64>,

    #[arg(long, default_value_t = 2000)]
    ntrials: usize,

    /// Response deadline in seconds
    #[arg(long, default_value_t = 0.65)]
    tb: f64,

    #[arg(long, default_value_t = 2016)]
    seed: u64,

    /// Resample into this many synthetic subjects
    #[arg(long)]
    nsubjects: Option<usize>,

    #[arg(long, default_value_t = 50)]
    trials_per_cell: usize,

    #[arg(short, long, default_value = "simulated_trials.csv")]
    output: String,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair(arg: &str, field: &str) -> radd::Result<(String, f64)> {
    let invalid = |reason: &str| RaddError::InvalidConfigValueError {
        field: field.to_string(),
        value: arg.to_string(),
        reason: reason.to_string(),
    };
    let (name, value) = arg.split_once('=').ok_or_else(|| invalid("Expected name=value"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| invalid("Value is not a number"))?;
    Ok((name.trim().to_string(), value))
}

fn settings(args: &Args) -> radd::Result<SyntheticSettings> {
    let kind: ModelKind = args.kind.parse()?;
    let mut theta: Theta = get_default_inits(kind, false);
    if kind.is_dpm() {
        theta.set_scalar(Param::Z, 0.1);
    }
    for arg in &args.params {
        let (name, value) = parse_pair(arg, "params")?;
        theta.set_scalar(name.parse()?, value);
    }

    let mut settings = SyntheticSettings::flat(kind, theta.clone(), args.ssds.clone());
    if !args.levels.is_empty() {
        settings.levels = args
            .levels
            .iter()
            .map(|arg| {
                let (level, v) = parse_pair(arg, "levels")?;
                let mut level_theta = theta.clone();
                level_theta.set_scalar(Param::V, v);
                Ok((level, level_theta))
            })
            .collect::<radd::Result<Vec<_>>>()?;
    }
    settings.ntrials = args.ntrials;
    settings.tb = args.tb;
    settings.seed = args.seed;
    settings.nsubjects = args.nsubjects;
    settings.trials_per_cell = args.trials_per_cell;
    Ok(settings)
}

async fn run(args: &Args) -> radd::Result<usize> {
    let settings = settings(args)?;
    tracing::info!(
        "🎲 Simulating {} over {} level(s), {} SSDs",
        settings.kind,
        settings.levels.len(),
        settings.ssds.len()
    );
    let trials = tokio::task::spawn_blocking(move || simulate_dataset(&settings))
        .await
        .map_err(|e| RaddError::ProcessingError {
            message: format!("simulation task failed: {}", e),
        })??;

    let bytes = write_trials(&trials)?;
    LocalStorage::new(".").write_file(&args.output, &bytes).await?;
    Ok(trials.len())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_logger(None, args.verbose);

    match run(&args).await {
        Ok(n) => {
            println!("✅ Wrote {} simulated trials to {}", n, args.output);
        }
        Err(e) => {
            tracing::error!("❌ Simulation failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
            std::process::exit(e.severity().exit_code());
        }
    }
}
