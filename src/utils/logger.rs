use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "radd=debug,info"
    } else {
        "radd=info"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Installs the global subscriber. `json` writes one object per line with
/// the enclosing fit span attached, for batch runs whose logs are collected
/// by a scheduler; anything else gives compact terminal output.
pub fn init_logger(format: Option<&str>, verbose: bool) {
    let registry = tracing_subscriber::registry().with(env_filter(verbose));
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        Some("json") => registry
            .with(
                fmt.with_thread_ids(true)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
        _ => registry.with(fmt.with_thread_ids(false).compact()).init(),
    }
}

/// Span wrapping the optimization of one data vector, so every hop,
/// polish and warning it logs carries the model and subject.
pub fn fit_span(model_id: &str, idx: &str) -> tracing::Span {
    tracing::info_span!("fit", model = %model_id, idx = %idx)
}
