use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::FitMonitor;

pub struct FitEngine<P: Pipeline> {
    pipeline: P,
    monitor: FitMonitor,
}

impl<P: Pipeline> FitEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: FitMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting fit");
        self.monitor.log_phase("start");

        // Extract
        tracing::info!("📥 Reading trial data...");
        let trials = self.pipeline.extract().await?;
        tracing::info!("📊 Read {} trials", trials.len());
        self.monitor.log_phase("extract");

        // Transform
        tracing::info!("⚙️  Fitting model...");
        let output = self.pipeline.transform(trials).await?;
        let tally = self.monitor.log_fits(&output.fits);
        tracing::info!(
            "📈 Fit {} ({} data vectors, {} evaluations, {} simulated trials)",
            output.model_id,
            tally.nvectors,
            tally.nfev,
            output.simulated.len()
        );
        if tally.unconverged > 0 {
            tracing::warn!("⚠️  {} fit stage(s) did not converge", tally.unconverged);
        }

        // Load
        tracing::info!("💾 Writing results...");
        let output_path = self.pipeline.load(output).await?;
        tracing::info!("📁 Output saved to: {}", output_path);
        self.monitor.log_final(&tally);

        Ok(output_path)
    }
}
