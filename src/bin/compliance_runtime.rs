//! Compliance Runtime - PPE compliance pipeline
//!
//! Reads newline-delimited detection records, correlates frontal (PPE) and
//! overhead (people count) cameras, and dispatches alerts for active machines
//! whose rolling compliance drops below the threshold.
//!
//! Usage:
//!   cargo run --release --bin compliance_runtime < detections.jsonl
//!   INPUT_PATH=streams/detections.jsonl INPUT_FOLLOW=true cargo run --release --bin compliance_runtime
//!
//! Environment variables: see `PipelineConfig::from_env`. `RUST_LOG` defaults to `info`.

use log::{error, info};
use plantsafe::dispatch::{
    Actuator, AlertDispatcher, BreakerMonitor, HttpActuator, LogActuator, LogMonitor, WebhookMonitor,
};
use plantsafe::pipeline::{spawn_pipeline, AuditWriter, LineSource, PipelineConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("🚀 Compliance Runtime");
    info!("   ├─ Count window: {} events", config.window_size);
    info!(
        "   ├─ Join window: {}ms sliding every {}ms",
        config.join_window_ms, config.join_slide_ms
    );
    info!("   ├─ Compliance threshold: {}", config.compliance_threshold);
    info!("   ├─ Min head-cover confidence: {}", config.min_confidence);
    info!("   ├─ Dedup horizon: {}ms", config.dedup_horizon_ms);
    info!("   ├─ Breaker threshold: {} consecutive failures", config.max_consecutive_failures);
    info!("   ├─ Worker shards: {}", config.worker_shards);
    info!(
        "   ├─ Channels: {} events / {} alerts",
        config.channel_buffer, config.alert_channel_buffer
    );
    info!(
        "   ├─ Input: {}{}",
        config.input_path.as_deref().unwrap_or("stdin"),
        if config.input_follow { " (follow)" } else { "" }
    );
    info!(
        "   └─ Audit trail: {}",
        config.alerts_output_path.as_deref().unwrap_or("disabled")
    );

    let actuator: Arc<dyn Actuator> = match &config.actuator_url {
        Some(url) => {
            info!("🔌 Actuator: {} ({})", url, config.actuator_function);
            Arc::new(HttpActuator::new(url.clone(), config.dispatch_timeout())?)
        }
        None => {
            info!("🔌 Actuator: dry-run (set ACTUATOR_URL to deliver alerts)");
            Arc::new(LogActuator)
        }
    };

    let monitor: Arc<dyn BreakerMonitor> = match &config.monitor_webhook_url {
        Some(url) => Arc::new(WebhookMonitor::new(url.clone(), config.dispatch_timeout())?),
        None => Arc::new(LogMonitor),
    };

    let dispatcher = AlertDispatcher::new(
        actuator,
        monitor,
        config.actuator_function.clone(),
        config.max_consecutive_failures,
        config.dispatch_timeout(),
    );

    let audit_writer = match &config.alerts_output_path {
        Some(path) => Some(AuditWriter::new(path)?),
        None => None,
    };

    let source = LineSource::open(config.input_path.as_deref(), config.input_follow).await?;

    let mut handle = spawn_pipeline(&config, source, dispatcher, audit_writer);
    info!("✅ Pipeline running");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!("❌ Failed to listen for CTRL+C: {}", err);
            }
            true
        }
        _ = handle.input_finished() => false,
    };

    let summary = if interrupted {
        info!("⚠️  Received CTRL+C, shutting down...");
        handle.shutdown().await
    } else {
        handle.join().await
    };

    info!("📊 Final statistics:");
    info!(
        "   ├─ Records: {} received, {} accepted, {} dropped",
        summary.router.received,
        summary.router.accepted,
        summary.router.dropped_total()
    );
    info!("   ├─ Alerts raised: {}", summary.alerts_raised());
    info!(
        "   └─ Dispatch: {} delivered, {} failed, {} breaker trips",
        summary.dispatch.delivered, summary.dispatch.failed, summary.dispatch.trips
    );
    info!("✅ Compliance runtime stopped");

    Ok(())
}
