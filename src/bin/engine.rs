use clap::Parser;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pingmon::config::{EngineSettings, load_device_file};
use pingmon::db::MemoryStore;
use pingmon::monitor::MonitorEngine;
use pingmon::notifications::senders::webhook::WebhookNotifier;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML device seed file
    #[arg(short, long, default_value = "devices.toml")]
    devices: String,

    /// Seconds between monitor cycles; overrides PINGMON_RUN_INTERVAL_SECS
    #[arg(short, long)]
    interval: Option<u64>,
}

fn init_logging() {
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    init_logging();
    dotenv().ok();

    let mut settings = match EngineSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load engine settings: {e}");
            return Err(e.into());
        }
    };
    if let Some(secs) = args.interval {
        settings.run_interval = Duration::from_secs(secs.max(1));
    }
    let run_interval = settings.run_interval;

    let devices = match load_device_file(&args.devices) {
        Ok(devices) => devices,
        Err(e) => {
            error!("failed to load device file '{}': {e}", args.devices);
            return Err(e.into());
        }
    };
    info!(count = devices.len(), "loaded device registry from {}", args.devices);

    let webhook_url = env::var("PINGMON_WEBHOOK_URL")
        .map_err(|_| "PINGMON_WEBHOOK_URL must be set".to_string())?;
    let notifier = Arc::new(WebhookNotifier::new(webhook_url, None));
    let store = Arc::new(MemoryStore::with_devices(devices));
    let engine = MonitorEngine::new(store, notifier, settings);

    info!(interval_secs = run_interval.as_secs(), "monitor engine started");
    let mut ticker = interval(run_interval);
    loop {
        ticker.tick().await;
        if let Err(e) = engine.run_cycle().await {
            error!(error = %e, "monitor cycle failed");
        }
    }
}
