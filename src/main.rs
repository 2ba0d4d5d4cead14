//! Alert scheduler demo
//!
//! Run with: cargo run -- <cache dir or definitions.json>
//!
//! Loads the alert definitions, runs the scheduler for 10 seconds with
//! intervals read as seconds, then prints every collected result.
//!
//! Environment variables:
//! - AMBARI_ALERTS_WORKERS: Worker pool size (default: 3)
//! - RUST_LOG: Log level (default: info)

use std::path::PathBuf;
use std::time::Duration;

use ambari_alerts::alerts::{AlertSchedulerHandler, DefinitionStore, HandlerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RUN_FOR: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ambari_alerts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: ambari-alerts <cache dir or definitions.json>")?;

    // Accept either the cache directory or the definitions file inside it
    let cache_dir = match path.file_name() {
        Some(name) if name == DefinitionStore::FILENAME => path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        _ => path,
    };

    let mut config = HandlerConfig::from_env().with_in_minutes(false);
    config.cache_dir = cache_dir;

    tracing::info!("Alert scheduler configuration:");
    tracing::info!("  Cache dir: {}", config.cache_dir.display());
    tracing::info!("  Workers: {}", config.worker_threads);
    tracing::info!("  Running for: {:?}", RUN_FOR);

    let mut handler = AlertSchedulerHandler::new(config)?;
    handler.start()?;
    tracing::info!("  Scheduled jobs: {}", handler.job_count());

    std::thread::sleep(RUN_FOR);

    let results = handler.collector().alerts();
    handler.stop();

    println!("Collected {} alert result(s)", results.len());
    for result in results {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
