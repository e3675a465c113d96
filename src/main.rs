use std::error::Error;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cuedrop::assembler::AlbumAssembler;
use cuedrop::config::Config;
use cuedrop::convert::IdentityNormalizer;
use cuedrop::ledger::SqliteLedger;
use cuedrop::metadata::NeteaseClient;
use cuedrop::processor::FfmpegTranscoder;
use cuedrop::scheduler::{ScanScheduler, SchedulerConfig};
use cuedrop::stability::StabilityDetector;
use cuedrop::watcher::DropWatcher;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load();
    config.ensure_directories()?;
    info!(
        "watching {} into library {}",
        config.download_dir.display(),
        config.music_lib_dir.display()
    );

    let ledger = Arc::new(SqliteLedger::open(&config.db_path()).await?);
    let fetcher = Arc::new(NeteaseClient::new(
        config.metadata_api_base.clone(),
        config.http_timeout,
    )?);
    let processor = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));

    let scheduler = ScanScheduler::new(
        SchedulerConfig {
            debounce_delay: config.debounce_delay,
            output_root: config.music_lib_dir.clone(),
        },
        StabilityDetector::new(
            config.stability_poll_interval,
            config.stability_quiet_duration,
            config.stability_max_wait,
        ),
        AlbumAssembler::new(Arc::new(IdentityNormalizer)),
        ledger,
        fetcher,
        processor,
    );

    scheduler.initial_scan(&config.download_dir).await;
    let _watcher = DropWatcher::spawn(&config.download_dir, scheduler)?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
