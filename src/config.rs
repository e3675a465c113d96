//! Runtime configuration from environment variables.
//!
//! In debug builds a `.env` file is loaded first; in production the
//! variables come from the container environment. Every knob has a
//! default, so an empty environment yields a working daemon.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// Drop directory watched for arriving album rips.
    pub download_dir: PathBuf,
    /// Music library the downstream processor writes into.
    pub music_lib_dir: PathBuf,
    /// Directory holding the ledger database.
    pub data_dir: PathBuf,
    pub db_file_name: String,
    /// How long after the last trigger a directory's scan fires.
    pub debounce_delay: Duration,
    pub stability_poll_interval: Duration,
    pub stability_quiet_duration: Duration,
    pub stability_max_wait: Duration,
    pub ffmpeg_path: String,
    pub metadata_api_base: String,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        if dotenvy::dotenv().is_ok() {
            tracing::info!("loaded .env file");
        }

        Config {
            download_dir: path_from_env("DOWNLOAD_DIR", "/app/download"),
            music_lib_dir: path_from_env("MUSIC_LIB_DIR", "/app/music"),
            data_dir: path_from_env("DATA_DIR", "/app/data"),
            db_file_name: string_from_env("DB_FILE_NAME", "music.db"),
            debounce_delay: duration_from_env("DEBOUNCE_DELAY", Duration::from_secs(5)),
            stability_poll_interval: duration_from_env(
                "STABILITY_CHECK_INTERVAL",
                Duration::from_secs(5),
            ),
            stability_quiet_duration: duration_from_env(
                "STABILITY_QUIET_DURATION",
                Duration::from_secs(60),
            ),
            stability_max_wait: duration_from_env(
                "STABILITY_MAX_WAIT",
                Duration::from_secs(12 * 60 * 60),
            ),
            ffmpeg_path: string_from_env("FFMPEG_PATH", "ffmpeg"),
            metadata_api_base: string_from_env("NETEASE_API", crate::metadata::DEFAULT_API_BASE),
            http_timeout: duration_from_env("HTTP_TIMEOUT", Duration::from_secs(30)),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    /// Create the download, library, and data directories if missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.download_dir)?;
        std::fs::create_dir_all(&self.music_lib_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn string_from_env(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn path_from_env(key: &str, default: &str) -> PathBuf {
    PathBuf::from(string_from_env(key, default))
}

fn duration_from_env(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => match parse_duration(&value) {
            Some(duration) => duration,
            None => {
                warn!(
                    "could not parse duration '{}' for {}, using default {:?}",
                    value, key, default
                );
                default
            }
        },
        _ => default,
    }
}

/// Parse durations like `250ms`, `5s`, `1m`, `12h`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = value.split_at(split);
    let number: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(number)),
        "s" => Some(Duration::from_secs(number)),
        "m" => Some(Duration::from_secs(number * 60)),
        "h" => Some(Duration::from_secs(number * 3600)),
        _ => None,
    }
}
