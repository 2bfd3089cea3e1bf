//! Environment-driven configuration.
//!
//! All values come from the process environment (optionally seeded from a
//! `.env` file). Required variables fail startup with the variable named in
//! the error; tuning knobs fall back to defaults.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// Bucket names for every object namespace the node touches.
///
/// The profile bucket is provisioned externally and optional; when unset the
/// profile-picture routes answer 404.
#[derive(Clone, Debug)]
pub struct Buckets {
    pub videos: String,
    pub raw_videos: String,
    pub failed: String,
    pub thumbnails: String,
    pub profiles: Option<String>,
}

impl Buckets {
    /// Buckets this node owns and must create at bootstrap. The profile
    /// bucket is not listed: it is read-only to this system.
    pub fn owned(&self) -> [&str; 4] {
        [
            self.videos.as_str(),
            self.raw_videos.as_str(),
            self.failed.as_str(),
            self.thumbnails.as_str(),
        ]
    }
}

/// Ingest scheduler tuning.
#[derive(Clone, Debug)]
pub struct IngestSettings {
    /// Worker pool size. Defaults to the host CPU count.
    pub workers: usize,
    pub scan_interval: Duration,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub minio_endpoint: String,
    pub minio_root_user: String,
    pub minio_root_password: String,
    pub database_dsn: String,
    pub buckets: Buckets,
    pub ingest: IngestSettings,
    pub ffmpeg_path: String,
}

/// Best-effort `.env` loading; a missing file is not an error.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn require(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow!("{name} is not set")),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server_port = require("SERVER_PORT")?
            .parse::<u16>()
            .context("SERVER_PORT must be a port number")?;

        let buckets = Buckets {
            videos: require("VIDEOS_BUCKET")?,
            raw_videos: require("RAW_VIDEOS_BUCKET")?,
            failed: require("FAILED_BUCKET")?,
            thumbnails: require("THUMBNAIL_BUCKET")?,
            profiles: optional("PROFILE_IMAGE_BUCKET"),
        };

        let workers = match optional("INGEST_WORKERS") {
            Some(raw) => {
                let workers = raw
                    .parse::<usize>()
                    .context("INGEST_WORKERS must be a positive integer")?;
                if workers == 0 {
                    num_cpus::get()
                } else {
                    workers
                }
            }
            None => num_cpus::get(),
        };

        let scan_interval = match optional("INGEST_SCAN_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("INGEST_SCAN_INTERVAL_SECS must be an integer")?,
            ),
            None => Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        };

        let max_retries = match optional("INGEST_MAX_RETRIES") {
            Some(raw) => raw
                .parse::<u32>()
                .context("INGEST_MAX_RETRIES must be an integer")?,
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(Config {
            server_port,
            minio_endpoint: require("MINIO_ENDPOINT")?,
            minio_root_user: require("MINIO_ROOT_USER")?,
            minio_root_password: require("MINIO_ROOT_PASSWORD")?,
            database_dsn: require("DATABASE_DSN")?,
            buckets,
            ingest: IngestSettings {
                workers,
                scan_interval,
                max_retries,
            },
            ffmpeg_path: optional("FFMPEG_PATH").unwrap_or_else(|| DEFAULT_FFMPEG_PATH.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment mutation is process-global; serialize the tests that do it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const REQUIRED: [(&str, &str); 9] = [
        ("SERVER_PORT", "8080"),
        ("MINIO_ENDPOINT", "http://localhost:9000"),
        ("MINIO_ROOT_USER", "minioadmin"),
        ("MINIO_ROOT_PASSWORD", "minioadmin"),
        ("VIDEOS_BUCKET", "videos"),
        ("RAW_VIDEOS_BUCKET", "raw-videos"),
        ("FAILED_BUCKET", "failed"),
        ("THUMBNAIL_BUCKET", "thumbnails"),
        ("DATABASE_DSN", "postgres://localhost/clipstream"),
    ];

    fn with_required_env<T>(f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap();
        for (name, value) in REQUIRED {
            env::set_var(name, value);
        }
        for name in [
            "PROFILE_IMAGE_BUCKET",
            "INGEST_WORKERS",
            "INGEST_SCAN_INTERVAL_SECS",
            "INGEST_MAX_RETRIES",
            "FFMPEG_PATH",
        ] {
            env::remove_var(name);
        }
        let result = f();
        for (name, _) in REQUIRED {
            env::remove_var(name);
        }
        result
    }

    #[test]
    fn loads_with_defaults() {
        let config = with_required_env(|| Config::from_env().unwrap());
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.buckets.profiles, None);
        assert_eq!(config.ingest.workers, num_cpus::get());
        assert_eq!(config.ingest.scan_interval, Duration::from_secs(30));
        assert_eq!(config.ingest.max_retries, 3);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn missing_required_variable_is_named() {
        let _guard = ENV_LOCK.lock().unwrap();
        for (name, value) in REQUIRED {
            env::set_var(name, value);
        }
        env::remove_var("RAW_VIDEOS_BUCKET");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("RAW_VIDEOS_BUCKET"));
        for (name, _) in REQUIRED {
            env::remove_var(name);
        }
    }

    #[test]
    fn honors_tuning_overrides() {
        let config = with_required_env(|| {
            env::set_var("PROFILE_IMAGE_BUCKET", "profiles");
            env::set_var("INGEST_WORKERS", "2");
            env::set_var("INGEST_SCAN_INTERVAL_SECS", "5");
            env::set_var("INGEST_MAX_RETRIES", "1");
            let config = Config::from_env().unwrap();
            for name in [
                "PROFILE_IMAGE_BUCKET",
                "INGEST_WORKERS",
                "INGEST_SCAN_INTERVAL_SECS",
                "INGEST_MAX_RETRIES",
            ] {
                env::remove_var(name);
            }
            config
        });
        assert_eq!(config.buckets.profiles.as_deref(), Some("profiles"));
        assert_eq!(config.ingest.workers, 2);
        assert_eq!(config.ingest.scan_interval, Duration::from_secs(5));
        assert_eq!(config.ingest.max_retries, 1);
    }
}
