//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_STARTUP_DELAY_MS: u64 = 1000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Base URL of the clinic backend (transcription + save endpoints)
    pub backend_url: String,

    /// How long to ignore utterances after startup, while the speech
    /// source settles
    pub startup_delay: Duration,

    /// Timeout for backend HTTP requests
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = match std::env::var("CLINIC_SCRIBE_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => PathBuf::from(&home)
                .join(".local")
                .join("share")
                .join("clinic-scribe"),
        };

        let socket_path = match std::env::var("CLINIC_SCRIBE_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("scribe.sock"),
        };

        let backend_url = std::env::var("CLINIC_SCRIBE_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let startup_delay = Duration::from_millis(env_u64(
            "CLINIC_SCRIBE_STARTUP_DELAY_MS",
            DEFAULT_STARTUP_DELAY_MS,
        ));
        let http_timeout = Duration::from_secs(env_u64(
            "CLINIC_SCRIBE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        ));

        Ok(Self {
            socket_path,
            data_dir,
            backend_url,
            startup_delay,
            http_timeout,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Read a numeric env var, falling back to the default when it is unset
/// or unparsable
fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(%name, %raw, "ignoring unparsable value");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("scribe"));
        assert!(!config.backend_url.is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = Config::load().unwrap();
        if std::env::var("CLINIC_SCRIBE_STARTUP_DELAY_MS").is_err() {
            assert_eq!(config.startup_delay, Duration::from_millis(1000));
        }
        if std::env::var("CLINIC_SCRIBE_HTTP_TIMEOUT_SECS").is_err() {
            assert_eq!(config.http_timeout, Duration::from_secs(30));
        }
    }

    #[test]
    fn test_env_u64_fallback() {
        assert_eq!(env_u64("CLINIC_SCRIBE_TEST_UNSET_VAR", 250), 250);
    }
}
