use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::consts::{
    CHAT_MODEL, DEFAULT_API_BASE_URL, DEFAULT_CONFIG_FILE, ENV_PREFIX, IMAGE_MODEL, POLL_INTERVAL,
    PROGRESS_INTERVAL, REQUEST_TIMEOUT, VIDEO_MODEL, VIDEO_RESOLUTION,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub image_model: String,
    pub video_model: String,
    pub chat_model: String,
    pub video_resolution: String,
    pub poll_interval_secs: u64,
    pub progress_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// Layers built-in defaults, then the config file, then `GENSTUDIO_*`
    /// environment variables.
    ///
    /// Without an explicit path, `genstudio.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = Config::builder()
            .set_default("api_base_url", DEFAULT_API_BASE_URL)?
            .set_default("image_model", IMAGE_MODEL)?
            .set_default("video_model", VIDEO_MODEL)?
            .set_default("chat_model", CHAT_MODEL)?
            .set_default("video_resolution", VIDEO_RESOLUTION)?
            .set_default("poll_interval_secs", POLL_INTERVAL.as_secs())?
            .set_default("progress_interval_secs", PROGRESS_INTERVAL.as_secs())?
            .set_default("request_timeout_secs", REQUEST_TIMEOUT.as_secs())?
            .set_default("output_dir", "generated")?;

        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let conf = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to load configuration")?;

        let app_config: AppConfig = conf
            .try_deserialize()
            .context("Invalid configuration")?;

        if app_config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if app_config.progress_interval_secs == 0 {
            anyhow::bail!("progress_interval_secs must be greater than zero");
        }

        Ok(app_config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_with_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "video_model = \"veo-test\"").unwrap();
        writeln!(file, "poll_interval_secs = 3").unwrap();

        let conf = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(conf.video_model, "veo-test");
        assert_eq!(conf.poll_interval(), Duration::from_secs(3));
        assert_eq!(conf.image_model, IMAGE_MODEL);
        assert_eq!(conf.chat_model, CHAT_MODEL);
        assert_eq!(conf.progress_interval(), PROGRESS_INTERVAL);
        assert_eq!(conf.video_resolution, "720p");
        assert_eq!(conf.output_dir, PathBuf::from("generated"));
        assert!(conf.sentry_dsn.is_none());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "poll_interval_secs = 0").unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }
}
