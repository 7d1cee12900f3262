use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use log::info;

use crate::errors::{PackError, PackResult};
use crate::naming::normalize;

pub const DEFAULT_CONFIG_FILE: &str = "music_pack.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the bundled `generic/` and `terraria/` templates.
    pub templates_dir: PathBuf,
    /// Resource namespace under `assets/`.
    pub namespace: String,
    pub ffmpeg: PathBuf,
    pub yt_dlp: PathBuf,
    pub strip_silence: bool,
    pub silence: SilenceSettings,
    pub retry: RetrySettings,
    pub terraria: TerrariaSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            namespace: "environmentalmusic".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
            yt_dlp: PathBuf::from("yt-dlp"),
            strip_silence: true,
            silence: SilenceSettings::default(),
            retry: RetrySettings::default(),
            terraria: TerrariaSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SilenceSettings {
    /// Frames whose peak stays below this level count as silence.
    pub threshold_dbfs: f64,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self { threshold_dbfs: -50.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    /// Delay before retry number `attempt` (1-based): doubles every time,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TerrariaSettings {
    /// Fail the run when a manifest sound has no matching music file.
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8081".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from `music_pack.toml` in the working
    /// directory when no path is given. A missing default file means defaults.
    pub fn load(path: Option<&Path>) -> PackResult<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(PackError::Config(format!("config file {} not found", path.display())));
            }
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| PackError::io(&path, e))?;
        let settings = Self::from_toml(&text)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> PackResult<Self> {
        let settings: Settings = toml::from_str(text).map_err(|e| PackError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PackResult<()> {
        if self.silence.threshold_dbfs > 0.0 {
            return Err(PackError::Config("silence.threshold_dbfs must be <= 0".to_string()));
        }
        if self.retry.max_attempts < 1 {
            return Err(PackError::Config("retry.max_attempts must be >= 1".to_string()));
        }
        if self.namespace.is_empty() || normalize(&self.namespace) != self.namespace {
            return Err(PackError::Config(format!(
                "namespace {:?} is not a valid resource namespace",
                self.namespace
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

            [retry]
            max_attempts = 3

            [terraria]
            strict = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.initial_delay_ms, 5_000);
        assert!(settings.terraria.strict);
        assert_eq!(settings.namespace, "environmentalmusic");
        assert_eq!(settings.server.bind, "127.0.0.1:8081");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Settings::from_toml("namespace = \"Bad Name\"").is_err());
        assert!(Settings::from_toml("[retry]\nmax_attempts = 0").is_err());
        assert!(Settings::from_toml("[silence]\nthreshold_dbfs = 3.0").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetrySettings {
            max_attempts: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 5_000,
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(retry.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(retry.delay_for(4), Duration::from_millis(5_000));
        assert_eq!(retry.delay_for(40), Duration::from_millis(5_000));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/music_pack.toml"))).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }
}
