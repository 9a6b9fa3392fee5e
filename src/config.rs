//! User configuration, read from `config.toml` in the platform config dir.
//!
//! Every field has a default, so a missing file or a partial one both work.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_DIR_NAME: &str = "wavedeck";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub player: PlayerConfig,
    pub spectrogram: SpectrogramConfig,
    pub timeline: TimelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Absolute URL, or a path resolved against `base_url`.
    pub audio_path: String,
    pub max_bytes: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".into(),
            audio_path: "/audio/audio.m4a".into(),
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Overrides `<data dir>/wavedeck/<db_name>.sqlite3`.
    pub path: Option<PathBuf>,
    pub db_name: String,
    pub db_version: u32,
    pub collection: String,
    pub key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            db_name: "audioDB".into(),
            db_version: 1,
            collection: "audioFiles".into(),
            key: "currentAudio".into(),
        }
    }
}

impl CacheConfig {
    pub fn db_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_dir().map(|dir| {
                dir.join(APP_DIR_NAME)
                    .join(format!("{}.sqlite3", self.db_name))
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub title: String,
    /// Relative height of the waveform region.
    pub height: u16,
    pub normalize: bool,
    pub bar_width: f32,
    pub bar_gap: f32,
    pub autoplay: bool,
    /// Clicking the waveform seeks.
    pub interact: bool,
    pub drag_to_seek: bool,
    pub audio_rate: f32,
    /// Rate the waveform and spectrogram are computed at.
    pub sample_rate: u32,
    pub theme: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            title: "Motri - La tumba de los perros".into(),
            height: 128,
            normalize: true,
            bar_width: 0.5,
            bar_gap: 0.5,
            autoplay: true,
            interact: true,
            drag_to_seek: true,
            audio_rate: 1.0,
            sample_rate: 8000,
            theme: "Teal".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    #[default]
    Roseus,
    Gray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Relative height of the spectrogram region.
    pub height: u16,
    pub color_map: ColorMap,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub fft_samples: usize,
    pub noverlap: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            height: 512,
            color_map: ColorMap::Roseus,
            min_frequency: 20.0,
            max_frequency: 20000.0,
            fft_samples: 512,
            noverlap: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub height: u16,
    /// Seconds between tick marks.
    pub time_interval: f64,
    pub primary_label_interval: f64,
    pub secondary_label_interval: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            height: 20,
            time_interval: 60.0,
            primary_label_interval: 300.0,
            secondary_label_interval: 150.0,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the config at the default location, falling back to defaults
    /// when there is no file.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let spec = &self.spectrogram;
        if !spec.fft_samples.is_power_of_two() || spec.fft_samples < 4 {
            return Err(ConfigError::Invalid(format!(
                "spectrogram.fft_samples must be a power of two >= 4, got {}",
                spec.fft_samples
            )));
        }
        if spec.noverlap >= spec.fft_samples {
            return Err(ConfigError::Invalid(format!(
                "spectrogram.noverlap ({}) must be smaller than fft_samples ({})",
                spec.noverlap, spec.fft_samples
            )));
        }
        if !(spec.min_frequency >= 0.0 && spec.min_frequency < spec.max_frequency) {
            return Err(ConfigError::Invalid(
                "spectrogram.min_frequency must be below max_frequency".into(),
            ));
        }
        if self.player.sample_rate == 0 {
            return Err(ConfigError::Invalid("player.sample_rate must be positive".into()));
        }
        if !(self.player.audio_rate > 0.0) {
            return Err(ConfigError::Invalid("player.audio_rate must be positive".into()));
        }
        let timeline = &self.timeline;
        if !(timeline.time_interval > 0.0) {
            return Err(ConfigError::Invalid("timeline.time_interval must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_player() {
        let config = Config::default();
        assert_eq!(config.cache.db_name, "audioDB");
        assert_eq!(config.cache.collection, "audioFiles");
        assert_eq!(config.cache.key, "currentAudio");
        assert_eq!(config.source.audio_path, "/audio/audio.m4a");
        assert_eq!(config.spectrogram.fft_samples, 512);
        assert_eq!(config.spectrogram.noverlap, 256);
        assert_eq!(config.timeline.primary_label_interval, 300.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[source]
base_url = "https://music.example.com"

[spectrogram]
color_map = "gray"
"#,
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.source.base_url, "https://music.example.com");
        assert_eq!(config.source.audio_path, "/audio/audio.m4a");
        assert_eq!(config.spectrogram.color_map, ColorMap::Gray);
        assert_eq!(config.player, PlayerConfig::default());
    }

    #[test]
    fn bad_fft_size_is_rejected() {
        let mut config = Config::default();
        config.spectrogram.fft_samples = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[player\ntitle = 1").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn explicit_cache_path_wins() {
        let cache = CacheConfig {
            path: Some(PathBuf::from("/tmp/x.sqlite3")),
            ..Default::default()
        };
        assert_eq!(cache.db_path(), Some(PathBuf::from("/tmp/x.sqlite3")));
    }
}
