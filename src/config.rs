use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for metacanon.
///
/// Controls the write-back engine's thresholds and the CLI's output
/// behavior (dry run, backups, JSON).
///
/// # Loading
///
/// ```rust,no_run
/// use metacanon::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.engine.integrity_ratio = 0.6;
/// config.output.backup_originals = false;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Metadata engine thresholds.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Output behavior (dry run, backups, JSON).
    #[serde(default)]
    pub output: OutputConfig,
}

/// Thresholds and defaults of the metadata record.
///
/// # Example
///
/// ```rust
/// use metacanon::config::EngineConfig;
///
/// let engine = EngineConfig {
///     integrity_ratio: 0.5,        // reject saves at or below half the original size
///     max_display_count: 2000,     // larger values show a placeholder
///     ..EngineConfig::default()
/// };
/// assert_eq!(engine.thumbnail_size, 160);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A serialized buffer must be larger than `original × integrity_ratio`.
    pub integrity_ratio: f64,
    /// Tag values with at least this many components are not displayed.
    pub max_display_count: usize,
    /// Text chunks with at least this many characters are not displayed.
    pub max_text_chunk_len: usize,
    /// Longest edge of generated EXIF thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// Written to `Exif.Image.Software` when image metadata is refreshed.
    pub software: String,
    /// Previews must be wider than this to be chosen.
    pub preview_min_width: u32,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, report what would change without modifying any files.
    pub dry_run: bool,
    /// If `true`, create a `.bak` backup before modifying an image.
    pub backup_originals: bool,
    /// Print results as JSON instead of text.
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            integrity_ratio: 0.5,
            max_display_count: 2000,
            max_text_chunk_len: 5000,
            thumbnail_size: 160,
            software: format!("metacanon {}", env!("CARGO_PKG_VERSION")),
            preview_min_width: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_originals: true,
            json: false,
        }
    }
}

impl Config {
    /// Resolve the config file path: same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let ratio = self.engine.integrity_ratio;
        if !(0.0..1.0).contains(&ratio) {
            anyhow::bail!("engine.integrity_ratio must be in [0, 1), got {ratio}");
        }
        if self.engine.thumbnail_size == 0 {
            anyhow::bail!("engine.thumbnail_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("nope.json").as_path())).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.output.backup_originals);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.engine.max_display_count = 10;
        config.output.json = true;
        config.save(Some(path.as_path())).unwrap();

        let back = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(back.engine.max_display_count, 10);
        assert!(back.output.json);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"thumbnail_size": 96}}"#).unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.engine.thumbnail_size, 96);
        assert_eq!(config.engine.integrity_ratio, 0.5);
        assert!(!config.output.dry_run);
    }

    #[test]
    fn out_of_range_ratio_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"integrity_ratio": 1.5}}"#).unwrap();
        assert!(Config::load(Some(path.as_path())).is_err());
    }
}
