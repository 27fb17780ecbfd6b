// File: ./src/config.rs
// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::engine::EngineSettings;
use crate::extractor::{EVENT_BLOCK_TAG, NormalizeOptions, VIEW_BLOCK_TAG};
use crate::model::event::{DEFAULT_COLOR, DEFAULT_TEXT_COLOR, DEFAULT_TITLE};
use anyhow::{Error, Result, bail};
use chrono_tz::Tz;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

fn default_quiet_window_ms() -> u64 {
    5000
}
fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_event_block_tag() -> String {
    EVENT_BLOCK_TAG.to_string()
}
fn default_view_block_tag() -> String {
    VIEW_BLOCK_TAG.to_string()
}

fn default_untitled_title() -> String {
    DEFAULT_TITLE.to_string()
}
fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}
fn default_text_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Quiet window before a changed view is recomputed.
    #[serde(default = "default_quiet_window_ms")]
    pub refresh_quiet_window_ms: u64,
    /// IANA zone for timestamps written without an offset.
    #[serde(default = "default_time_zone")]
    pub default_time_zone: String,

    #[serde(default = "default_event_block_tag")]
    pub event_block_tag: String,
    #[serde(default = "default_view_block_tag")]
    pub view_block_tag: String,

    #[serde(default = "default_untitled_title")]
    pub untitled_event_title: String,
    #[serde(default = "default_color")]
    pub default_color: String,
    #[serde(default = "default_text_color")]
    pub default_text_color: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        // Match the serde defaults
        Self {
            refresh_quiet_window_ms: default_quiet_window_ms(),
            default_time_zone: default_time_zone(),
            event_block_tag: default_event_block_tag(),
            view_block_tag: default_view_block_tag(),
            untitled_event_title: default_untitled_title(),
            default_color: default_color(),
            default_text_color: default_text_color(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Loads the config, falling back to defaults when no file exists yet.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(config) => Ok(config),
            Err(e) if Self::is_missing_config_error(&e) => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Helper to detect whether an anyhow::Error indicates that the config file was missing.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        let toml_str = toml::to_string_pretty(self)?;
        fs::write(&path, toml_str).map_err(|e| {
            anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e)
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_quiet_window_ms == 0 {
            bail!("refresh_quiet_window_ms must be greater than zero");
        }
        self.time_zone()?;
        self.level_filter()?;
        if self.event_block_tag.trim().is_empty() || self.view_block_tag.trim().is_empty() {
            bail!("Block tags cannot be empty");
        }
        if self.event_block_tag == self.view_block_tag {
            bail!(
                "Event and view blocks cannot share the tag '{}'",
                self.event_block_tag
            );
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.default_time_zone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown time zone '{}'", self.default_time_zone))
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.log_level))
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.refresh_quiet_window_ms)
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            quiet_window: self.quiet_window(),
            event_block_tag: self.event_block_tag.clone(),
            normalize: NormalizeOptions {
                default_zone: self.time_zone()?,
                untitled_title: self.untitled_event_title.clone(),
                default_color: self.default_color.clone(),
                default_text_color: self.default_text_color.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let ctx = TestContext::new();
        let err = Config::load(&ctx).unwrap_err();
        assert!(Config::is_missing_config_error(&err));
        assert_eq!(Config::load_or_default(&ctx).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_uses_serde_defaults() {
        let ctx = TestContext::new();
        let path = ctx.get_config_file_path().unwrap();
        fs::write(&path, "refresh_quiet_window_ms = 250\ndefault_time_zone = \"Europe/Paris\"\n").unwrap();

        let config = Config::load(&ctx).unwrap();
        assert_eq!(config.quiet_window(), Duration::from_millis(250));
        assert_eq!(config.view_block_tag, "itinerary");
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.normalize.default_zone, chrono_tz::Europe::Paris);
        assert_eq!(settings.normalize.untitled_title, "Untitled Event");
    }

    #[test]
    fn test_save_then_load() {
        let ctx = TestContext::new();
        let config = Config {
            log_level: "debug".into(),
            ..Default::default()
        };
        config.save(&ctx).unwrap();
        assert_eq!(Config::load(&ctx).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let bad_zone = Config {
            default_time_zone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(bad_zone.validate().is_err());

        let zero = Config {
            refresh_quiet_window_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let shared_tag = Config {
            view_block_tag: "itinerary-event".into(),
            ..Default::default()
        };
        assert!(shared_tag.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }
}
