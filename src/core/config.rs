//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, TileError};
use crate::tiles::spec::limits;

/// Full configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub tiles: TilesConfig,
    pub logging: LoggingConfig,
    /// Where this config was loaded from; not serialized.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Navigation session behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds without a successful transition before a session expires.
    pub idle_timeout_secs: u64,
}

/// Row validation knobs. Platform size limits are constants, not config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TilesConfig {
    /// Link prefixes accepted for title and author links.
    pub accepted_url_schemes: Vec<String>,
    /// Field-name prefix marking a full-width field.
    pub full_width_marker: String,
    /// Accent color used when the color cell cannot be coerced.
    pub default_color: u32,
}

/// Activity log destination and tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            accepted_url_schemes: vec!["http://".to_string(), "https://".to_string()],
            full_width_marker: "~".to_string(),
            default_color: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_path: data_dir().join("activity.jsonl"),
            fallback_path: Some(env::temp_dir().join("stiles-activity.jsonl")),
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
            channel_capacity: 1024,
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[STL-CONFIG] WARNING: HOME not set, falling back to /tmp");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("stiles")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("stiles").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| TileError::io(&path_buf, e))?;
            let mut parsed: Self = toml::from_str(&raw)?;
            parsed.source_path = Some(path_buf);
            parsed
        } else if path.is_some() {
            return Err(TileError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Effective config rendered as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic FNV-1a hash of the effective config, for log correlation.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("STILES_IDLE_TIMEOUT_SECS") {
            self.session.idle_timeout_secs = parse_env("STILES_IDLE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("STILES_URL_SCHEMES") {
            self.tiles.accepted_url_schemes = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("STILES_FULL_WIDTH_MARKER") {
            self.tiles.full_width_marker = raw;
        }
        if let Some(raw) = lookup("STILES_DEFAULT_COLOR") {
            self.tiles.default_color = parse_env("STILES_DEFAULT_COLOR", &raw)?;
        }
        if let Some(raw) = lookup("STILES_LOG_PATH") {
            self.logging.jsonl_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("STILES_LOG_FALLBACK_PATH") {
            self.logging.fallback_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("STILES_LOG_MAX_SIZE_BYTES") {
            self.logging.max_size_bytes = parse_env("STILES_LOG_MAX_SIZE_BYTES", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.session.idle_timeout_secs == 0 {
            return Err(TileError::InvalidConfig {
                details: "session.idle_timeout_secs must be >= 1".to_string(),
            });
        }

        if self.tiles.accepted_url_schemes.is_empty() {
            return Err(TileError::InvalidConfig {
                details: "tiles.accepted_url_schemes must not be empty".to_string(),
            });
        }
        if let Some(bad) = self
            .tiles
            .accepted_url_schemes
            .iter()
            .find(|s| !s.ends_with("://") || s.len() <= 3)
        {
            return Err(TileError::InvalidConfig {
                details: format!("tiles.accepted_url_schemes entry {bad:?} must look like \"scheme://\""),
            });
        }
        if self.tiles.full_width_marker.is_empty() {
            return Err(TileError::InvalidConfig {
                details: "tiles.full_width_marker must not be empty".to_string(),
            });
        }
        if self.tiles.default_color > limits::MAX_COLOR {
            return Err(TileError::InvalidConfig {
                details: format!(
                    "tiles.default_color ({}) must be <= {}",
                    self.tiles.default_color,
                    limits::MAX_COLOR
                ),
            });
        }

        if self.logging.channel_capacity == 0 {
            return Err(TileError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }
        if self.logging.max_size_bytes < 1024 {
            return Err(TileError::InvalidConfig {
                details: format!(
                    "logging.max_size_bytes ({}) must be >= 1024",
                    self.logging.max_size_bytes
                ),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| TileError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, TileError};
    use std::collections::HashMap;
    use std::path::Path;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.session.idle_timeout().as_secs(), 300);
        assert_eq!(cfg.tiles.full_width_marker, "~");
    }

    #[test]
    fn zero_idle_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.session.idle_timeout_secs = 0;
        let err = cfg.validate().expect_err("expected timeout error");
        assert!(err.to_string().contains("idle_timeout_secs"));
    }

    #[test]
    fn malformed_scheme_rejected() {
        let mut cfg = Config::default();
        cfg.tiles.accepted_url_schemes = vec!["https".to_string()];
        let err = cfg.validate().expect_err("expected scheme error");
        match err {
            TileError::InvalidConfig { details } => assert!(details.contains("scheme://")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_color_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.tiles.default_color = 0x0100_0000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("STILES_IDLE_TIMEOUT_SECS", "60"),
            ("STILES_URL_SCHEMES", "https://, discord://"),
            ("STILES_FULL_WIDTH_MARKER", "!"),
            ("STILES_LOG_PATH", "/tmp/stiles/custom.jsonl"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("overrides should parse");

        assert_eq!(cfg.session.idle_timeout_secs, 60);
        assert_eq!(
            cfg.tiles.accepted_url_schemes,
            vec!["https://".to_string(), "discord://".to_string()]
        );
        assert_eq!(cfg.tiles.full_width_marker, "!");
        assert_eq!(
            cfg.logging.jsonl_path,
            std::path::PathBuf::from("/tmp/stiles/custom.jsonl")
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("STILES_DEFAULT_COLOR", "green")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid number should fail");
        match err {
            TileError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("STILES_DEFAULT_COLOR"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/stiles/config.toml"))).unwrap_err();
        assert!(matches!(err, TileError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_partial_toml_and_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nidle_timeout_secs = 42\n\n[tiles]\nfull_width_marker = \"*\"\n",
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.session.idle_timeout_secs, 42);
        assert_eq!(cfg.tiles.full_width_marker, "*");
        assert_eq!(cfg.tiles.accepted_url_schemes.len(), 2);
        assert_eq!(cfg.source_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn to_toml_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.tiles.default_color = 0x00ff00;
        std::fs::write(&path, cfg.to_toml().unwrap()).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.tiles, cfg.tiles);
        assert_eq!(loaded.session, cfg.session);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().expect("hash should compute");
        assert_eq!(before, cfg.stable_hash().expect("hash should compute"));
        let mut modified = Config::default();
        modified.session.idle_timeout_secs += 1;
        assert_ne!(before, modified.stable_hash().expect("hash should compute"));
    }
}
