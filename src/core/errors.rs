//! STL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tiles::decode::DecodeError;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, TileError>;

/// Top-level error type for ambient operations (config, I/O, threads).
///
/// Navigation failures have their own taxonomy in
/// [`crate::session::TransitionError`]; input degradations are never errors.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("[STL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[STL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[STL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[STL-2001] payload decode failure: {source}")]
    Decode {
        #[source]
        source: DecodeError,
    },

    #[error("[STL-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[STL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STL-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[STL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl TileError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "STL-1001",
            Self::MissingConfig { .. } => "STL-1002",
            Self::ConfigParse { .. } => "STL-1003",
            Self::Decode { .. } => "STL-2001",
            Self::Serialization { .. } => "STL-2101",
            Self::Io { .. } => "STL-3002",
            Self::ChannelClosed { .. } => "STL-3003",
            Self::Runtime { .. } => "STL-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<DecodeError> for TileError {
    fn from(source: DecodeError) -> Self {
        Self::Decode { source }
    }
}

impl From<serde_json::Error> for TileError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for TileError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for TileError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
