//! Data-source capability used for the initial fetch and for refresh.
//!
//! A source only ever answers "here is a payload" or "nothing". Transport
//! errors, auth failures and timeouts all collapse into `None`.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tiles::decode::RawPayload;

/// Yields a fresh payload on demand.
pub trait RefreshSource: Send + Sync {
    fn fetch(&self) -> Option<RawPayload>;

    /// Whether a session may offer the refresh transition at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<T: RefreshSource + ?Sized> RefreshSource for Arc<T> {
    fn fetch(&self) -> Option<RawPayload> {
        (**self).fetch()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// No refresh capability. Sessions opened with it never offer refresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefresh;

impl RefreshSource for NoRefresh {
    fn fetch(&self) -> Option<RawPayload> {
        None
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Re-reads a file on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RefreshSource for FileSource {
    fn fetch(&self) -> Option<RawPayload> {
        fs::read_to_string(&self.path).ok()
    }
}

/// Adapts a closure into a source.
pub struct FnSource<F>(pub F);

impl<F> RefreshSource for FnSource<F>
where
    F: Fn() -> Option<RawPayload> + Send + Sync,
{
    fn fetch(&self) -> Option<RawPayload> {
        (self.0)()
    }
}
