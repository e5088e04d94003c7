//! Fetch service interface.
//!
//! Network transport, retries and backoff are outside this crate; only local
//! and in-memory fetchers ship here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FetchError;

pub trait Fetch: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError>;
}

/// Serves `file://` URIs and bare paths, resolved against `base_dir`.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    base_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf, FetchError> {
        let raw = match uri.split_once("://") {
            Some(("file", rest)) => rest,
            Some((scheme, _)) => {
                return Err(FetchError::new(
                    uri,
                    format!("unsupported scheme '{scheme}'"),
                ));
            }
            None => uri,
        };
        let path = Path::new(raw);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(uri)?;
        tracing::debug!(uri, path = %path.display(), "fetching");
        fs::read(&path).map_err(|e| FetchError::new(uri, e.to_string()))
    }
}

/// In-memory fetcher keyed by exact URI.
#[derive(Debug, Clone, Default)]
pub struct MapFetcher {
    pages: HashMap<String, Vec<u8>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, uri: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(uri.into(), body.into());
        self
    }
}

impl Fetch for MapFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        self.pages
            .get(uri)
            .cloned()
            .ok_or_else(|| FetchError::new(uri, "not found"))
    }
}
