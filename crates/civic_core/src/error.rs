//! Error types for scrape passes

use serde::Serialize;
use thiserror::Error;

use crate::schema::EntityKind;

/// A required field is missing or malformed on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("invalid {entity} field '{field}': {reason}")]
pub struct ValidationError {
    pub entity: EntityKind,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(entity: EntityKind, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Raised by a fetch service. Retries are the fetcher's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("fetch failed for {uri}: {message}")]
pub struct FetchError {
    pub uri: String,
    pub message: String,
}

impl FetchError {
    pub fn new(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            message: message.into(),
        }
    }
}

/// Raised by a persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("persist failed: {message}")]
pub struct PersistError {
    pub message: String,
}

impl PersistError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for PersistError {
    fn from(err: anyhow::Error) -> Self {
        PersistError::new(format!("{err:#}"))
    }
}

/// Everything that can land in a pass report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ScrapeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A denormalized `post_id` does not match its organization after the pass.
    #[error("consistency error: {message}")]
    Consistency { message: String },

    /// Registration or configuration fault. The pass never starts.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl ScrapeError {
    pub fn consistency(message: impl Into<String>) -> Self {
        ScrapeError::Consistency {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ScrapeError::Configuration {
            message: message.into(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ScrapeError::Validation(_) => "ValidationError",
            ScrapeError::Consistency { .. } => "ConsistencyError",
            ScrapeError::Configuration { .. } => "ConfigurationError",
            ScrapeError::Fetch(_) => "FetchError",
            ScrapeError::Persist(_) => "PersistError",
        }
    }
}
