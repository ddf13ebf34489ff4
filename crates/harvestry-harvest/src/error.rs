//! Harvest-side error types.

use thiserror::Error;

/// Errors that can occur while harvesting from an external source.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// An HTTP request to an external source failed or returned a
    /// non-success status.
    #[error("HTTP error from {source_name}: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    /// The external source returned a rate-limit response.
    #[error("rate limited by {source_name}")]
    RateLimited { source_name: String },

    /// A response from an external source could not be parsed.
    #[error("parse error from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The person lacks the identifier this harvester queries by.
    #[error("{source_name} requires a {kind} identifier")]
    MissingIdentifier {
        source_name: String,
        kind: &'static str,
    },

    /// A requested source has no registered harvester.
    #[error("unknown harvester: {name}")]
    UnknownHarvester { name: String },

    /// An error propagated from `reqwest`.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// An error propagated from the store.
    #[error("database error: {0}")]
    Database(#[from] harvestry_core::Error),
}

impl HarvestError {
    /// Returns `true` when the error is transient and the harvesting
    /// may succeed if re-run.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::RateLimited { .. })
    }
}

/// Convenience alias for harvest results.
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;
