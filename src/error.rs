//! Error kinds surfaced by the crawling core.
//!
//! Field-level extraction failures never show up here: they are logged and
//! the field falls back to its empty default. Everything in this enum is a
//! provider-level or call-level failure.

use thiserror::Error;

/// Errors returned from searches, info lookups and source resolution.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Timeout, connection failure, or an unreadable response body.
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// The site answered with a non-success status that is not a challenge.
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The challenge solver failed, or the site challenged again after a
    /// token retry.
    #[error("challenge unresolved for provider {provider}: {reason}")]
    ChallengeUnresolved { provider: String, reason: String },

    /// The info page has no content node at all.
    #[error("provider {provider}: scope `{scope}` not found at {url}")]
    MissingScope {
        provider: String,
        scope: String,
        url: String,
    },

    /// An async resolver could not produce a playable URL.
    #[error("source resolution failed ({extractor}): {reason}")]
    SourceResolution { extractor: String, reason: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown extractor: {0}")]
    UnknownExtractor(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CrawlError {
    pub(crate) fn network(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn resolution(extractor: &str, reason: impl std::fmt::Display) -> Self {
        Self::SourceResolution {
            extractor: extractor.to_string(),
            reason: reason.to_string(),
        }
    }

    /// `true` for [`CrawlError::ChallengeUnresolved`].
    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::ChallengeUnresolved { .. })
    }

    /// `true` for transport-level failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
