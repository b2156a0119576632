//! Outbound content API: the remote collaborator the cache sits in front of.
//!
//! The cache only needs one capability from the CMS: browse a collection with
//! a filter expression. [`ContentApi`] captures exactly that, so the service
//! can run against the real [`GhostContentApi`] or an in-process stub.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{ContentItem, ContentKind};

pub mod ghost;

pub use ghost::GhostContentApi;

/// Errors produced while talking to the remote content API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid content API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode content API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("content API response is missing the `{field}` collection")]
    MissingField { field: &'static str },
}

/// Query parameters for a collection browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseParams {
    pub limit: usize,
    pub include: Option<String>,
    pub filter: Option<String>,
}

impl BrowseParams {
    /// Creates params with the given page size and no include/filter.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            include: None,
            filter: None,
        }
    }

    #[must_use]
    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }
}

/// A remote source of posts and pages.
///
/// Implementations must be cheap to share behind an [`Arc`](std::sync::Arc);
/// the cache service holds one for its whole lifetime and calls it from many
/// requests at once.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetches one page of `kind`, newest first, narrowed by `params.filter`.
    async fn browse(
        &self,
        kind: ContentKind,
        params: &BrowseParams,
    ) -> Result<Vec<ContentItem>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_params_builder() {
        let params = BrowseParams::new(50)
            .include("tags")
            .filter(Some("tags:news".to_string()));
        assert_eq!(params.limit, 50);
        assert_eq!(params.include.as_deref(), Some("tags"));
        assert_eq!(params.filter.as_deref(), Some("tags:news"));
    }

    #[test]
    fn status_error_message() {
        let err = ApiError::Status {
            status: 401,
            message: "Unknown Content API Key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "content API returned 401: Unknown Content API Key"
        );
    }
}
