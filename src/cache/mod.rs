//! Caching layer: tag-keyed, featured-first content caches in front of the
//! remote content API.
//!
//! - [`ContentCacheContainer`]: storage for one kind, one entry per tag.
//! - [`TransformRegistry`]: validated body rewrites applied before caching.
//! - [`ContentCacheService`]: the fetch-or-serve orchestrator that owns both
//!   containers, the registry, and the API client.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::content::ContentKind;

pub mod container;
mod lock;
pub mod service;
pub mod transform;

pub use container::ContentCacheContainer;
pub use service::{ContentCacheService, DEFAULT_PAGE_SIZE, FetchOptions, ServiceOptions, WILDCARD_TAG};
pub use transform::{ALL_TAGS, SharedTransform, Transform, TransformError, TransformRegistry};

/// Errors surfaced by [`ContentCacheService`].
///
/// Cloneable so one failed remote fetch can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("failed to fetch {kind} tagged `{tag}`: {source}")]
    RemoteFetch {
        kind: ContentKind,
        tag: String,
        #[source]
        source: Arc<ApiError>,
    },

    #[error("fetching {kind} tagged `{tag}` timed out after {after:?}")]
    Timeout {
        kind: ContentKind,
        tag: String,
        after: Duration,
    },

    #[error("failed to initialize content API client: {0}")]
    Init(#[source] Arc<ApiError>),
}
