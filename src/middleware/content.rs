//! Request adapter attaching cached posts or pages to each request.

use std::sync::Arc;

use tracing::debug;

use super::{Middleware, MiddlewareFuture, MiddlewareHandler, Next, PipelineError, from_middleware};
use crate::cache::{ContentCacheService, FetchOptions};
use crate::content::ContentKind;
use crate::context::Context;

/// Tag used for the site root.
pub const HOMEPAGE_TAG: &str = "homepage";

/// Derives the cache tag for a request path.
///
/// `/` maps to [`HOMEPAGE_TAG`]. Any other path loses its leading slash, and
/// the separator after the first segment becomes a dash, so `/section/item`
/// maps to `section-item`.
///
/// # Examples
///
/// ```
/// use ghostcache::middleware::content::tag_for_path;
///
/// assert_eq!(tag_for_path("/"), "homepage");
/// assert_eq!(tag_for_path("/about"), "about");
/// assert_eq!(tag_for_path("/blog/rust"), "blog-rust");
/// ```
pub fn tag_for_path(path: &str) -> String {
    if path == "/" {
        return HOMEPAGE_TAG.to_owned();
    }
    path.strip_prefix('/')
        .unwrap_or(path)
        .replacen('/', "-", 1)
}

/// Fills one field of the request's [`ContentData`](crate::content::ContentData)
/// from the cache.
///
/// Mount one per kind; both share the same data object, so either can run
/// alone or both in sequence. On an uninitialized service the request passes
/// straight through with empty collections. A failed fetch fails the request
/// instead of being swallowed.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ghostcache::cache::ContentCacheService;
/// use ghostcache::middleware::ContentMiddleware;
///
/// let service = Arc::new(ContentCacheService::new());
/// let stack = vec![
///     ContentMiddleware::posts(Arc::clone(&service)).into_handler(),
///     ContentMiddleware::pages(service).with_limit(3).into_handler(),
/// ];
/// ```
#[derive(Debug, Clone)]
pub struct ContentMiddleware {
    service: Arc<ContentCacheService>,
    kind: ContentKind,
    limit: usize,
}

impl ContentMiddleware {
    /// Middleware for `kind` using that kind's default limit.
    pub fn new(service: Arc<ContentCacheService>, kind: ContentKind) -> Self {
        Self {
            service,
            kind,
            limit: kind.default_limit(),
        }
    }

    pub fn posts(service: Arc<ContentCacheService>) -> Self {
        Self::new(service, ContentKind::Posts)
    }

    pub fn pages(service: Arc<ContentCacheService>) -> Self {
        Self::new(service, ContentKind::Pages)
    }

    /// Overrides how many items are attached per request.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn into_handler(self) -> MiddlewareHandler {
        from_middleware(Arc::new(self))
    }
}

impl Middleware for ContentMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> MiddlewareFuture {
        let service = Arc::clone(&self.service);
        let kind = self.kind;
        let limit = self.limit;

        Box::pin(async move {
            ctx.content_data_mut();

            if !service.is_initialized() {
                debug!(%kind, "content cache not initialized, passing request through");
                return next.run(ctx).await;
            }

            let tag = tag_for_path(ctx.request().path());
            let options = FetchOptions::tag(&tag).limit(limit);
            match service.fetch(kind, &options, false).await {
                Ok(items) => {
                    ctx.content_data_mut().set(kind, items);
                    next.run(ctx).await
                }
                Err(e) => Err(PipelineError::from(e)),
            }
        })
    }
}
