//! # ghostcache
//!
//! A request-scoped, tag-keyed content cache in front of the Ghost Content API.
//!
//! Each request path maps to a Ghost tag (`/` → `homepage`, `/news` → `news`).
//! The content middlewares fetch the posts and pages carrying that tag once,
//! memoize them per tag, and attach them to the request [`Context`] for the
//! handler that renders the page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ghostcache::cache::ContentCacheService;
//! use ghostcache::http::{Response, StatusCode};
//! use ghostcache::middleware::{ContentMiddleware, MiddlewareResult, from_fn};
//! use ghostcache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(ContentCacheService::new());
//!     service.init("https://demo.ghost.io", "22444f78447824223cefc48062")?;
//!
//!     let stack = vec![
//!         ContentMiddleware::posts(Arc::clone(&service)).into_handler(),
//!         ContentMiddleware::pages(service).into_handler(),
//!         from_fn(|ctx, _next| async move {
//!             let data = ctx.content_data().cloned().unwrap_or_default();
//!             MiddlewareResult::Ok(Response::new(StatusCode::Ok).json(&data))
//!         }),
//!     ];
//!     Server::bind("127.0.0.1:8080").await?.run(stack).await?;
//!     Ok(())
//! }
//! ```

// ── Cache core ────────────────────────────────────────────────────────────────
pub mod api;
pub mod cache;
pub mod content;

// ── Hosting ───────────────────────────────────────────────────────────────────
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheError, ContentCacheService, FetchOptions, ServiceOptions};
pub use content::{ContentData, ContentItem, ContentKind};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{ContentMiddleware, PipelineError};
pub use server::{Server, ServerError};
