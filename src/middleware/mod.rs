//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer. A layer may pass the request on,
//! answer it directly, or fail it: returning `Err` skips every remaining
//! layer and sends the error back up the chain, where [`dispatch`] turns it
//! into an error response.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_fn`]: build handlers from a trait object or
//!   a closure.
//! - [`LoggerMiddleware`]: built-in request/response logger.
//! - [`content::ContentMiddleware`]: attaches cached posts or pages to the
//!   request context.

use std::{future::Future, pin::Pin, sync::Arc};

use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::cache::CacheError;
use crate::http::{Request, Response, StatusCode};
use crate::context::Context;

pub mod content;

pub use content::ContentMiddleware;

/// An error travelling up the middleware chain instead of a response.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Content(#[from] CacheError),
}

impl PipelineError {
    /// The status the client sees when this error reaches [`dispatch`].
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Content(CacheError::RemoteFetch { .. }) => StatusCode::BadGateway,
            Self::Content(CacheError::Timeout { .. }) => StatusCode::GatewayTimeout,
            Self::Content(CacheError::Init(_)) => StatusCode::InternalServerError,
        }
    }
}

/// Outcome of a middleware layer.
pub type MiddlewareResult = Result<Response, PipelineError>;

/// Boxed future returned by every middleware layer.
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = MiddlewareResult> + Send>>;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once.
///
/// # Examples
///
/// ```rust,no_run
/// use ghostcache::{context::Context, middleware::{Middleware, MiddlewareFuture, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next) -> MiddlewareFuture {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> MiddlewareFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ghostcache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Wraps an async closure as a [`MiddlewareHandler`].
///
/// Handy for the terminal layer that renders a page from the context:
///
/// ```rust,no_run
/// use ghostcache::http::{Response, StatusCode};
/// use ghostcache::middleware::{MiddlewareResult, from_fn};
///
/// let render = from_fn(|ctx, _next| async move {
///     let data = ctx.content_data().cloned().unwrap_or_default();
///     MiddlewareResult::Ok(Response::new(StatusCode::Ok).json(&data))
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    Arc::new(move |ctx: Context, next: Next| Box::pin(f(ctx, next)) as MiddlewareFuture)
}

impl Next {
    /// Creates a cursor positioned at the start of `middlewares`.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain.
    ///
    /// When the chain is exhausted without any layer producing a response,
    /// a `404 Not Found` is returned.
    pub async fn run(mut self, ctx: Context) -> MiddlewareResult {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Ok(Response::error(StatusCode::NotFound))
        }
    }
}

/// Runs `request` through `stack` and always produces a response.
///
/// A [`PipelineError`] escaping the chain is logged and answered with its
/// [`status`](PipelineError::status); the error detail stays in the log.
pub async fn dispatch(stack: &[MiddlewareHandler], request: Request) -> Response {
    let path = request.path().to_owned();
    match Next::new(stack.to_vec()).run(Context::new(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(%path, error = %e, "request failed in middleware pipeline");
            Response::error(e.status())
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: `next.run(ctx).await`.
/// - **Short-circuit**: return `Ok(response)` without calling `next`.
/// - **Fail**: return `Err(error)`; remaining layers are skipped.
/// - **Decorate**: call `next`, then adjust the response.
///
/// Implementations must not hold locks across an `.await` point.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> MiddlewareFuture;
}

/// Logs each request's method, path, outcome, and duration.
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// Failed requests are logged at `warn` and the error is passed on unchanged.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> MiddlewareFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let result = next.run(ctx).await;
            let duration = start.elapsed();

            match &result {
                Ok(response) => {
                    info!("{} {} - {} ({:?})", method, path, response.status().as_u16(), duration);
                }
                Err(e) => {
                    warn!(error = %e, "{} {} - failed ({:?})", method, path, duration);
                }
            }
            result
        })
    }
}
