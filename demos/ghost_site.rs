//! A tiny Ghost-backed site: every path renders the posts and pages tagged
//! with it as JSON.
//!
//! ```sh
//! GHOSTCACHE__GHOST__ENABLED=true \
//! GHOSTCACHE__GHOST__URL=https://demo.ghost.io \
//! GHOSTCACHE__GHOST__KEY=22444f78447824223cefc48062 \
//! RUST_LOG=ghostcache=debug cargo run --example ghost_site
//! ```
//!
//! A config file path may be passed as the first argument instead.

use std::path::PathBuf;
use std::sync::Arc;

use ghostcache::cache::TransformError;
use ghostcache::config::{self, GhostSettings};
use ghostcache::content::ContentKind;
use ghostcache::http::{Response, StatusCode};
use ghostcache::middleware::{
    ContentMiddleware, LoggerMiddleware, MiddlewareResult, from_fn, from_middleware,
};
use ghostcache::server::Server;
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = config::load(path.as_deref())?;
    let ghost = GhostSettings::from_config(&settings)?;
    let service = config::bootstrap(&settings);

    // Open external links in a new tab on every post.
    service.register_transform(
        ContentKind::Posts,
        |html: &str, _slug: &str, _kind: ContentKind| -> Result<String, TransformError> {
            Ok(html.replace("<a href=\"http", "<a target=\"_blank\" href=\"http"))
        },
        None,
    );

    let render = from_fn(|ctx, _next| async move {
        let data = ctx.content_data().cloned().unwrap_or_default();
        MiddlewareResult::Ok(Response::new(StatusCode::Ok).json(&data))
    });

    let stack = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        ContentMiddleware::posts(Arc::clone(&service))
            .with_limit(ghost.limit(ContentKind::Posts))
            .into_handler(),
        ContentMiddleware::pages(Arc::clone(&service))
            .with_limit(ghost.limit(ContentKind::Pages))
            .into_handler(),
        render,
    ];

    let server = Server::bind(ADDR).await?;
    println!("Listening on http://{}", server.local_addr());
    server.run(stack).await?;
    Ok(())
}
