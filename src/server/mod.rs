//! Async TCP server using Tokio.
//!
//! Accepts connections and runs every HTTP/1.1 request through a middleware
//! stack via [`dispatch`]. Persistent connections (keep-alive) and pipelined
//! requests are handled per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::middleware::{MiddlewareHandler, dispatch};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request we buffer before answering 413 (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// An HTTP server hosting a middleware stack.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ghostcache::cache::ContentCacheService;
/// use ghostcache::middleware::{ContentMiddleware, LoggerMiddleware, from_middleware};
/// use ghostcache::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = Arc::new(ContentCacheService::new());
///     let stack = vec![
///         from_middleware(Arc::new(LoggerMiddleware)),
///         ContentMiddleware::posts(service).into_handler(),
///     ];
///     Server::bind("127.0.0.1:8080").await?.run(stack).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound address; useful after binding port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `stack` until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener itself fails.
    pub async fn run(self, stack: Vec<MiddlewareHandler>) -> Result<(), ServerError> {
        self.run_until(stack, std::future::pending()).await
    }

    /// Serves `stack` until `shutdown` resolves.
    ///
    /// Connections already accepted keep running to completion on their own
    /// tasks; only the accept loop stops.
    pub async fn run_until<S>(
        self,
        stack: Vec<MiddlewareHandler>,
        shutdown: S,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let stack: Arc<[MiddlewareHandler]> = stack.into();
        info!(address = %self.local_addr, layers = stack.len(), "ghostcache listening");

        tokio::pin!(shutdown);
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down listener");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let stack = Arc::clone(&stack);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, stack).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// What the connection loop should do with the bytes buffered so far.
enum Parsed {
    Ready { request: Request, consumed: usize },
    NeedMore,
    Rejected(Response),
}

fn try_parse(buf: &[u8]) -> Parsed {
    match Request::parse(buf) {
        Ok((request, body_offset)) => {
            let declared = request.content_length().unwrap_or(0);
            let Some(consumed) = body_offset
                .checked_add(declared)
                .filter(|&total| total <= MAX_REQUEST_SIZE)
            else {
                warn!(declared, "declared body too large, sending 413");
                return Parsed::Rejected(
                    Response::error(StatusCode::PayloadTooLarge).keep_alive(false),
                );
            };
            if buf.len() < consumed {
                Parsed::NeedMore
            } else {
                Parsed::Ready { request, consumed }
            }
        }
        Err(RequestError::Incomplete) => Parsed::NeedMore,
        Err(e) => {
            warn!(error = %e, "malformed request, sending 400");
            Parsed::Rejected(Response::error(StatusCode::BadRequest).keep_alive(false))
        }
    }
}

/// Serves one connection until the peer closes it or asks to.
///
/// Buffered bytes are parsed before reading again, so pipelined requests
/// that arrived in one segment are all answered.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    stack: Arc<[MiddlewareHandler]>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let (request, consumed) = match try_parse(&buf) {
            Parsed::Ready { request, consumed } => (request, consumed),
            Parsed::Rejected(response) => {
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
            Parsed::NeedMore => {
                if buf.len() > MAX_REQUEST_SIZE {
                    warn!(peer = %peer_addr, "request too large, sending 413");
                    let response =
                        Response::error(StatusCode::PayloadTooLarge).keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    break;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = dispatch(&stack, request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(consumed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}
