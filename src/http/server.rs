//! Embedded HTTP(S) server.
//!
//! # Responsibilities
//! - Bind a listener, optionally terminating TLS with a supplied acceptor
//! - Accept connections forever, one task per connection
//! - Serve exactly one request per connection, then close
//! - Dispatch every request to a [`RequestHandler`]
//!
//! # Design Decisions
//! - A failing connection is logged and dropped; only bind or fatal accept
//!   errors end the accept loop
//! - Unbounded by default; `max_connections` turns on semaphore backpressure
//! - Axum `Router` with a single fallback route, served by hand over hyper so
//!   the TLS handshake and connection accounting stay in our accept loop

use axum::extract::{ConnectInfo, Extension, State};
use axum::http::{Method, Uri};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::http::request::HandlerRequest;
use crate::http::response::Reply;
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::{self, Listener, ListenerError};

/// Turns a request into a reply. Never fails: errors become error replies.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: HandlerRequest) -> impl Future<Output = Reply> + Send;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send,
{
    fn handle(&self, request: HandlerRequest) -> impl Future<Output = Reply> + Send {
        self(request)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

impl ServerError {
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, ServerError::Listener(e) if e.is_addr_in_use())
    }
}

/// A bound, not yet serving, HTTP or HTTPS server.
pub struct EmbeddedServer {
    name: &'static str,
    listener: Listener,
    tls: Option<TlsAcceptor>,
    local_addr: SocketAddr,
}

impl EmbeddedServer {
    /// Bind `addr`. With `tls`, every connection is TLS-terminated first.
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        tls: Option<TlsAcceptor>,
        max_connections: Option<usize>,
    ) -> Result<Self, ServerError> {
        let listener = Listener::bind(addr, max_connections).await?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        tracing::info!(
            server = name,
            address = %local_addr,
            tls = tls.is_some(),
            "HTTP server listening"
        );

        Ok(Self {
            name,
            listener,
            tls,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve on a background task.
    pub fn spawn<H: RequestHandler>(self, handler: Arc<H>) -> JoinHandle<Result<(), ServerError>> {
        tokio::spawn(self.run(handler))
    }

    /// Accept and serve until a non-transient accept error.
    pub async fn run<H: RequestHandler>(self, handler: Arc<H>) -> Result<(), ServerError> {
        let router = build_router(handler);
        let tracker = ConnectionTracker::new(self.name);

        loop {
            let (stream, peer, permit) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(ListenerError::Accept(e)) if listener::is_transient(&e) => {
                    tracing::debug!(server = self.name, error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    tracing::error!(server = self.name, error = %e, "Accept loop stopped");
                    return Err(e.into());
                }
            };

            let guard = tracker.track();
            let router = router.clone();
            let tls = self.tls.clone();
            let name = self.name;

            tokio::spawn(async move {
                let _permit = permit;
                let id = guard.id();
                tracing::debug!(server = name, connection_id = %id, peer_addr = %peer, "Connection opened");

                let result = match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, router, peer, id).await,
                        Err(e) => {
                            tracing::debug!(connection_id = %id, error = %e, "TLS handshake failed");
                            return;
                        }
                    },
                    None => serve_connection(stream, router, peer, id).await,
                };

                if let Err(e) = result {
                    tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
                }
                drop(guard);
            });
        }
    }
}

/// Bind and start serving in one step. Returns the bound address.
pub async fn start<H: RequestHandler>(
    name: &'static str,
    addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    handler: Arc<H>,
) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
    let server = EmbeddedServer::bind(name, addr, tls, None).await?;
    let local_addr = server.local_addr();
    Ok((local_addr, server.spawn(handler)))
}

fn build_router<H: RequestHandler>(handler: Arc<H>) -> Router {
    Router::new()
        .fallback(dispatch::<H>)
        .with_state(handler)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch<H: RequestHandler>(
    State(handler): State<Arc<H>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Extension(connection): Extension<ConnectionId>,
    method: Method,
    uri: Uri,
) -> Reply {
    let request = HandlerRequest::new(method, &uri, peer, connection);
    handler.handle(request).await
}

async fn serve_connection<S>(stream: S, router: Router, peer: SocketAddr, id: ConnectionId) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        request.extensions_mut().insert(id);
        router.clone().call(request)
    });

    http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service)
        .await
}
