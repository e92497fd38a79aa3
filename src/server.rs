//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On SIGTERM (what Kubernetes sends) or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()` — no new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Transitions the app to its Stopped phase and returns.
//!
//! Keep the pod's `terminationGracePeriodSeconds` longer than your slowest
//! request; request-level timeouts themselves belong to the proxy in front,
//! not to this loop.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::{App, Phase};
use crate::error::{RequestError, ServeError};
use crate::fault::default_render;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind `addr` when [`serve`](Server::serve) is
    /// called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `app`.
    ///
    /// The app must be freshly built: serving transitions it Built →
    /// Running, and to Stopped after the drain. Returns only after a full
    /// graceful shutdown.
    pub async fn serve(self, app: Arc<App>) -> Result<(), ServeError> {
        app.transition(Phase::Running)?;
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, service = %app.config().service, "listening");

        // JoinSet tracks every spawned connection task so the drain below
        // can wait for all of them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top-to-bottom: a shutdown signal must
                // stop the accept arm even if connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // The closure runs once per request on the
                        // connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req).await }
                        });

                        // Serves whichever of HTTP/1.1 / HTTP/2 the client
                        // negotiated.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow unbounded on
                // long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        app.transition(Phase::Stopped)?;
        info!("stopped");
        Ok(())
    }
}

// ── Request dispatch ─────────────────────────────────────────────────────────

/// The hot path: one wire request in, one wire response out.
///
/// The error type is [`Infallible`](std::convert::Infallible): every failure
/// is funneled through the classification procedure (or the local fallbacks
/// for requests that never reach a route) and rendered, so hyper never sees
/// an error.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    let method = match Method::parse(req.method().as_str()) {
        Ok(method) => method,
        Err(_) => {
            let error = RequestError::client(
                http::StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                format!("unsupported method `{}`", req.method()),
            );
            return Ok(default_render(&error).into_hyper());
        }
    };

    let target = match req.uri().query() {
        Some(query) => format!("{}?{query}", req.uri().path()),
        None => req.uri().path().to_owned(),
    };

    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
        .collect();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let error = RequestError::client(
                http::StatusCode::BAD_REQUEST,
                "BODY_READ_FAILED",
                format!("failed to read request body: {e}"),
            );
            return Ok(default_render(&error).into_hyper());
        }
    };

    let mut request = Request::new(method, &target).with_body(body);
    for (name, value) in headers {
        request = request.with_header(&name, &value);
    }
    let path = request.path().to_owned();

    // None is the continuation's cue: no route, or a chain that completed
    // without terminating the request. Both fall through to not-found.
    let response = match app.invoke(request).await {
        Some(response) => response,
        None => not_found(method, &path),
    };

    Ok(response.into_hyper())
}

fn not_found(method: Method, path: &str) -> Response {
    let error = RequestError::client(
        http::StatusCode::NOT_FOUND,
        "NOT_FOUND",
        format!("no route matches {method} {path}"),
    );
    default_render(&error)
}

// ── Shutdown signal ──────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves — the SIGTERM arm is disabled off-Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
