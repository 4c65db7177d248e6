//! Mutual-TLS listener
//!
//! Serves an [`axum::Router`] over TLS with HTTP/2 negotiated by ALPN. The
//! server configuration comes from the fleet authority and makes client
//! certificates mandatory, so a connection that fails verification is closed
//! during the handshake and never reaches the router.
//!
//! Each accepted connection, handshake included, runs on its own task.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::ServerConfig;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Listener errors
///
/// Returned once to whoever launched the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an unrecoverable transport error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The listener task panicked or was aborted
    #[error("listener task failed: {0}")]
    Task(String),
}

/// Bind a TCP listener for the mutual-TLS server
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let bind_err = |source| ListenerError::Bind { addr, source };
    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;
    Ok(listener)
}

/// Bind `addr` and serve `router` until `shutdown` fires
///
/// On shutdown no new connections are accepted and in-flight connections get
/// up to `grace` to finish. Returns `Ok(())` after a requested shutdown and
/// the transport error otherwise.
pub async fn listen_and_serve(
    addr: SocketAddr,
    router: Router,
    tls: Arc<ServerConfig>,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), ListenerError> {
    let listener = bind(addr)?;
    serve(listener, router, tls, shutdown, grace).await
}

/// Serve `router` on an already bound listener until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    router: Router,
    tls: Arc<ServerConfig>,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), ListenerError> {
    let local_addr = listener.local_addr().map_err(ListenerError::Serve)?;
    let handle = Handle::new();

    let watcher = {
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            info!(addr = %local_addr, grace_secs = grace.as_secs(), "Closing listener");
            handle.graceful_shutdown(Some(grace));
        })
    };

    info!(addr = %local_addr, "Starting mutual-TLS listener");
    let result = axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(tls))
        .handle(handle)
        .serve(router.into_make_service())
        .await;
    watcher.abort();

    match result {
        Ok(()) => {
            info!(addr = %local_addr, "Listener stopped");
            Ok(())
        }
        Err(e) => {
            error!(addr = %local_addr, error = %e, "Listener failed");
            Err(ListenerError::Serve(e))
        }
    }
}

/// A listener running on its own task
///
/// The owner closes it with [`ListenerHandle::shutdown`] and collects its
/// outcome with [`ListenerHandle::join`]. Dropping the handle starts the same
/// graceful shutdown; the listener never outlives its owner.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<(), ListenerError>>>,
}

impl ListenerHandle {
    /// Bind `addr` and start serving on a new task
    ///
    /// Binding happens before this returns, so bind errors are reported here
    /// and [`ListenerHandle::local_addr`] is immediately usable.
    pub fn spawn(
        addr: SocketAddr,
        router: Router,
        tls: Arc<ServerConfig>,
        grace: Duration,
    ) -> Result<Self, ListenerError> {
        let listener = bind(addr)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Serve)?;
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(serve(listener, router, tls, shutdown.clone(), grace));

        Ok(Self {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and let in-flight ones finish
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the listener task has ended
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the listener to end and return its outcome
    pub async fn join(mut self) -> Result<(), ListenerError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(ListenerError::Task(e.to_string())),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown.cancel();
        }
    }
}
