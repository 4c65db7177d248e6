//! Mutual-TLS dialer
//!
//! Opens an HTTP/2 session to a peer: TCP connect, TLS handshake with the
//! authority's client configuration, then the HTTP/2 handshake. Failures are
//! classified so callers can tell a peer from another fleet apart from a
//! network problem.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2::SendRequest;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use rustls::{AlertDescription, ClientConfig};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DEFAULT_DIAL_TIMEOUT;

/// How long a failed request waits for the connection to report why it closed
const CLOSE_REASON_WAIT: Duration = Duration::from_millis(250);

/// Outbound connection errors
#[derive(Debug, Clone, Error)]
pub enum HandshakeError {
    /// The peer is not part of this trust domain, or rejected our certificate
    #[error("bad certificate: {0}")]
    BadCertificate(String),

    /// Connection refused, reset, broken pipe or another transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The dial did not complete within the timeout
    #[error("dial timed out after {0:?}")]
    TimedOut(Duration),

    /// The caller cancelled the dial
    #[error("dial cancelled")]
    Cancelled,

    /// The address cannot be dialed
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl HandshakeError {
    /// Whether the failure was a certificate rejection on either side
    pub fn is_bad_certificate(&self) -> bool {
        matches!(self, HandshakeError::BadCertificate(_))
    }

    /// Classify an error from any layer of the connection stack
    ///
    /// The source chain is searched for a rustls error; certificate problems
    /// found there become [`HandshakeError::BadCertificate`], anything else is
    /// a transport failure.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        match find_tls_error(err) {
            Some(tls) if is_certificate_error(tls) => {
                HandshakeError::BadCertificate(tls.to_string())
            }
            _ => HandshakeError::Transport(error_chain(err)),
        }
    }
}

fn find_tls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        // tokio-rustls wraps rustls errors in io::Error without exposing them as source
        if let Some(tls) = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(tls);
        }
        current = e.source();
    }
    None
}

fn is_certificate_error(err: &rustls::Error) -> bool {
    match err {
        rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented => true,
        rustls::Error::AlertReceived(alert) => matches!(
            alert,
            AlertDescription::BadCertificate
                | AlertDescription::UnsupportedCertificate
                | AlertDescription::CertificateRevoked
                | AlertDescription::CertificateExpired
                | AlertDescription::CertificateUnknown
                | AlertDescription::UnknownCA
                | AlertDescription::CertificateRequired
                | AlertDescription::AccessDenied
        ),
        _ => false,
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

type CloseReason = Arc<watch::Sender<Option<HandshakeError>>>;

/// Record `reason` unless an earlier one is already recorded
fn record_close_reason(slot: &CloseReason, reason: HandshakeError) {
    slot.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        true
    });
}

/// TLS stream wrapper that records certificate alerts as they surface
///
/// h2 keeps only the kind and message of an I/O error, which loses the
/// rustls alert a peer sent when it rejected our certificate. The tap sits
/// below HTTP/2 and records the classified error first.
struct AlertTap<S> {
    inner: S,
    close_reason: CloseReason,
}

impl<S> AlertTap<S> {
    fn new(inner: S, close_reason: CloseReason) -> Self {
        Self {
            inner,
            close_reason,
        }
    }

    fn observe<T>(&self, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        if let Poll::Ready(Err(e)) = &poll {
            let reason = HandshakeError::classify(e);
            if reason.is_bad_certificate() {
                record_close_reason(&self.close_reason, reason);
            }
        }
        poll
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for AlertTap<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        self.observe(poll)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for AlertTap<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        self.observe(poll)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        self.observe(poll)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_flush(cx);
        self.observe(poll)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_shutdown(cx);
        self.observe(poll)
    }
}

/// Options for a single dial
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Limit on the whole dial, handshake included
    pub timeout: Duration,
    /// Aborts the dial when cancelled
    pub cancel: CancellationToken,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DIAL_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl DialOptions {
    /// Options with the given timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Split `host:port` into the host part used for the TLS server name
fn server_name(addr: &str) -> Result<ServerName<'static>, HandshakeError> {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => host,
        _ => {
            return Err(HandshakeError::InvalidAddress(format!(
                "'{}' is not host:port",
                addr
            )))
        }
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    ServerName::try_from(host.to_string())
        .map_err(|e| HandshakeError::InvalidAddress(format!("'{}': {}", addr, e)))
}

/// Open a mutual-TLS HTTP/2 session to `addr` (`host:port`)
pub async fn dial(
    addr: &str,
    tls: Arc<ClientConfig>,
    opts: DialOptions,
) -> Result<SecureConnection, HandshakeError> {
    let name = server_name(addr)?;

    tokio::select! {
        _ = opts.cancel.cancelled() => {
            debug!(addr = %addr, "Dial cancelled");
            Err(HandshakeError::Cancelled)
        }
        result = tokio::time::timeout(opts.timeout, connect(addr, name, tls)) => {
            result.map_err(|_| HandshakeError::TimedOut(opts.timeout))?
        }
    }
}

async fn connect(
    addr: &str,
    name: ServerName<'static>,
    tls: Arc<ClientConfig>,
) -> Result<SecureConnection, HandshakeError> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| HandshakeError::Transport(format!("failed to connect to {}: {}", addr, e)))?;
    tcp.set_nodelay(true)
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    let stream = TlsConnector::from(tls)
        .connect(name, tcp)
        .await
        .map_err(|e| HandshakeError::classify(&e))?;

    let (close_tx, close_rx) = watch::channel(None);
    let close_tx = Arc::new(close_tx);
    let io = TokioIo::new(AlertTap::new(stream, close_tx.clone()));

    let (sender, connection) =
        match hyper::client::conn::http2::handshake(TokioExecutor::new(), io).await {
            Ok(parts) => parts,
            Err(e) => {
                let recorded = close_rx.borrow().clone();
                return Err(recorded.unwrap_or_else(|| HandshakeError::classify(&e)));
            }
        };

    let peer = addr.to_string();
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            record_close_reason(&close_tx, HandshakeError::classify(&e));
            let reason = close_tx.borrow().clone();
            if let Some(reason) = reason {
                debug!(addr = %peer, error = %reason, "Connection closed with error");
            }
        }
    });

    debug!(addr = %addr, "Dialed peer");
    Ok(SecureConnection {
        sender,
        authority: addr.to_string(),
        close_reason: close_rx,
        driver,
    })
}

/// An authenticated HTTP/2 session with a peer
///
/// Requests may be issued concurrently. Dropping the connection closes it.
#[derive(Debug)]
pub struct SecureConnection {
    sender: SendRequest<Full<Bytes>>,
    authority: String,
    close_reason: watch::Receiver<Option<HandshakeError>>,
    driver: JoinHandle<()>,
}

impl SecureConnection {
    /// The `host:port` this connection was dialed with
    pub fn peer(&self) -> &str {
        &self.authority
    }

    /// Issue a GET for `path`
    pub async fn get(&self, path: &str) -> Result<Response<Bytes>, HandshakeError> {
        let request = Request::get(self.uri(path)?)
            .body(Full::new(Bytes::new()))
            .map_err(|e| HandshakeError::InvalidAddress(e.to_string()))?;
        self.send(request).await
    }

    /// Send a request and collect the response body
    ///
    /// A peer that rejected our certificate after the handshake (TLS 1.3
    /// reports it on the first read) surfaces here as
    /// [`HandshakeError::BadCertificate`].
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>, HandshakeError> {
        let mut sender = self.sender.clone();
        if let Err(e) = sender.ready().await {
            return Err(self.failure(HandshakeError::classify(&e)).await);
        }

        let response = match sender.send_request(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.failure(HandshakeError::classify(&e)).await),
        };

        let (parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return Err(self.failure(HandshakeError::classify(&e)).await),
        };
        Ok(Response::from_parts(parts, body))
    }

    /// Classify a request failure
    ///
    /// A request on a dying connection fails with whatever h2 reports, which
    /// no longer carries the TLS alert that killed it. The reason recorded
    /// for the connection wins when there is one.
    async fn failure(&self, local: HandshakeError) -> HandshakeError {
        if local.is_bad_certificate() {
            return local;
        }

        let mut close_reason = self.close_reason.clone();
        let reason = tokio::time::timeout(
            CLOSE_REASON_WAIT,
            close_reason.wait_for(|reason| reason.is_some()),
        )
        .await;
        match reason {
            Ok(Ok(reason)) => reason.clone().unwrap_or(local),
            _ => local,
        }
    }

    fn uri(&self, path: &str) -> Result<Uri, HandshakeError> {
        format!("https://{}{}", self.authority, path)
            .parse()
            .map_err(|e| HandshakeError::InvalidAddress(format!("{}: {}", path, e)))
    }
}

impl Drop for SecureConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
