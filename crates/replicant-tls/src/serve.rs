//! Accept loops for the API and probe listeners.
//!
//! Each accepted TCP connection gets its own task. On the mTLS listener the
//! handshake runs there (bounded by a timeout), and only a completed
//! handshake is handed to hyper. Handshake failures are logged and the
//! socket is dropped, so the router never sees unauthenticated traffic.
//! The plain listener skips the handshake and is otherwise identical.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` so a persistent error (fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Timeouts governing the accept loop.
#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    /// Upper bound on a single TLS handshake.
    pub handshake_timeout: Duration,
    /// Upper bound on receiving a complete HTTP/1 request head.
    pub header_read_timeout: Duration,
    /// How long in-flight connections may run after shutdown begins.
    pub shutdown_grace: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            header_read_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Source of inbound connections.
trait Accept: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    type Io = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Serve `router` over mTLS on `listener` until `shutdown` fires.
///
/// On shutdown the listener is closed, every open connection is asked to
/// finish its in-flight requests, and whatever is still running after the
/// grace period is aborted.
pub async fn serve_tls(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Router,
    shutdown: watch::Receiver<bool>,
    options: ServeOptions,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mTLS listener accepting connections");
    }
    let acceptor = TlsAcceptor::from(config);
    accept_loop(listener, Some(acceptor), router, shutdown, options).await;
    info!("mTLS listener stopped");
}

/// Serve `router` over plain HTTP on `listener` until `shutdown` fires.
///
/// Same drain and timeout behaviour as [`serve_tls`], minus the handshake.
pub async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: watch::Receiver<bool>,
    options: ServeOptions,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "plain HTTP listener accepting connections");
    }
    accept_loop(listener, None, router, shutdown, options).await;
    info!("plain HTTP listener stopped");
}

async fn accept_loop<L: Accept>(
    mut listener: L,
    acceptor: Option<TlsAcceptor>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
    options: ServeOptions,
) {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(options.header_read_timeout);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                connections.spawn(serve_connection(
                    stream,
                    peer,
                    acceptor.clone(),
                    builder.clone(),
                    router.clone(),
                    shutdown.clone(),
                    options.handshake_timeout,
                ));
            }
            // Reap finished connection tasks.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    info!(open = connections.len(), "listener closed, draining connections");

    let drained = tokio::time::timeout(options.shutdown_grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            grace = ?options.shutdown_grace,
            "grace period elapsed, aborting connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}

async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    builder: auto::Builder<TokioExecutor>,
    router: Router,
    shutdown: watch::Receiver<bool>,
    handshake_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Some(acceptor) = acceptor else {
        return drive(stream, peer, builder, router, shutdown).await;
    };

    let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            debug!(%peer, "TLS handshake timed out");
            return;
        }
    };
    debug!(%peer, "TLS handshake complete");
    drive(tls, peer, builder, router, shutdown).await;
}

async fn drive<S>(
    stream: S,
    peer: SocketAddr,
    builder: auto::Builder<TokioExecutor>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(router);
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(%peer, error = %e, "connection closed with error");
                }
                break;
            }
            _ = shutdown.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    struct FailingListener {
        attempts: Arc<AtomicUsize>,
    }

    impl Accept for FailingListener {
        type Io = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Err(io::Error::other("too many open files"))
        }
    }

    fn options() -> ServeOptions {
        ServeOptions {
            handshake_timeout: Duration::from_secs(1),
            header_read_timeout: Duration::from_millis(200),
            shutdown_grace: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn accept_errors_back_off() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let listener = FailingListener {
            attempts: attempts.clone(),
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(
            listener,
            None,
            Router::new(),
            shutdown_rx,
            options(),
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        shutdown.send(true).unwrap();
        handle.await.unwrap();

        let n = attempts.load(Ordering::SeqCst);
        assert!((1..=10).contains(&n), "{n} accept attempts in 350ms");
    }

    #[tokio::test]
    async fn incomplete_request_head_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let router = Router::new().route("/", get(|| async { "ok" }));
        let handle = tokio::spawn(serve_plain(listener, router, shutdown_rx, options()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
        assert!(closed.is_ok(), "server kept a stalled request head open");

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn plain_listener_serves_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let router = Router::new().route("/", get(|| async { "ok" }));
        let handle = tokio::spawn(serve_plain(listener, router, shutdown_rx, options()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 200"), "{text}");

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("plain listener did not stop")
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
