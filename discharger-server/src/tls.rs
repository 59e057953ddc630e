//! HTTPS listener for `axum::serve`.

use axum::Router;
use std::future::Future;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("failed to parse PEM in {path}: {source}")]
    Pem { path: String, source: io::Error },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}

/// TCP listener that completes a TLS handshake before handing the stream to axum
pub struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(tcp: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { tcp, acceptor }
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = tokio_rustls::server::TlsStream<tokio::net::TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, addr) = match self.tcp.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "TCP accept error");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            };

            match self.acceptor.accept(stream).await {
                Ok(tls_stream) => return (tls_stream, addr),
                Err(e) => {
                    tracing::warn!(peer = %addr, error = %e, "TLS handshake failed");
                    continue;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }
}

/// Serve `app` over TLS until `shutdown` resolves.
///
/// Peer addresses are not attached as `ConnectInfo` on this path, so audit
/// entries record the client IP as unknown.
pub async fn serve<F>(listener: TlsListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

fn open(path: &str) -> Result<BufReader<std::fs::File>, TlsError> {
    std::fs::File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Open {
            path: path.to_string(),
            source,
        })
}

/// Build an acceptor from PEM certificate chain and private key files.
pub fn load_tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, TlsError> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Pem {
            path: cert_path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_string()));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|source| TlsError::Pem {
            path: key_path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_string()))?;

    // reqwest pulls in a second provider; pick ring explicitly
    let config = tokio_rustls::rustls::ServerConfig::builder_with_provider(Arc::new(
        tokio_rustls::rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
