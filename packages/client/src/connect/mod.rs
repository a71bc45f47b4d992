//! Connection establishment.
//!
//! Resolves the target host, dials TCP with the configured socket options,
//! and wraps the stream in TLS for https. The whole sequence runs under the
//! connect timeout; a slow resolver or handshake surfaces as
//! [`HttpError::Timeout`].

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{HttpError, Result};

/// An established connection, plaintext or TLS.
pub(crate) enum Transport {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// The underlying TCP stream, through TLS if present.
    pub(crate) fn tcp(&self) -> &TcpStream {
        match self {
            Transport::Tcp(s) => s,
            Transport::Tls(s) => s.get_ref().0,
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dials connections for the pool. One connector is shared by the whole
/// client so the TLS config is built once.
#[derive(Clone)]
pub(crate) struct Connector {
    tls: TlsConnector,
    connect_timeout: Duration,
    tcp_nodelay: bool,
    tcp_keepalive: Option<Duration>,
}

impl Connector {
    pub(crate) fn new(config: &HttpConfig) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            tls: TlsConnector::from(Arc::new(tls_config)),
            connect_timeout: config.connect_timeout,
            tcp_nodelay: config.tcp_nodelay,
            tcp_keepalive: config.tcp_keepalive,
        }
    }

    /// Establish a connection to the URL's authority. Covers DNS, TCP, and
    /// the TLS handshake under a single deadline.
    pub(crate) async fn establish(&self, url: &Url) -> Result<Transport> {
        let deadline = tokio::time::sleep(self.connect_timeout);
        tokio::pin!(deadline);

        tokio::select! {
            result = self.dial(url) => result,
            () = &mut deadline => Err(HttpError::Timeout(self.connect_timeout)),
        }
    }

    async fn dial(&self, url: &Url) -> Result<Transport> {
        let host = url
            .host_str()
            .ok_or_else(|| HttpError::invalid_request("url has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HttpError::invalid_request("url has no port"))?;

        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            HttpError::connect_io(format!("failed to connect to {host}:{port}"), e)
        })?;
        self.apply_socket_options(&stream)?;

        if url.scheme() != "https" {
            return Ok(Transport::Tcp(stream));
        }

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| HttpError::connect(format!("invalid TLS server name `{host}`")))?;
        let tls = self
            .tls
            .connect(server_name, stream)
            .await
            .map_err(|e| HttpError::connect_io(format!("TLS handshake with {host} failed"), e))?;
        Ok(Transport::Tls(Box::new(tls)))
    }

    fn apply_socket_options(&self, stream: &TcpStream) -> Result<()> {
        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }
        if let Some(interval) = self.tcp_keepalive {
            let sock = SockRef::from(stream);
            sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(interval))?;
        }
        Ok(())
    }
}
