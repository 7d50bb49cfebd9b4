use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A connected device link. Implements `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by [`open`].
/// Wraps either a TCP stream or, with the `serial` feature, a serial port.
pub struct LabnodeStream {
    inner: StreamInner,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
}

/// Open a stream to `endpoint`, giving up after `timeout`.
pub async fn open(endpoint: &Endpoint, timeout: Duration) -> Result<LabnodeStream> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let connect = TcpStream::connect((host.as_str(), *port));
            let stream = tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| TransportError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                })?
                .map_err(|source| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            // Frames are small and latency bound.
            stream.set_nodelay(true)?;
            tracing::debug!(%endpoint, "tcp link established");
            Ok(LabnodeStream::from_tcp(stream))
        }
        Endpoint::Serial { tty, baud_rate } => open_serial(endpoint, tty, *baud_rate),
    }
}

#[cfg(feature = "serial")]
fn open_serial(endpoint: &Endpoint, tty: &str, baud_rate: u32) -> Result<LabnodeStream> {
    use tokio_serial::SerialPortBuilderExt;

    let port = tokio_serial::new(tty, baud_rate)
        .open_native_async()
        .map_err(|err| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source: io::Error::other(err.to_string()),
        })?;
    tracing::debug!(%endpoint, "serial link established");
    Ok(LabnodeStream {
        inner: StreamInner::Serial(port),
    })
}

#[cfg(not(feature = "serial"))]
fn open_serial(endpoint: &Endpoint, _tty: &str, _baud_rate: u32) -> Result<LabnodeStream> {
    Err(TransportError::Unsupported {
        endpoint: endpoint.to_string(),
        reason: "serial support requires the `serial` feature",
    })
}

impl LabnodeStream {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }

    /// Remote address, if the link is a socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.peer_addr().ok(),
            #[cfg(feature = "serial")]
            StreamInner::Serial(_) => None,
        }
    }

    /// Short name of the link kind, for logs.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(feature = "serial")]
            StreamInner::Serial(_) => "serial",
        }
    }
}

impl AsyncRead for LabnodeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "serial")]
            StreamInner::Serial(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LabnodeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "serial")]
            StreamInner::Serial(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "serial")]
            StreamInner::Serial(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "serial")]
            StreamInner::Serial(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for LabnodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabnodeStream")
            .field("type", &self.kind())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
