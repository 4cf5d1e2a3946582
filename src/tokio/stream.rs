//! Async stream abstraction for tokio.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::UnixStream;

#[cfg(feature = "tokio-tls")]
use tokio_native_tls::TlsStream;

enum Inner {
    Tcp(BufReader<TcpStream>),
    #[cfg(feature = "tokio-tls")]
    Tls(BufReader<TlsStream<TcpStream>>),
    Unix(BufReader<UnixStream>),
}

/// Wraps a TCP/Unix/TLS stream with the read/write timeout from
/// `Opts::socket_timeout`, applied to every I/O call via `tokio::time::timeout`
/// rather than a socket option (tokio's streams don't expose one).
pub struct Stream {
    inner: Inner,
    timeout: Duration,
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self {
            inner: Inner::Tcp(BufReader::new(stream)),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self {
            inner: Inner::Unix(BufReader::new(stream)),
            timeout: Duration::from_secs(60),
        }
    }

    /// Apply a read/write timeout to every subsequent I/O call on this stream.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Upgrade a TCP stream to TLS.
    ///
    /// Returns an error if this is not a TCP stream or if the TLS handshake fails.
    #[cfg(feature = "tokio-tls")]
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self, crate::error::Error> {
        let timeout = self.timeout;
        match self.inner {
            Inner::Tcp(buf_reader) => {
                let tcp_stream = buf_reader.into_inner();
                let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
                let tls_stream = connector.connect(host, tcp_stream).await.map_err(|e| {
                    crate::error::Error::Tls(e.into())
                })?;
                Ok(Self {
                    inner: Inner::Tls(BufReader::new(tls_stream)),
                    timeout,
                })
            }
            Inner::Tls(_) => Err(crate::error::Error::Interface(
                "Stream is already TLS".into(),
            )),
            Inner::Unix(_) => Err(crate::error::Error::Interface(
                "Cannot upgrade Unix socket to TLS".into(),
            )),
        }
    }

    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        let timeout = self.timeout;
        let read = async {
            match &mut self.inner {
                Inner::Tcp(r) => r.read_u8().await,
                #[cfg(feature = "tokio-tls")]
                Inner::Tls(r) => r.read_u8().await,
                Inner::Unix(r) => r.read_u8().await,
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .unwrap_or_else(|_| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)))
    }

    /// Read a PostgreSQL message into the buffer set.
    pub async fn read_message(&mut self, buffer_set: &mut crate::buffer_set::BufferSet) -> std::io::Result<()> {
        buffer_set.type_byte = self.read_u8().await?;

        let mut length_bytes = [0u8; 4];
        self.read_exact(&mut length_bytes).await?;
        let length = u32::from_be_bytes(length_bytes);
        if length > buffer_set.max_message_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "message length {length} exceeds max_message_size {}",
                    buffer_set.max_message_size
                ),
            ));
        }

        let payload_len = (length as usize).saturating_sub(4);
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize(payload_len, 0);
        self.read_exact(&mut buffer_set.read_buffer).await?;

        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        let timeout = self.timeout;
        let read = async {
            match &mut self.inner {
                Inner::Tcp(r) => r.read_exact(buf).await.map(|_| ()),
                #[cfg(feature = "tokio-tls")]
                Inner::Tls(r) => r.read_exact(buf).await.map(|_| ()),
                Inner::Unix(r) => r.read_exact(buf).await.map(|_| ()),
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .unwrap_or_else(|_| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)))
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let timeout = self.timeout;
        let write = async {
            match &mut self.inner {
                Inner::Tcp(r) => r.get_mut().write_all(buf).await,
                #[cfg(feature = "tokio-tls")]
                Inner::Tls(r) => r.get_mut().write_all(buf).await,
                Inner::Unix(r) => r.get_mut().write_all(buf).await,
            }
        };
        tokio::time::timeout(timeout, write)
            .await
            .unwrap_or_else(|_| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)))
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        let timeout = self.timeout;
        let flush = async {
            match &mut self.inner {
                Inner::Tcp(r) => r.get_mut().flush().await,
                #[cfg(feature = "tokio-tls")]
                Inner::Tls(r) => r.get_mut().flush().await,
                Inner::Unix(r) => r.get_mut().flush().await,
            }
        };
        tokio::time::timeout(timeout, flush)
            .await
            .unwrap_or_else(|_| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)))
    }

    pub fn is_tcp_loopback(&self) -> bool {
        match &self.inner {
            Inner::Tcp(r) => r
                .get_ref()
                .peer_addr()
                .map(|addr| addr.ip().is_loopback())
                .unwrap_or(false),
            #[cfg(feature = "tokio-tls")]
            Inner::Tls(r) => r
                .get_ref() // &TlsStream<TcpStream> (tokio_native_tls)
                .get_ref() // &native_tls::TlsStream<AllowStd<TcpStream>>
                .get_ref() // &AllowStd<TcpStream>
                .get_ref() // &TcpStream
                .peer_addr()
                .map(|addr| addr.ip().is_loopback())
                .unwrap_or(false),
            Inner::Unix(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_set::BufferSet;
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (Stream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Stream::tcp(server), client)
    }

    #[tokio::test]
    async fn read_message_rejects_length_over_bound() {
        let (mut server, mut client) = loopback_pair().await;

        client.write_all(&[b'D']).await.unwrap();
        client.write_all(&100u32.to_be_bytes()).await.unwrap();

        let mut buffer_set = BufferSet::with_max_message_size(16);
        let err = server.read_message(&mut buffer_set).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn read_message_accepts_length_within_bound() {
        let (mut server, mut client) = loopback_pair().await;

        let payload = b"hello";
        client.write_all(&[b'D']).await.unwrap();
        client
            .write_all(&((4 + payload.len()) as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(payload).await.unwrap();

        let mut buffer_set = BufferSet::with_max_message_size(64);
        server.read_message(&mut buffer_set).await.unwrap();
        assert_eq!(buffer_set.type_byte, b'D');
        assert_eq!(buffer_set.read_buffer, payload);
    }

    #[tokio::test]
    async fn read_u8_times_out_when_peer_sends_nothing() {
        let (mut server, _client) = loopback_pair().await;
        server.set_timeout(Duration::from_millis(20));

        let err = server.read_u8().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
