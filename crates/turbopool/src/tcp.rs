//! TCP connector built on tokio sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::connector::{Connection, Connector};
use crate::error::{PoolError, PoolResult};

/// Per-attempt TCP parameters
#[derive(Debug, Clone)]
pub struct TcpTemplate {
    /// Remote address as `host:port`
    pub addr: String,

    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// Upper bound on resolution plus handshake
    pub connect_timeout: Duration,
}

impl TcpTemplate {
    /// Template for `addr` with `TCP_NODELAY` and a 5 second connect timeout
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            nodelay: true,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set `TCP_NODELAY`
    #[must_use]
    pub const fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Connector producing [`TcpConnection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a new TCP connector
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpConnection;
    type Template = TcpTemplate;

    async fn establish(&self, template: &TcpTemplate) -> PoolResult<TcpConnection> {
        trace!("Connecting to {}", template.addr);

        let stream = tokio::time::timeout(template.connect_timeout, TcpStream::connect(&template.addr))
            .await
            .map_err(|_| {
                PoolError::EstablishFailed(format!(
                    "Connect to {} timed out after {:?}",
                    template.addr, template.connect_timeout
                ))
            })?
            .map_err(|e| {
                PoolError::EstablishFailed(format!("Failed to connect to {}: {e}", template.addr))
            })?;

        stream.set_nodelay(template.nodelay)?;
        let peer = stream.peer_addr()?;
        let connection = TcpConnection {
            id: Uuid::new_v4(),
            peer,
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
        };
        debug!(connection = %connection.id, %peer, "TCP connection established");
        Ok(connection)
    }
}

/// A pooled TCP stream
#[derive(Debug)]
pub struct TcpConnection {
    id: Uuid,
    peer: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl TcpConnection {
    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether close has been signalled
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Exclusive access to the stream. `None` once the connection is closed.
    pub async fn lock(&self) -> MutexGuard<'_, Option<TcpStream>> {
        let mut guard = self.stream.lock().await;
        if self.is_closed() {
            guard.take();
        }
        guard
    }
}

impl Connection for TcpConnection {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // a holder of the lock drops the stream on its next `lock`
        if let Ok(mut guard) = self.stream.try_lock() {
            guard.take();
        }
        trace!(connection = %self.id, "TCP connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_template_builder() {
        let template = TcpTemplate::new("127.0.0.1:8007")
            .nodelay(false)
            .connect_timeout(Duration::from_millis(250));
        assert_eq!(template.addr, "127.0.0.1:8007");
        assert!(!template.nodelay);
        assert_eq!(template.connect_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_establish_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let conn = TcpConnector::new()
            .establish(&TcpTemplate::new(addr.to_string()))
            .await
            .unwrap();
        assert_eq!(conn.peer_addr(), addr);

        {
            let mut guard = conn.lock().await;
            let stream = guard.as_mut().unwrap();
            stream.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
        }
        server.await.unwrap();

        conn.close();
        assert!(conn.is_closed());
        assert!(conn.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_establish_refused() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpConnector::new()
            .establish(&TcpTemplate::new(addr.to_string()))
            .await;
        assert!(matches!(result, Err(PoolError::EstablishFailed(_))));
    }
}
