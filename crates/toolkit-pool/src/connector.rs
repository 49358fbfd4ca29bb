//! Connection factories.
//!
//! A [`Connector`] knows how to open and close the connections a
//! [`Pool`](crate::Pool) lends out. The pool never touches the network
//! itself; it only decides when a connection may be created.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Factory for the connections managed by a pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type handed out by the pool.
    type Connection: Send + 'static;

    /// Error returned when a driver, connect or close operation fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Check that the named driver is available.
    ///
    /// Called once while the pool is created, before any connection is opened.
    fn load_driver(&self, _driver: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Open a new connection to `target`.
    async fn connect(&self, target: &str) -> Result<Self::Connection, Self::Error>;

    /// Close a connection the pool no longer tracks.
    async fn close(&self, conn: Self::Connection) -> Result<(), Self::Error> {
        drop(conn);
        Ok(())
    }
}

/// Driver identifier accepted by [`TcpConnector`].
pub const TCP_DRIVER: &str = "tcp";

/// Connector that opens plain TCP streams to a `host:port` target.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpConnector {
    /// Create a connector with no connect timeout and Nagle enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a connect attempt that takes longer than `timeout`.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set `TCP_NODELAY` on every new stream.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpStream;
    type Error = io::Error;

    fn load_driver(&self, driver: &str) -> Result<(), Self::Error> {
        if driver.eq_ignore_ascii_case(TCP_DRIVER) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported driver: {driver}"),
            ))
        }
    }

    async fn connect(&self, target: &str) -> Result<TcpStream, io::Error> {
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {target} timed out after {timeout:?}"),
                    )
                })??,
            None => TcpStream::connect(target).await?,
        };

        if self.nodelay {
            stream.set_nodelay(true)?;
        }

        tracing::debug!(addr = target, "tcp connection established");
        Ok(stream)
    }

    async fn close(&self, mut conn: TcpStream) -> Result<(), io::Error> {
        conn.shutdown().await
    }
}
