//! # toolkit-testing
//!
//! Test infrastructure for the toolkit connection pool.
//!
//! [`MockConnector`] stands in for a real network connector. It hands out
//! numbered [`MockConnection`]s, tracks how many are open at once, and can
//! be told to fail driver loading, connects, or closes on demand.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolkit_pool::{Pool, PoolConfig};
//! use toolkit_testing::MockConnector;
//!
//! let connector = MockConnector::new();
//! let pool = Pool::new(PoolConfig::new().max_connections(2), connector.clone()).await?;
//!
//! let conn = pool.acquire().await?;
//! assert_eq!(connector.open_connections(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use toolkit_pool::Connector;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Errors produced by [`MockConnector`].
#[derive(Debug, Error)]
pub enum MockError {
    /// The requested driver is not registered.
    #[error("driver not found: {0}")]
    DriverNotFound(String),

    /// A connect attempt was told to fail.
    #[error("connection refused by {target}")]
    ConnectRefused {
        /// Target that was dialed.
        target: String,
    },

    /// A close was told to fail.
    #[error("connection {serial} failed to close")]
    CloseFailed {
        /// Serial of the connection.
        serial: u64,
    },
}

/// A scripted connector for pool tests.
///
/// Clones share state, so a test can keep a clone to inspect counters
/// after handing the connector to a pool.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    next_serial: AtomicU64,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    created: AtomicUsize,
    closed: AtomicUsize,
    script: Mutex<Script>,
}

#[derive(Debug, Default)]
struct Script {
    /// `None` accepts every driver.
    drivers: Option<Vec<String>>,
    fail_next_connects: usize,
    fail_all_connects: bool,
    fail_close: HashSet<u64>,
    connect_delay: Option<Duration>,
}

impl MockConnector {
    /// Create a connector that accepts any driver and never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept the given driver identifiers.
    #[must_use]
    pub fn with_drivers(self, drivers: &[&str]) -> Self {
        self.state.script.lock().drivers = Some(drivers.iter().map(|d| d.to_string()).collect());
        self
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.script.lock().fail_next_connects = count;
    }

    /// Make every connect attempt fail until switched off.
    pub fn fail_all_connects(&self, enabled: bool) {
        self.state.script.lock().fail_all_connects = enabled;
    }

    /// Make closing the connection with `serial` fail.
    pub fn fail_close_of(&self, serial: u64) {
        self.state.script.lock().fail_close.insert(serial);
    }

    /// Delay every connect attempt, or clear the delay with `None`.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.script.lock().connect_delay = delay;
    }

    /// Number of connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Highest number of connections that were open at the same time.
    #[must_use]
    pub fn peak_open_connections(&self) -> usize {
        self.state.peak_open.load(Ordering::SeqCst)
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Number of connections closed through [`Connector::close`].
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Error = MockError;

    fn load_driver(&self, driver: &str) -> Result<(), MockError> {
        match &self.state.script.lock().drivers {
            Some(drivers) if !drivers.iter().any(|d| d == driver) => {
                Err(MockError::DriverNotFound(driver.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn connect(&self, target: &str) -> Result<MockConnection, MockError> {
        let delay = self.state.script.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let refuse = {
            let mut script = self.state.script.lock();
            if script.fail_next_connects > 0 {
                script.fail_next_connects -= 1;
                true
            } else {
                script.fail_all_connects
            }
        };
        if refuse {
            return Err(MockError::ConnectRefused {
                target: target.to_string(),
            });
        }

        let serial = self.state.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open.fetch_max(open, Ordering::SeqCst);
        self.state.created.fetch_add(1, Ordering::SeqCst);

        Ok(MockConnection {
            serial,
            target: target.to_string(),
            state: Arc::clone(&self.state),
            open: true,
        })
    }

    async fn close(&self, mut conn: MockConnection) -> Result<(), MockError> {
        conn.mark_closed();
        self.state.closed.fetch_add(1, Ordering::SeqCst);

        if self.state.script.lock().fail_close.contains(&conn.serial) {
            return Err(MockError::CloseFailed {
                serial: conn.serial,
            });
        }
        Ok(())
    }
}

/// A fake connection handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    serial: u64,
    target: String,
    state: Arc<MockState>,
    open: bool,
}

impl MockConnection {
    /// Connector-assigned serial, starting at 1.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Target the connection was opened against.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    fn mark_closed(&mut self) {
        if self.open {
            self.open = false;
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
