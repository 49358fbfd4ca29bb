//! Connection pool implementation.
//!
//! This module provides a bounded pool that lends connections created by a
//! [`Connector`]. The number of live connections (idle, lent out, or being
//! opened) never exceeds [`PoolConfig::max_connections`], and checkout never
//! waits for capacity.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::connector::Connector;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;

/// A bounded connection pool.
///
/// The pool owns every connection it creates. Idle connections are reused in
/// FIFO order; when none is idle and the pool is below its maximum, a new
/// connection is opened for the caller. Otherwise [`Pool::acquire`] fails
/// with [`PoolError::PoolExhausted`].
///
/// `Pool` is cheap to clone; clones share the same connections.
///
/// # Example
///
/// ```rust,ignore
/// use toolkit_pool::{Pool, PoolConfig, TcpConnector};
///
/// let config = PoolConfig::new()
///     .url("db.internal:5432")
///     .max_connections(20)
///     .initial_connections(5);
///
/// let pool = Pool::new(config, TcpConnector::new()).await?;
///
/// let conn = pool.acquire().await?;
/// // Use connection...
/// pool.release(conn)?;
/// ```
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C: Connector> {
    /// Pool configuration.
    config: PoolConfig,

    /// Factory for new connections.
    connector: C,

    /// Idle connections and the live count, guarded together.
    slots: Mutex<Slots<C::Connection>>,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,
}

struct Slots<T> {
    /// Connections ready to be lent, oldest return first.
    idle: VecDeque<Entry<T>>,
    /// Connections created and not yet closed, plus reserved slots.
    live: u32,
}

struct Entry<T> {
    conn: T,
    metadata: ConnectionMetadata,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections created.
    connections_created: u64,
    /// Total connections removed by close or discard.
    connections_closed: u64,
    /// Total failed connect attempts.
    connect_failures: u64,
    /// Total connections that failed to close cleanly.
    close_failures: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (exhausted, connect errors).
    checkouts_failed: u64,
    /// Total connections returned to the idle queue.
    releases: u64,
}

impl<C: Connector> Pool<C> {
    /// Create a new pool builder around `connector`.
    #[must_use]
    pub fn builder(connector: C) -> PoolBuilder<C> {
        PoolBuilder::new(connector)
    }

    /// Create a new pool and open its initial connections.
    ///
    /// Only an invalid configuration is an error. A driver that fails to
    /// load, or an initial connection that fails to open, is logged and the
    /// pool starts with whatever connections succeeded.
    pub async fn new(config: PoolConfig, connector: C) -> Result<Self, PoolError> {
        config.validate()?;

        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                slots: Mutex::new(Slots {
                    idle: VecDeque::new(),
                    live: 0,
                }),
                next_connection_id: AtomicU64::new(1),
                created_at: Instant::now(),
                metrics: Mutex::new(PoolMetricsInner::default()),
            }),
        };

        pool.warm_up().await;

        let config = &pool.inner.config;
        tracing::info!(
            url = %config.url,
            driver = %config.driver,
            max = config.max_connections,
            initial = config.initial_connections,
            idle = pool.status().available,
            "connection pool created"
        );

        Ok(pool)
    }

    async fn warm_up(&self) {
        let config = &self.inner.config;

        if let Err(e) = self.inner.connector.load_driver(&config.driver) {
            let err = PoolError::PrerequisiteMissing {
                driver: config.driver.clone(),
                source: Box::new(e),
            };
            tracing::warn!(error = %err, "starting with an empty pool");
            return;
        }

        for _ in 0..config.initial_connections {
            match self.inner.open().await {
                Ok(entry) => {
                    let mut slots = self.inner.slots.lock();
                    slots.live += 1;
                    slots.idle.push_back(entry);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to open initial connection");
                }
            }
        }
    }

    /// Get a connection from the pool.
    ///
    /// Returns the longest-idle connection if there is one. Otherwise opens
    /// a new connection if the pool is below its maximum, or fails with
    /// [`PoolError::PoolExhausted`] without waiting.
    ///
    /// A failed connect returns [`PoolError::ConnectFailed`] and leaves the
    /// live count unchanged. Dropping the returned future while it connects
    /// frees the reserved slot.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let reservation = {
            let mut slots = self.inner.slots.lock();

            if let Some(entry) = slots.idle.pop_front() {
                drop(slots);
                return Ok(self.lend(entry));
            }

            let max = self.inner.config.max_connections;
            if slots.live >= max {
                drop(slots);
                self.inner.metrics.lock().checkouts_failed += 1;
                tracing::debug!(max = max, "connection pool exhausted");
                return Err(PoolError::PoolExhausted { max });
            }

            slots.live += 1;
            SlotReservation {
                pool: &self.inner,
                committed: false,
            }
        };

        match self.inner.open().await {
            Ok(entry) => {
                reservation.commit();
                Ok(self.lend(entry))
            }
            Err(err) => {
                drop(reservation);
                self.inner.metrics.lock().checkouts_failed += 1;
                Err(err)
            }
        }
    }

    fn lend(&self, mut entry: Entry<C::Connection>) -> PooledConnection<C> {
        entry.metadata.mark_checkout();
        self.inner.metrics.lock().checkouts_successful += 1;

        tracing::trace!(
            connection_id = entry.metadata.id,
            checkouts = entry.metadata.checkout_count,
            "connection checked out"
        );

        PooledConnection {
            entry: Some(entry),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Return a connection to the tail of the idle queue.
    ///
    /// Fails with [`PoolError::ForeignConnection`] if the connection was
    /// acquired from another pool; it is then returned to its own pool.
    /// Dropping a [`PooledConnection`] has the same effect as releasing it.
    pub fn release(&self, mut conn: PooledConnection<C>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            let id = conn.id();
            tracing::warn!(
                connection_id = id,
                "connection released to a pool it was not acquired from"
            );
            return Err(PoolError::ForeignConnection { id });
        }

        let entry = conn.take_entry();
        self.inner.return_entry(entry);
        Ok(())
    }

    /// Close a connection the caller found to be broken.
    ///
    /// The connection's slot is freed whether or not the close succeeds.
    pub async fn discard(&self, conn: PooledConnection<C>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            return Err(PoolError::ForeignConnection { id: conn.id() });
        }

        let id = conn.id();
        let raw = conn.detach();
        tracing::debug!(connection_id = id, "discarding connection");

        self.inner.close_one(id, raw).await
    }

    /// Close every idle connection.
    ///
    /// Idle connections are removed from the pool and their slots freed
    /// before any of them is closed, so a failed close never leaks a slot.
    /// Each failure is logged and collected in the returned report; the
    /// remaining connections are still closed.
    ///
    /// Connections currently lent out are not touched. Once released they
    /// become idle and are closed by the next call. The pool stays usable
    /// and opens fresh connections on demand afterwards.
    pub async fn close_all_connections(&self) -> CloseReport {
        let drained: Vec<Entry<C::Connection>> = {
            let mut slots = self.inner.slots.lock();
            let drained: Vec<_> = slots.idle.drain(..).collect();
            slots.live -= drained.len() as u32;
            drained
        };

        let mut report = CloseReport::default();
        for entry in drained {
            match self.inner.close_one(entry.metadata.id, entry.conn).await {
                Ok(()) => report.closed += 1,
                Err(err) => report.failures.push(err),
            }
        }

        tracing::info!(
            closed = report.closed,
            failed = report.failures.len(),
            in_use = self.status().in_use,
            "closed idle connections"
        );

        report
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let slots = self.inner.slots.lock();
        let available = slots.idle.len() as u32;
        PoolStatus {
            available,
            in_use: slots.live - available,
            total: slots.live,
            max: self.inner.config.max_connections,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            connect_failures: inner.connect_failures,
            close_failures: inner.close_failures,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            releases: inner.releases,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connector used to open connections.
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }
}

impl<C: Connector> PoolInner<C> {
    /// Open a connection. The caller must already own a slot for it.
    async fn open(&self) -> Result<Entry<C::Connection>, PoolError> {
        match self.connector.connect(&self.config.url).await {
            Ok(conn) => {
                let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                self.metrics.lock().connections_created += 1;
                tracing::debug!(connection_id = id, "connection opened");
                Ok(Entry {
                    conn,
                    metadata: ConnectionMetadata::new(id),
                })
            }
            Err(e) => {
                self.metrics.lock().connect_failures += 1;
                Err(PoolError::ConnectFailed {
                    target: self.config.url.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Close a connection whose slot has already been freed.
    async fn close_one(&self, id: u64, conn: C::Connection) -> Result<(), PoolError> {
        let result = self.connector.close(conn).await;

        let mut metrics = self.metrics.lock();
        metrics.connections_closed += 1;
        match result {
            Ok(()) => {
                drop(metrics);
                tracing::debug!(connection_id = id, "connection closed");
                Ok(())
            }
            Err(e) => {
                metrics.close_failures += 1;
                drop(metrics);
                let err = PoolError::CloseFailed {
                    id,
                    source: Box::new(e),
                };
                tracing::warn!(error = %err, "connection did not close cleanly");
                Err(err)
            }
        }
    }

    fn return_entry(&self, entry: Entry<C::Connection>) {
        let id = entry.metadata.id;
        self.slots.lock().idle.push_back(entry);
        self.metrics.lock().releases += 1;
        tracing::trace!(connection_id = id, "connection returned to pool");
    }

    fn release_slot(&self) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.live > 0, "live connection count underflow");
        slots.live = slots.live.saturating_sub(1);
    }
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

/// A live-count slot taken for a connection that is still being opened.
///
/// Dropping an uncommitted reservation gives the slot back.
struct SlotReservation<'a, C: Connector> {
    pool: &'a PoolInner<C>,
    committed: bool,
}

impl<C: Connector> SlotReservation<'_, C> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl<C: Connector> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.release_slot();
        }
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(TcpConnector::new())
///     .url("db.internal:5432")
///     .max_connections(20)
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder<C: Connector> {
    pool_config: PoolConfig,
    connector: C,
}

impl<C: Connector> PoolBuilder<C> {
    /// Create a new pool builder with default settings.
    pub fn new(connector: C) -> Self {
        Self {
            pool_config: PoolConfig::default(),
            connector,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the connection target.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.pool_config.url = url.into();
        self
    }

    /// Set the driver identifier.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.pool_config.driver = driver.into();
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the number of connections opened when the pool is created.
    #[must_use]
    pub fn initial_connections(mut self, count: u32) -> Self {
        self.pool_config.initial_connections = count;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool<C>, PoolError> {
        Pool::new(self.pool_config, self.connector).await
    }
}

impl<C: Connector + Default> Default for PoolBuilder<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections lent out or being opened.
    pub in_use: u32,
    /// Total number of live connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed or discarded since pool start.
    pub connections_closed: u64,
    /// Connect attempts that failed.
    pub connect_failures: u64,
    /// Closes that reported an error.
    pub close_failures: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (exhausted, connect errors).
    pub checkouts_failed: u64,
    /// Connections returned to the idle queue.
    pub releases: u64,
    /// Time since pool creation.
    pub uptime: std::time::Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate close success rate (0.0 to 1.0).
    #[must_use]
    pub fn close_success_rate(&self) -> f64 {
        if self.connections_closed == 0 {
            return 1.0;
        }
        let successful = self.connections_closed - self.close_failures;
        successful as f64 / self.connections_closed as f64
    }
}

/// Outcome of [`Pool::close_all_connections`].
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Connections that closed cleanly.
    pub closed: usize,
    /// One [`PoolError::CloseFailed`] per connection that did not.
    pub failures: Vec<PoolError>,
}

impl CloseReport {
    /// Number of connections removed from the pool.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.closed + self.failures.len()
    }

    /// Check if every connection closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A connection retrieved from the pool.
///
/// Dereferences to the underlying connection. When dropped, the connection
/// is returned to the pool it came from, exactly as [`Pool::release`] would.
/// Use [`detach()`](PooledConnection::detach) to take it out of the pool.
pub struct PooledConnection<C: Connector> {
    /// `None` only once the connection has been handed back or detached.
    entry: Option<Entry<C::Connection>>,
    /// Reference to the pool for returning the connection.
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledConnection<C> {
    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.entry().metadata
    }

    /// Get the pool-assigned connection ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry().metadata.id
    }

    /// Detach the connection from the pool.
    ///
    /// The pool stops tracking the connection and frees its slot; closing
    /// it becomes the caller's responsibility.
    pub fn detach(mut self) -> C::Connection {
        let entry = self.take_entry();
        self.pool.release_slot();
        tracing::debug!(connection_id = entry.metadata.id, "connection detached");
        entry.conn
    }

    fn entry(&self) -> &Entry<C::Connection> {
        match &self.entry {
            Some(entry) => entry,
            None => unreachable!("pooled connection used after return"),
        }
    }

    fn take_entry(&mut self) -> Entry<C::Connection> {
        match self.entry.take() {
            Some(entry) => entry,
            None => unreachable!("pooled connection returned twice"),
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        &self.entry().conn
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.entry {
            Some(entry) => &mut entry.conn,
            None => unreachable!("pooled connection used after return"),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.return_entry(entry);
        }
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.entry.as_ref().map(|e| &e.metadata))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TcpConnector;
    use tokio::net::TcpListener;

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
        };
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_status_at_capacity() {
        let status = PoolStatus {
            available: 0,
            in_use: 10,
            total: 10,
            max: 10,
        };
        assert!(status.is_at_capacity());

        let status2 = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
        };
        assert!(!status2.is_at_capacity());
    }

    #[test]
    fn test_pool_metrics_success_rates() {
        let metrics = PoolMetrics {
            connections_created: 10,
            connections_closed: 20,
            connect_failures: 1,
            close_failures: 1,
            checkouts_successful: 90,
            checkouts_failed: 10,
            releases: 85,
            uptime: std::time::Duration::from_secs(3600),
        };

        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
        assert!((metrics.close_success_rate() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_close_report() {
        let mut report = CloseReport::default();
        assert!(report.is_clean());

        report.closed = 2;
        report.failures.push(PoolError::CloseFailed {
            id: 3,
            source: "reset by peer".into(),
        });
        assert_eq!(report.attempted(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_builder_default() {
        let builder = PoolBuilder::new(TcpConnector::new());
        assert_eq!(builder.pool_config.initial_connections, 1);
        assert_eq!(builder.pool_config.max_connections, 10);
    }

    #[test]
    fn test_builder_fluent() {
        let builder = Pool::builder(TcpConnector::new())
            .url("db.internal:5432")
            .driver("tcp")
            .initial_connections(5)
            .max_connections(50);

        assert_eq!(builder.pool_config.url, "db.internal:5432");
        assert_eq!(builder.pool_config.initial_connections, 5);
        assert_eq!(builder.pool_config.max_connections, 50);
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let err = Pool::builder(TcpConnector::new())
            .max_connections(1)
            .initial_connections(2)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_tcp_pool_reuses_released_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let pool = Pool::builder(TcpConnector::new().nodelay(true))
            .url(addr)
            .max_connections(1)
            .initial_connections(1)
            .build()
            .await
            .unwrap();
        assert_eq!(pool.status().available, 1);

        let conn = pool.acquire().await.unwrap();
        let id = conn.id();
        assert!(conn.nodelay().unwrap());
        assert!(matches!(
            pool.acquire().await,
            Err(PoolError::PoolExhausted { max: 1 })
        ));

        pool.release(conn).unwrap();
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), id);
        assert_eq!(conn.metadata().checkout_count, 2);
        drop(conn);

        let report = pool.close_all_connections().await;
        assert_eq!(report.closed, 1);
        assert!(report.is_clean());
        assert_eq!(pool.status().total, 0);
    }

    #[tokio::test]
    async fn test_tcp_pool_with_unknown_driver_starts_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let config = PoolConfig::new()
            .url(addr)
            .driver("org.sqlite.JDBC")
            .max_connections(2)
            .initial_connections(2);
        let pool = Pool::new(config, TcpConnector::new()).await.unwrap();

        assert_eq!(pool.status().total, 0);
        assert_eq!(pool.metrics().connections_created, 0);
    }
}
