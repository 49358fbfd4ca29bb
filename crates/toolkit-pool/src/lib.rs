//! # toolkit-pool
//!
//! Bounded connection pool for expensive, long-lived network connections.
//!
//! The pool lends connections to many concurrent callers, never lends the
//! same connection twice, and never lets the number of live connections
//! exceed the configured maximum. Checkout never waits: when every slot is
//! taken, [`Pool::acquire`] fails immediately with
//! [`PoolError::PoolExhausted`].
//!
//! ## Features
//!
//! - Eager warm-up of an initial batch of connections
//! - Lazy creation on demand, bounded by the live connection count
//! - FIFO reuse of idle connections
//! - Connect and close run outside the pool lock
//! - Pluggable connection factory via the [`Connector`] trait
//! - Pool status and metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolkit_pool::{Pool, TcpConnector};
//!
//! let pool = Pool::builder(TcpConnector::new())
//!     .url("db.internal:5432")
//!     .driver("tcp")
//!     .max_connections(20)
//!     .initial_connections(5)
//!     .build()
//!     .await?;
//!
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn)?;
//!
//! // On shutdown
//! let report = pool.close_all_connections().await;
//! println!("closed {} connections", report.closed);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Connection factories
pub use connector::{Connector, TcpConnector};

// Error types
pub use error::{BoxError, PoolError};

// Pool types
pub use pool::{CloseReport, Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::ConnectionMetadata;
