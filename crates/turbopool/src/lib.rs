//! # TurboPool
//!
//! A bounded, self-healing pool of asynchronously established connections.
//!
//! Connections are created on demand up to a maximum, kept warm down to a core
//! floor, handed out as shareable futures before the handshake completes, and
//! evicted by a background sweeper once they sit idle past the keep-alive.
//!
//! ## Lifecycle
//!
//! - `prepare(n)` grows the pool towards `max(n, core)` without overshoot
//! - `lease()` claims the oldest idle connection or grows the pool, and
//!   returns [`CapacityExceeded`](PoolError::CapacityExceeded) at the ceiling
//! - `revert(id)` hands a leased connection back
//! - `close()` stops leasing; `shutdown()` closes everything the pool tracks
//!
//! See [`slot`] for the per-connection state machine.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use turbopool::{Connection, Pool, Presets, TcpConnector, TcpTemplate};
//!
//! # async fn run() -> turbopool::PoolResult<()> {
//! let pool = Pool::new(
//!     Presets::fixed(4),
//!     TcpConnector::new(),
//!     TcpTemplate::new("127.0.0.1:6379"),
//! )?;
//!
//! let conn = pool.lease()?.await?;
//! // ... use the connection ...
//! pool.revert(&conn.id())?;
//!
//! pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! ```text
//! turbopool/
//! ├── config/     # Pool sizing and keep-alive configuration
//! ├── connector/  # Connector and connection traits, lease futures
//! ├── error/      # Pool error types
//! ├── pool/       # Pool operations and eviction
//! ├── slot/       # Per-connection state machine
//! ├── stats/      # Pool statistics
//! └── tcp/        # TCP connector
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod connector;
pub mod error;
pub mod pool;
mod registry;
mod scheduler;
pub mod slot;
pub mod stats;

#[cfg(feature = "tcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "tcp")))]
pub mod tcp;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{PoolConfig, PoolConfigBuilder, Presets};
pub use connector::{Connection, ConnectionFuture, Connector, Lease};
pub use error::{PoolError, PoolResult};
pub use pool::{ConnectionId, Pool};
pub use slot::SlotState;
pub use stats::PoolStats;

#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpConnector, TcpTemplate};
