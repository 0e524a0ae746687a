//! Connector and connection contracts.
//!
//! The pool never opens sockets itself. A [`Connector`] turns a connection
//! template into a live [`Connection`]; the pool wraps that attempt in a
//! resolve-once [`ConnectionFuture`] which the pool and every caller share.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::PoolResult;

/// A live connection handed out by a pool
pub trait Connection: Send + Sync + 'static {
    /// Stable identity used to return the connection to its pool
    type Id: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    /// Identity of this connection
    fn id(&self) -> Self::Id;

    /// Signal the connection to close. Must be idempotent.
    fn close(&self);
}

/// Asynchronously establishes connections from a template
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced
    type Connection: Connection;

    /// Opaque per-attempt parameters (address, socket options, ...)
    type Template: Send + Sync + 'static;

    /// Establish one connection. Timeouts are the connector's concern.
    async fn establish(&self, template: &Self::Template) -> PoolResult<Self::Connection>;

    /// Release any execution resources held by the connector.
    fn shutdown(&self) {}
}

/// Shared, resolve-once handle to a connection attempt
pub type ConnectionFuture<C> = Shared<BoxFuture<'static, PoolResult<Arc<C>>>>;

pub(crate) fn into_connection_future<C, F>(future: F) -> ConnectionFuture<C>
where
    C: Connection,
    F: Future<Output = PoolResult<Arc<C>>> + Send + 'static,
{
    future.boxed().shared()
}

/// A leased connection that may still be connecting.
///
/// Awaiting the lease yields the connection once established, or the
/// establishment error. Cloning is cheap; every clone observes the same
/// outcome.
#[must_use = "a lease holds pool capacity until the connection is reverted"]
pub struct Lease<C: Connection> {
    slot: u64,
    future: ConnectionFuture<C>,
}

impl<C: Connection> Lease<C> {
    pub(crate) fn new(slot: u64, future: ConnectionFuture<C>) -> Self {
        Self { slot, future }
    }

    /// Pool-internal sequence number of the slot backing this lease
    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// Whether establishment has already finished
    pub fn is_ready(&self) -> bool {
        self.future.peek().is_some()
    }

    /// The outcome, if establishment has already finished
    pub fn peek(&self) -> Option<PoolResult<Arc<C>>> {
        self.future.peek().cloned()
    }

    /// The underlying shared future
    pub fn into_shared(self) -> ConnectionFuture<C> {
        self.future
    }
}

impl<C: Connection> Clone for Lease<C> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            future: self.future.clone(),
        }
    }
}

impl<C: Connection> Future for Lease<C> {
    type Output = PoolResult<Arc<C>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.future).poll(cx)
    }
}

impl<C: Connection> fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("slot", &self.slot)
            .field("ready", &self.is_ready())
            .finish()
    }
}
