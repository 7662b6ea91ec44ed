//! Event publishing/subscription abstraction.
//!
//! The bus distributes committed change events to in-process consumers (the
//! audit log today). It is not a store: events that nobody is subscribed to
//! when they are published are simply dropped.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to the bus.
///
/// Each subscription receives a copy of every message published after it was
/// created, in publication order. Meant to be drained by a single consumer.
///
/// ```ignore
/// let sub = bus.subscribe();
/// tokio::task::spawn_blocking(move || {
///     while let Ok(env) = sub.recv() {
///         tracing::info!(event_type = env.event_type(), "change event");
///     }
/// });
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Pub/sub contract with broadcast semantics.
///
/// `publish` is called by the command dispatcher after the transaction has
/// committed; a publish failure is logged by the caller and does not undo the
/// committed change.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
