//! Repeatable event subscriptions.
//!
//! A [`Listener`] binds one engine subscription to a source (a connection's
//! state changes, or mDNS discovery) and hands out one fresh [`Future`] per
//! [`listen_next`](Listener::listen_next) call. All of those futures talk to
//! the same engine-side subscription.
//!
//! # Example
//!
//! ```ignore
//! let listener = connection.create_events_listener()?;
//! loop {
//!     match listener.listen_next().wait_for_result() {
//!         Ok(ConnectionEvent::Closed) => break,
//!         Ok(event) => println!("{event:?}"),
//!         Err(e) if e.is_stopped() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

use crate::engine::{Engine, EventSink, ListenerId, ListenerSource};
use crate::future::storage::{self, DiscoveryStorage, EventStorage, ResultStorage, Slot};
use crate::future::Future;
use crate::status::Result;

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Result storage that a listener event can be written into.
pub trait Subscription: ResultStorage + Default {
    fn sink(slot: &Slot<Self>) -> EventSink;
}

impl Subscription for EventStorage {
    fn sink(slot: &Slot<Self>) -> EventSink {
        EventSink::ConnectionEvent(slot.clone())
    }
}

impl Subscription for DiscoveryStorage {
    fn sink(slot: &Slot<Self>) -> EventSink {
        EventSink::Discovery(slot.clone())
    }
}

/// Listener for connection state changes.
pub type ConnectionEventsListener = Listener<EventStorage>;
/// Listener yielding one discovered device per future.
pub type MdnsResolver = Listener<DiscoveryStorage>;

/// Subscription producing one future per requested event.
pub struct Listener<S: Subscription> {
    engine: Arc<dyn Engine>,
    id: ListenerId,
    stopped: AtomicBool,
    _storage: PhantomData<fn() -> S>,
}

impl<S: Subscription> Listener<S> {
    pub(crate) fn new(engine: Arc<dyn Engine>, source: ListenerSource) -> Result<Self> {
        let id = engine.listener_new(source)?;
        debug!(target: "edge_client::listener", ?id, ?source, "listener created");

        Ok(Self {
            engine,
            id,
            stopped: AtomicBool::new(false),
            _storage: PhantomData,
        })
    }

    /// Requests the next event.
    ///
    /// Only one future per listener may be outstanding. A second call before
    /// the previous future resolved returns a future that fails with
    /// `OperationInProgress`. After [`stop`](Self::stop) the future fails with
    /// `Stopped` right away.
    pub fn listen_next(&self) -> Future<S> {
        let storage = storage::slot(S::default());
        let (handle, resolver) = self.engine.new_completion();

        self.engine
            .listener_next(self.id, S::sink(&storage), resolver);

        Future::new(handle, storage)
    }

    /// Stops the subscription. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(target: "edge_client::listener", id = ?self.id, "listener stopped");
            self.engine.listener_stop(self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl<S: Subscription> Drop for Listener<S> {
    fn drop(&mut self) {
        self.stop();
        self.engine.listener_free(self.id);
    }
}
