//! Single-resolution futures over engine operations.
//!
//! Every resource operation returns a [`Future`] immediately. The caller then
//! picks exactly one way to consume it:
//!
//! - [`Future::wait_for_result`] blocks the calling thread until the engine
//!   resolves the operation.
//! - [`Future::callback`] hands the future over to a self-owning guard and
//!   runs the callback on the engine's callback thread once it resolves.
//! - `.await` through [`IntoFuture`](std::future::IntoFuture), built on the
//!   callback path.
//!
//! Dropping a future that was never consumed does not cancel or leak the
//! operation: the guard keeps it alive until the engine resolves it and then
//! frees the completion handle.
//!
//! # Example
//!
//! ```ignore
//! use edge_client::Context;
//!
//! let context = Context::new()?;
//! let connection = context.create_connection();
//! // configure the connection ...
//!
//! // Blocking
//! connection.connect().wait_for_result()?;
//!
//! // Callback
//! connection.close().callback(|future| {
//!     println!("closed: {:?}", future.status());
//! });
//! ```

mod awaiting;
mod guard;
pub mod storage;

pub use awaiting::Awaiting;
pub use storage::{
    BufferStorage, ConnectionEvent, DiscoveryRecord, DiscoveryStorage, EventStorage,
    ResultStorage, Slot, VoidStorage,
};

use crate::engine::completion::CompletionHandle;
use crate::status::{Error, Result, Status, check};

use std::fmt;
use tracing::trace;

/// Future without a payload.
pub type FutureVoid = Future<VoidStorage>;
/// Future yielding the bytes transferred by a read.
pub type FutureBuffer = Future<BufferStorage>;
/// Future yielding one discovered peer.
pub type FutureDiscovery = Future<DiscoveryStorage>;
/// Future yielding one connection event.
pub type FutureConnectionEvent = Future<EventStorage>;

/// Handle to one in-flight or completed engine operation.
///
/// # Type Parameters
///
/// * `S` - Result storage strategy deciding what `get_result()` returns
///
/// # Internals
///
/// - `handle`: engine completion, owned by this future until it is consumed
///   or handed to the self-owning guard
/// - `storage`: typed result written by the engine before resolution
/// - `consumed`: set once the future was waited on or given a callback
pub struct Future<S: ResultStorage> {
    handle: Option<CompletionHandle>,
    storage: Slot<S>,
    consumed: bool,
}

impl<S: ResultStorage> Future<S> {
    pub(crate) fn new(handle: CompletionHandle, storage: Slot<S>) -> Self {
        Self {
            handle: Some(handle),
            storage,
            consumed: false,
        }
    }

    fn handle(&self) -> &CompletionHandle {
        self.handle
            .as_ref()
            .expect("completion handle is present until the future is dropped")
    }

    /// Engine-assigned identifier of the underlying completion.
    pub fn id(&self) -> u64 {
        self.handle().id()
    }

    pub fn is_resolved(&self) -> bool {
        self.handle().is_resolved()
    }

    /// Outcome of the operation, or `None` while it is still running.
    pub fn status(&self) -> Option<Status> {
        self.handle().code().map(Status::new)
    }

    /// Blocks until the engine resolves the operation, then returns its result.
    ///
    /// Calling it again after resolution returns immediately with the same
    /// outcome.
    ///
    /// # Errors
    /// [`Error::Status`] when the operation did not succeed.
    pub fn wait_for_result(&mut self) -> Result<S::Output> {
        self.handle().wait();
        self.consumed = true;

        self.get_result()
    }

    /// Returns the result of an already resolved operation.
    ///
    /// Valid after [`wait_for_result`](Self::wait_for_result) or inside a
    /// callback. Repeated calls return the same outcome.
    ///
    /// # Errors
    /// - [`Error::NotResolved`] if the operation has not resolved yet
    /// - [`Error::Status`] if the operation did not succeed
    pub fn get_result(&self) -> Result<S::Output> {
        let code = self.handle().code().ok_or(Error::NotResolved)?;
        check(code)?;

        self.storage.lock().output()
    }

    /// Registers the completion callback.
    ///
    /// The future is moved into a self-owning guard that keeps it alive until
    /// the engine resolves the operation. The callback then runs on the
    /// engine's callback thread with a reference to the resolved future, so it
    /// can call [`status`](Self::status) or [`get_result`](Self::get_result).
    /// The completion handle is freed right after the callback returns.
    ///
    /// Callbacks must not block for long: they share one thread.
    pub fn callback<F>(mut self, callback: F)
    where
        F: FnOnce(&Future<S>) + Send + 'static,
    {
        self.consumed = true;
        guard::adopt(self, callback);
    }
}

impl<S: ResultStorage> Drop for Future<S> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if self.consumed || handle.is_resolved() {
            // Nothing is pending on the handle, it is freed here.
            return;
        }

        trace!(target: "edge_client::future", id = handle.id(), "unresolved future dropped, handing over to guard");
        let orphan = Future::new(handle, self.storage.clone());
        orphan.callback(|_| {});
    }
}

impl<S: ResultStorage> fmt::Debug for Future<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("handle", &self.handle)
            .field("consumed", &self.consumed)
            .finish()
    }
}
