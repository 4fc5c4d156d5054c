//! Engine-side completion primitive.
//!
//! Each asynchronous operation is backed by one completion shared between two
//! ends:
//!
//! - the [`CompletionHandle`], owned by the client side. Dropping it frees the
//!   completion, which is counted in [`EngineStats`].
//! - the [`Resolver`], handed to the engine together with the operation. It
//!   resolves the completion exactly once; dropping it unresolved resolves the
//!   completion with [`ErrorCode::Aborted`].
//!
//! Registered callbacks never run on the resolving thread: they are queued on
//! the engine's callback [`Driver`].

use crate::engine::driver::Driver;
use crate::engine::stats::EngineStats;
use crate::status::ErrorCode;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Callback invoked with the outcome code once a completion resolves.
pub type CompletionCallback = Box<dyn FnOnce(ErrorCode) + Send + 'static>;

enum State {
    Pending(Option<CompletionCallback>),
    Resolved(ErrorCode),
}

struct Shared {
    id: u64,
    state: Mutex<State>,
    resolved: Condvar,
    callbacks: Driver,
    stats: Arc<EngineStats>,
}

impl Shared {
    fn complete(&self, code: ErrorCode) -> bool {
        let callback = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Resolved(code)) {
                State::Pending(callback) => callback,
                State::Resolved(previous) => {
                    *state = State::Resolved(previous);
                    return false;
                }
            }
        };

        trace!(target: "edge_client::engine", id = self.id, code = code.name(), "completion resolved");
        self.resolved.notify_all();

        if let Some(callback) = callback {
            self.fire(callback, code);
        }

        true
    }

    fn fire(&self, callback: CompletionCallback, code: ErrorCode) {
        let stats = self.stats.clone();
        self.callbacks.dispatch(Box::new(move || {
            stats.callback_fired();
            callback(code);
        }));
    }

    fn code(&self) -> Option<ErrorCode> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Resolved(code) => Some(*code),
        }
    }
}

/// Creates completions for one engine instance.
#[derive(Clone)]
pub struct Completions {
    callbacks: Driver,
    stats: Arc<EngineStats>,
    next_id: Arc<AtomicU64>,
}

impl Completions {
    /// # Arguments
    /// * `callbacks` - Driver on which completion callbacks run
    /// * `stats` - Counters shared with the owning engine
    pub fn new(callbacks: Driver, stats: Arc<EngineStats>) -> Self {
        Self {
            callbacks,
            stats,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a fresh unresolved completion.
    pub fn create(&self) -> (CompletionHandle, Resolver) {
        let shared = Arc::new(Shared {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(State::Pending(None)),
            resolved: Condvar::new(),
            callbacks: self.callbacks.clone(),
            stats: self.stats.clone(),
        });
        self.stats.completion_created();

        (
            CompletionHandle {
                shared: shared.clone(),
            },
            Resolver {
                shared: Some(shared),
            },
        )
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}

/// Client-side owner of a completion.
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Blocks the calling thread until the completion is resolved.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Pending(_)) {
            self.shared.resolved.wait(&mut state);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.code().is_some()
    }

    /// Outcome code, or `None` while the operation is still running.
    pub fn code(&self) -> Option<ErrorCode> {
        self.shared.code()
    }

    pub(crate) fn registrar(&self) -> Registrar {
        Registrar {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.shared.stats.completion_freed();
        trace!(target: "edge_client::engine", id = self.shared.id, "completion freed");
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("id", &self.shared.id)
            .field("code", &self.shared.code())
            .finish()
    }
}

/// Registers the completion callback without taking ownership of the handle.
pub(crate) struct Registrar {
    shared: Arc<Shared>,
}

impl Registrar {
    pub(crate) fn stats(&self) -> &Arc<EngineStats> {
        &self.shared.stats
    }

    /// Registers `callback`. If the completion is already resolved the callback
    /// is queued right away.
    pub(crate) fn register(self, callback: CompletionCallback) {
        let mut callback = Some(callback);

        let resolved = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(slot) => {
                    if let Some(callback) = callback.take() {
                        // A second registration is chained after the first one.
                        let chained: CompletionCallback = match slot.take() {
                            Some(previous) => Box::new(move |code| {
                                previous(code);
                                callback(code);
                            }),
                            None => callback,
                        };
                        *slot = Some(chained);
                    }
                    None
                }
                State::Resolved(code) => Some(*code),
            }
        };

        if let (Some(code), Some(callback)) = (resolved, callback) {
            self.shared.fire(callback, code);
        }
    }
}

/// Engine-side end of a completion.
pub struct Resolver {
    shared: Option<Arc<Shared>>,
}

impl Resolver {
    pub fn id(&self) -> u64 {
        self.shared.as_ref().map_or(0, |shared| shared.id)
    }

    /// Resolves the completion with `code`.
    pub fn resolve(mut self, code: ErrorCode) {
        if let Some(shared) = self.shared.take() {
            shared.complete(code);
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take()
            && shared.complete(ErrorCode::Aborted)
        {
            trace!(target: "edge_client::engine", id = shared.id, "resolver dropped, operation aborted");
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn completions() -> Completions {
        Completions::new(
            Driver::spawn("test-callbacks").unwrap(),
            Arc::new(EngineStats::new()),
        )
    }

    #[test]
    fn wait_returns_after_resolve_from_other_thread() {
        let completions = completions();
        let (handle, resolver) = completions.create();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(ErrorCode::Ok);
        });

        handle.wait();
        assert_eq!(handle.code(), Some(ErrorCode::Ok));
    }

    #[test]
    fn dropped_resolver_aborts() {
        let completions = completions();
        let (handle, resolver) = completions.create();

        drop(resolver);

        assert_eq!(handle.code(), Some(ErrorCode::Aborted));
    }

    #[test]
    fn callback_registered_after_resolution_still_fires() {
        let completions = completions();
        let (handle, resolver) = completions.create();
        let (tx, rx) = mpsc::channel();

        resolver.resolve(ErrorCode::Eof);
        handle
            .registrar()
            .register(Box::new(move |code| tx.send(code).unwrap()));

        assert_eq!(rx.recv().unwrap(), ErrorCode::Eof);
    }

    #[test]
    fn handle_drop_is_counted_once() {
        let completions = completions();
        let (handle, resolver) = completions.create();

        resolver.resolve(ErrorCode::Ok);
        drop(handle);

        let snapshot = completions.stats().snapshot();
        assert_eq!(snapshot.completions_created, 1);
        assert_eq!(snapshot.completions_freed, 1);
    }
}
