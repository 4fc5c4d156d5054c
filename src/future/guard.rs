//! Self-owning lifetime guard.
//!
//! The engine needs the completion context to stay alive until it fires the
//! callback. The guard owns the consumed future and lives inside the callback
//! the engine holds for that completion, so it is released exactly when the
//! callback has run. The completion handle is freed as the guard goes away,
//! never while its callback is still pending.

use crate::engine::stats::EngineStats;
use crate::future::{Future, ResultStorage};

use std::sync::Arc;
use tracing::trace;

struct SelfOwned<S: ResultStorage> {
    future: Future<S>,
    callback: Box<dyn FnOnce(&Future<S>) + Send>,
    stats: Arc<EngineStats>,
}

/// Counts the guard as released when dropped, including while unwinding out
/// of a panicking callback.
struct Release {
    id: u64,
    stats: Arc<EngineStats>,
}

impl Drop for Release {
    fn drop(&mut self) {
        trace!(target: "edge_client::future", id = self.id, "guard released");
        self.stats.guard_released();
    }
}

impl<S: ResultStorage> SelfOwned<S> {
    fn release(self) {
        let SelfOwned {
            future,
            callback,
            stats,
        } = self;
        let _release = Release {
            id: future.id(),
            stats,
        };

        callback(&future);
        drop(future);
    }
}

/// Moves `future` into a guard that lives until the engine resolves it.
///
/// The future must already be marked consumed, so dropping it after the
/// callback frees the handle instead of adopting it again.
pub(super) fn adopt<S, F>(future: Future<S>, callback: F)
where
    S: ResultStorage,
    F: FnOnce(&Future<S>) + Send + 'static,
{
    let registrar = future.handle().registrar();
    let stats = registrar.stats().clone();
    stats.guard_adopted();

    trace!(target: "edge_client::future", id = future.id(), "guard adopted");

    let guard = SelfOwned {
        future,
        callback: Box::new(callback),
        stats,
    };

    registrar.register(Box::new(move |_code| guard.release()));
}
