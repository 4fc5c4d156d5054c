//! Reliable byte streams over a connection.
//!
//! ```ignore
//! let stream = connection.create_stream()?;
//! stream.open(4242).wait_for_result()?;
//! stream.write(b"ping").wait_for_result()?;
//! let echoed = stream.read_all(4).wait_for_result()?;
//! ```

use crate::engine::{ConnectionId, Engine, Resolver, StreamId};
use crate::future::storage::{self, BufferStorage, Slot, VoidStorage};
use crate::future::{FutureBuffer, FutureVoid};
use crate::status::Result;

use std::sync::Arc;

/// Bidirectional byte stream to a device service.
///
/// Dropping the stream frees it; reads and writes still pending resolve with
/// a non-OK status.
pub struct Stream {
    engine: Arc<dyn Engine>,
    id: StreamId,
}

impl Stream {
    pub(crate) fn new(engine: Arc<dyn Engine>, connection: ConnectionId) -> Result<Self> {
        let id = engine.stream_new(connection)?;
        Ok(Self { engine, id })
    }

    fn void(&self, start: impl FnOnce(&dyn Engine, Resolver)) -> FutureVoid {
        let (handle, resolver) = self.engine.new_completion();
        start(self.engine.as_ref(), resolver);

        FutureVoid::new(handle, storage::slot(VoidStorage))
    }

    fn buffer(
        &self,
        capacity: usize,
        start: impl FnOnce(&dyn Engine, Slot<BufferStorage>, Resolver),
    ) -> FutureBuffer {
        let buffer = storage::slot(BufferStorage::with_capacity(capacity));
        let (handle, resolver) = self.engine.new_completion();
        start(self.engine.as_ref(), buffer.clone(), resolver);

        FutureBuffer::new(handle, buffer)
    }

    /// Opens the stream towards the device service listening on `port`.
    pub fn open(&self, port: u32) -> FutureVoid {
        self.void(|engine, resolver| engine.stream_open(self.id, port, resolver))
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Arguments
    /// * `n` - Number of bytes to read, 0 resolves at once with no bytes
    ///
    /// # Returns
    /// A future yielding the bytes. Fails with `Eof` if the stream ends
    /// first.
    pub fn read_all(&self, n: usize) -> FutureBuffer {
        self.buffer(n, |engine, buffer, resolver| {
            engine.stream_read_all(self.id, buffer, resolver)
        })
    }

    /// Reads between one and `max` bytes, whatever is available first.
    ///
    /// # Errors
    /// `InvalidArgument` for `max == 0`, `Eof` once the peer has closed and
    /// everything was read.
    pub fn read_some(&self, max: usize) -> FutureBuffer {
        self.buffer(max, |engine, buffer, resolver| {
            engine.stream_read_some(self.id, buffer, resolver)
        })
    }

    /// Writes all of `data`. The future resolves once the bytes are accepted
    /// by the engine, and fails with `InvalidState` after [`close`](Self::close).
    pub fn write(&self, data: &[u8]) -> FutureVoid {
        let data = data.to_vec();
        self.void(|engine, resolver| engine.stream_write(self.id, data, resolver))
    }

    /// Closes the write direction. Reading stays possible until the peer
    /// closes its side.
    pub fn close(&self) -> FutureVoid {
        self.void(|engine, resolver| engine.stream_close(self.id, resolver))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.engine.stream_free(self.id);
    }
}
