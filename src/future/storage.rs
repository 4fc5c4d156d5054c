//! Typed result storage attached to a [`Future`](crate::future::Future).
//!
//! The engine writes into the storage before it resolves the operation; the
//! future reads it back in `get_result()`. Reads only happen after resolution,
//! so the storage mutex is never contended in practice.

use crate::status::{ErrorCode, Error, Result};

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Storage shared between a future and the engine operation that fills it.
pub type Slot<S> = Arc<Mutex<S>>;

pub(crate) fn slot<S>(storage: S) -> Slot<S> {
    Arc::new(Mutex::new(storage))
}

/// Strategy reconstructing a typed result from what the engine wrote.
pub trait ResultStorage: Send + 'static {
    type Output: Send + 'static;

    /// Builds the result of a successful operation. Called only after the
    /// operation resolved with OK; may be called repeatedly.
    fn output(&self) -> Result<Self::Output>;
}

/// No payload: success means the action completed.
#[derive(Debug, Default)]
pub struct VoidStorage;

impl ResultStorage for VoidStorage {
    type Output = ();

    fn output(&self) -> Result<()> {
        Ok(())
    }
}

/// Pre-sized output buffer plus the number of bytes the engine transferred.
pub struct BufferStorage {
    data: Vec<u8>,
    transferred: usize,
}

impl BufferStorage {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            transferred: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn transferred(&self) -> usize {
        self.transferred
    }

    /// Copies `bytes` after the bytes already transferred.
    ///
    /// # Returns
    /// How many bytes fit into the remaining capacity
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let start = self.transferred;
        let count = bytes.len().min(self.data.len() - start);
        self.data[start..start + count].copy_from_slice(&bytes[..count]);
        self.transferred += count;
        count
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.transferred
    }
}

impl ResultStorage for BufferStorage {
    type Output = Vec<u8>;

    fn output(&self) -> Result<Vec<u8>> {
        Ok(self.data[..self.transferred].to_vec())
    }
}

impl fmt::Debug for BufferStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferStorage")
            .field("capacity", &self.data.len())
            .field("transferred", &self.transferred)
            .finish()
    }
}

/// One discovered peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiscoveryRecord {
    pub address: String,
    pub port: u16,
    pub device_id: String,
    pub product_id: String,
}

/// Raw discovery fields as reported by the engine. Any missing field turns
/// the result into a `NoData` error.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryStorage {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub device_id: Option<String>,
    pub product_id: Option<String>,
}

impl ResultStorage for DiscoveryStorage {
    type Output = DiscoveryRecord;

    fn output(&self) -> Result<DiscoveryRecord> {
        let missing = || Error::from(ErrorCode::NoData);

        Ok(DiscoveryRecord {
            address: self.address.clone().ok_or_else(missing)?,
            port: self.port.ok_or_else(missing)?,
            device_id: self.device_id.clone().ok_or_else(missing)?,
            product_id: self.product_id.clone().ok_or_else(missing)?,
        })
    }
}

/// Connection state changes reported by a connection events listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Connected,
    Closed,
    ChannelChanged,
}

impl ConnectionEvent {
    pub fn raw(self) -> i32 {
        match self {
            ConnectionEvent::Connected => 0,
            ConnectionEvent::Closed => 1,
            ConnectionEvent::ChannelChanged => 2,
        }
    }
}

impl TryFrom<i32> for ConnectionEvent {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(ConnectionEvent::Connected),
            1 => Ok(ConnectionEvent::Closed),
            2 => Ok(ConnectionEvent::ChannelChanged),
            _ => Err(Error::from(ErrorCode::InvalidState)),
        }
    }
}

/// Raw event code written by the engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventStorage {
    pub event: Option<i32>,
}

impl ResultStorage for EventStorage {
    type Output = ConnectionEvent;

    fn output(&self) -> Result<ConnectionEvent> {
        let raw = self.event.ok_or(Error::from(ErrorCode::NoData))?;
        ConnectionEvent::try_from(raw)
    }
}
