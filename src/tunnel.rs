//! TCP tunnels through a connection.

use crate::engine::{ConnectionId, Engine, TunnelId};
use crate::future::FutureVoid;
use crate::future::storage::{self, VoidStorage};
use crate::status::Result;

use std::sync::Arc;

/// Forwards a local TCP port to a host and port reachable from the device.
pub struct TcpTunnel {
    engine: Arc<dyn Engine>,
    id: TunnelId,
}

impl TcpTunnel {
    pub(crate) fn new(engine: Arc<dyn Engine>, connection: ConnectionId) -> Result<Self> {
        let id = engine.tunnel_new(connection)?;
        Ok(Self { engine, id })
    }

    /// Opens the tunnel. A `local_port` of 0 lets the engine pick a port; see
    /// [`local_port`](Self::local_port).
    pub fn open(&self, local_port: u16, remote_host: &str, remote_port: u16) -> FutureVoid {
        let (handle, resolver) = self.engine.new_completion();
        self.engine
            .tunnel_open(self.id, local_port, remote_host, remote_port, resolver);

        FutureVoid::new(handle, storage::slot(VoidStorage))
    }

    /// The local port accepting connections, once the tunnel is open.
    pub fn local_port(&self) -> Result<u16> {
        self.engine.tunnel_local_port(self.id)
    }
}

impl Drop for TcpTunnel {
    fn drop(&mut self) {
        self.engine.tunnel_free(self.id);
    }
}
