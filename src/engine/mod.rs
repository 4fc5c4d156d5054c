//! The asynchronous engine seam.
//!
//! The client does not perform any network work itself. It drives an
//! [`Engine`]: an external runtime that creates completions, runs operations
//! on its own threads and resolves the completions when they finish. This
//! module contains:
//!
//! - [`completion`]: the completion handle / resolver pair every operation is
//!   built on
//! - [`driver`]: background threads draining job queues
//! - [`stats`]: per-engine instrumentation counters
//! - [`loopback`]: an in-process engine with simulated devices
//!
//! Operations follow the same shape throughout: the client creates a
//! completion with [`Engine::new_completion`], passes the [`Resolver`] (and
//! any typed result storage) to the operation, and wraps the
//! [`CompletionHandle`] in a [`Future`](crate::Future). The engine must
//! resolve or drop every resolver it receives; dropping one resolves the
//! operation with [`ErrorCode::Aborted`](crate::ErrorCode::Aborted).

pub mod completion;
pub mod driver;
pub mod loopback;
pub mod stats;

pub use completion::{CompletionCallback, CompletionHandle, Completions, Resolver};
pub use stats::{EngineStats, StatsSnapshot};

use crate::future::storage::{BufferStorage, DiscoveryStorage, EventStorage, Slot};
use crate::logging::Logger;
use crate::status::Result;

use std::fmt;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

macro_rules! engine_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

engine_id!(
    /// Engine-side connection handle.
    ConnectionId
);
engine_id!(
    /// Engine-side CoAP request handle.
    CoapId
);
engine_id!(
    /// Engine-side stream handle.
    StreamId
);
engine_id!(
    /// Engine-side TCP tunnel handle.
    TunnelId
);
engine_id!(
    /// Engine-side subscription handle shared by all futures of one listener.
    ListenerId
);

/// Single connection setting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionOption {
    ProductId(String),
    DeviceId(String),
    ApplicationName(String),
    ApplicationVersion(String),
    ServerUrl(String),
    ServerKey(String),
    ServerJwtToken(String),
    PrivateKey(String),
}

impl ConnectionOption {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionOption::ProductId(_) => "product_id",
            ConnectionOption::DeviceId(_) => "device_id",
            ConnectionOption::ApplicationName(_) => "application_name",
            ConnectionOption::ApplicationVersion(_) => "application_version",
            ConnectionOption::ServerUrl(_) => "server_url",
            ConnectionOption::ServerKey(_) => "server_key",
            ConnectionOption::ServerJwtToken(_) => "server_jwt_token",
            ConnectionOption::PrivateKey(_) => "private_key",
        }
    }
}

/// What a listener subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerSource {
    ConnectionEvents(ConnectionId),
    Mdns,
}

/// Typed storage a listener event is written into.
#[derive(Clone)]
pub enum EventSink {
    ConnectionEvent(Slot<EventStorage>),
    Discovery(Slot<DiscoveryStorage>),
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSink::ConnectionEvent(_) => f.write_str("EventSink::ConnectionEvent"),
            EventSink::Discovery(_) => f.write_str("EventSink::Discovery"),
        }
    }
}

/// Primitives the client consumes from an asynchronous engine.
///
/// Synchronous calls return their outcome directly. Asynchronous calls take a
/// [`Resolver`] and must eventually resolve or drop it, from any thread.
/// Freeing a resource must resolve every operation still pending on it.
pub trait Engine: Send + Sync + 'static {
    /// Creates a fresh unresolved completion.
    fn new_completion(&self) -> (CompletionHandle, Resolver);

    fn stats(&self) -> Arc<EngineStats>;

    fn version(&self) -> String;

    fn set_log_level(&self, level: LevelFilter);

    /// Routes engine log events to `logger` as well, `None` removes it.
    fn set_logger(&self, logger: Option<Arc<dyn Logger>>);

    fn create_private_key(&self) -> Result<String>;

    fn connection_new(&self) -> ConnectionId;
    fn connection_free(&self, connection: ConnectionId);
    fn connection_set_option(&self, connection: ConnectionId, option: ConnectionOption)
    -> Result<()>;
    fn connection_enable_direct_candidates(&self, connection: ConnectionId) -> Result<()>;
    fn connection_add_direct_candidate(
        &self,
        connection: ConnectionId,
        host: &str,
        port: u16,
    ) -> Result<()>;
    fn connection_end_of_direct_candidates(&self, connection: ConnectionId) -> Result<()>;
    fn connection_device_fingerprint(&self, connection: ConnectionId) -> Result<String>;
    fn connection_client_fingerprint(&self, connection: ConnectionId) -> Result<String>;
    fn connection_connect(&self, connection: ConnectionId, resolver: Resolver);
    fn connection_close(&self, connection: ConnectionId, resolver: Resolver);

    fn coap_new(&self, connection: ConnectionId, method: &str, path: &str) -> Result<CoapId>;
    fn coap_free(&self, coap: CoapId);
    fn coap_set_request_payload(
        &self,
        coap: CoapId,
        content_format: u16,
        payload: &[u8],
    ) -> Result<()>;
    fn coap_execute(&self, coap: CoapId, resolver: Resolver);
    fn coap_response_status_code(&self, coap: CoapId) -> Result<u16>;
    /// `Ok(None)` when the response carries no content format.
    fn coap_response_content_format(&self, coap: CoapId) -> Result<Option<u16>>;
    fn coap_response_payload(&self, coap: CoapId) -> Result<Vec<u8>>;

    fn stream_new(&self, connection: ConnectionId) -> Result<StreamId>;
    fn stream_free(&self, stream: StreamId);
    fn stream_open(&self, stream: StreamId, port: u32, resolver: Resolver);
    /// Resolves once the buffer is full, or with `Eof` if the peer closes first.
    fn stream_read_all(&self, stream: StreamId, buffer: Slot<BufferStorage>, resolver: Resolver);
    /// Resolves once at least one byte was read.
    fn stream_read_some(&self, stream: StreamId, buffer: Slot<BufferStorage>, resolver: Resolver);
    fn stream_write(&self, stream: StreamId, data: Vec<u8>, resolver: Resolver);
    fn stream_close(&self, stream: StreamId, resolver: Resolver);

    fn tunnel_new(&self, connection: ConnectionId) -> Result<TunnelId>;
    fn tunnel_free(&self, tunnel: TunnelId);
    fn tunnel_open(
        &self,
        tunnel: TunnelId,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
        resolver: Resolver,
    );
    fn tunnel_local_port(&self, tunnel: TunnelId) -> Result<u16>;

    fn listener_new(&self, source: ListenerSource) -> Result<ListenerId>;
    fn listener_free(&self, listener: ListenerId);
    /// Requests the next event. Only one request may be outstanding per
    /// listener; a second one resolves with `OperationInProgress`.
    fn listener_next(&self, listener: ListenerId, sink: EventSink, resolver: Resolver);
    /// Idempotent. The outstanding request and every later one resolve with
    /// `Stopped`.
    fn listener_stop(&self, listener: ListenerId);
}
