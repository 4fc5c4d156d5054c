//! Client-side completion bridge for a device connectivity engine.
//!
//! The crate wraps an asynchronous engine (connections to remote devices, CoAP
//! exchanges, byte streams, TCP tunnels and mDNS discovery) behind typed,
//! single-resolution futures that can be waited on, given a callback, or
//! awaited.
//!
//! # Architecture
//!
//! - **Context**: Entry point owning the engine, created via `ContextBuilder`
//! - **Engine**: Trait seam over the asynchronous engine; `LoopbackEngine` is
//!   the bundled in-process implementation
//! - **Future**: Generic single-resolution handle, specialized per result type
//! - **Guard**: Keeps dropped or callback-bound futures alive until resolution
//! - **Listener**: Repeatable subscription yielding one future per event
//! - **Resources**: `Connection`, `Coap`, `Stream`, `TcpTunnel`
//!
//! # Example
//!
//! ```ignore
//! use edge_client::Context;
//!
//! let context = Context::new()?;
//! let connection = context.create_connection();
//! connection.set_product_id("pr-12345678")?;
//! connection.set_device_id("de-abcdefgh")?;
//! connection.set_private_key(&context.create_private_key()?)?;
//! connection.connect().wait_for_result()?;
//!
//! let coap = connection.create_coap("GET", "/hello-world")?;
//! coap.execute().wait_for_result()?;
//! println!("{}", coap.response_status_code()?);
//! ```

mod builder;
mod coap;
mod connection;
mod context;
mod listener;
mod options;
mod status;
mod stream;
mod tunnel;

pub mod engine;
pub mod future;
pub mod logging;

pub use builder::ContextBuilder;
pub use coap::{CONTENT_FORMAT_CBOR, CONTENT_FORMAT_JSON, CONTENT_FORMAT_TEXT_PLAIN, Coap};
pub use connection::Connection;
pub use context::Context;
pub use engine::loopback::{LoopbackDevice, LoopbackEngine};
pub use future::{
    Awaiting, BufferStorage, ConnectionEvent, DiscoveryRecord, DiscoveryStorage, EventStorage,
    Future, FutureBuffer, FutureConnectionEvent, FutureDiscovery, FutureVoid, ResultStorage,
    VoidStorage,
};
pub use listener::{ConnectionEventsListener, Listener, MdnsResolver, Subscription};
pub use logging::{LogMessage, Logger};
pub use options::ConnectionOptions;
pub use status::{Error, ErrorCode, Result, Status};
pub use stream::Stream;
pub use tunnel::TcpTunnel;
