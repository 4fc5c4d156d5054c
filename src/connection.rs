//! Connections to remote devices.
//!
//! A [`Connection`] is configured synchronously (product id, device id,
//! private key, ...) and then established with [`Connection::connect`], which
//! returns a [`FutureVoid`]. Streams, CoAP requests, tunnels and event
//! listeners are created from an established connection.
//!
//! Dropping the connection frees the engine-side connection; operations still
//! pending on it resolve with a non-OK status.

use crate::coap::Coap;
use crate::engine::{ConnectionId, ConnectionOption, Engine, ListenerSource};
use crate::future::storage::{self, VoidStorage};
use crate::future::FutureVoid;
use crate::listener::ConnectionEventsListener;
use crate::options::ConnectionOptions;
use crate::status::Result;
use crate::stream::Stream;
use crate::tunnel::TcpTunnel;

use std::sync::Arc;
use tracing::debug;

/// Client-side handle to one engine connection.
///
/// Setters are only accepted before [`connect`](Self::connect) is called;
/// after that they fail with `InvalidState`.
pub struct Connection {
    engine: Arc<dyn Engine>,
    id: ConnectionId,
}

impl Connection {
    pub(crate) fn new(engine: Arc<dyn Engine>) -> Self {
        let id = engine.connection_new();
        debug!(target: "edge_client::connection", ?id, "connection created");

        Self { engine, id }
    }

    /// Engine-side id of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn set(&self, option: ConnectionOption) -> Result<()> {
        self.engine.connection_set_option(self.id, option)
    }

    /// Sets the product id of the device to connect to.
    ///
    /// # Arguments
    /// * `product_id` - Product id, e.g. `pr-12345678`
    ///
    /// # Errors
    /// `InvalidArgument` for an empty id, `InvalidState` once connecting has
    /// started.
    pub fn set_product_id(&self, product_id: &str) -> Result<()> {
        self.set(ConnectionOption::ProductId(product_id.to_string()))
    }

    /// Sets the device id of the device to connect to, e.g. `de-abcdefgh`.
    pub fn set_device_id(&self, device_id: &str) -> Result<()> {
        self.set(ConnectionOption::DeviceId(device_id.to_string()))
    }

    /// Name reported to the device and basestation.
    pub fn set_application_name(&self, name: &str) -> Result<()> {
        self.set(ConnectionOption::ApplicationName(name.to_string()))
    }

    pub fn set_application_version(&self, version: &str) -> Result<()> {
        self.set(ConnectionOption::ApplicationVersion(version.to_string()))
    }

    /// Overrides the basestation URL derived from the product id.
    pub fn set_server_url(&self, url: &str) -> Result<()> {
        self.set(ConnectionOption::ServerUrl(url.to_string()))
    }

    /// Server key used to authorize against the basestation.
    pub fn set_server_key(&self, key: &str) -> Result<()> {
        self.set(ConnectionOption::ServerKey(key.to_string()))
    }

    pub fn set_server_jwt_token(&self, token: &str) -> Result<()> {
        self.set(ConnectionOption::ServerJwtToken(token.to_string()))
    }

    /// Sets the client private key, as created by
    /// [`Context::create_private_key`](crate::Context::create_private_key).
    ///
    /// # Arguments
    /// * `private_key` - PEM encoded private key
    ///
    /// # Errors
    /// `InvalidArgument` if the value is empty or not a PEM private key.
    pub fn set_private_key(&self, private_key: &str) -> Result<()> {
        self.set(ConnectionOption::PrivateKey(private_key.to_string()))
    }

    /// Applies every option that is set, stopping at the first rejected one.
    ///
    /// # Example
    /// ```ignore
    /// let options = ConnectionOptions::from_json(r#"{"product_id":"pr-1","device_id":"de-1"}"#)?;
    /// connection.set_options(&options)?;
    /// ```
    pub fn set_options(&self, options: &ConnectionOptions) -> Result<()> {
        options
            .to_settings()
            .into_iter()
            .try_for_each(|option| self.set(option))
    }

    /// Fingerprint of the device's public key, hex encoded. Available once
    /// connected.
    pub fn device_fingerprint_hex(&self) -> Result<String> {
        self.engine.connection_device_fingerprint(self.id)
    }

    /// Fingerprint of the client's public key, hex encoded. Available once a
    /// private key is set.
    pub fn client_fingerprint_hex(&self) -> Result<String> {
        self.engine.connection_client_fingerprint(self.id)
    }

    /// Allows connecting through direct candidates added with
    /// [`add_direct_candidate`](Self::add_direct_candidate).
    pub fn enable_direct_candidates(&self) -> Result<()> {
        self.engine.connection_enable_direct_candidates(self.id)
    }

    /// Adds a local address the device may be reached on.
    ///
    /// # Errors
    /// `InvalidState` unless direct candidates were enabled and not yet
    /// ended.
    pub fn add_direct_candidate(&self, host: &str, port: u16) -> Result<()> {
        self.engine
            .connection_add_direct_candidate(self.id, host, port)
    }

    /// Signals that no more direct candidates follow.
    pub fn end_of_direct_candidates(&self) -> Result<()> {
        self.engine.connection_end_of_direct_candidates(self.id)
    }

    /// Starts connecting to the configured device.
    ///
    /// # Returns
    /// A future resolving OK once connected. Fails with `InvalidState` when
    /// product id, device id or private key is missing or a connect was
    /// already issued, `NotFound` for an unknown device and `NoChannels` when
    /// the device cannot be reached.
    ///
    /// # Example
    /// ```ignore
    /// connection.connect().wait_for_result()?;
    /// ```
    pub fn connect(&self) -> FutureVoid {
        let (handle, resolver) = self.engine.new_completion();
        self.engine.connection_connect(self.id, resolver);

        FutureVoid::new(handle, storage::slot(VoidStorage))
    }

    /// Closes an established connection. Pending operations on its streams
    /// and requests are aborted, and events listeners receive `Closed`.
    pub fn close(&self) -> FutureVoid {
        let (handle, resolver) = self.engine.new_completion();
        self.engine.connection_close(self.id, resolver);

        FutureVoid::new(handle, storage::slot(VoidStorage))
    }

    /// Creates an unopened stream, see [`Stream::open`].
    pub fn create_stream(&self) -> Result<Stream> {
        Stream::new(self.engine.clone(), self.id)
    }

    /// Creates a CoAP request, e.g. `create_coap("GET", "/heat-pump")`.
    pub fn create_coap(&self, method: &str, path: &str) -> Result<Coap> {
        Coap::new(self.engine.clone(), self.id, method, path)
    }

    /// Creates a closed TCP tunnel, see [`TcpTunnel::open`].
    pub fn create_tcp_tunnel(&self) -> Result<TcpTunnel> {
        TcpTunnel::new(self.engine.clone(), self.id)
    }

    /// Subscribes to connection events. The listener may outlive the
    /// connection; it yields `Closed` and then fails with `Stopped`.
    pub fn create_events_listener(&self) -> Result<ConnectionEventsListener> {
        ConnectionEventsListener::new(self.engine.clone(), ListenerSource::ConnectionEvents(self.id))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!(target: "edge_client::connection", id = ?self.id, "connection freed");
        self.engine.connection_free(self.id);
    }
}
