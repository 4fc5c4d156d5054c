//! Bookkeeping behind the loopback engine.
//!
//! All resources live in one [`LoopbackState`] guarded by the engine's mutex.
//! Methods never resolve completions themselves: they push the resolver and its
//! outcome into a [`Settled`] batch that the engine resolves after the lock is
//! released, so callbacks and waiters never observe the state locked.

use crate::engine::loopback::device::{
    Announcement, CoapHandler, CoapRequest, CoapResponse, LoopbackDevice,
};
use crate::engine::loopback::listener::{ListenerEntry, ListenerEvent};
use crate::engine::loopback::stream::StreamEntry;
use crate::engine::loopback::tunnel::Forwarder;
use crate::engine::{
    CoapId, ConnectionId, ConnectionOption, EventSink, ListenerId, ListenerSource, Resolver,
    StreamId, TunnelId,
};
use crate::future::storage::{BufferStorage, ConnectionEvent, Slot};
use crate::status::ErrorCode;

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use tracing::debug;

const COAP_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Resolutions collected while the state is locked.
#[derive(Default)]
pub(crate) struct Settled(Vec<(Resolver, ErrorCode)>);

impl Settled {
    pub(crate) fn push(&mut self, resolver: Resolver, code: ErrorCode) {
        self.0.push((resolver, code));
    }

    pub(crate) fn settle(self) {
        for (resolver, code) in self.0 {
            resolver.resolve(code);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    /// Index into the device table.
    Connected(usize),
    Closed,
}

#[derive(Default)]
struct Settings {
    product_id: Option<String>,
    device_id: Option<String>,
    application_name: Option<String>,
    application_version: Option<String>,
    server_url: Option<String>,
    server_key: Option<String>,
    server_jwt_token: Option<String>,
    private_key: Option<String>,
}

struct ConnectionEntry {
    settings: Settings,
    direct_candidates: Option<Vec<(String, u16)>>,
    candidates_complete: bool,
    phase: Phase,
}

enum CoapPhase {
    Ready,
    Executing,
    Done(CoapResponse),
}

struct CoapEntry {
    connection: ConnectionId,
    request: CoapRequest,
    phase: CoapPhase,
}

struct TunnelEntry {
    connection: ConnectionId,
    opening: bool,
    forwarder: Option<Forwarder>,
}

/// Every resource known to one loopback engine.
#[derive(Default)]
pub(crate) struct LoopbackState {
    next_id: u64,
    devices: Vec<LoopbackDevice>,
    announcements: Vec<Announcement>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    coaps: HashMap<CoapId, CoapEntry>,
    streams: HashMap<StreamId, StreamEntry>,
    tunnels: HashMap<TunnelId, TunnelEntry>,
    listeners: HashMap<ListenerId, ListenerEntry>,
}

impl LoopbackState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Registers `device`, replacing a device with the same product and
    /// device id in place so established connections keep pointing at it.
    pub(crate) fn add_device(&mut self, device: LoopbackDevice, settled: &mut Settled) {
        let announcement = device.announcement();

        match self
            .devices
            .iter()
            .position(|known| known.matches(&device.product_id, &device.device_id))
        {
            Some(index) => self.devices[index] = device,
            None => self.devices.push(device),
        }

        if let Some(announcement) = announcement {
            self.announce(announcement, settled);
        }
    }

    /// Publishes a discovery record to every mDNS listener, current and
    /// future. A device announcing itself again replaces its earlier record;
    /// an unchanged record is not delivered twice.
    pub(crate) fn announce(&mut self, announcement: Announcement, settled: &mut Settled) {
        if self.announcements.contains(&announcement) {
            return;
        }

        let known = match (&announcement.product_id, &announcement.device_id) {
            (Some(product_id), Some(device_id)) => self.announcements.iter().position(|known| {
                known.product_id.as_deref() == Some(product_id.as_str())
                    && known.device_id.as_deref() == Some(device_id.as_str())
            }),
            _ => None,
        };

        for listener in self.listeners.values_mut() {
            if listener.source == ListenerSource::Mdns {
                listener.deliver(ListenerEvent::Discovery(announcement.clone()), settled);
            }
        }

        match known {
            Some(index) => self.announcements[index] = announcement,
            None => self.announcements.push(announcement),
        }
    }

    /// Signals `ChannelChanged` on every connection established to the
    /// device. Returns how many connections were notified.
    pub(crate) fn change_channel(
        &mut self,
        product_id: &str,
        device_id: &str,
        settled: &mut Settled,
    ) -> usize {
        let affected: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter_map(|(id, entry)| match entry.phase {
                Phase::Connected(index) if self.devices[index].matches(product_id, device_id) => {
                    Some(*id)
                }
                _ => None,
            })
            .collect();

        for id in &affected {
            self.emit(*id, ConnectionEvent::ChannelChanged, settled);
        }

        affected.len()
    }

    fn emit(&mut self, connection: ConnectionId, event: ConnectionEvent, settled: &mut Settled) {
        let source = ListenerSource::ConnectionEvents(connection);

        for listener in self.listeners.values_mut() {
            if listener.source == source {
                listener.deliver(ListenerEvent::Connection(event), settled);
            }
        }
    }

    fn connected_device(&self, connection: ConnectionId) -> Result<&LoopbackDevice, ErrorCode> {
        match self.connections.get(&connection).map(|entry| entry.phase) {
            Some(Phase::Connected(index)) => Ok(&self.devices[index]),
            Some(_) => Err(ErrorCode::NotConnected),
            None => Err(ErrorCode::Aborted),
        }
    }

    pub(crate) fn connection_new(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.allocate());
        self.connections.insert(
            id,
            ConnectionEntry {
                settings: Settings::default(),
                direct_candidates: None,
                candidates_complete: false,
                phase: Phase::Idle,
            },
        );
        id
    }

    /// Removes the connection and everything running on it. Returned
    /// forwarders must be dropped after the state is unlocked.
    pub(crate) fn connection_free(
        &mut self,
        connection: ConnectionId,
        settled: &mut Settled,
    ) -> Vec<Forwarder> {
        let forwarders = self.teardown(connection, settled);
        self.connections.remove(&connection);
        forwarders
    }

    fn teardown(&mut self, connection: ConnectionId, settled: &mut Settled) -> Vec<Forwarder> {
        let was_connected = match self.connections.get_mut(&connection) {
            Some(entry) => {
                let connected = matches!(entry.phase, Phase::Connected(_));
                entry.phase = Phase::Closed;
                connected
            }
            None => return Vec::new(),
        };

        for stream in self.streams.values_mut() {
            if stream.connection == connection {
                stream.abort(settled);
            }
        }

        let forwarders = self
            .tunnels
            .values_mut()
            .filter(|tunnel| tunnel.connection == connection)
            .filter_map(|tunnel| tunnel.forwarder.take())
            .collect();

        if was_connected {
            self.emit(connection, ConnectionEvent::Closed, settled);
        }

        let source = ListenerSource::ConnectionEvents(connection);
        for listener in self.listeners.values_mut() {
            if listener.source == source {
                listener.exhaust(settled);
            }
        }

        forwarders
    }

    fn configurable(&mut self, connection: ConnectionId) -> Result<&mut ConnectionEntry, ErrorCode> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or(ErrorCode::InvalidArgument)?;

        if entry.phase != Phase::Idle {
            return Err(ErrorCode::InvalidState);
        }

        Ok(entry)
    }

    pub(crate) fn set_option(
        &mut self,
        connection: ConnectionId,
        option: ConnectionOption,
    ) -> Result<(), ErrorCode> {
        let entry = self.configurable(connection)?;
        let settings = &mut entry.settings;

        let (field, value) = match option {
            ConnectionOption::ProductId(value) => (&mut settings.product_id, value),
            ConnectionOption::DeviceId(value) => (&mut settings.device_id, value),
            ConnectionOption::ApplicationName(value) => (&mut settings.application_name, value),
            ConnectionOption::ApplicationVersion(value) => {
                (&mut settings.application_version, value)
            }
            ConnectionOption::ServerUrl(value) => (&mut settings.server_url, value),
            ConnectionOption::ServerKey(value) => (&mut settings.server_key, value),
            ConnectionOption::ServerJwtToken(value) => (&mut settings.server_jwt_token, value),
            ConnectionOption::PrivateKey(value) => {
                if !value.contains("PRIVATE KEY") {
                    return Err(ErrorCode::InvalidArgument);
                }
                (&mut settings.private_key, value)
            }
        };

        if value.trim().is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }

        *field = Some(value);
        Ok(())
    }

    pub(crate) fn enable_direct_candidates(
        &mut self,
        connection: ConnectionId,
    ) -> Result<(), ErrorCode> {
        let entry = self.configurable(connection)?;
        entry.direct_candidates.get_or_insert_with(Vec::new);
        Ok(())
    }

    pub(crate) fn add_direct_candidate(
        &mut self,
        connection: ConnectionId,
        host: &str,
        port: u16,
    ) -> Result<(), ErrorCode> {
        let entry = self.configurable(connection)?;

        if entry.candidates_complete {
            return Err(ErrorCode::InvalidState);
        }

        match entry.direct_candidates.as_mut() {
            Some(candidates) => {
                candidates.push((host.to_string(), port));
                Ok(())
            }
            None => Err(ErrorCode::InvalidState),
        }
    }

    pub(crate) fn end_of_direct_candidates(
        &mut self,
        connection: ConnectionId,
    ) -> Result<(), ErrorCode> {
        let entry = self.configurable(connection)?;

        if entry.direct_candidates.is_none() {
            return Err(ErrorCode::InvalidState);
        }

        entry.candidates_complete = true;
        Ok(())
    }

    pub(crate) fn device_fingerprint(&self, connection: ConnectionId) -> Result<String, ErrorCode> {
        match self.connected_device(connection) {
            Ok(device) => Ok(device.fingerprint.clone()),
            Err(ErrorCode::Aborted) => Err(ErrorCode::InvalidArgument),
            Err(_) => Err(ErrorCode::InvalidState),
        }
    }

    pub(crate) fn client_fingerprint(&self, connection: ConnectionId) -> Result<String, ErrorCode> {
        let entry = self
            .connections
            .get(&connection)
            .ok_or(ErrorCode::InvalidArgument)?;

        entry
            .settings
            .private_key
            .as_ref()
            .map(|key| hex::encode(Sha256::digest(key.trim())))
            .ok_or(ErrorCode::InvalidState)
    }

    /// Validates the settings and marks the connection as connecting. The
    /// caller finishes with [`finish_connect`](Self::finish_connect).
    pub(crate) fn begin_connect(&mut self, connection: ConnectionId) -> Result<(), ErrorCode> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or(ErrorCode::Aborted)?;

        if entry.phase != Phase::Idle {
            return Err(ErrorCode::InvalidState);
        }

        let settings = &entry.settings;
        if settings.product_id.is_none()
            || settings.device_id.is_none()
            || settings.private_key.is_none()
        {
            return Err(ErrorCode::InvalidState);
        }

        debug!(
            target: "edge_client::engine",
            ?connection,
            application_name = ?settings.application_name,
            application_version = ?settings.application_version,
            server_url = ?settings.server_url,
            server_key = settings.server_key.is_some(),
            server_jwt_token = settings.server_jwt_token.is_some(),
            direct_candidates = ?entry.direct_candidates,
            "connecting"
        );

        entry.phase = Phase::Connecting;
        Ok(())
    }

    pub(crate) fn finish_connect(
        &mut self,
        connection: ConnectionId,
        settled: &mut Settled,
    ) -> ErrorCode {
        let Some(entry) = self.connections.get(&connection) else {
            return ErrorCode::Aborted;
        };
        if entry.phase != Phase::Connecting {
            return ErrorCode::Aborted;
        }

        let product_id = entry.settings.product_id.as_deref().unwrap_or_default();
        let device_id = entry.settings.device_id.as_deref().unwrap_or_default();

        let outcome = match self
            .devices
            .iter()
            .position(|device| device.matches(product_id, device_id))
        {
            Some(index) if self.devices[index].reachable => Ok(index),
            Some(_) => Err(ErrorCode::NoChannels),
            None => Err(ErrorCode::NotFound),
        };

        let Some(entry) = self.connections.get_mut(&connection) else {
            return ErrorCode::Aborted;
        };

        match outcome {
            Ok(index) => {
                entry.phase = Phase::Connected(index);
                self.emit(connection, ConnectionEvent::Connected, settled);
                ErrorCode::Ok
            }
            Err(code) => {
                entry.phase = Phase::Idle;
                code
            }
        }
    }

    pub(crate) fn close(
        &mut self,
        connection: ConnectionId,
        settled: &mut Settled,
    ) -> (ErrorCode, Vec<Forwarder>) {
        match self.connections.get(&connection).map(|entry| entry.phase) {
            Some(Phase::Connected(_)) => (ErrorCode::Ok, self.teardown(connection, settled)),
            Some(_) => (ErrorCode::InvalidState, Vec::new()),
            None => (ErrorCode::Aborted, Vec::new()),
        }
    }

    pub(crate) fn coap_new(
        &mut self,
        connection: ConnectionId,
        method: &str,
        path: &str,
    ) -> Result<CoapId, ErrorCode> {
        if !self.connections.contains_key(&connection) {
            return Err(ErrorCode::InvalidArgument);
        }

        let method = method.to_ascii_uppercase();
        if !COAP_METHODS.contains(&method.as_str()) || !path.starts_with('/') {
            return Err(ErrorCode::InvalidArgument);
        }

        let id = CoapId::new(self.allocate());
        self.coaps.insert(
            id,
            CoapEntry {
                connection,
                request: CoapRequest {
                    method,
                    path: path.to_string(),
                    content_format: None,
                    payload: Vec::new(),
                },
                phase: CoapPhase::Ready,
            },
        );
        Ok(id)
    }

    pub(crate) fn coap_free(&mut self, coap: CoapId) {
        self.coaps.remove(&coap);
    }

    pub(crate) fn coap_set_request_payload(
        &mut self,
        coap: CoapId,
        content_format: u16,
        payload: &[u8],
    ) -> Result<(), ErrorCode> {
        let entry = self.coaps.get_mut(&coap).ok_or(ErrorCode::InvalidArgument)?;

        if !matches!(entry.phase, CoapPhase::Ready) {
            return Err(ErrorCode::InvalidState);
        }

        entry.request.content_format = Some(content_format);
        entry.request.payload = payload.to_vec();
        Ok(())
    }

    /// Marks the request as executing and returns what the device handler
    /// needs. `None` as handler means the device has no such resource.
    pub(crate) fn coap_begin(
        &mut self,
        coap: CoapId,
    ) -> Result<(CoapRequest, Option<CoapHandler>), ErrorCode> {
        let entry = self.coaps.get(&coap).ok_or(ErrorCode::Aborted)?;

        if !matches!(entry.phase, CoapPhase::Ready) {
            return Err(ErrorCode::InvalidState);
        }

        let device = self.connected_device(entry.connection)?;
        let handler = device.handler(&entry.request.method, &entry.request.path);
        let request = entry.request.clone();

        if let Some(entry) = self.coaps.get_mut(&coap) {
            entry.phase = CoapPhase::Executing;
        }

        Ok((request, handler))
    }

    pub(crate) fn coap_finish(&mut self, coap: CoapId, response: CoapResponse) -> ErrorCode {
        let Some(connection) = self.coaps.get(&coap).map(|entry| entry.connection) else {
            return ErrorCode::Aborted;
        };
        let connected = self.connected_device(connection).is_ok();

        let Some(entry) = self.coaps.get_mut(&coap) else {
            return ErrorCode::Aborted;
        };

        if connected {
            entry.phase = CoapPhase::Done(response);
            ErrorCode::Ok
        } else {
            entry.phase = CoapPhase::Ready;
            ErrorCode::NotConnected
        }
    }

    fn coap_response(&self, coap: CoapId) -> Result<&CoapResponse, ErrorCode> {
        match self.coaps.get(&coap).map(|entry| &entry.phase) {
            Some(CoapPhase::Done(response)) => Ok(response),
            Some(_) => Err(ErrorCode::InvalidState),
            None => Err(ErrorCode::InvalidArgument),
        }
    }

    pub(crate) fn coap_response_status_code(&self, coap: CoapId) -> Result<u16, ErrorCode> {
        self.coap_response(coap).map(|response| response.status_code)
    }

    pub(crate) fn coap_response_content_format(
        &self,
        coap: CoapId,
    ) -> Result<Option<u16>, ErrorCode> {
        self.coap_response(coap)
            .map(|response| response.content_format)
    }

    pub(crate) fn coap_response_payload(&self, coap: CoapId) -> Result<Vec<u8>, ErrorCode> {
        self.coap_response(coap)
            .map(|response| response.payload.clone())
    }

    pub(crate) fn stream_new(&mut self, connection: ConnectionId) -> Result<StreamId, ErrorCode> {
        if !self.connections.contains_key(&connection) {
            return Err(ErrorCode::InvalidArgument);
        }

        let id = StreamId::new(self.allocate());
        self.streams.insert(id, StreamEntry::new(connection));
        Ok(id)
    }

    pub(crate) fn stream_free(&mut self, stream: StreamId, settled: &mut Settled) {
        if let Some(mut entry) = self.streams.remove(&stream) {
            entry.abort(settled);
        }
    }

    pub(crate) fn stream_open(&mut self, stream: StreamId, port: u32) -> ErrorCode {
        let Some(connection) = self.streams.get(&stream).map(|entry| entry.connection) else {
            return ErrorCode::Aborted;
        };

        let ports = match self.connected_device(connection) {
            Ok(device) => device.stream_ports.clone(),
            Err(code) => return code,
        };

        match self.streams.get_mut(&stream) {
            Some(entry) => entry.open(port, &ports),
            None => ErrorCode::Aborted,
        }
    }

    pub(crate) fn stream_read(
        &mut self,
        stream: StreamId,
        buffer: Slot<BufferStorage>,
        exact: bool,
        resolver: Resolver,
        settled: &mut Settled,
    ) {
        match self.streams.get_mut(&stream) {
            Some(entry) => entry.read(buffer, exact, resolver, settled),
            None => settled.push(resolver, ErrorCode::Aborted),
        }
    }

    pub(crate) fn stream_write(
        &mut self,
        stream: StreamId,
        data: &[u8],
        settled: &mut Settled,
    ) -> ErrorCode {
        let Some(entry) = self.streams.get_mut(&stream) else {
            return ErrorCode::Aborted;
        };

        let code = entry.write(data);
        entry.pump(settled);
        code
    }

    pub(crate) fn stream_close(&mut self, stream: StreamId, settled: &mut Settled) -> ErrorCode {
        let Some(entry) = self.streams.get_mut(&stream) else {
            return ErrorCode::Aborted;
        };

        let code = entry.close();
        entry.pump(settled);
        code
    }

    pub(crate) fn tunnel_new(&mut self, connection: ConnectionId) -> Result<TunnelId, ErrorCode> {
        if !self.connections.contains_key(&connection) {
            return Err(ErrorCode::InvalidArgument);
        }

        let id = TunnelId::new(self.allocate());
        self.tunnels.insert(
            id,
            TunnelEntry {
                connection,
                opening: false,
                forwarder: None,
            },
        );
        Ok(id)
    }

    pub(crate) fn tunnel_free(&mut self, tunnel: TunnelId) -> Option<Forwarder> {
        self.tunnels
            .remove(&tunnel)
            .and_then(|entry| entry.forwarder)
    }

    /// Checks that the device allows the service and reserves the tunnel
    /// for [`tunnel_install`](Self::tunnel_install).
    pub(crate) fn tunnel_prepare(
        &mut self,
        tunnel: TunnelId,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<(), ErrorCode> {
        let entry = self.tunnels.get(&tunnel).ok_or(ErrorCode::Aborted)?;

        if entry.opening || entry.forwarder.is_some() {
            return Err(ErrorCode::InvalidState);
        }

        let device = self.connected_device(entry.connection)?;
        if !device
            .tunnel_services
            .contains(&(remote_host.to_string(), remote_port))
        {
            return Err(ErrorCode::AccessDenied);
        }

        if let Some(entry) = self.tunnels.get_mut(&tunnel) {
            entry.opening = true;
        }
        Ok(())
    }

    /// Stores the bound forwarder. A forwarder that cannot be kept is handed
    /// back so the caller drops it outside the lock.
    pub(crate) fn tunnel_install(
        &mut self,
        tunnel: TunnelId,
        bound: io::Result<Forwarder>,
    ) -> (ErrorCode, Option<Forwarder>) {
        let connection = match self.tunnels.get_mut(&tunnel) {
            Some(entry) => {
                entry.opening = false;
                entry.connection
            }
            None => return (ErrorCode::Aborted, bound.ok()),
        };

        let forwarder = match bound {
            Ok(forwarder) => forwarder,
            Err(error) if error.kind() == io::ErrorKind::AddrInUse => {
                return (ErrorCode::AddressInUse, None);
            }
            Err(_) => return (ErrorCode::Failed, None),
        };

        if self.connected_device(connection).is_err() {
            return (ErrorCode::NotConnected, Some(forwarder));
        }

        match self.tunnels.get_mut(&tunnel) {
            Some(entry) => {
                entry.forwarder = Some(forwarder);
                (ErrorCode::Ok, None)
            }
            None => (ErrorCode::Aborted, Some(forwarder)),
        }
    }

    pub(crate) fn tunnel_local_port(&self, tunnel: TunnelId) -> Result<u16, ErrorCode> {
        self.tunnels
            .get(&tunnel)
            .ok_or(ErrorCode::InvalidArgument)?
            .forwarder
            .as_ref()
            .map(Forwarder::local_port)
            .ok_or(ErrorCode::InvalidState)
    }

    pub(crate) fn listener_new(&mut self, source: ListenerSource) -> Result<ListenerId, ErrorCode> {
        let mut entry = ListenerEntry::new(source);
        let mut settled = Settled::default();

        match source {
            ListenerSource::ConnectionEvents(connection) => {
                let phase = self
                    .connections
                    .get(&connection)
                    .map(|connection| connection.phase)
                    .ok_or(ErrorCode::InvalidArgument)?;

                if phase == Phase::Closed {
                    entry.exhaust(&mut settled);
                }
            }
            ListenerSource::Mdns => {
                for announcement in &self.announcements {
                    entry.deliver(ListenerEvent::Discovery(announcement.clone()), &mut settled);
                }
            }
        }

        let id = ListenerId::new(self.allocate());
        self.listeners.insert(id, entry);
        Ok(id)
    }

    pub(crate) fn listener_free(&mut self, listener: ListenerId, settled: &mut Settled) {
        if let Some(mut entry) = self.listeners.remove(&listener) {
            entry.stop(settled);
        }
    }

    pub(crate) fn listener_next(
        &mut self,
        listener: ListenerId,
        sink: EventSink,
        resolver: Resolver,
        settled: &mut Settled,
    ) {
        match self.listeners.get_mut(&listener) {
            Some(entry) => entry.next(sink, resolver, settled),
            None => settled.push(resolver, ErrorCode::Stopped),
        }
    }

    pub(crate) fn listener_stop(&mut self, listener: ListenerId, settled: &mut Settled) {
        if let Some(entry) = self.listeners.get_mut(&listener)
            && !entry.is_stopped()
        {
            entry.stop(settled);
        }
    }
}
