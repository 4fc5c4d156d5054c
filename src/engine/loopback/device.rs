//! Simulated devices served by the loopback engine.
//!
//! # Example
//!
//! ```ignore
//! let device = LoopbackDevice::new("pr-12345678", "de-abcdefgh")
//!     .coap_static("GET", "/hello", 205, Some(0), b"hello".to_vec())
//!     .stream_port(42)
//!     .tunnel_service("127.0.0.1", 8080)
//!     .advertise("192.168.1.20", 5592);
//! engine.add_device(device);
//! ```

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A CoAP request as seen by a simulated device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoapRequest {
    pub method: String,
    pub path: String,
    pub content_format: Option<u16>,
    pub payload: Vec<u8>,
}

/// Response produced by a simulated device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoapResponse {
    pub status_code: u16,
    pub content_format: Option<u16>,
    pub payload: Vec<u8>,
}

impl CoapResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            content_format: None,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, content_format: u16, payload: Vec<u8>) -> Self {
        self.content_format = Some(content_format);
        self.payload = payload;
        self
    }

    pub(crate) fn not_found() -> Self {
        Self::new(404)
    }
}

/// Handler serving one CoAP resource.
pub type CoapHandler = Arc<dyn Fn(&CoapRequest) -> CoapResponse + Send + Sync>;

/// Discovery record as announced on the simulated network. Fields left `None`
/// are missing from the announcement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Announcement {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub device_id: Option<String>,
    pub product_id: Option<String>,
}

/// A device the loopback engine can connect to.
#[derive(Clone)]
pub struct LoopbackDevice {
    pub(crate) product_id: String,
    pub(crate) device_id: String,
    pub(crate) fingerprint: String,
    pub(crate) reachable: bool,
    pub(crate) resources: HashMap<(String, String), CoapHandler>,
    pub(crate) stream_ports: HashSet<u32>,
    pub(crate) tunnel_services: HashSet<(String, u16)>,
    pub(crate) advertisement: Option<(String, u16)>,
}

impl LoopbackDevice {
    /// Creates a reachable device without resources. The fingerprint is
    /// derived from the product and device ids.
    pub fn new(product_id: &str, device_id: &str) -> Self {
        let fingerprint = hex::encode(Sha256::digest(format!("{product_id}/{device_id}")));

        Self {
            product_id: product_id.to_string(),
            device_id: device_id.to_string(),
            fingerprint,
            reachable: true,
            resources: HashMap::new(),
            stream_ports: HashSet::new(),
            tunnel_services: HashSet::new(),
            advertisement: None,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Connection attempts fail with `NoChannels` when unreachable.
    pub fn reachable(mut self, reachable: bool) -> Self {
        self.reachable = reachable;
        self
    }

    /// Serves `method path` with `handler`.
    pub fn coap<F>(mut self, method: &str, path: &str, handler: F) -> Self
    where
        F: Fn(&CoapRequest) -> CoapResponse + Send + Sync + 'static,
    {
        self.resources.insert(
            (method.to_ascii_uppercase(), path.to_string()),
            Arc::new(handler),
        );
        self
    }

    /// Serves `method path` with a fixed response.
    pub fn coap_static(
        self,
        method: &str,
        path: &str,
        status_code: u16,
        content_format: Option<u16>,
        payload: Vec<u8>,
    ) -> Self {
        let response = CoapResponse {
            status_code,
            content_format,
            payload,
        };
        self.coap(method, path, move |_| response.clone())
    }

    /// Accepts streams on `port` and echoes everything written to them.
    pub fn stream_port(mut self, port: u32) -> Self {
        self.stream_ports.insert(port);
        self
    }

    /// Allows tunnels to `host:port`.
    pub fn tunnel_service(mut self, host: &str, port: u16) -> Self {
        self.tunnel_services.insert((host.to_string(), port));
        self
    }

    /// Announces the device via mDNS at `address:port`.
    pub fn advertise(mut self, address: &str, port: u16) -> Self {
        self.advertisement = Some((address.to_string(), port));
        self
    }

    pub(crate) fn matches(&self, product_id: &str, device_id: &str) -> bool {
        self.product_id == product_id && self.device_id == device_id
    }

    pub(crate) fn announcement(&self) -> Option<Announcement> {
        self.advertisement
            .as_ref()
            .map(|(address, port)| Announcement {
                address: Some(address.clone()),
                port: Some(*port),
                device_id: Some(self.device_id.clone()),
                product_id: Some(self.product_id.clone()),
            })
    }

    pub(crate) fn handler(&self, method: &str, path: &str) -> Option<CoapHandler> {
        self.resources
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl fmt::Debug for LoopbackDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackDevice")
            .field("product_id", &self.product_id)
            .field("device_id", &self.device_id)
            .field("reachable", &self.reachable)
            .field("resources", &self.resources.len())
            .field("stream_ports", &self.stream_ports)
            .field("advertisement", &self.advertisement)
            .finish()
    }
}
