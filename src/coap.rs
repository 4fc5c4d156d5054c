//! CoAP request/response exchanges over a connection.
//!
//! ```ignore
//! let coap = connection.create_coap("GET", "/heat-pump")?;
//! coap.execute().wait_for_result()?;
//!
//! let status = coap.response_status_code()?;
//! match coap.response_content_format()? {
//!     Some(format) => println!("{status} format {format}"),
//!     None => println!("{status} without content format"),
//! }
//! ```

use crate::engine::{CoapId, ConnectionId, Engine};
use crate::future::FutureVoid;
use crate::future::storage::{self, VoidStorage};
use crate::status::Result;

use std::sync::Arc;

/// CoAP content format for CBOR payloads.
pub const CONTENT_FORMAT_CBOR: u16 = 60;
/// CoAP content format for JSON payloads.
pub const CONTENT_FORMAT_JSON: u16 = 50;
/// CoAP content format for plain text payloads.
pub const CONTENT_FORMAT_TEXT_PLAIN: u16 = 0;

/// One CoAP request. Executes once; the response accessors become valid
/// after the execution future resolved OK.
pub struct Coap {
    engine: Arc<dyn Engine>,
    id: CoapId,
}

impl Coap {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        connection: ConnectionId,
        method: &str,
        path: &str,
    ) -> Result<Self> {
        let id = engine.coap_new(connection, method, path)?;
        Ok(Self { engine, id })
    }

    /// Sets the request body.
    ///
    /// # Arguments
    /// * `content_format` - CoAP content format of `payload`, e.g.
    ///   [`CONTENT_FORMAT_CBOR`]
    /// * `payload` - Request body
    pub fn set_request_payload(&self, content_format: u16, payload: &[u8]) -> Result<()> {
        self.engine
            .coap_set_request_payload(self.id, content_format, payload)
    }

    /// Sends the request.
    ///
    /// # Returns
    /// A future resolving OK once a response arrived, whatever its status
    /// code. Fails with `NotConnected` when the connection is not
    /// established and `InvalidState` when already executed.
    pub fn execute(&self) -> FutureVoid {
        let (handle, resolver) = self.engine.new_completion();
        self.engine.coap_execute(self.id, resolver);

        FutureVoid::new(handle, storage::slot(VoidStorage))
    }

    /// Response status code, e.g. 205. Valid after `execute()` succeeded.
    pub fn response_status_code(&self) -> Result<u16> {
        self.engine.coap_response_status_code(self.id)
    }

    /// Response content format, `None` when the response carries none.
    ///
    /// A missing content format is a valid outcome and distinct from any
    /// format value, including 0. Engine failures are returned as errors.
    pub fn response_content_format(&self) -> Result<Option<u16>> {
        self.engine.coap_response_content_format(self.id)
    }

    /// Response body, empty when the device sent none.
    pub fn response_payload(&self) -> Result<Vec<u8>> {
        self.engine.coap_response_payload(self.id)
    }
}

impl Drop for Coap {
    fn drop(&mut self) {
        self.engine.coap_free(self.id);
    }
}
