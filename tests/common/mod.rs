#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edge_client::engine::loopback::CoapResponse;
use edge_client::{Connection, Context, LoopbackDevice, LoopbackEngine};

pub const PRODUCT_ID: &str = "pr-12345678";
pub const DEVICE_ID: &str = "de-abcdefgh";
pub const ECHO_PORT: u32 = 42;

/// CBOR encoding of `{"A": 1}`.
pub const CBOR_PAYLOAD: [u8; 4] = [0xA1, 0x61, 0x41, 0x01];

/// Device serving the resources most tests use.
pub fn device() -> LoopbackDevice {
    LoopbackDevice::new(PRODUCT_ID, DEVICE_ID)
        .coap_static("GET", "/resource", 205, Some(60), CBOR_PAYLOAD.to_vec())
        .coap_static("GET", "/text", 205, Some(0), b"hello".to_vec())
        .coap_static("GET", "/empty", 205, None, Vec::new())
        .coap("POST", "/echo", |request| {
            CoapResponse::new(204).with_payload(
                request.content_format.unwrap_or_default(),
                request.payload.clone(),
            )
        })
        .stream_port(ECHO_PORT)
}

pub fn setup() -> (Arc<LoopbackEngine>, Context) {
    setup_with(device())
}

pub fn setup_with(device: LoopbackDevice) -> (Arc<LoopbackEngine>, Context) {
    let engine = Arc::new(LoopbackEngine::new().expect("engine threads should spawn"));
    engine.add_device(device);

    let context = Context::builder()
        .engine(engine.clone())
        .build()
        .expect("context should build");

    (engine, context)
}

/// Connection with product id, device id and a fresh private key set.
pub fn configured(context: &Context) -> Connection {
    let connection = context.create_connection();
    connection.set_product_id(PRODUCT_ID).unwrap();
    connection.set_device_id(DEVICE_ID).unwrap();
    connection
        .set_private_key(&context.create_private_key().unwrap())
        .unwrap();
    connection
}

pub fn connect(context: &Context) -> Connection {
    let connection = configured(context);
    connection
        .connect()
        .wait_for_result()
        .expect("connect should succeed");
    connection
}

/// Polls `condition` for up to two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    condition()
}
