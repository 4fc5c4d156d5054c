mod common;

use rstest::rstest;
use serde_json::{Value, json};

use edge_client::{CONTENT_FORMAT_CBOR, CONTENT_FORMAT_TEXT_PLAIN, ErrorCode};

use common::CBOR_PAYLOAD;

/// Decodes the single-entry CBOR maps the test device serves: one text key
/// of up to 23 bytes mapped to a small unsigned integer.
fn decode_small_map(payload: &[u8]) -> Value {
    assert_eq!(payload[0], 0xA1, "payload should be a one-entry map");

    let key_len = (payload[1] - 0x60) as usize;
    let key = std::str::from_utf8(&payload[2..2 + key_len]).unwrap();
    let value = payload[2 + key_len];
    assert!(value < 0x18, "value should be a small unsigned integer");

    json!({ key: value })
}

#[test]
fn test_get_resource_scenario() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/resource").unwrap();

    coap.execute()
        .wait_for_result()
        .expect("GET /resource should succeed");

    assert_eq!(coap.response_status_code().unwrap(), 205);
    assert_eq!(
        coap.response_content_format().unwrap(),
        Some(CONTENT_FORMAT_CBOR)
    );

    let payload = coap.response_payload().unwrap();
    assert_eq!(payload, CBOR_PAYLOAD.to_vec());
    assert_eq!(decode_small_map(&payload), json!({"A": 1}));
}

#[test]
fn test_missing_content_format_is_none() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);

    let empty = connection.create_coap("GET", "/empty").unwrap();
    empty.execute().wait_for_result().unwrap();

    let text = connection.create_coap("GET", "/text").unwrap();
    text.execute().wait_for_result().unwrap();

    assert_eq!(
        empty.response_content_format().unwrap(),
        None,
        "A response without content format should report None"
    );
    assert_eq!(
        text.response_content_format().unwrap(),
        Some(CONTENT_FORMAT_TEXT_PLAIN),
        "Content format 0 should be distinct from a missing one"
    );
    assert!(empty.response_payload().unwrap().is_empty());
}

#[test]
fn test_unknown_resource_is_not_found_status() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/missing").unwrap();

    coap.execute().wait_for_result().unwrap();

    assert_eq!(coap.response_status_code().unwrap(), 404);
    assert_eq!(coap.response_content_format().unwrap(), None);
}

#[test]
fn test_request_payload_reaches_device() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("POST", "/echo").unwrap();

    coap.set_request_payload(CONTENT_FORMAT_TEXT_PLAIN, b"ping")
        .unwrap();
    coap.execute().wait_for_result().unwrap();

    assert_eq!(coap.response_status_code().unwrap(), 204);
    assert_eq!(coap.response_payload().unwrap(), b"ping".to_vec());
}

#[test]
fn test_accessors_before_execute_fail() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/resource").unwrap();

    let err = coap.response_content_format().unwrap_err();
    assert_eq!(
        err.code(),
        Some(ErrorCode::InvalidState),
        "Reading a response before execution is an error, not a missing value"
    );
    assert!(coap.response_status_code().is_err());
}

#[test]
fn test_execute_without_connection_fails() {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);
    let coap = connection.create_coap("GET", "/resource").unwrap();

    let err = coap.execute().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotConnected));
}

#[rstest]
#[case::unknown_method("FETCH", "/resource")]
#[case::relative_path("GET", "resource")]
#[case::empty_path("GET", "")]
fn test_invalid_request_is_rejected(#[case] method: &str, #[case] path: &str) {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);

    let err = connection.create_coap(method, path).err().unwrap();
    assert_eq!(err.code(), Some(ErrorCode::InvalidArgument));
}
