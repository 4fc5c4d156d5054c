mod common;

use std::sync::{Arc, Mutex};

use rstest::rstest;

use edge_client::logging::Level;
use edge_client::{Context, ConnectionOptions, Error, ErrorCode, LogMessage, LoopbackDevice};

use common::{DEVICE_ID, PRODUCT_ID};

#[rstest]
#[case::no_product_id(false, true, true)]
#[case::no_device_id(true, false, true)]
#[case::no_private_key(true, true, false)]
fn test_connect_requires_configuration(
    #[case] product_id: bool,
    #[case] device_id: bool,
    #[case] private_key: bool,
) {
    let (_engine, context) = common::setup();
    let connection = context.create_connection();

    if product_id {
        connection.set_product_id(PRODUCT_ID).unwrap();
    }
    if device_id {
        connection.set_device_id(DEVICE_ID).unwrap();
    }
    if private_key {
        connection
            .set_private_key(&context.create_private_key().unwrap())
            .unwrap();
    }

    let err = connection.connect().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidState));
}

#[test]
fn test_connect_to_unknown_device() {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);
    connection.set_device_id("de-nobody").unwrap();

    let err = connection.connect().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[test]
fn test_connect_to_unreachable_device() {
    let (_engine, context) = common::setup_with(common::device().reachable(false));
    let connection = common::configured(&context);

    let err = connection.connect().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NoChannels));
}

#[test]
fn test_second_connect_is_rejected() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);

    let err = connection.connect().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidState));
}

#[test]
fn test_setters_rejected_after_connect() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);

    let err = connection.set_server_url("https://example.test").unwrap_err();
    assert_eq!(
        err.code(),
        Some(ErrorCode::InvalidState),
        "Settings are frozen once connected"
    );
}

#[rstest]
#[case::empty_value("")]
#[case::not_a_key("secret")]
fn test_invalid_private_key(#[case] key: &str) {
    let (_engine, context) = common::setup();
    let connection = context.create_connection();

    let err = connection.set_private_key(key).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidArgument));
}

#[test]
fn test_fingerprints() {
    let (_engine, context) = common::setup();
    let connection = context.create_connection();

    assert_eq!(
        connection.client_fingerprint_hex().unwrap_err().code(),
        Some(ErrorCode::InvalidState),
        "No client fingerprint without a private key"
    );

    let connection = common::configured(&context);
    assert_eq!(
        connection.device_fingerprint_hex().unwrap_err().code(),
        Some(ErrorCode::InvalidState),
        "No device fingerprint before connecting"
    );

    let client = connection.client_fingerprint_hex().unwrap();
    assert_eq!(client.len(), 64);
    assert!(client.chars().all(|c| c.is_ascii_hexdigit()));

    connection.connect().wait_for_result().unwrap();
    assert_eq!(
        connection.device_fingerprint_hex().unwrap(),
        LoopbackDevice::new(PRODUCT_ID, DEVICE_ID).fingerprint()
    );
}

#[test]
fn test_options_from_json() {
    let (_engine, context) = common::setup();
    let key = context.create_private_key().unwrap();

    let options = ConnectionOptions {
        private_key: Some(key),
        ..ConnectionOptions::from_json(&format!(
            r#"{{"product_id":"{PRODUCT_ID}","device_id":"{DEVICE_ID}","application_name":"tests"}}"#
        ))
        .unwrap()
    };

    let connection = context.create_connection();
    connection.set_options(&options).unwrap();
    connection.connect().wait_for_result().unwrap();
}

#[test]
fn test_options_reject_unknown_keys() {
    let err = ConnectionOptions::from_json(r#"{"serverUrl":"x"}"#).unwrap_err();
    assert!(matches!(err, Error::Options(_)));
}

#[test]
fn test_direct_candidates() {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);

    assert_eq!(
        connection
            .add_direct_candidate("127.0.0.1", 5592)
            .unwrap_err()
            .code(),
        Some(ErrorCode::InvalidState),
        "Candidates must be enabled first"
    );

    connection.enable_direct_candidates().unwrap();
    connection.add_direct_candidate("127.0.0.1", 5592).unwrap();
    connection.end_of_direct_candidates().unwrap();

    connection.connect().wait_for_result().unwrap();
}

#[test]
fn test_close_before_connect() {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);

    let err = connection.close().wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidState));
}

#[test]
fn test_context_settings() {
    let (_engine, context) = common::setup();

    assert!(context.version().starts_with("loopback-"));
    context.set_log_level("debug").unwrap();
    assert_eq!(
        context.set_log_level("loud").unwrap_err().code(),
        Some(ErrorCode::InvalidArgument)
    );

    let err = Context::builder().log_level("loud").build().err().unwrap();
    assert_eq!(err.code(), Some(ErrorCode::InvalidArgument));
}

#[test]
fn test_logger_receives_engine_events() {
    let (_engine, context) = common::setup();
    let messages: Arc<Mutex<Vec<LogMessage>>> = Arc::default();
    let sink = messages.clone();
    context.set_logger(move |message: LogMessage| sink.lock().unwrap().push(message));
    context.set_log_level("debug").unwrap();

    let connection = common::configured(&context);
    connection.set_device_id("de-nobody").unwrap();
    connection.connect().wait_for_result().unwrap_err();

    let messages = messages.lock().unwrap();
    assert!(
        messages
            .iter()
            .any(|m| m.severity == Level::DEBUG && m.message.contains("NOT_FOUND")),
        "Failed connect should be logged, got {messages:?}"
    );
    assert!(
        messages.iter().all(|m| m.severity != Level::TRACE),
        "Trace events are below the log level"
    );
}

#[test]
fn test_logger_respects_level_and_can_be_cleared() {
    let (_engine, context) = common::setup();
    let messages: Arc<Mutex<Vec<LogMessage>>> = Arc::default();
    let sink = messages.clone();
    context.set_logger(move |message: LogMessage| sink.lock().unwrap().push(message));
    context.set_log_level("warn").unwrap();

    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();
    coap.execute().wait_for_result().unwrap();
    assert!(
        messages.lock().unwrap().is_empty(),
        "Nothing at warn or above happened"
    );

    context.clear_logger();
    context.set_log_level("trace").unwrap();
    let coap = connection.create_coap("GET", "/text").unwrap();
    coap.execute().wait_for_result().unwrap();
    assert!(messages.lock().unwrap().is_empty(), "Cleared logger sees nothing");
}
