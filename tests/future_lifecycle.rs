mod common;

use std::sync::mpsc;
use std::time::Duration;

use edge_client::{Error, ErrorCode, Status};

use common::ECHO_PORT;

#[test]
fn test_get_result_is_idempotent() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();

    let mut future = coap.execute();
    future.wait_for_result().unwrap();

    assert!(future.get_result().is_ok(), "First get_result should succeed");
    assert!(future.get_result().is_ok(), "Second get_result should match");
    assert_eq!(future.status(), Some(Status::OK));
}

#[test]
fn test_failed_result_is_repeated() {
    let (_engine, context) = common::setup();
    let connection = common::configured(&context);
    connection.set_device_id("de-unknown").unwrap();

    let mut future = connection.connect();
    let first = future.wait_for_result().unwrap_err();
    let second = future.get_result().unwrap_err();

    assert_eq!(first.code(), Some(ErrorCode::NotFound));
    assert_eq!(second.code(), Some(ErrorCode::NotFound));
}

#[test]
fn test_get_result_before_resolution() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let stream = connection.create_stream().unwrap();
    stream.open(ECHO_PORT).wait_for_result().unwrap();

    let mut pending = stream.read_some(8);

    assert!(
        matches!(pending.get_result(), Err(Error::NotResolved)),
        "Reading a pending future should fail with NotResolved"
    );
    assert_eq!(pending.status(), None, "Pending future has no status");

    stream.write(b"ping").wait_for_result().unwrap();
    assert_eq!(pending.wait_for_result().unwrap(), b"ping".to_vec());
}

#[test]
fn test_dropped_future_frees_handle_once() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let stream = connection.create_stream().unwrap();
    stream.open(ECHO_PORT).wait_for_result().unwrap();

    drop(stream.read_some(8));

    let during = context.stats();
    assert_eq!(during.guards_active(), 1, "Dropped future should be guarded");
    assert_eq!(during.outstanding(), 1, "Guarded handle should still be alive");

    stream.write(b"x").wait_for_result().unwrap();

    assert!(
        common::wait_until(|| context.stats().guards_active() == 0),
        "Guard should be released after resolution"
    );

    let after = context.stats();
    assert_eq!(after.outstanding(), 0, "Every handle should be freed");
    assert_eq!(after.completions_created, after.completions_freed);
    assert_eq!(after.guards_released, 1, "Guard should be released exactly once");
    assert_eq!(after.callbacks_fired, 1, "Guard callback should fire exactly once");
}

#[test]
fn test_dropped_resolved_future_is_freed_directly() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();

    let mut future = coap.execute();
    future.wait_for_result().unwrap();
    drop(future);

    let stats = context.stats();
    assert_eq!(stats.guards_adopted, 0, "Resolved future needs no guard");
    assert_eq!(stats.outstanding(), 0);
}

#[test]
fn test_callback_fires_once_with_status() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();
    let (tx, rx) = mpsc::channel();

    coap.execute().callback(move |future| {
        tx.send(future.status()).unwrap();
    });

    let status = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Callback should fire");
    assert_eq!(status, Some(Status::OK));
    assert!(
        rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "Callback should fire only once"
    );

    assert!(common::wait_until(|| context.stats().outstanding() == 0));
    assert_eq!(context.stats().callbacks_fired, 1);
}

#[test]
fn test_panicking_callback_still_releases_guard() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();

    coap.execute().callback(|_| panic!("callback failure"));

    assert!(
        common::wait_until(|| {
            let stats = context.stats();
            stats.guards_active() == 0 && stats.outstanding() == 0
        }),
        "Guard and handle should be released even when the callback panics"
    );
    assert_eq!(context.stats().guards_released, 1);

    let next = connection.create_coap("GET", "/text").unwrap();
    let (tx, rx) = mpsc::channel();
    next.execute().callback(move |future| {
        tx.send(future.status()).unwrap();
    });
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        Some(Status::OK),
        "Callbacks should keep running after a panic"
    );
}

#[test]
fn test_callback_on_resolved_future_still_fires() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/text").unwrap();
    let (tx, rx) = mpsc::channel();

    let future = coap.execute();
    assert!(common::wait_until(|| future.is_resolved()));

    future.callback(move |future| {
        tx.send(future.get_result().is_ok()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
}

#[test]
fn test_callback_may_wait_on_other_future() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let coap = connection.create_coap("GET", "/resource").unwrap();
    let second = connection.create_coap("GET", "/text").unwrap();
    let (tx, rx) = mpsc::channel();

    coap.execute().callback(move |_| {
        let outcome = second.execute().wait_for_result();
        let payload = second.response_payload();
        tx.send(outcome.and(payload)).unwrap();
    });

    let payload = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Nested wait should not deadlock");
    assert_eq!(payload.unwrap(), b"hello".to_vec());
}

#[test]
fn test_resource_drop_aborts_pending_operation() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let stream = connection.create_stream().unwrap();
    stream.open(ECHO_PORT).wait_for_result().unwrap();

    let mut pending = stream.read_all(4);
    drop(stream);

    let err = pending.wait_for_result().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Aborted));
}
