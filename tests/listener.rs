mod common;

use std::collections::HashSet;

use edge_client::engine::loopback::Announcement;
use edge_client::{ConnectionEvent, ErrorCode, LoopbackDevice};

use common::{DEVICE_ID, PRODUCT_ID};

fn advertised(index: u16) -> LoopbackDevice {
    LoopbackDevice::new(PRODUCT_ID, &format!("de-{index:08}"))
        .advertise(&format!("192.168.1.{}", 10 + index), 5592)
}

#[test]
fn test_discovery_yields_records_then_stops() {
    let (engine, context) = common::setup();
    for index in 0..3 {
        engine.add_device(advertised(index));
    }

    let resolver = context.create_mdns_resolver().unwrap();

    let mut ids = HashSet::new();
    for _ in 0..3 {
        let record = resolver
            .listen_next()
            .wait_for_result()
            .expect("advertised device should be discovered");
        assert_eq!(record.product_id, PRODUCT_ID);
        assert_eq!(record.port, 5592);
        ids.insert(record.device_id);
    }
    assert_eq!(ids.len(), 3, "Each record should name a distinct device");

    resolver.stop();

    let fourth = resolver.listen_next();
    assert!(
        fourth.is_resolved(),
        "Request after stop should resolve immediately"
    );
    assert!(fourth.get_result().unwrap_err().is_stopped());
}

#[test]
fn test_discovery_waits_for_new_announcements() {
    let (engine, context) = common::setup();
    let resolver = context.create_mdns_resolver().unwrap();

    let mut pending = resolver.listen_next();
    assert!(!pending.is_resolved(), "Nothing advertised yet");

    engine.add_device(advertised(7));

    let record = pending.wait_for_result().unwrap();
    assert_eq!(record.device_id, "de-00000007");
    assert_eq!(record.address, "192.168.1.17");
}

#[test]
fn test_re_added_device_is_discovered_once() {
    let (engine, context) = common::setup();
    engine.add_device(advertised(3));
    engine.add_device(advertised(3));

    let resolver = context.create_mdns_resolver().unwrap();
    let record = resolver.listen_next().wait_for_result().unwrap();
    assert_eq!(record.device_id, "de-00000003");

    let mut pending = resolver.listen_next();
    assert!(
        !pending.is_resolved(),
        "Same device should not be replayed twice"
    );

    engine.add_device(
        LoopbackDevice::new(PRODUCT_ID, "de-00000003").advertise("10.0.0.3", 5592),
    );
    let moved = pending.wait_for_result().unwrap();
    assert_eq!(moved.address, "10.0.0.3", "Changed record should be delivered");
}

#[test]
fn test_incomplete_announcement_is_no_data() {
    let (engine, context) = common::setup();
    engine.announce(Announcement {
        address: Some("10.0.0.9".into()),
        port: Some(5592),
        device_id: None,
        product_id: Some(PRODUCT_ID.into()),
    });

    let resolver = context.create_mdns_resolver().unwrap();
    let err = resolver.listen_next().wait_for_result().unwrap_err();

    assert_eq!(err.code(), Some(ErrorCode::NoData));
}

#[test]
fn test_stop_resolves_outstanding_future() {
    let (_engine, context) = common::setup();
    let resolver = context.create_mdns_resolver().unwrap();

    let mut pending = resolver.listen_next();
    resolver.stop();

    let err = pending.wait_for_result().unwrap_err();
    assert!(err.is_stopped(), "Outstanding request should see Stopped");
}

#[test]
fn test_double_stop_is_noop() {
    let (_engine, context) = common::setup();
    let resolver = context.create_mdns_resolver().unwrap();

    resolver.stop();
    resolver.stop();

    assert!(resolver.is_stopped());
    assert!(resolver.listen_next().wait_for_result().unwrap_err().is_stopped());
}

#[test]
fn test_second_outstanding_request_is_rejected() {
    let (_engine, context) = common::setup();
    let resolver = context.create_mdns_resolver().unwrap();

    let mut first = resolver.listen_next();
    let mut second = resolver.listen_next();

    assert_eq!(
        second.wait_for_result().unwrap_err().code(),
        Some(ErrorCode::OperationInProgress)
    );
    assert!(!first.is_resolved(), "First request should stay pending");

    resolver.stop();
    assert!(first.wait_for_result().unwrap_err().is_stopped());
}

#[test]
fn test_connection_events_follow_lifecycle() {
    let (engine, context) = common::setup();
    let connection = common::configured(&context);
    let events = connection.create_events_listener().unwrap();

    connection.connect().wait_for_result().unwrap();
    assert_eq!(
        events.listen_next().wait_for_result().unwrap(),
        ConnectionEvent::Connected
    );

    assert_eq!(engine.change_channel(PRODUCT_ID, DEVICE_ID), 1);
    assert_eq!(
        events.listen_next().wait_for_result().unwrap(),
        ConnectionEvent::ChannelChanged
    );

    connection.close().wait_for_result().unwrap();
    assert_eq!(
        events.listen_next().wait_for_result().unwrap(),
        ConnectionEvent::Closed
    );

    let err = events.listen_next().wait_for_result().unwrap_err();
    assert!(err.is_stopped(), "Closed connection has no further events");
}

#[test]
fn test_events_listener_outlives_connection() {
    let (_engine, context) = common::setup();
    let connection = common::connect(&context);
    let events = connection.create_events_listener().unwrap();

    let mut pending = events.listen_next();
    drop(connection);

    assert_eq!(pending.wait_for_result().unwrap(), ConnectionEvent::Closed);
    assert!(events.listen_next().wait_for_result().unwrap_err().is_stopped());
}

#[test]
fn test_dropped_listener_releases_everything() {
    let (_engine, context) = common::setup();
    let resolver = context.create_mdns_resolver().unwrap();

    drop(resolver.listen_next());
    drop(resolver);

    assert!(common::wait_until(|| {
        let stats = context.stats();
        stats.outstanding() == 0 && stats.guards_active() == 0
    }));
}
