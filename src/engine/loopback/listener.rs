//! Engine-side subscription state.

use crate::engine::loopback::device::Announcement;
use crate::engine::loopback::state::Settled;
use crate::engine::{EventSink, ListenerSource, Resolver};
use crate::future::storage::ConnectionEvent;
use crate::status::ErrorCode;

use std::collections::VecDeque;
use tracing::debug;

/// Events kept for a listener nobody is reading; older ones are dropped.
pub(crate) const MAX_QUEUED_EVENTS: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ListenerEvent {
    Connection(ConnectionEvent),
    Discovery(Announcement),
}

/// One subscription: queued events, at most one waiting request, and the
/// stopped/exhausted flags.
pub(crate) struct ListenerEntry {
    pub(crate) source: ListenerSource,
    queue: VecDeque<ListenerEvent>,
    waiter: Option<(EventSink, Resolver)>,
    stopped: bool,
    exhausted: bool,
}

impl ListenerEntry {
    pub(crate) fn new(source: ListenerSource) -> Self {
        Self {
            source,
            queue: VecDeque::new(),
            waiter: None,
            stopped: false,
            exhausted: false,
        }
    }

    pub(crate) fn next(&mut self, sink: EventSink, resolver: Resolver, settled: &mut Settled) {
        if self.stopped {
            settled.push(resolver, ErrorCode::Stopped);
            return;
        }

        if self.waiter.is_some() {
            settled.push(resolver, ErrorCode::OperationInProgress);
            return;
        }

        if let Some(event) = self.queue.pop_front() {
            settled.push(resolver, write(&sink, event));
            return;
        }

        if self.exhausted {
            settled.push(resolver, ErrorCode::Stopped);
            return;
        }

        self.waiter = Some((sink, resolver));
    }

    pub(crate) fn deliver(&mut self, event: ListenerEvent, settled: &mut Settled) {
        if self.stopped {
            return;
        }

        match self.waiter.take() {
            Some((sink, resolver)) => settled.push(resolver, write(&sink, event)),
            None => {
                if self.queue.len() >= MAX_QUEUED_EVENTS {
                    self.queue.pop_front();
                    debug!(target: "edge_client::engine", source = ?self.source, "listener queue full, oldest event dropped");
                }
                self.queue.push_back(event);
            }
        }
    }

    /// Marks the subscription inactive and fails the waiting request.
    pub(crate) fn stop(&mut self, settled: &mut Settled) {
        self.stopped = true;
        self.queue.clear();

        if let Some((_, resolver)) = self.waiter.take() {
            settled.push(resolver, ErrorCode::Stopped);
        }
    }

    /// The source is gone: queued events are still handed out, after that
    /// every request fails with `Stopped`.
    pub(crate) fn exhaust(&mut self, settled: &mut Settled) {
        self.exhausted = true;

        if self.queue.is_empty()
            && let Some((_, resolver)) = self.waiter.take()
        {
            settled.push(resolver, ErrorCode::Stopped);
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }
}

fn write(sink: &EventSink, event: ListenerEvent) -> ErrorCode {
    match (sink, event) {
        (EventSink::ConnectionEvent(slot), ListenerEvent::Connection(event)) => {
            slot.lock().event = Some(event.raw());
            ErrorCode::Ok
        }
        (EventSink::Discovery(slot), ListenerEvent::Discovery(announcement)) => {
            let mut record = slot.lock();
            record.address = announcement.address;
            record.port = announcement.port;
            record.device_id = announcement.device_id;
            record.product_id = announcement.product_id;
            ErrorCode::Ok
        }
        _ => ErrorCode::InvalidArgument,
    }
}
