//! Echo streams.
//!
//! Everything the client writes is queued for reading back. Closing the write
//! direction makes reads fail with `Eof` once the queued bytes are consumed.

use crate::engine::loopback::state::Settled;
use crate::engine::{ConnectionId, Resolver};
use crate::future::storage::{BufferStorage, Slot};
use crate::status::ErrorCode;

use std::collections::{HashSet, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Open,
    Aborted,
}

struct PendingRead {
    buffer: Slot<BufferStorage>,
    exact: bool,
    resolver: Resolver,
}

pub(crate) struct StreamEntry {
    pub(crate) connection: ConnectionId,
    phase: Phase,
    echo: VecDeque<u8>,
    write_closed: bool,
    reads: VecDeque<PendingRead>,
}

impl StreamEntry {
    pub(crate) fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            phase: Phase::Created,
            echo: VecDeque::new(),
            write_closed: false,
            reads: VecDeque::new(),
        }
    }

    fn usable(&self) -> Result<(), ErrorCode> {
        match self.phase {
            Phase::Open => Ok(()),
            Phase::Created => Err(ErrorCode::InvalidState),
            Phase::Aborted => Err(ErrorCode::Aborted),
        }
    }

    pub(crate) fn open(&mut self, port: u32, ports: &HashSet<u32>) -> ErrorCode {
        if self.phase != Phase::Created {
            return ErrorCode::InvalidState;
        }

        if !ports.contains(&port) {
            return ErrorCode::NotFound;
        }

        self.phase = Phase::Open;
        ErrorCode::Ok
    }

    pub(crate) fn read(
        &mut self,
        buffer: Slot<BufferStorage>,
        exact: bool,
        resolver: Resolver,
        settled: &mut Settled,
    ) {
        if let Err(code) = self.usable() {
            settled.push(resolver, code);
            return;
        }

        if buffer.lock().capacity() == 0 {
            let code = if exact {
                ErrorCode::Ok
            } else {
                ErrorCode::InvalidArgument
            };
            settled.push(resolver, code);
            return;
        }

        self.reads.push_back(PendingRead {
            buffer,
            exact,
            resolver,
        });
        self.pump(settled);
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> ErrorCode {
        if let Err(code) = self.usable() {
            return code;
        }

        if self.write_closed {
            return ErrorCode::InvalidState;
        }

        self.echo.extend(data);
        ErrorCode::Ok
    }

    pub(crate) fn close(&mut self) -> ErrorCode {
        if let Err(code) = self.usable() {
            return code;
        }

        if self.write_closed {
            return ErrorCode::InvalidState;
        }

        self.write_closed = true;
        ErrorCode::Ok
    }

    /// Fails every pending read; later operations fail with `Aborted`.
    pub(crate) fn abort(&mut self, settled: &mut Settled) {
        self.phase = Phase::Aborted;
        self.echo.clear();

        for read in self.reads.drain(..) {
            settled.push(read.resolver, ErrorCode::Aborted);
        }
    }

    /// Moves queued bytes into pending reads, in request order.
    pub(crate) fn pump(&mut self, settled: &mut Settled) {
        while let Some(read) = self.reads.front() {
            let outcome = {
                let mut buffer = read.buffer.lock();

                let take = buffer.remaining().min(self.echo.len());
                if take > 0 {
                    let bytes: Vec<u8> = self.echo.drain(..take).collect();
                    buffer.append(&bytes);
                }

                if buffer.remaining() == 0 || (!read.exact && buffer.transferred() > 0) {
                    Some(ErrorCode::Ok)
                } else if self.write_closed && self.echo.is_empty() {
                    Some(ErrorCode::Eof)
                } else {
                    None
                }
            };

            let Some(code) = outcome else {
                break;
            };

            if let Some(read) = self.reads.pop_front() {
                settled.push(read.resolver, code);
            }
        }
    }
}
