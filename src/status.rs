//! Outcome codes, statuses and the crate error type.
//!
//! Every resolved operation carries a [`Status`]: an [`ErrorCode`] plus a
//! description resolved from a static table. A non-OK status met while
//! fetching a result is returned to the caller as [`Error::Status`].
//!
//! # Example
//!
//! ```ignore
//! use edge_client::{ErrorCode, Status};
//!
//! let status = Status::new(ErrorCode::Eof);
//! assert!(!status.ok());
//! assert_eq!(status.description(), "end of file");
//! ```

use std::fmt;
use thiserror::Error;

/// Raw outcome code reported by the engine for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ErrorCode {
    #[default]
    Ok = 0,
    Unknown = 1000,
    Failed = 1001,
    Aborted = 1002,
    Eof = 1003,
    Stopped = 1004,
    NoData = 1005,
    NotFound = 1006,
    NotConnected = 1007,
    InvalidArgument = 1008,
    InvalidState = 1009,
    OperationInProgress = 1010,
    AccessDenied = 1011,
    NoChannels = 1012,
    AddressInUse = 1013,
}

impl ErrorCode {
    const ALL: [ErrorCode; 15] = [
        ErrorCode::Ok,
        ErrorCode::Unknown,
        ErrorCode::Failed,
        ErrorCode::Aborted,
        ErrorCode::Eof,
        ErrorCode::Stopped,
        ErrorCode::NoData,
        ErrorCode::NotFound,
        ErrorCode::NotConnected,
        ErrorCode::InvalidArgument,
        ErrorCode::InvalidState,
        ErrorCode::OperationInProgress,
        ErrorCode::AccessDenied,
        ErrorCode::NoChannels,
        ErrorCode::AddressInUse,
    ];

    /// Maps a raw engine code to a known code. Unrecognised values become
    /// [`ErrorCode::Unknown`].
    pub fn from_raw(raw: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|code| *code as i32 == raw)
            .unwrap_or(ErrorCode::Unknown)
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Short symbolic name, e.g. `EOF`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::Failed => "FAILED",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Eof => "EOF",
            ErrorCode::Stopped => "STOPPED",
            ErrorCode::NoData => "NO_DATA",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::OperationInProgress => "OPERATION_IN_PROGRESS",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::NoChannels => "NO_CHANNELS",
            ErrorCode::AddressInUse => "ADDRESS_IN_USE",
        }
    }

    /// Human readable text for the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::Unknown => "unknown error",
            ErrorCode::Failed => "operation failed",
            ErrorCode::Aborted => "operation aborted",
            ErrorCode::Eof => "end of file",
            ErrorCode::Stopped => "stopped",
            ErrorCode::NoData => "no data",
            ErrorCode::NotFound => "not found",
            ErrorCode::NotConnected => "not connected",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::InvalidState => "invalid state",
            ErrorCode::OperationInProgress => "operation in progress",
            ErrorCode::AccessDenied => "access denied",
            ErrorCode::NoChannels => "no channels available to reach the device",
            ErrorCode::AddressInUse => "address in use",
        }
    }
}

/// Outcome of a resolved operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status {
    code: ErrorCode,
}

impl Status {
    pub const OK: Status = Status { code: ErrorCode::Ok };

    pub const fn new(code: ErrorCode) -> Self {
        Self { code }
    }

    pub fn ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn description(&self) -> &'static str {
        self.code.description()
    }
}

impl From<ErrorCode> for Status {
    fn from(code: ErrorCode) -> Self {
        Status::new(code)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({})", self.code.name())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code.name())
    }
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine reported a non-success outcome.
    #[error("{0}")]
    Status(Status),

    /// A result was requested before the operation resolved.
    #[error("future is not resolved yet")]
    NotResolved,

    #[error("invalid connection options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the carried status for engine failures.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Status(status) => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.status().map(|status| status.code())
    }

    pub fn is_stopped(&self) -> bool {
        self.code() == Some(ErrorCode::Stopped)
    }

    pub fn is_eof(&self) -> bool {
        self.code() == Some(ErrorCode::Eof)
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::Status(Status::new(code))
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Status(status)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Converts an engine code into `Ok(())` or an [`Error::Status`].
pub(crate) fn check(code: ErrorCode) -> Result<()> {
    if code == ErrorCode::Ok {
        Ok(())
    } else {
        Err(Error::from(code))
    }
}
