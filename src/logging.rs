//! Logging setup for binaries and tests using the client.
//!
//! The crate emits `tracing` events; installing a subscriber is left to the
//! application. These helpers install a `fmt` subscriber filtered through
//! `RUST_LOG`.
//!
//! Engine events can also be routed to a [`Logger`] registered with
//! [`Context::set_logger`](crate::Context::set_logger). The sink only sees
//! events passing the engine log level.

pub use tracing::{self, Level, debug, error, info, trace, warn};

use std::fmt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One engine log event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogMessage {
    pub message: String,
    pub severity: Level,
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Receives engine log events. Called from engine threads, so it must not
/// block for long.
///
/// # Example
/// ```ignore
/// context.set_logger(|message: LogMessage| eprintln!("{message}"));
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, message: LogMessage);
}

impl<F> Logger for F
where
    F: Fn(LogMessage) + Send + Sync,
{
    fn log(&self, message: LogMessage) {
        self(message)
    }
}

/// Installs the subscriber and a panic hook that logs the panic before
/// exiting the process.
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "edge_client", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber only. Safe to call more than once.
pub fn setup_log_no_panic_hook() {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init();
}
