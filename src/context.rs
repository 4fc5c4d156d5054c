//! Client context owning the engine.
//!
//! The context is the entry point of the crate: it creates connections and
//! mDNS resolvers, and forwards engine-wide settings such as the log level.
//! Every resource keeps the engine alive, so the context may be dropped before
//! the resources it created.

use crate::builder::ContextBuilder;
use crate::connection::Connection;
use crate::engine::{Engine, ListenerSource, StatsSnapshot};
use crate::listener::MdnsResolver;
use crate::logging::Logger;
use crate::status::{ErrorCode, Error, Result};

use std::sync::Arc;
use tracing::level_filters::LevelFilter;

pub struct Context {
    engine: Arc<dyn Engine>,
}

impl Context {
    /// Creates a context backed by a fresh loopback engine.
    ///
    /// # Example
    /// ```ignore
    /// let context = Context::new()?;
    /// let connection = context.create_connection();
    /// ```
    pub fn new() -> Result<Self> {
        ContextBuilder::new().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn create_connection(&self) -> Connection {
        Connection::new(self.engine.clone())
    }

    /// Starts mDNS discovery. Each `listen_next()` yields one device.
    pub fn create_mdns_resolver(&self) -> Result<MdnsResolver> {
        MdnsResolver::new(self.engine.clone(), ListenerSource::Mdns)
    }

    /// Sets the engine log level: `error`, `warn`, `info`, `debug`, `trace`
    /// or `off`.
    pub fn set_log_level(&self, level: &str) -> Result<()> {
        self.engine.set_log_level(parse_log_level(level)?);
        Ok(())
    }

    /// Routes engine log events to `logger`, replacing any previous one. Only
    /// events passing [`set_log_level`](Self::set_log_level) are delivered.
    ///
    /// # Example
    /// ```ignore
    /// context.set_logger(|message: LogMessage| eprintln!("{message}"));
    /// ```
    pub fn set_logger<L: Logger + 'static>(&self, logger: L) {
        self.engine.set_logger(Some(Arc::new(logger)));
    }

    /// Stops delivering engine events to the logger.
    pub fn clear_logger(&self) {
        self.engine.set_logger(None);
    }

    /// Creates a new private key in PEM format.
    pub fn create_private_key(&self) -> Result<String> {
        self.engine.create_private_key()
    }

    pub fn version(&self) -> String {
        self.engine.version()
    }

    /// Instrumentation counters of the underlying engine.
    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats().snapshot()
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

pub(crate) fn parse_log_level(level: &str) -> Result<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "off" | "none" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(Error::from(ErrorCode::InvalidArgument)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!(parse_log_level("TRACE").unwrap(), LevelFilter::TRACE);
        assert_eq!(parse_log_level("warn").unwrap(), LevelFilter::WARN);
        assert_eq!(
            parse_log_level("loud").unwrap_err().code(),
            Some(ErrorCode::InvalidArgument)
        );
    }
}
