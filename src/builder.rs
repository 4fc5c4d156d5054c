//! Fluent builder for Context construction.

use crate::context::{Context, parse_log_level};
use crate::engine::Engine;
use crate::engine::loopback::LoopbackEngine;
use crate::status::Result;

use std::sync::Arc;

/// Builder for constructing [`Context`] instances with fluent API.
///
/// # Example
/// ```ignore
/// let context = ContextBuilder::new().log_level("debug").build()?;
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    engine: Option<Arc<dyn Engine>>,
    log_level: Option<String>,
}

impl ContextBuilder {
    /// Creates a builder using a fresh loopback engine and the engine's
    /// default log level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `engine` instead of a fresh loopback engine.
    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Initial engine log level, see [`Context::set_log_level`].
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = Some(level.to_string());
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    /// - `InvalidArgument` for an unknown log level
    /// - [`Error::Io`](crate::Error::Io) if the loopback engine threads
    ///   cannot be spawned
    pub fn build(self) -> Result<Context> {
        let level = self.log_level.as_deref().map(parse_log_level).transpose()?;

        let engine: Arc<dyn Engine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(LoopbackEngine::new()?),
        };

        if let Some(level) = level {
            engine.set_log_level(level);
        }

        Ok(Context::with_engine(engine))
    }
}
