//! Pipeline assembly.
//!
//! Handlers are registered as factories in head-to-tail order and wired
//! together at build time. The chain is an owned forward list: factories run
//! tail-first so every handler receives its already-constructed continuation
//! and no continuation field is ever rebound afterwards.

use super::handler::PipelineHandler;
use crate::context::PipelineContext;
use crate::errors::PipelineBuildError;

/// Constructs one handler, taking ownership of its continuation.
///
/// `None` means the handler is the tail of the chain.
pub type HandlerFactory = Box<
    dyn FnOnce(&PipelineContext, Option<Box<dyn PipelineHandler>>) -> Box<dyn PipelineHandler>
        + Send,
>;

/// Builder for an ordered chain of delegating handlers.
///
/// `build` consumes the builder, so a pipeline description is one-shot by
/// construction; assembling a second chain requires registering the
/// factories again.
#[derive(Default)]
pub struct PipelineBuilder {
    factories: Vec<HandlerFactory>,
}

impl PipelineBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler factory; registration order is head-to-tail.
    #[must_use]
    pub fn with_handler<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&PipelineContext, Option<Box<dyn PipelineHandler>>) -> Box<dyn PipelineHandler>
            + Send
            + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.factories.len()
    }

    /// Builds the chain and returns its head handler.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError::Empty`] if no factories were registered.
    pub fn build(
        self,
        context: &PipelineContext,
    ) -> Result<Box<dyn PipelineHandler>, PipelineBuildError> {
        let mut chain: Option<Box<dyn PipelineHandler>> = None;
        for factory in self.factories.into_iter().rev() {
            let next = chain.take();
            chain = Some(factory(context, next));
        }
        chain.ok_or(PipelineBuildError::Empty)
    }
}
