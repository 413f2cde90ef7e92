//! Application-facing client owning the head of a built chain.

use crate::context::PipelineContext;
use crate::errors::{PipelineBuildError, TransportError};
use crate::message::Message;
use crate::pipeline::{PipelineBuilder, PipelineHandler};
use std::time::Duration;

/// Thin facade over the head handler of an assembled pipeline.
///
/// Dropping the client disposes the whole chain.
pub struct Client {
    head: Box<dyn PipelineHandler>,
}

impl Client {
    /// Assembles the pipeline described by `builder` and takes ownership of
    /// its head.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder holds no handler factories.
    pub fn build(
        builder: PipelineBuilder,
        context: &PipelineContext,
    ) -> Result<Self, PipelineBuildError> {
        Ok(Self {
            head: builder.build(context)?,
        })
    }

    /// Opens the connection to the service.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn open(&self, explicit_open: bool) -> Result<(), TransportError> {
        self.head.open(explicit_open).await
    }

    /// Closes the connection to the service.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.head.close().await
    }

    /// Sends a single message.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn send_event(&self, message: &Message) -> Result<(), TransportError> {
        self.head.send_event(message).await
    }

    /// Sends a batch of messages.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn send_events(&self, messages: &[Message]) -> Result<(), TransportError> {
        self.head.send_events(messages).await
    }

    /// Receives the next message using the transport's default timeout.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn receive(&self) -> Result<Option<Message>, TransportError> {
        self.head.receive().await
    }

    /// Receives the next message, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn receive_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, TransportError> {
        self.head.receive_with_timeout(timeout).await
    }

    /// Completes a received message by lock token.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
        self.head.complete(lock_token).await
    }

    /// Abandons a received message by lock token.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn abandon(&self, lock_token: &str) -> Result<(), TransportError> {
        self.head.abandon(lock_token).await
    }

    /// Rejects a received message by lock token.
    ///
    /// # Errors
    ///
    /// Surfaces the pipeline's final failure.
    pub async fn reject(&self, lock_token: &str) -> Result<(), TransportError> {
        self.head.reject(lock_token).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.head.dispose();
    }
}
