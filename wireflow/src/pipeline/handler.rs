//! The delegating-handler contract.
//!
//! Every element of the chain implements the full client operation set and
//! holds an optional continuation (the next handler). Operations a handler
//! does not override fall through to the continuation unchanged, so a
//! handler only intercepts what it polices. A terminal handler (no
//! continuation) completes every operation successfully; `receive` simply
//! yields nothing.

use crate::errors::TransportError;
use crate::message::Message;
use async_trait::async_trait;
use std::time::Duration;

/// A chain element that may intercept or forward a client operation.
#[async_trait]
pub trait PipelineHandler: Send + Sync {
    /// Returns the next handler in the chain, if any.
    fn continuation(&self) -> Option<&dyn PipelineHandler>;

    /// Returns the next handler mutably, for disposal cascades.
    fn continuation_mut(&mut self) -> Option<&mut (dyn PipelineHandler + 'static)>;

    /// Opens the connection to the service.
    async fn open(&self, explicit_open: bool) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.open(explicit_open).await,
            None => Ok(()),
        }
    }

    /// Closes the connection to the service.
    async fn close(&self) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.close().await,
            None => Ok(()),
        }
    }

    /// Sends a single message.
    async fn send_event(&self, message: &Message) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.send_event(message).await,
            None => Ok(()),
        }
    }

    /// Sends a batch of messages.
    async fn send_events(&self, messages: &[Message]) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.send_events(messages).await,
            None => Ok(()),
        }
    }

    /// Receives the next message, waiting up to the transport's default
    /// timeout.
    async fn receive(&self) -> Result<Option<Message>, TransportError> {
        match self.continuation() {
            Some(next) => next.receive().await,
            None => Ok(None),
        }
    }

    /// Receives the next message, waiting up to `timeout`.
    ///
    /// The timeout bounds only this operation's wait for incoming data, not
    /// any retry budget applied further up the chain.
    async fn receive_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, TransportError> {
        match self.continuation() {
            Some(next) => next.receive_with_timeout(timeout).await,
            None => Ok(None),
        }
    }

    /// Completes (settles) a received message by lock token.
    async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.complete(lock_token).await,
            None => Ok(()),
        }
    }

    /// Abandons a received message by lock token, making it redeliverable.
    async fn abandon(&self, lock_token: &str) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.abandon(lock_token).await,
            None => Ok(()),
        }
    }

    /// Rejects a received message by lock token as undeliverable.
    async fn reject(&self, lock_token: &str) -> Result<(), TransportError> {
        match self.continuation() {
            Some(next) => next.reject(lock_token).await,
            None => Ok(()),
        }
    }

    /// Releases owned resources and cascades down the chain.
    ///
    /// Best effort: an implementor's own cleanup failure must not stop the
    /// cascade from reaching the rest of the chain.
    fn dispose(&mut self) {
        if let Some(next) = self.continuation_mut() {
            next.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A handler that overrides nothing, exercising every default.
    struct PassThrough {
        next: Option<Box<dyn PipelineHandler>>,
    }

    #[async_trait]
    impl PipelineHandler for PassThrough {
        fn continuation(&self) -> Option<&dyn PipelineHandler> {
            self.next.as_deref()
        }

        fn continuation_mut(&mut self) -> Option<&mut (dyn PipelineHandler + 'static)> {
            self.next.as_deref_mut()
        }
    }

    struct EchoTail;

    #[async_trait]
    impl PipelineHandler for EchoTail {
        fn continuation(&self) -> Option<&dyn PipelineHandler> {
            None
        }

        fn continuation_mut(&mut self) -> Option<&mut (dyn PipelineHandler + 'static)> {
            None
        }

        async fn receive(&self) -> Result<Option<Message>, TransportError> {
            Ok(Some(Message::from_bytes(b"tail".to_vec())))
        }

        async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
            Err(TransportError::not_found(lock_token.to_owned()))
        }
    }

    #[tokio::test]
    async fn test_terminal_handler_completes_every_operation() {
        let mut handler = PassThrough { next: None };
        let message = Message::from_bytes(b"x".to_vec());

        assert!(handler.open(true).await.is_ok());
        assert!(handler.close().await.is_ok());
        assert!(handler.send_event(&message).await.is_ok());
        assert!(handler.send_events(std::slice::from_ref(&message)).await.is_ok());
        assert!(handler.receive().await.unwrap().is_none());
        assert!(handler
            .receive_with_timeout(Duration::from_secs(1))
            .await
            .unwrap()
            .is_none());
        assert!(handler.complete("t").await.is_ok());
        assert!(handler.abandon("t").await.is_ok());
        assert!(handler.reject("t").await.is_ok());
        handler.dispose();
    }

    #[tokio::test]
    async fn test_defaults_forward_to_continuation() {
        let handler = PassThrough {
            next: Some(Box::new(PassThrough {
                next: Some(Box::new(EchoTail)),
            })),
        };

        let received = handler.receive().await.unwrap();
        assert_eq!(received.unwrap().read_body().unwrap(), b"tail");

        let err = handler.complete("lock-9").await.unwrap_err();
        assert_eq!(err.message(), "lock-9");
    }
}
