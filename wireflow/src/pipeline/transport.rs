//! Tail-of-chain transport adapter.
//!
//! [`Transport`] is the boundary to the concrete wire protocol (AMQP, MQTT,
//! HTTP); implementations live outside this crate. [`TransportHandler`]
//! adapts a transport into a terminal [`PipelineHandler`], filling in the
//! protocol's default receive timeout when the caller omits one and feeding
//! latency samples to the counters injected at assembly time. No retry or
//! backoff logic lives here; policy sits one layer up.

use super::handler::PipelineHandler;
use crate::context::PipelineContext;
use crate::errors::TransportError;
use crate::message::Message;
use crate::metrics::{LatencyCounters, OperationClass};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by every transport implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Timeout applied to `receive` calls that do not specify one.
    pub default_receive_timeout: Duration,
    /// Upper bound on a single wire operation.
    pub operation_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            default_receive_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(60),
        }
    }
}

/// The concrete wire-protocol collaborator at the tail of the chain.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the connection.
    async fn open(&self, explicit_open: bool) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Sends a single message.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Sends a batch of messages.
    async fn send_batch(&self, messages: &[Message]) -> Result<(), TransportError>;

    /// Waits up to `timeout` for an incoming message.
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, TransportError>;

    /// Settles a message by lock token.
    async fn complete(&self, lock_token: &str) -> Result<(), TransportError>;

    /// Returns a message for redelivery by lock token.
    async fn abandon(&self, lock_token: &str) -> Result<(), TransportError>;

    /// Marks a message undeliverable by lock token.
    async fn reject(&self, lock_token: &str) -> Result<(), TransportError>;

    /// Releases the transport's resources.
    ///
    /// # Errors
    ///
    /// Implementations may report a cleanup failure; callers treat it as
    /// best-effort and continue.
    fn dispose(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Terminal handler adapting a [`Transport`] into the chain.
pub struct TransportHandler<T: Transport> {
    transport: T,
    settings: TransportSettings,
    counters: Option<Arc<LatencyCounters>>,
}

impl<T: Transport> TransportHandler<T> {
    /// Creates the adapter, pulling [`TransportSettings`] and optional
    /// [`LatencyCounters`] out of the context.
    #[must_use]
    pub fn new(context: &PipelineContext, transport: T) -> Self {
        Self {
            transport,
            settings: context.get::<TransportSettings>().cloned().unwrap_or_default(),
            counters: context.get::<Arc<LatencyCounters>>().cloned(),
        }
    }

    /// Returns the settings in effect.
    #[must_use]
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    async fn measured<R, F>(&self, class: OperationClass, operation: F) -> Result<R, TransportError>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        match self.counters.as_deref() {
            Some(counters) => counters.measure(class, operation).await,
            None => operation.await,
        }
    }
}

#[async_trait]
impl<T: Transport> PipelineHandler for TransportHandler<T> {
    fn continuation(&self) -> Option<&dyn PipelineHandler> {
        None
    }

    fn continuation_mut(&mut self) -> Option<&mut (dyn PipelineHandler + 'static)> {
        None
    }

    async fn open(&self, explicit_open: bool) -> Result<(), TransportError> {
        self.measured(OperationClass::Open, self.transport.open(explicit_open))
            .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    async fn send_event(&self, message: &Message) -> Result<(), TransportError> {
        self.measured(OperationClass::Send, self.transport.send(message))
            .await
    }

    async fn send_events(&self, messages: &[Message]) -> Result<(), TransportError> {
        self.measured(OperationClass::Send, self.transport.send_batch(messages))
            .await
    }

    async fn receive(&self) -> Result<Option<Message>, TransportError> {
        self.receive_with_timeout(self.settings.default_receive_timeout)
            .await
    }

    async fn receive_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, TransportError> {
        self.transport.receive(timeout).await
    }

    async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
        self.transport.complete(lock_token).await
    }

    async fn abandon(&self, lock_token: &str) -> Result<(), TransportError> {
        self.transport.abandon(lock_token).await
    }

    async fn reject(&self, lock_token: &str) -> Result<(), TransportError> {
        self.transport.reject(lock_token).await
    }

    fn dispose(&mut self) {
        if let Err(err) = self.transport.dispose() {
            tracing::warn!(error = %err, "transport dispose failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-rolled transport doubles shared by the pipeline tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted transport: fails the first `failures` send/open calls with
    /// faults popped from a queue, then succeeds.
    pub struct ScriptedTransport {
        pub attempts: AtomicUsize,
        pub opens: AtomicUsize,
        pub received_timeouts: Mutex<Vec<Duration>>,
        pub dispose_calls: AtomicUsize,
        faults: Mutex<VecDeque<TransportError>>,
        dispose_error: Mutex<Option<TransportError>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                opens: AtomicUsize::new(0),
                received_timeouts: Mutex::new(Vec::new()),
                dispose_calls: AtomicUsize::new(0),
                faults: Mutex::new(VecDeque::new()),
                dispose_error: Mutex::new(None),
            }
        }

        /// Queues a fault to be returned by the next send/open call.
        pub fn push_fault(&self, fault: TransportError) {
            self.faults.lock().push_back(fault);
        }

        /// Makes `dispose` report the given failure.
        pub fn failing_dispose(self, error: TransportError) -> Self {
            *self.dispose_error.lock() = Some(error);
            self
        }

        pub fn attempt_count(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn next_fault(&self) -> Option<TransportError> {
            self.faults.lock().pop_front()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self, _explicit_open: bool) -> Result<(), TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.next_fault() {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, _message: &Message) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.next_fault() {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }

        async fn send_batch(&self, _messages: &[Message]) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.next_fault() {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }

        async fn receive(&self, timeout: Duration) -> Result<Option<Message>, TransportError> {
            self.received_timeouts.lock().push(timeout);
            Ok(None)
        }

        async fn complete(&self, _lock_token: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn abandon(&self, _lock_token: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn reject(&self, _lock_token: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn dispose(&mut self) -> Result<(), TransportError> {
            self.dispose_calls.fetch_add(1, Ordering::SeqCst);
            match self.dispose_error.lock().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}
