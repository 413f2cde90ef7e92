//! End-to-end tests exercising a built chain: retry overlay over the
//! transport adapter, assembled through the builder.

use super::transport::test_support::ScriptedTransport;
use super::{
    PipelineBuilder, PipelineHandler, RetryHandler, Transport, TransportHandler, TransportSettings,
};
use crate::context::PipelineContext;
use crate::errors::{FaultKind, TransportError};
use crate::message::Message;
use crate::metrics::{LatencyCounters, OperationClass};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn chain_over(
    transport: Arc<ScriptedTransport>,
    context: &PipelineContext,
) -> Box<dyn PipelineHandler> {
    PipelineBuilder::new()
        .with_handler(|_ctx, next| Box::new(RetryHandler::new(next)))
        .with_handler(move |ctx, _next| Box::new(TransportHandler::new(ctx, SharedTransport(transport))))
        .build(context)
        .unwrap()
}

/// Lets tests keep a handle on the transport after it moves into the chain.
struct SharedTransport(Arc<ScriptedTransport>);

#[async_trait::async_trait]
impl Transport for SharedTransport {
    async fn open(&self, explicit_open: bool) -> Result<(), TransportError> {
        self.0.open(explicit_open).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.0.close().await
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.0.send(message).await
    }

    async fn send_batch(&self, messages: &[Message]) -> Result<(), TransportError> {
        self.0.send_batch(messages).await
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        self.0.receive(timeout).await
    }

    async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
        self.0.complete(lock_token).await
    }

    async fn abandon(&self, lock_token: &str) -> Result<(), TransportError> {
        self.0.abandon(lock_token).await
    }

    async fn reject(&self, lock_token: &str) -> Result<(), TransportError> {
        self.0.reject(lock_token).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_chain_retries_send_through_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_fault(TransportError::server_busy("busy"));
    transport.push_fault(TransportError::connection_lost("flap"));

    let ctx = PipelineContext::new();
    let head = chain_over(transport.clone(), &ctx);

    head.send_event(&Message::from_bytes(b"payload".to_vec()))
        .await
        .unwrap();
    assert_eq!(transport.attempt_count(), 3);
}

#[tokio::test]
async fn test_chain_vetoes_consumed_stream_retry() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_fault(TransportError::server_busy("busy"));

    let ctx = PipelineContext::new();
    let head = chain_over(transport.clone(), &ctx);

    let message = Message::from_reader(Box::new(std::io::Cursor::new(b"stream".to_vec())));
    let err = head.send_event(&message).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::ServerBusy);
    assert_eq!(transport.attempt_count(), 1);
}

#[tokio::test]
async fn test_chain_receive_uses_configured_default_timeout() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut ctx = PipelineContext::new();
    ctx.set(TransportSettings {
        default_receive_timeout: Duration::from_secs(7),
        ..TransportSettings::default()
    });

    let head = chain_over(transport.clone(), &ctx);
    head.receive().await.unwrap();

    assert_eq!(
        transport.received_timeouts.lock().clone(),
        vec![Duration::from_secs(7)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_chain_records_open_latency_per_attempt() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_fault(TransportError::connection_lost("flap"));

    let counters = Arc::new(LatencyCounters::new());
    let mut ctx = PipelineContext::new();
    ctx.set(Arc::clone(&counters));

    let head = chain_over(transport.clone(), &ctx);
    head.open(true).await.unwrap();

    assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
    // Only the successful attempt is recorded by default.
    assert_eq!(counters.histogram(OperationClass::Open).count(), 1);
}

#[tokio::test]
async fn test_chain_dispose_reaches_failing_tail() {
    let transport = ScriptedTransport::new()
        .failing_dispose(TransportError::connection_lost("already gone"));

    let ctx = PipelineContext::new();
    let mut head = PipelineBuilder::new()
        .with_handler(|_ctx, next| Box::new(RetryHandler::new(next)))
        .with_handler(move |ctx, _next| Box::new(TransportHandler::new(ctx, transport)))
        .build(&ctx)
        .unwrap();

    head.dispose();
}
