//! Pipeline construction and the handler chain.
//!
//! This module provides:
//! - The delegating-handler contract with default pass-through behavior
//! - A builder that wires handler factories into an owned forward chain
//! - The retry overlay and its backoff policies
//! - The tail-of-chain transport adapter

mod builder;
mod handler;
mod retry;
mod transport;

#[cfg(test)]
mod integration_tests;

pub use builder::{HandlerFactory, PipelineBuilder};
pub use handler::PipelineHandler;
pub use retry::{ExponentialBackoff, RetryHandler, RetryPolicy, MAX_ATTEMPTS};
pub use transport::{Transport, TransportHandler, TransportSettings};
