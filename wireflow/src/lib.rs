//! # Wireflow
//!
//! A client-side protocol request pipeline: an ordered chain of
//! interchangeable handlers mediating every operation (open, send, receive,
//! acknowledge) between an application-facing client and an underlying wire
//! transport, plus a retry overlay that makes the pipeline resilient to
//! transient service failures without violating delivery-safety invariants.
//!
//! - **Handler chain**: every handler implements the full operation set and
//!   forwards what it does not intercept to its continuation
//! - **Retry overlay**: transient faults get a fast exponential backoff,
//!   throttling faults a slow one, and a send is only retried when its
//!   message bodies can be proven replayable from position zero
//! - **Transport adapter**: a terminal handler adapting the concrete wire
//!   protocol and filling in its default receive timeout
//! - **Latency counters**: passive per-operation histograms shared through
//!   the assembly context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wireflow::prelude::*;
//!
//! let mut context = PipelineContext::new();
//! context.set(TransportSettings::default());
//!
//! let client = Client::build(
//!     PipelineBuilder::new()
//!         .with_handler(|_ctx, next| Box::new(RetryHandler::new(next)))
//!         .with_handler(|ctx, _next| Box::new(TransportHandler::new(ctx, my_transport))),
//!     &context,
//! )?;
//!
//! client.open(true).await?;
//! client.send_event(&Message::from_bytes(b"hello".to_vec())).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod context;
pub mod errors;
pub mod message;
pub mod metrics;
pub mod pipeline;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::context::PipelineContext;
    pub use crate::errors::{FaultKind, PipelineBuildError, TransportError};
    pub use crate::message::{Body, Message};
    pub use crate::metrics::{LatencyCounters, LatencyHistogram, OperationClass};
    pub use crate::pipeline::{
        PipelineBuilder, PipelineHandler, RetryHandler, RetryPolicy, Transport, TransportHandler,
        TransportSettings,
    };
}
