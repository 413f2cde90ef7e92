//! Error types for the wireflow pipeline.
//!
//! The retry overlay only ever looks at three things on a failure: whether
//! its kind is transient, whether it is a throttling fault, and whether the
//! stop-retrying marker is set. Everything else is carried for the caller.

use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Momentary loss of connectivity to the service.
    ConnectionLost,
    /// The service is temporarily unable to process the request.
    ServerBusy,
    /// Server-side rate limiting.
    Throttled,
    /// The operation did not complete within its allotted time.
    Timeout,
    /// Authentication or authorization failure.
    Unauthorized,
    /// The addressed entity does not exist.
    NotFound,
    /// The payload exceeds the service's size limit.
    MessageTooLarge,
    /// The peer violated the wire protocol.
    Protocol,
    /// The operation was cancelled by the caller.
    Cancelled,
}

impl FaultKind {
    /// Returns true if failures of this kind are likely to succeed on retry.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ConnectionLost | Self::ServerBusy | Self::Throttled | Self::Timeout
        )
    }

    /// Returns true if this kind signals server-side rate limiting.
    #[must_use]
    pub fn is_throttled(self) -> bool {
        self == Self::Throttled
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionLost => "connection lost",
            Self::ServerBusy => "server busy",
            Self::Throttled => "throttled",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::MessageTooLarge => "message too large",
            Self::Protocol => "protocol violation",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A failure raised by a pipeline handler or the underlying transport.
///
/// Carries an optional inner cause and a mutable stop-retrying marker. The
/// marker forces the retry overlay to terminate even though the fault's kind
/// is nominally transient; it is consumed (cleared) the first time it vetoes
/// a retry, so a reused error value is not permanently poisoned.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: FaultKind,
    message: String,
    stop_retrying: bool,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl TransportError {
    /// Creates a new error of the given kind.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stop_retrying: false,
            source: None,
        }
    }

    /// Creates a connection-lost error.
    #[must_use]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ConnectionLost, message)
    }

    /// Creates a server-busy error.
    #[must_use]
    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ServerBusy, message)
    }

    /// Creates a throttling error.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Throttled, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Timeout, message)
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unauthorized, message)
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    /// Creates a payload-too-large error.
    #[must_use]
    pub fn message_too_large(message: impl Into<String>) -> Self {
        Self::new(FaultKind::MessageTooLarge, message)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Cancelled, message)
    }

    /// Attaches an inner cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the fault classification.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this fault is likely to succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Returns true if this fault signals server-side rate limiting.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.kind.is_throttled()
    }

    /// Returns true if the stop-retrying marker is currently set.
    #[must_use]
    pub fn stop_retrying(&self) -> bool {
        self.stop_retrying
    }

    /// Sets or clears the stop-retrying marker.
    pub fn set_stop_retrying(&mut self, stop: bool) {
        self.stop_retrying = stop;
    }

    /// Consumes the stop-retrying marker, clearing it.
    pub fn take_stop_retrying(&mut self) -> bool {
        std::mem::take(&mut self.stop_retrying)
    }

    /// Normalizes a final failure before surfacing it to the caller.
    ///
    /// A transient fault that wraps an inner `TransportError` is unwrapped
    /// one level so the caller sees the original service-level error rather
    /// than the transient envelope. Non-transient faults and faults without
    /// an inner cause are returned unchanged.
    #[must_use]
    pub fn into_normalized(self) -> Self {
        if !self.kind.is_transient() {
            return self;
        }
        let Self {
            kind,
            message,
            stop_retrying,
            source,
        } = self;
        match source {
            Some(src) => match src.downcast::<Self>() {
                Ok(inner) => *inner,
                Err(src) => Self {
                    kind,
                    message,
                    stop_retrying,
                    source: Some(src),
                },
            },
            None => Self {
                kind,
                message,
                stop_retrying,
                source: None,
            },
        }
    }
}

/// An error raised while assembling a pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineBuildError {
    /// `build` was called with no handler factories registered.
    #[error("pipeline has no handler factories registered")]
    Empty,
}
