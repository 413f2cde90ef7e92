//! Latency histograms for awaited pipeline operations.
//!
//! Purely additive instrumentation: the counters never influence control
//! flow, retry decisions, or error propagation. A process typically shares
//! one `Arc<LatencyCounters>` through the [`PipelineContext`] rather than a
//! global static.
//!
//! [`PipelineContext`]: crate::context::PipelineContext

use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};

/// Highest elapsed-millisecond value tracked with its own bucket; anything
/// slower lands in the ceiling bucket.
pub const LATENCY_CEILING_MS: usize = 60_000;

/// Operation class a latency sample is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Message send operations.
    Send,
    /// Connection open operations.
    Open,
}

/// A bounded histogram with one bucket per elapsed millisecond.
#[derive(Debug)]
pub struct LatencyHistogram {
    buckets: Mutex<Vec<u64>>,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![0; LATENCY_CEILING_MS + 1]),
        }
    }

    fn record(&self, elapsed: Duration) {
        let ms = usize::try_from(elapsed.as_millis()).unwrap_or(LATENCY_CEILING_MS);
        let index = ms.min(LATENCY_CEILING_MS);
        self.buckets.lock()[index] += 1;
    }

    /// Returns the sample count for an exact elapsed-millisecond bucket.
    #[must_use]
    pub fn bucket(&self, ms: usize) -> u64 {
        self.buckets.lock().get(ms).copied().unwrap_or(0)
    }

    /// Returns the count of samples at or beyond the ceiling.
    #[must_use]
    pub fn overflow(&self) -> u64 {
        self.bucket(LATENCY_CEILING_MS)
    }

    /// Returns the total number of recorded samples.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.buckets.lock().iter().sum()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// One histogram per measured operation class.
#[derive(Debug, Default)]
pub struct LatencyCounters {
    send: LatencyHistogram,
    open: LatencyHistogram,
    record_failures: bool,
}

impl LatencyCounters {
    /// Creates counters that record successful operations only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also records the elapsed time of failed operations.
    #[must_use]
    pub fn with_failures_recorded(mut self) -> Self {
        self.record_failures = true;
        self
    }

    /// Returns the histogram for an operation class.
    #[must_use]
    pub fn histogram(&self, class: OperationClass) -> &LatencyHistogram {
        match class {
            OperationClass::Send => &self.send,
            OperationClass::Open => &self.open,
        }
    }

    /// Records one sample for the given class.
    pub fn record(&self, class: OperationClass, elapsed: Duration) {
        self.histogram(class).record(elapsed);
    }

    /// Awaits `operation`, recording its elapsed time on completion.
    ///
    /// Failures are recorded only when configured via
    /// [`with_failures_recorded`](Self::with_failures_recorded). The result
    /// is returned untouched.
    pub async fn measure<T, E, F>(&self, class: OperationClass, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = operation.await;
        if result.is_ok() || self.record_failures {
            self.record(class, start.elapsed());
        }
        result
    }
}
