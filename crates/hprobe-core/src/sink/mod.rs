//! Result sinks: where workers deliver finished `ProbeResult`s.
//!
//! A sink is the only place results leave the pool. Appends are atomic (a
//! result is either wholly visible or not yet visible) and arrive in
//! completion order; sinks neither deduplicate nor reorder.
//!
//! `accept` is called from blocking worker threads, never from inside the
//! async runtime, so implementations may block (e.g. for channel capacity).

mod aggregator;
mod callback;
mod channel;

pub use aggregator::Aggregator;
pub use callback::CallbackSink;
pub use channel::{channel, ChannelSink};

use std::sync::Arc;

use crate::error::SinkClosed;
use crate::result::ProbeResult;

/// Consumer-side capability that receives each result as it completes.
pub trait ResultSink: Send + Sync {
    /// Append one result. Returns `SinkClosed` once the consumer has gone away
    /// or the sink was closed; the runner treats that as early termination.
    fn accept(&self, result: ProbeResult) -> Result<(), SinkClosed>;

    /// Terminal signal: no more results will be delivered.
    fn close(&self) {}
}

impl<S: ResultSink + ?Sized> ResultSink for Arc<S> {
    fn accept(&self, result: ProbeResult) -> Result<(), SinkClosed> {
        (**self).accept(result)
    }

    fn close(&self) {
        (**self).close()
    }
}
