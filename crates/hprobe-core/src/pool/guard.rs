//! RAII guard that closes the result sink when dropped.

use std::sync::Arc;

use crate::sink::ResultSink;

/// Closes the sink on every exit path of a run (success, error, panic unwind).
///
/// Once the pool starts, the guard lives in the shared worker context, so the
/// sink closes only after the last in-flight probe has delivered, even when
/// the run future itself is dropped early.
pub(crate) struct CloseGuard {
    pub(crate) sink: Arc<dyn ResultSink>,
}

impl CloseGuard {
    pub(crate) fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self { sink }
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.sink.close();
    }
}
