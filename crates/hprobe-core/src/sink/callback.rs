//! Sink that hands every result to a caller-supplied closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::SinkClosed;
use crate::result::ProbeResult;

use super::ResultSink;

/// Calls `F` once per result. Calls are serialised, so the closure never sees
/// two deliveries at once and may keep plain mutable state.
pub struct CallbackSink<F> {
    callback: Mutex<F>,
    closed: AtomicBool,
}

impl<F> CallbackSink<F>
where
    F: FnMut(ProbeResult) + Send,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback: Mutex::new(callback),
            closed: AtomicBool::new(false),
        }
    }
}

impl<F> std::fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<F> ResultSink for CallbackSink<F>
where
    F: FnMut(ProbeResult) + Send,
{
    fn accept(&self, result: ProbeResult) -> Result<(), SinkClosed> {
        // Checked under the lock so nothing is forwarded after `close` returns.
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkClosed);
        }
        (*callback)(result);
        Ok(())
    }

    fn close(&self) {
        let _callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::Release);
    }
}
