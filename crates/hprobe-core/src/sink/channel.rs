//! Bounded channel sink for pull-based async consumers.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::SinkClosed;
use crate::result::ProbeResult;

use super::ResultSink;

/// Create a sink/receiver pair with room for `capacity` undelivered results.
///
/// The receiver yields results in arrival order and returns `None` once the
/// run has finished and the sink is closed. Dropping the receiver early makes
/// further `accept` calls fail, which stops dispatch of new targets.
pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<ProbeResult>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            tx: Mutex::new(Some(tx)),
        },
        rx,
    )
}

/// Sending half of `channel`.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<ProbeResult>>>,
}

impl ResultSink for ChannelSink {
    fn accept(&self, result: ProbeResult) -> Result<(), SinkClosed> {
        // Clone out so the lock is not held while waiting for capacity.
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SinkClosed)?;
        tx.blocking_send(result).map_err(|_| SinkClosed)
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
