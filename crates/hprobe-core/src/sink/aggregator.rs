//! In-memory, lock-protected result collection.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::SinkClosed;
use crate::result::ProbeResult;

use super::ResultSink;

#[derive(Debug, Default)]
struct State {
    results: Vec<ProbeResult>,
    closed: bool,
}

/// Append-only sequence of results shared between workers and a reader.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<State>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                results: Vec::with_capacity(capacity),
                closed: false,
            }),
        }
    }

    // Every critical section leaves `State` consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().results.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy of the results appended so far, in arrival order.
    pub fn snapshot(&self) -> Vec<ProbeResult> {
        self.lock().results.clone()
    }

    pub fn into_results(self) -> Vec<ProbeResult> {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .results
    }
}

impl ResultSink for Aggregator {
    fn accept(&self, result: ProbeResult) -> Result<(), SinkClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(SinkClosed);
        }
        state.results.push(result);
        Ok(())
    }

    fn close(&self) {
        self.lock().closed = true;
    }
}
