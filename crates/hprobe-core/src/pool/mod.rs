//! Bounded worker pool.
//!
//! A fixed number of workers (`min(concurrency, targets)`) share one intake
//! cursor and one result sink. Each worker loops: claim the next target, run
//! the prober on the blocking thread pool, deliver the result, repeat. At most
//! `concurrency` probes are in flight, and each worker holds at most one
//! finished result while handing it to the sink.
//!
//! Probe failures are results, not pool failures. The pool never retries.

mod guard;
mod intake;
mod worker;

pub(crate) use guard::CloseGuard;

use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::agent::UserAgentPool;
use crate::control::RunControl;
use crate::error::LifecycleError;
use crate::options::ProbeFlags;
use crate::prober::Prober;
use crate::target::Target;

use intake::Intake;
use worker::{WorkerContext, WorkerTally};

/// Per-run settings every worker reads.
#[derive(Debug, Clone)]
pub(crate) struct PoolSettings {
    pub concurrency: usize,
    pub method: String,
    pub flags: ProbeFlags,
    pub agents: Arc<UserAgentPool>,
}

/// Counts gathered from all workers once the pool has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PoolReport {
    /// Targets handed out by the intake (each was probed).
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Results the sink refused because the consumer went away.
    pub undelivered: usize,
}

impl PoolReport {
    fn absorb(&mut self, tally: WorkerTally) {
        self.succeeded += tally.succeeded;
        self.failed += tally.failed;
        self.undelivered += tally.undelivered;
    }
}

/// Probe every target with at most `settings.concurrency` probes in flight.
/// Returns once every worker has finished and all claimed targets are done.
///
/// `close` travels with the workers: the sink is closed when the last of them
/// (or a blocking probe outliving an aborted worker) lets go of it.
pub(crate) async fn run_pool<P: Prober>(
    targets: Vec<Target>,
    settings: PoolSettings,
    prober: Arc<P>,
    close: CloseGuard,
    control: RunControl,
) -> Result<PoolReport, LifecycleError> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(LifecycleError::NoRuntime);
    }

    let intake = Arc::new(Intake::new(targets, control.clone()));
    let workers = settings.concurrency.min(intake.len()).max(1);
    let ctx = Arc::new(WorkerContext {
        prober,
        sink: Arc::clone(&close.sink),
        settings,
        control: control.clone(),
        _close: close,
    });

    let mut join_set = JoinSet::new();
    for id in 0..workers {
        join_set.spawn(worker::run_worker(id, Arc::clone(&intake), Arc::clone(&ctx)));
    }
    tracing::debug!(workers, targets = intake.len(), "worker pool started");

    let mut report = PoolReport::default();
    let mut failure = None;
    // Drain every worker even after a failure so no slot outlives the run.
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(tally) => report.absorb(tally),
            Err(e) => {
                control.cancel();
                let err = if e.is_panic() {
                    LifecycleError::WorkerPanicked(panic_message(&*e.into_panic()))
                } else {
                    LifecycleError::WorkerCancelled
                };
                tracing::error!("{}", err);
                failure.get_or_insert(err);
            }
        }
    }
    report.claimed = intake.claimed();

    match failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
