//! One pool worker: claim, probe, deliver, repeat.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::control::RunControl;
use crate::error::ProbeError;
use crate::prober::{ProbeRequest, Prober};
use crate::result::{ProbeRecord, ProbeResult};
use crate::sink::ResultSink;
use crate::target::Target;

use super::guard::CloseGuard;
use super::intake::Intake;
use super::{panic_message, PoolSettings};

pub(super) struct WorkerContext<P> {
    pub(super) prober: Arc<P>,
    pub(super) sink: Arc<dyn ResultSink>,
    pub(super) settings: PoolSettings,
    pub(super) control: RunControl,
    pub(super) _close: CloseGuard,
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct WorkerTally {
    pub(super) succeeded: usize,
    pub(super) failed: usize,
    pub(super) undelivered: usize,
}

enum Delivery {
    Delivered { succeeded: bool },
    Undelivered,
}

pub(super) async fn run_worker<P: Prober>(
    id: usize,
    intake: Arc<Intake>,
    ctx: Arc<WorkerContext<P>>,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    while let Some((index, target)) = intake.claim_next() {
        let task_ctx = Arc::clone(&ctx);
        let delivered =
            tokio::task::spawn_blocking(move || task_ctx.probe_and_deliver(index, target)).await;
        match delivered {
            Ok(Delivery::Delivered { succeeded: true }) => tally.succeeded += 1,
            Ok(Delivery::Delivered { succeeded: false }) => tally.failed += 1,
            Ok(Delivery::Undelivered) => tally.undelivered += 1,
            // The prober's panics are caught inside the task; anything else is the sink's.
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(_) => {
                tracing::warn!(worker = id, index, "blocking task cancelled, runtime shutting down");
                ctx.control.cancel();
                tally.undelivered += 1;
            }
        }
    }
    tracing::trace!(worker = id, "worker finished");
    tally
}

impl<P: Prober> WorkerContext<P> {
    fn probe_and_deliver(&self, index: usize, target: Target) -> Delivery {
        let flags = self.settings.flags;
        let request = ProbeRequest {
            target: target.clone(),
            method: self.settings.method.clone(),
            user_agent: flags
                .random_agent
                .then(|| self.settings.agents.pick().to_string()),
            detect_cdn: flags.output_cdn || flags.exclude_cdn,
        };

        let probed = panic::catch_unwind(AssertUnwindSafe(|| self.prober.probe(&request)))
            .unwrap_or_else(|payload| Err(ProbeError::Panicked(panic_message(&*payload))));

        let result = match self.apply_cdn_policy(probed) {
            Ok(record) => {
                tracing::debug!(index, host = %target, status = record.status_code, "probe succeeded");
                ProbeResult::success(index, target, record)
            }
            Err(e) => {
                tracing::debug!(index, host = %target, error = %e, "probe failed");
                ProbeResult::failure(index, target, &e)
            }
        };

        let succeeded = result.is_success();
        match self.sink.accept(result) {
            Ok(()) => Delivery::Delivered { succeeded },
            Err(_) => {
                self.control.cancel();
                Delivery::Undelivered
            }
        }
    }

    fn apply_cdn_policy(
        &self,
        probed: Result<ProbeRecord, ProbeError>,
    ) -> Result<ProbeRecord, ProbeError> {
        let mut record = probed?;
        let flags = self.settings.flags;
        if flags.exclude_cdn {
            if let Some(provider) = record.cdn.take() {
                return Err(ProbeError::ExcludedCdn { provider });
            }
        }
        if !flags.output_cdn {
            record.cdn = None;
        }
        Ok(record)
    }
}
