//! Runner lifecycle and worker pool behaviour, driven by in-memory probers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agent::BUILTIN_USER_AGENTS;
use crate::error::{ConfigError, LifecycleError, ProbeError, RunnerError};
use crate::options::{ConcurrencyPolicy, ProbeFlags, ProbeOptions};
use crate::prober::ProbeRequest;
use crate::result::{FailureKind, ProbeRecord, ProbeResult};
use crate::retry::ErrorKind;
use crate::sink::{self, Aggregator, CallbackSink};

use super::*;

fn ok_record(request: &ProbeRequest, status: u32) -> ProbeRecord {
    ProbeRecord {
        url: format!("https://{}/", request.target),
        method: request.method.clone(),
        status_code: status,
        ..ProbeRecord::default()
    }
}

fn always_ok(request: &ProbeRequest) -> Result<ProbeRecord, ProbeError> {
    Ok(ok_record(request, 200))
}

fn hosts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("host{i}.example")).collect()
}

fn sorted_indices(results: &[ProbeResult]) -> Vec<usize> {
    let mut v: Vec<usize> = results.iter().map(|r| r.index).collect();
    v.sort_unstable();
    v
}

#[tokio::test]
async fn two_hosts_one_network_error() {
    let options = ProbeOptions::new(["host1", "host2"]).with_concurrency(2);
    let prober = |req: &ProbeRequest| match req.target.as_str() {
        "host1" => Ok(ok_record(req, 200)),
        _ => Err(ProbeError::transport(
            ErrorKind::Connection,
            "Couldn't connect to server",
        )),
    };
    let agg = Arc::new(Aggregator::new());
    let mut runner = Runner::new(options, prober);
    let summary = runner.run(Arc::clone(&agg)).await.unwrap();

    assert_eq!(runner.state(), RunnerState::Completed);
    assert!(agg.is_closed());
    let results = agg.snapshot();
    assert_eq!(results.len(), 2);
    let by_target: HashMap<&str, &ProbeResult> =
        results.iter().map(|r| (r.target.as_str(), r)).collect();
    assert_eq!(by_target["host1"].record().unwrap().status_code, 200);
    assert_eq!(
        by_target["host2"].failure_info().unwrap().kind,
        FailureKind::Connection
    );
    assert_eq!(
        summary,
        RunSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            undelivered: 0,
            undispatched: 0,
            cancelled: false,
        }
    );
    assert!(summary.is_complete());
}

#[tokio::test]
async fn empty_target_set_rejected_without_results() {
    let options = ProbeOptions::new(Vec::<String>::new()).with_concurrency(5);
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let prober = move |req: &ProbeRequest| {
        counted.fetch_add(1, Ordering::SeqCst);
        always_ok(req)
    };
    let agg = Arc::new(Aggregator::new());
    let mut runner = Runner::new(options, prober);
    let err = runner.run(Arc::clone(&agg)).await.unwrap_err();

    assert!(matches!(err, RunnerError::Config(ConfigError::EmptyTargets)));
    assert!(err.to_string().contains("empty target set"));
    assert_eq!(runner.state(), RunnerState::Failed);
    assert!(agg.is_empty());
    assert!(agg.is_closed());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_configurations_produce_no_results() {
    let bad = [
        ProbeOptions::new(["a"]).with_concurrency(0),
        ProbeOptions::new(["a"]).with_concurrency(-1),
        ProbeOptions::new(["a"]).with_flags(ProbeFlags {
            output_cdn: true,
            exclude_cdn: true,
            ..ProbeFlags::default()
        }),
        ProbeOptions::new(["a", ""]),
    ];
    for options in bad {
        let agg = Arc::new(Aggregator::new());
        let err = Runner::new(options, always_ok)
            .run(Arc::clone(&agg))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Config(_)), "{err}");
        assert!(agg.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_target_yields_exactly_one_result() {
    for concurrency in [1, 2, 3, 8, 64] {
        let targets = hosts(40);
        let results = probe_all(
            ProbeOptions::new(targets).with_concurrency(concurrency),
            always_ok,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 40, "concurrency {concurrency}");
        assert_eq!(sorted_indices(&results), (0..40).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_target_is_claimed_twice() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let prober = move |req: &ProbeRequest| {
        recorder.lock().unwrap().push(req.target.to_string());
        std::thread::sleep(Duration::from_millis(1));
        always_ok(req)
    };
    let targets = hosts(60);
    let results = probe_all(ProbeOptions::new(targets.clone()).with_concurrency(7), prober)
        .await
        .unwrap();
    assert_eq!(results.len(), 60);

    let mut claimed = seen.lock().unwrap().clone();
    claimed.sort();
    let mut expected = targets;
    expected.sort();
    assert_eq!(claimed, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_probes_never_exceed_concurrency() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (cur, pk) = (Arc::clone(&current), Arc::clone(&peak));
    let prober = move |req: &ProbeRequest| {
        let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
        pk.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(15));
        cur.fetch_sub(1, Ordering::SeqCst);
        always_ok(req)
    };
    let results = probe_all(ProbeOptions::new(hosts(12)).with_concurrency(3), prober)
        .await
        .unwrap();
    assert_eq!(results.len(), 12);
    let peak = peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak in-flight {peak}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn coerced_concurrency_runs_one_worker() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (cur, pk) = (Arc::clone(&current), Arc::clone(&peak));
    let prober = move |req: &ProbeRequest| {
        let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
        pk.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        cur.fetch_sub(1, Ordering::SeqCst);
        always_ok(req)
    };
    let options = ProbeOptions::new(hosts(5))
        .with_concurrency(0)
        .with_concurrency_policy(ConcurrencyPolicy::Coerce);
    let results = probe_all(options, prober).await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_worker_keeps_input_order() {
    let results = probe_all(ProbeOptions::new(hosts(10)), always_ok)
        .await
        .unwrap();
    let order: Vec<usize> = results.iter().map(|r| r.index).collect();
    assert_eq!(order, (0..10).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_target_does_not_block_others() {
    let prober = |req: &ProbeRequest| {
        if req.target.as_str() == "B" {
            Err(ProbeError::transport(ErrorKind::Timeout, "Operation timed out"))
        } else {
            always_ok(req)
        }
    };
    let results = probe_all(ProbeOptions::new(["A", "B", "C"]).with_concurrency(2), prober)
        .await
        .unwrap();
    let mut outcome: Vec<(String, bool)> = results
        .iter()
        .map(|r| (r.target.to_string(), r.is_success()))
        .collect();
    outcome.sort();
    assert_eq!(
        outcome,
        vec![
            ("A".to_string(), true),
            ("B".to_string(), false),
            ("C".to_string(), true)
        ]
    );
}

#[tokio::test]
async fn panicking_prober_becomes_failure_result() {
    let prober = |req: &ProbeRequest| {
        if req.target.as_str() == "boom" {
            panic!("prober exploded");
        }
        always_ok(req)
    };
    let results = probe_all(ProbeOptions::new(["ok", "boom"]), prober)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    let failed = results.iter().find(|r| !r.is_success()).unwrap();
    assert_eq!(failed.target.as_str(), "boom");
    let info = failed.failure_info().unwrap();
    assert_eq!(info.kind, FailureKind::Panicked);
    assert!(info.error.contains("prober exploded"));
}

#[tokio::test]
async fn cancel_stops_dispatch_after_in_flight_work() {
    let options = ProbeOptions::new(hosts(10)).with_concurrency(1);
    let mut runner = Runner::new(options, always_ok);
    let control = runner.control();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let sink = CallbackSink::new(move |_r: ProbeResult| {
        counter.fetch_add(1, Ordering::SeqCst);
        control.cancel();
    });
    let summary = runner.run(sink).await.unwrap();

    assert_eq!(runner.state(), RunnerState::Completed);
    assert!(summary.cancelled);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.undispatched, 9);
    assert!(!summary.is_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_receiver_terminates_early() {
    let options = ProbeOptions::new(hosts(40)).with_concurrency(2);
    let prober = |req: &ProbeRequest| {
        std::thread::sleep(Duration::from_millis(10));
        always_ok(req)
    };
    let (sink, mut rx) = sink::channel(1);
    let mut runner = Runner::new(options, prober);
    let handle = tokio::spawn(async move { runner.run(sink).await });

    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_some());
    drop(rx);

    let summary = handle.await.unwrap().unwrap();
    assert!(summary.cancelled);
    assert!(summary.undispatched > 0);
    assert_eq!(
        summary.succeeded + summary.failed + summary.undelivered + summary.undispatched,
        summary.total
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_stream_ends_after_last_result() {
    let options = ProbeOptions::new(hosts(25)).with_concurrency(4);
    let (sink, mut rx) = sink::channel(4);
    let mut runner = Runner::new(options, always_ok);
    let handle = tokio::spawn(async move { runner.run(sink).await });

    let mut received = Vec::new();
    while let Some(r) = rx.recv().await {
        received.push(r);
    }
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(received.len(), 25);
    assert_eq!(sorted_indices(&received), (0..25).collect::<Vec<_>>());
    assert!(summary.is_complete());
}

#[tokio::test]
async fn runner_runs_only_once() {
    let mut runner = Runner::new(ProbeOptions::new(["a"]), always_ok);
    runner.run(Aggregator::new()).await.unwrap();
    assert!(runner.state().is_terminal());
    let err = runner.run(Aggregator::new()).await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::Lifecycle(LifecycleError::NotRunnable(RunnerState::Completed))
    ));
}

#[tokio::test]
async fn failed_runner_stays_failed() {
    let mut runner = Runner::new(ProbeOptions::new(["a"]).with_concurrency(0), always_ok);
    assert_eq!(runner.state(), RunnerState::Created);
    assert!(runner.validate().is_err());
    assert_eq!(runner.state(), RunnerState::Failed);
    let err = runner.run(Aggregator::new()).await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::Lifecycle(LifecycleError::NotRunnable(RunnerState::Failed))
    ));
}

#[test]
fn validate_moves_created_to_validated() {
    let mut runner = Runner::new(ProbeOptions::new(["a", "a", "b"]), always_ok);
    runner.validate().unwrap();
    runner.validate().unwrap();
    assert_eq!(runner.state(), RunnerState::Validated);
    assert_eq!(runner.validated_options().unwrap().targets().len(), 2);
}

#[tokio::test]
async fn exclude_cdn_reports_cdn_hosts_as_failures() {
    let detect_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&detect_seen);
    let prober = move |req: &ProbeRequest| {
        seen.lock().unwrap().push(req.detect_cdn);
        let mut record = ok_record(req, 200);
        if req.target.as_str() == "behind-cdn" {
            record.cdn = Some("cloudflare".to_string());
        }
        Ok(record)
    };
    let options = ProbeOptions::new(["behind-cdn", "origin"]).with_flags(ProbeFlags {
        exclude_cdn: true,
        ..ProbeFlags::default()
    });
    let results = probe_all(options, prober).await.unwrap();
    assert_eq!(results.len(), 2);
    let excluded = results
        .iter()
        .find(|r| r.target.as_str() == "behind-cdn")
        .unwrap();
    assert_eq!(
        excluded.failure_info().unwrap().kind,
        FailureKind::ExcludedCdn
    );
    assert!(results
        .iter()
        .any(|r| r.target.as_str() == "origin" && r.is_success()));
    assert_eq!(*detect_seen.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn cdn_annotation_only_when_requested() {
    let prober = |req: &ProbeRequest| {
        let mut record = ok_record(req, 200);
        record.cdn = Some("fastly".to_string());
        Ok(record)
    };
    let plain = probe_all(ProbeOptions::new(["a"]), prober).await.unwrap();
    assert_eq!(plain[0].record().unwrap().cdn, None);

    let annotated = probe_all(
        ProbeOptions::new(["a"]).with_flags(ProbeFlags {
            output_cdn: true,
            ..ProbeFlags::default()
        }),
        prober,
    )
    .await
    .unwrap();
    assert_eq!(annotated[0].record().unwrap().cdn.as_deref(), Some("fastly"));
}

/// Records the method and agent of every request, then answers 200.
fn recorder(
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
) -> impl Fn(&ProbeRequest) -> Result<ProbeRecord, ProbeError> + Send + Sync + 'static {
    move |req: &ProbeRequest| {
        seen.lock()
            .unwrap()
            .push((req.method.clone(), req.user_agent.clone()));
        always_ok(req)
    }
}

#[tokio::test]
async fn random_agent_and_method_reach_each_request() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = ProbeOptions::new(hosts(5))
        .with_method("head")
        .with_flags(ProbeFlags {
            random_agent: true,
            ..ProbeFlags::default()
        });
    let results = probe_all(options, recorder(Arc::clone(&seen)))
        .await
        .unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(ProbeResult::is_success));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    for (method, agent) in seen.iter() {
        assert_eq!(method, "HEAD");
        let agent = agent.as_deref().expect("agent set");
        assert!(BUILTIN_USER_AGENTS.contains(&agent));
    }
}

#[tokio::test]
async fn no_agent_is_sent_without_random_agent() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let results = probe_all(
        ProbeOptions::new(["a", "b"]),
        recorder(Arc::clone(&seen)),
    )
    .await
    .unwrap();
    assert!(results.iter().all(ProbeResult::is_success));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(method, agent)| method == "GET" && agent.is_none()));
}

#[tokio::test]
async fn custom_agent_pool_is_used() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = ProbeOptions::new(["a", "b"]).with_flags(ProbeFlags {
        random_agent: true,
        ..ProbeFlags::default()
    });
    let mut runner = Runner::new(options, recorder(Arc::clone(&seen)))
        .with_user_agents(UserAgentPool::new(vec!["only-agent".to_string()]));
    let summary = runner.run(Aggregator::new()).await.unwrap();
    assert_eq!(summary.succeeded, 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen
        .iter()
        .all(|(_, agent)| agent.as_deref() == Some("only-agent")));
}

/// Polls `future` once on the current thread, outside any async runtime.
fn poll_once<F: std::future::Future>(future: F) -> std::task::Poll<F::Output> {
    use std::future::Future;
    use std::task::{Context, Wake, Waker};

    struct NoopWake;
    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    future.as_mut().poll(&mut cx)
}

#[test]
fn run_outside_a_runtime_fails_and_closes_the_sink() {
    let agg = Arc::new(Aggregator::new());
    let mut runner = Runner::new(ProbeOptions::new(hosts(3)), always_ok);
    let outcome = match poll_once(runner.run(Arc::clone(&agg))) {
        std::task::Poll::Ready(outcome) => outcome,
        std::task::Poll::Pending => panic!("run should fail before awaiting anything"),
    };

    assert!(matches!(
        outcome,
        Err(RunnerError::Lifecycle(LifecycleError::NoRuntime))
    ));
    assert_eq!(runner.state(), RunnerState::Failed);
    assert!(agg.is_closed());
    assert!(agg.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sink_panic_fails_the_run_after_draining() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&delivered);
    let sink = Arc::new(CallbackSink::new(move |r: ProbeResult| {
        if r.index == 3 {
            panic!("sink exploded");
        }
        record.lock().unwrap().push(r.index);
    }));
    let options = ProbeOptions::new(hosts(10)).with_concurrency(2);
    let mut runner = Runner::new(options, always_ok);

    let err = runner.run(Arc::clone(&sink)).await.unwrap_err();
    match err {
        RunnerError::Lifecycle(LifecycleError::WorkerPanicked(msg)) => {
            assert!(msg.contains("sink exploded"), "unexpected message: {msg}");
        }
        other => panic!("expected a worker panic, got {other:?}"),
    }
    assert_eq!(runner.state(), RunnerState::Failed);
    assert!(runner.control().is_cancelled());

    // Targets claimed before the failing one were still delivered.
    let mut seen = delivered.lock().unwrap().clone();
    seen.sort_unstable();
    assert!(!seen.contains(&3));
    assert!(seen.starts_with(&[0, 1, 2]), "delivered: {seen:?}");
    assert!(seen.len() < 10);
    // The sink was closed before `run` returned.
    assert_eq!(
        sink.accept(ProbeResult::success(
            0,
            crate::target::Target::from("late"),
            ProbeRecord::default()
        )),
        Err(crate::error::SinkClosed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_run_delivers_in_flight_results_then_closes() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let prober = move |req: &ProbeRequest| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        always_ok(req)
    };
    let agg = Arc::new(Aggregator::new());
    let mut runner = Runner::new(ProbeOptions::new(hosts(6)).with_concurrency(2), prober);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), runner.run(Arc::clone(&agg))).await;
    assert!(abandoned.is_err());
    assert!(!agg.is_closed());

    for _ in 0..200 {
        if agg.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(agg.is_closed());
    assert_eq!(started.load(Ordering::SeqCst), 2);
    let results = agg.snapshot();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(ProbeResult::is_success));
    assert_eq!(runner.state(), RunnerState::Running);
}
