use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use fieldtrack::liveness::LogNotice;
use fieldtrack::position::{
    FixStream, FixedProvider, LocationProvider, PositionError, PositionFix, PositionSource,
    UpdateRequest,
};
use fieldtrack::scheduler::CycleOutcome;
use fieldtrack::store::SampleStore;
use fieldtrack::tracking::{CycleDetail, Deduplicator, TrackingJob};
use fieldtrack::upload::{SampleSink, SubmitOutcome, TransientReason};

/// Hands out whatever fix the test placed last, as a fresh cached platform fix.
#[derive(Default)]
struct ScriptedProvider {
    current: Mutex<Option<PositionFix>>,
}

impl ScriptedProvider {
    fn set(&self, fix: PositionFix) {
        *self.current.lock().unwrap() = Some(fix);
    }
}

impl LocationProvider for ScriptedProvider {
    fn last_fix(&self) -> Option<PositionFix> {
        self.current.lock().unwrap().clone()
    }

    fn subscribe(&self, _request: UpdateRequest) -> Result<FixStream, PositionError> {
        Err(PositionError::Unavailable("scripted provider".into()))
    }
}

#[derive(Debug, Clone, Copy)]
enum SinkMode {
    Ack,
    Offline,
    Reject,
    Hang,
}

struct ScriptedSink {
    mode: Mutex<SinkMode>,
    calls: AtomicUsize,
}

impl ScriptedSink {
    fn new(mode: SinkMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        })
    }

    fn set(&self, mode: SinkMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl SampleSink for ScriptedSink {
    async fn submit(&self, _fix: &PositionFix) -> SubmitOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            SinkMode::Ack => SubmitOutcome::Ack,
            SinkMode::Offline => SubmitOutcome::RejectTransient(TransientReason::Network),
            SinkMode::Reject => SubmitOutcome::RejectPermanent {
                status: 422,
                message: "unprocessable".into(),
            },
            SinkMode::Hang => {
                std::future::pending::<()>().await;
                SubmitOutcome::Ack
            }
        }
    }
}

fn open_store(dir: &TempDir, capacity: usize) -> Arc<SampleStore> {
    Arc::new(SampleStore::open(dir.path().to_path_buf(), capacity).unwrap())
}

fn job(
    provider: Arc<dyn LocationProvider>,
    store: Arc<SampleStore>,
    sink: Arc<ScriptedSink>,
) -> TrackingJob {
    TrackingJob::new(
        PositionSource::new(provider),
        Deduplicator::default(),
        store,
        sink,
        Arc::new(LogNotice),
    )
}

/// Fixes roughly 1.1 km apart, in capture order.
fn moving_fix(step: i64) -> PositionFix {
    PositionFix::new(
        45.0 + step as f64 * 0.01,
        7.0,
        6.0,
        Utc::now() - chrono::Duration::seconds(5 - step),
    )
}

#[tokio::test]
async fn offline_accumulation_then_reconnect_drain() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 100);
    let provider = Arc::new(ScriptedProvider::default());
    let sink = ScriptedSink::new(SinkMode::Offline);
    let job = job(provider.clone(), store.clone(), sink.clone());

    let mut accepted = Vec::new();
    for step in 0..3 {
        let fix = moving_fix(step);
        provider.set(fix.clone());
        accepted.push(fix);

        let report = job.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Retry);
        assert_eq!(report.detail, CycleDetail::UploadDeferred);
    }

    assert_eq!(store.list_pending().unwrap(), accepted);
    assert_eq!(store.get_last_known().unwrap().unwrap().fix, accepted[2]);

    sink.set(SinkMode::Ack);
    let report = job.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.acked, 3);
    assert_eq!(store.pending_len().unwrap(), 0);
}

#[tokio::test]
async fn stationary_device_queues_only_the_first_fix() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 100);
    let sink = ScriptedSink::new(SinkMode::Ack);
    let job = job(
        Arc::new(FixedProvider::new(59.3293, 18.0686, 4.0)),
        store.clone(),
        sink.clone(),
    );

    let first = job.run_cycle().await;
    assert_eq!(first.outcome, CycleOutcome::Success);
    assert_eq!(first.detail, CycleDetail::Uploaded);
    let last_known = store.get_last_known().unwrap().unwrap();

    for _ in 0..4 {
        let report = job.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Success);
        assert_eq!(report.detail, CycleDetail::Stationary);
        assert_eq!(store.pending_len().unwrap(), 0);
        assert_eq!(store.get_last_known().unwrap().unwrap(), last_known);
    }
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn killed_cycle_keeps_persisted_fix_exactly_once() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::default());
    let fix = moving_fix(0);
    provider.set(fix.clone());

    {
        let store = open_store(&dir, 100);
        let job = job(provider.clone(), store, ScriptedSink::new(SinkMode::Hang));
        let cut = tokio::time::timeout(Duration::from_millis(200), job.run_cycle()).await;
        assert!(cut.is_err());
    }

    let store = open_store(&dir, 100);
    assert_eq!(store.list_pending().unwrap(), vec![fix.clone()]);
    assert_eq!(store.get_last_known().unwrap().unwrap().fix, fix);

    let sink = ScriptedSink::new(SinkMode::Ack);
    let job = job(provider, store.clone(), sink.clone());
    let report = job.run_cycle().await;
    assert_eq!(report.detail, CycleDetail::Stationary);
    assert_eq!(report.acked, 1);
    assert_eq!(store.pending_len().unwrap(), 0);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn long_outage_keeps_newest_samples() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 3);
    let provider = Arc::new(ScriptedProvider::default());
    let job = job(provider.clone(), store.clone(), ScriptedSink::new(SinkMode::Offline));

    let mut accepted = Vec::new();
    for step in 0..5 {
        let fix = moving_fix(step);
        provider.set(fix.clone());
        accepted.push(fix);
        job.run_cycle().await;
    }

    assert_eq!(store.list_pending().unwrap(), accepted[2..].to_vec());
}

#[tokio::test]
async fn rejected_sample_does_not_block_the_queue() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 100);
    let provider = Arc::new(ScriptedProvider::default());
    let sink = ScriptedSink::new(SinkMode::Reject);
    let job = job(provider.clone(), store.clone(), sink.clone());

    provider.set(moving_fix(0));
    let report = job.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.dropped, 1);
    assert_eq!(store.pending_len().unwrap(), 0);

    sink.set(SinkMode::Ack);
    provider.set(moving_fix(1));
    let report = job.run_cycle().await;
    assert_eq!(report.acked, 1);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_fix_is_a_quiet_success() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 100);
    let sink = ScriptedSink::new(SinkMode::Ack);
    let job = job(Arc::new(ScriptedProvider::default()), store.clone(), sink.clone());

    let report = job.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.detail, CycleDetail::NoFix);
    assert!(store.get_last_known().unwrap().is_none());
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unpromoted_fix_is_queued_once() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 100);
    let ahead = PositionFix::new(40.0, 3.0, 5.0, Utc::now() + chrono::Duration::hours(1));
    store.set_last_known(&ahead).unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let fix = moving_fix(0);
    provider.set(fix.clone());
    let job = job(provider, store.clone(), ScriptedSink::new(SinkMode::Offline));

    for _ in 0..3 {
        let report = job.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Retry);
    }

    assert_eq!(store.list_pending().unwrap(), vec![fix]);
    assert_eq!(store.get_last_known().unwrap().unwrap().fix, ahead);
}

#[test]
fn ack_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 10);
    let first = moving_fix(0);
    let second = moving_fix(1);
    store.enqueue(&first).unwrap();
    store.enqueue(&second).unwrap();

    assert!(store.dequeue_acknowledged(&first).unwrap());
    assert!(!store.dequeue_acknowledged(&first).unwrap());
    assert_eq!(store.list_pending().unwrap(), vec![second]);
}
