use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;

use super::dedup::Deduplicator;
use crate::liveness::{ForegroundNotice, LivenessGuard};
use crate::position::{PositionFix, PositionSource, SampleKind, DEFAULT_DEADLINE, DEFAULT_MIN_ACCURACY_M};
use crate::scheduler::{CycleOutcome, ScheduledJob};
use crate::store::{LastKnownPosition, SampleStore, StoreError};
use crate::upload::{SampleSink, SubmitOutcome};

/// Key-value record holding the latest [`CycleReport`].
pub const LAST_CYCLE_KEY: &str = "last_cycle";
/// Key-value record holding the time the queue was last fully drained.
pub const LAST_SYNCED_KEY: &str = "last_synced_at";

const NOTICE_TEXT: &str = "Location tracking is active";

/// Why a cycle ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleDetail {
    /// No fix obtainable before the deadline.
    NoFix,
    /// Fix too close to the last accepted one.
    Stationary,
    /// Every pending sample was acknowledged or dropped.
    Uploaded,
    /// At least one sample was rejected transiently and stays queued.
    UploadDeferred,
    StorageFault,
    /// Started without connectivity; nothing attempted.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub detail: CycleDetail,
    pub acked: usize,
    pub dropped: usize,
    /// Queue length after the cycle; `None` when the queue could not be read.
    pub pending: Option<usize>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Counts from one pass over the pending queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub acked: usize,
    pub dropped: usize,
    pub deferred: usize,
    pub remaining: usize,
}

/// One pipeline cycle: acquire, deduplicate, persist, upload.
pub struct TrackingJob {
    source: PositionSource,
    dedup: Deduplicator,
    store: Arc<SampleStore>,
    sink: Arc<dyn SampleSink>,
    notice: Arc<dyn ForegroundNotice>,
    deadline: Duration,
    min_accuracy_m: f64,
}

impl TrackingJob {
    pub fn new(
        source: PositionSource,
        dedup: Deduplicator,
        store: Arc<SampleStore>,
        sink: Arc<dyn SampleSink>,
        notice: Arc<dyn ForegroundNotice>,
    ) -> Self {
        Self {
            source,
            dedup,
            store,
            sink,
            notice,
            deadline: DEFAULT_DEADLINE,
            min_accuracy_m: DEFAULT_MIN_ACCURACY_M,
        }
    }

    pub fn with_acquire_policy(mut self, deadline: Duration, min_accuracy_m: f64) -> Self {
        self.deadline = deadline;
        self.min_accuracy_m = min_accuracy_m;
        self
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    /// Run one cycle. Always produces a terminal report.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let _notice = LivenessGuard::show(self.notice.clone(), NOTICE_TEXT);

        let report = match self.cycle(started).await {
            Ok(report) => report,
            Err(e) => {
                error!("Tracking cycle storage fault: {}", e);
                self.report(started, CycleOutcome::Retry, CycleDetail::StorageFault, None)
            }
        };
        self.record(&report);
        report
    }

    /// Drain the pending queue without acquiring a new fix.
    pub async fn flush(&self) -> CycleReport {
        let started = Instant::now();
        let report = match self.drain().await {
            Ok(summary) => self.report_drain(started, &summary, CycleDetail::Uploaded),
            Err(e) => {
                error!("Flush storage fault: {}", e);
                self.report(started, CycleOutcome::Retry, CycleDetail::StorageFault, None)
            }
        };
        self.record(&report);
        report
    }

    async fn cycle(&self, started: Instant) -> Result<CycleReport, StoreError> {
        let fix = match self.source.acquire(self.deadline, self.min_accuracy_m).await {
            Ok(fix) => fix.with_kind(SampleKind::Tracking),
            Err(e) => {
                debug!("no fix this cycle: {}", e);
                return self.skip(started, CycleDetail::NoFix).await;
            }
        };

        let last_known = self.store.get_last_known()?;
        if !self
            .dedup
            .should_accept(&fix, last_known.as_ref().map(|last| &last.fix))
        {
            debug!("fix within {} m of last known, skipped", self.dedup.threshold_m());
            return self.skip(started, CycleDetail::Stationary).await;
        }

        self.persist(&fix, last_known.as_ref())?;

        let summary = self.drain().await?;
        Ok(self.report_drain(started, &summary, CycleDetail::Uploaded))
    }

    /// Enqueue, then promote to last-known unless an older capture.
    fn persist(
        &self,
        fix: &PositionFix,
        last_known: Option<&LastKnownPosition>,
    ) -> Result<(), StoreError> {
        self.store.enqueue(fix)?;

        match last_known {
            Some(last) if fix.captured_at < last.fix.captured_at => {
                warn!(
                    "Accepted fix {} is older than last known {}, not promoting",
                    fix.captured_at, last.fix.captured_at
                );
            }
            _ => {
                self.store.set_last_known(fix)?;
            }
        }
        Ok(())
    }

    /// Skipped cycles still succeed. Any backlog is offered to the sink, but a transient
    /// rejection there does not turn the cycle into a retry.
    async fn skip(&self, started: Instant, detail: CycleDetail) -> Result<CycleReport, StoreError> {
        if self.store.pending_len()? == 0 {
            return Ok(self.report(started, CycleOutcome::Success, detail, None));
        }
        let summary = self.drain().await?;
        Ok(self.report(started, CycleOutcome::Success, detail, Some(&summary)))
    }

    /// Submit every pending sample, oldest first. Acknowledged and permanently rejected
    /// samples leave the queue; transient rejections stay. After an auth rejection the
    /// remaining samples are not attempted in this pass.
    pub async fn drain(&self) -> Result<DrainSummary, StoreError> {
        let pending = self.store.list_pending()?;
        let mut summary = DrainSummary::default();
        let mut auth_blocked = false;

        for fix in pending {
            if auth_blocked {
                summary.deferred += 1;
                continue;
            }

            match self.sink.submit(&fix).await {
                SubmitOutcome::Ack => {
                    self.store.dequeue_acknowledged(&fix)?;
                    summary.acked += 1;
                }
                SubmitOutcome::RejectPermanent { status, message } => {
                    warn!(
                        "Sink rejected sample {} permanently ({}): {}, dropping it",
                        fix.captured_at, status, message
                    );
                    self.store.dequeue_acknowledged(&fix)?;
                    summary.dropped += 1;
                }
                SubmitOutcome::RejectTransient(reason) => {
                    debug!("sample {} deferred: {}", fix.captured_at, reason);
                    summary.deferred += 1;
                    auth_blocked = reason.is_auth();
                }
            }
        }

        summary.remaining = self.store.pending_len()?;
        if summary.remaining == 0 {
            if let Err(e) = self.store.put_value(LAST_SYNCED_KEY, &Utc::now()) {
                warn!("Failed to record sync time: {}", e);
            }
        }
        Ok(summary)
    }

    fn report_drain(
        &self,
        started: Instant,
        summary: &DrainSummary,
        drained: CycleDetail,
    ) -> CycleReport {
        let (outcome, detail) = if summary.deferred > 0 {
            (CycleOutcome::Retry, CycleDetail::UploadDeferred)
        } else {
            (CycleOutcome::Success, drained)
        };
        self.report(started, outcome, detail, Some(summary))
    }

    fn report(
        &self,
        started: Instant,
        outcome: CycleOutcome,
        detail: CycleDetail,
        summary: Option<&DrainSummary>,
    ) -> CycleReport {
        let pending = match summary {
            Some(summary) => Some(summary.remaining),
            None => self.store.pending_len().ok(),
        };
        CycleReport {
            outcome,
            detail,
            acked: summary.map_or(0, |s| s.acked),
            dropped: summary.map_or(0, |s| s.dropped),
            pending,
            finished_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as i64,
        }
    }

    fn record(&self, report: &CycleReport) {
        let pending = report
            .pending
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        info!(
            "Tracking cycle {} ({}): acked={} dropped={} pending={} in {} ms",
            report.outcome,
            report.detail,
            report.acked,
            report.dropped,
            pending,
            report.duration_ms
        );
        if let Err(e) = self.store.put_value(LAST_CYCLE_KEY, report) {
            warn!("Failed to record cycle report: {}", e);
        }
    }
}

#[async_trait]
impl ScheduledJob for TrackingJob {
    async fn run_once(&self) -> CycleOutcome {
        self.run_cycle().await.outcome
    }

    fn constraint_unmet(&self) {
        let report = self.report(Instant::now(), CycleOutcome::Retry, CycleDetail::Offline, None);
        self.record(&report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::LogNotice;
    use crate::position::FixedProvider;
    use crate::upload::TransientReason;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedSink {
        outcomes: Mutex<VecDeque<SubmitOutcome>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSink {
        fn new(outcomes: Vec<SubmitOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SampleSink for ScriptedSink {
        async fn submit(&self, _fix: &PositionFix) -> SubmitOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SubmitOutcome::Ack)
        }
    }

    fn job(dir: &TempDir, sink: Arc<ScriptedSink>) -> TrackingJob {
        let store = Arc::new(SampleStore::open(dir.path().to_path_buf(), 10).unwrap());
        let provider = Arc::new(FixedProvider::new(52.37, 4.89, 5.0));
        TrackingJob::new(
            PositionSource::new(provider),
            Deduplicator::default(),
            store,
            sink,
            Arc::new(LogNotice),
        )
    }

    fn queued(n: i64) -> PositionFix {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        PositionFix::new(
            51.0 + n as f64 * 0.01,
            4.0,
            5.0,
            base + chrono::Duration::minutes(n),
        )
    }

    #[tokio::test]
    async fn storage_fault_means_retry() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, ScriptedSink::new(vec![]));
        std::fs::write(dir.path().join("pending.json"), b"{broken").unwrap();

        let report = job.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Retry);
        assert_eq!(report.detail, CycleDetail::StorageFault);
        assert_eq!(report.pending, None);
    }

    #[tokio::test]
    async fn permanent_rejection_drops_and_keeps_draining() {
        let dir = TempDir::new().unwrap();
        let sink = ScriptedSink::new(vec![
            SubmitOutcome::RejectPermanent {
                status: 400,
                message: "bad".into(),
            },
            SubmitOutcome::RejectTransient(TransientReason::Server(502)),
            SubmitOutcome::Ack,
        ]);
        let job = job(&dir, sink.clone());
        for n in 0..3 {
            job.store().enqueue(&queued(n)).unwrap();
        }

        let summary = job.drain().await.unwrap();
        assert_eq!(
            summary,
            DrainSummary {
                acked: 1,
                dropped: 1,
                deferred: 1,
                remaining: 1,
            }
        );
        assert_eq!(sink.calls(), 3);
        assert_eq!(job.store().list_pending().unwrap(), vec![queued(1)]);
    }

    #[tokio::test]
    async fn unauthorized_stops_the_pass() {
        let dir = TempDir::new().unwrap();
        let sink = ScriptedSink::new(vec![SubmitOutcome::RejectTransient(
            TransientReason::Unauthorized(401),
        )]);
        let job = job(&dir, sink.clone());
        for n in 0..3 {
            job.store().enqueue(&queued(n)).unwrap();
        }

        let report = job.flush().await;
        assert_eq!(report.outcome, CycleOutcome::Retry);
        assert_eq!(report.detail, CycleDetail::UploadDeferred);
        assert_eq!(report.pending, Some(3));
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn older_fix_is_queued_but_not_promoted() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, ScriptedSink::new(vec![]));
        let newer = PositionFix::new(40.0, 3.0, 5.0, Utc::now() + chrono::Duration::hours(1));
        job.store().set_last_known(&newer).unwrap();

        let report = job.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Success);
        assert_eq!(report.acked, 1);
        assert_eq!(job.store().get_last_known().unwrap().unwrap().fix, newer);
    }

    #[tokio::test]
    async fn cycle_report_and_sync_time_are_recorded() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, ScriptedSink::new(vec![]));

        let report = job.run_cycle().await;
        let stored: CycleReport = job.store().get_value(LAST_CYCLE_KEY).unwrap().unwrap();
        assert_eq!(stored, report);
        assert!(job
            .store()
            .get_value::<DateTime<Utc>>(LAST_SYNCED_KEY)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn offline_constraint_is_recorded() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, ScriptedSink::new(vec![]));
        job.constraint_unmet();

        let stored: CycleReport = job.store().get_value(LAST_CYCLE_KEY).unwrap().unwrap();
        assert_eq!(stored.detail, CycleDetail::Offline);
        assert_eq!(stored.outcome, CycleOutcome::Retry);
    }
}
