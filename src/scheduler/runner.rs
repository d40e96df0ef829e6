use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::connectivity::Connectivity;
use super::error::SchedulerError;
use super::registration::{RegisterResult, Registration, ScheduleState};

/// Terminal signal of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    Retry,
}

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run_once(&self) -> CycleOutcome;

    /// Called instead of `run_once` when a run starts with its constraints unmet.
    fn constraint_unmet(&self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub runs: u64,
    /// Consecutive retries since the last success.
    pub attempt: u32,
    pub last_outcome: Option<CycleOutcome>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    wake: Arc<Notify>,
    status: Arc<StdMutex<JobStatus>>,
    join: JoinHandle<()>,
}

/// Runs at most one worker per registration key.
pub struct Scheduler {
    connectivity: Arc<dyn Connectivity>,
    backoff: BackoffPolicy,
    states: HashMap<String, ScheduleState>,
    workers: HashMap<String, WorkerHandle>,
}

impl Scheduler {
    pub fn new(connectivity: Arc<dyn Connectivity>, backoff: BackoffPolicy) -> Self {
        Self {
            connectivity,
            backoff,
            states: HashMap::new(),
            workers: HashMap::new(),
        }
    }

    pub fn state(&self, key: &str) -> ScheduleState {
        self.states
            .get(key)
            .cloned()
            .unwrap_or(ScheduleState::Unregistered)
    }

    pub fn status(&self, key: &str) -> Option<JobStatus> {
        self.workers
            .get(key)
            .map(|worker| lock(&worker.status).clone())
    }

    /// Register `job` under the registration key. An existing worker for the same key
    /// is stopped and awaited first. The first run starts immediately.
    pub async fn register(
        &mut self,
        registration: Registration,
        job: Arc<dyn ScheduledJob>,
    ) -> RegisterResult {
        let key = registration.key.clone();
        let result = if self.stop_worker(&key).await {
            info!("Replacing registration {}", key);
            RegisterResult::Replaced
        } else {
            info!(
                "Registering {} every {:?} (flex {:?})",
                key, registration.interval, registration.flex
            );
            RegisterResult::Registered
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let wake = Arc::new(Notify::new());
        let status = Arc::new(StdMutex::new(JobStatus::default()));

        let worker = Worker {
            registration: registration.clone(),
            job,
            connectivity: self.connectivity.clone(),
            backoff: self.backoff,
            wake: wake.clone(),
            status: status.clone(),
        };
        let join = tokio::spawn(worker.run(stop_rx));

        self.workers.insert(
            key.clone(),
            WorkerHandle {
                stop_tx,
                wake,
                status,
                join,
            },
        );
        self.states.insert(
            key,
            ScheduleState::Registered {
                registration,
                instance: Uuid::new_v4(),
                since: Utc::now(),
            },
        );
        result
    }

    /// Cancel the registration. Returns whether a worker was stopped; repeated calls
    /// are no-ops.
    pub async fn cancel(&mut self, key: &str) -> bool {
        let stopped = self.stop_worker(key).await;
        if stopped {
            info!("Cancelled registration {}", key);
            self.states
                .insert(key.to_string(), ScheduleState::Cancelled { at: Utc::now() });
        }
        stopped
    }

    /// Wake the worker for an immediate run.
    pub fn run_now(&self, key: &str) -> Result<(), SchedulerError> {
        let worker = self
            .workers
            .get(key)
            .ok_or_else(|| SchedulerError::NotRegistered(key.to_string()))?;
        worker.wake.notify_one();
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let keys: Vec<String> = self.workers.keys().cloned().collect();
        for key in keys {
            self.cancel(&key).await;
        }
    }

    async fn stop_worker(&mut self, key: &str) -> bool {
        match self.workers.remove(key) {
            Some(worker) => {
                let _ = worker.stop_tx.send(());
                if let Err(e) = worker.join.await {
                    warn!("Worker {} ended abnormally: {}", key, e);
                }
                true
            }
            None => false,
        }
    }
}

struct Worker {
    registration: Registration,
    job: Arc<dyn ScheduledJob>,
    connectivity: Arc<dyn Connectivity>,
    backoff: BackoffPolicy,
    wake: Arc<Notify>,
    status: Arc<StdMutex<JobStatus>>,
}

impl Worker {
    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        let key = self.registration.key.clone();
        let mut delay = Duration::ZERO;

        loop {
            self.set_next_run(delay);
            let should_stop = tokio::select! {
                _ = sleep(delay) => false,
                _ = self.wake.notified() => false,
                _ = &mut stop_rx => true,
            };
            if should_stop {
                break;
            }

            let cycle = async {
                if self.registration.constraints.requires_network
                    && !self.connectivity.is_online().await
                {
                    debug!("{}: offline, deferring run", key);
                    self.job.constraint_unmet();
                    return CycleOutcome::Retry;
                }
                self.job.run_once().await
            };
            let outcome = tokio::select! {
                outcome = cycle => outcome,
                _ = &mut stop_rx => {
                    debug!("{}: stopped mid-run", key);
                    break;
                }
            };

            delay = self.record(outcome);
        }
        debug!("{}: worker stopped", key);
    }

    fn record(&self, outcome: CycleOutcome) -> Duration {
        let mut status = lock(&self.status);
        status.runs += 1;
        status.last_outcome = Some(outcome);
        status.last_run_at = Some(Utc::now());

        match outcome {
            CycleOutcome::Success => {
                status.attempt = 0;
                self.registration.next_delay()
            }
            CycleOutcome::Retry => {
                status.attempt = status.attempt.saturating_add(1);
                let delay = self.backoff.delay(status.attempt);
                debug!(
                    "{}: retry {} in {:?}",
                    self.registration.key, status.attempt, delay
                );
                delay
            }
        }
    }

    fn set_next_run(&self, delay: Duration) {
        let offset = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        lock(&self.status).next_run_at = Some(Utc::now() + offset);
    }
}

fn lock(status: &StdMutex<JobStatus>) -> std::sync::MutexGuard<'_, JobStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}
