use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ProviderConfig};
use crate::liveness::LogNotice;
use crate::position::{FixedProvider, LocationProvider, PositionError, PositionSource, ReplayProvider};
use crate::scheduler::{
    AlwaysOnline, Connectivity, RegisterResult, Registration, Scheduler, SchedulerError, TcpProbe,
};
use crate::store::{LastKnownPosition, SampleStore, StoreError};
use crate::tracking::{CycleReport, Deduplicator, TrackingJob, LAST_CYCLE_KEY, LAST_SYNCED_KEY};
use crate::upload::{EnvToken, UploadClient, UploadError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("position provider error: {0}")]
    Position(#[from] PositionError),
    #[error("upload client error: {0}")]
    Upload(#[from] UploadError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of the durable state, for display.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub last_known: Option<LastKnownPosition>,
    pub pending: usize,
    pub last_cycle: Option<CycleReport>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The assembled pipeline.
pub struct App {
    config: Config,
    store: Arc<SampleStore>,
    job: Arc<TrackingJob>,
    connectivity: Arc<dyn Connectivity>,
}

impl App {
    pub fn build(config: Config) -> Result<Self, AppError> {
        let store = Arc::new(SampleStore::open(
            config.storage.dir.clone(),
            config.storage.queue_capacity,
        )?);

        let provider = build_provider(&config.position.provider)?;
        let source = PositionSource::new(provider)
            .with_max_cached_age(config.position.max_cached_age)
            .with_poll_interval(config.position.poll_interval);

        let client = UploadClient::new(
            &config.sink.endpoint,
            config.sink.timeout,
            Arc::new(EnvToken::new(config.sink.token_env.clone())),
        )?;
        let connectivity = build_connectivity(&config, &client);

        let job = TrackingJob::new(
            source,
            Deduplicator::new(config.dedup.threshold_m),
            store.clone(),
            Arc::new(client),
            Arc::new(LogNotice),
        )
        .with_acquire_policy(config.position.deadline, config.position.min_accuracy_m);

        Ok(Self {
            config,
            store,
            job: Arc::new(job),
            connectivity,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn job(&self) -> &Arc<TrackingJob> {
        &self.job
    }

    pub fn registration(&self) -> Result<Registration, SchedulerError> {
        let schedule = &self.config.schedule;
        Ok(
            Registration::periodic(schedule.key.clone(), schedule.interval, schedule.flex)?
                .with_network_required(schedule.requires_network),
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.connectivity.clone(), self.config.schedule.backoff)
    }

    pub fn status(&self) -> Result<StatusReport, StoreError> {
        Ok(StatusReport {
            last_known: self.store.get_last_known()?,
            pending: self.store.pending_len()?,
            last_cycle: self.store.get_value(LAST_CYCLE_KEY)?,
            last_synced_at: self.store.get_value(LAST_SYNCED_KEY)?,
        })
    }

    /// Register the periodic job and keep it running until Ctrl-C.
    pub async fn run_until_interrupted(&self) -> Result<(), AppError> {
        let registration = self.registration()?;
        let key = registration.key.clone();
        let mut scheduler = self.scheduler();

        if scheduler.register(registration, self.job.clone()).await == RegisterResult::Replaced {
            warn!("Registration {} replaced an existing one", key);
        }

        tokio::signal::ctrl_c().await?;
        info!("Interrupted, cancelling {}", key);
        scheduler.cancel(&key).await;
        Ok(())
    }
}

pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LocationProvider>, PositionError> {
    match config {
        ProviderConfig::Fixed {
            coordinates,
            accuracy_m,
        } => Ok(Arc::new(FixedProvider::from_coordinates(
            coordinates,
            *accuracy_m,
        )?)),
        ProviderConfig::Replay { path } => Ok(Arc::new(ReplayProvider::from_file(path)?)),
    }
}

fn build_connectivity(config: &Config, client: &UploadClient) -> Arc<dyn Connectivity> {
    if !config.schedule.requires_network {
        return Arc::new(AlwaysOnline);
    }

    let probe = match &config.schedule.probe {
        Some(address) => Some(TcpProbe::new(address.clone())),
        None => TcpProbe::for_endpoint(client.endpoint()),
    };
    match probe {
        Some(probe) => {
            info!("Connectivity probe: {}", probe.address());
            Arc::new(probe)
        }
        None => {
            warn!("No probe address for {}, assuming online", client.endpoint());
            Arc::new(AlwaysOnline)
        }
    }
}
