use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use super::error::PositionError;
use super::types::{PositionFix, UpdateRequest};

const STREAM_BUFFER: usize = 8;
const MIN_PUBLISH_INTERVAL: Duration = Duration::from_millis(10);

/// Device location service.
///
/// `subscribe` must be called from within a tokio runtime; implementations are free to
/// spawn the task that feeds the returned stream.
pub trait LocationProvider: Send + Sync {
    /// The platform's most recent fix, however old.
    fn last_fix(&self) -> Option<PositionFix>;

    /// Start streaming fixes at the requested priority until the stream is dropped.
    fn subscribe(&self, request: UpdateRequest) -> Result<FixStream, PositionError>;
}

/// Receiving end of a sensor subscription. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct FixStream {
    updates: mpsc::Receiver<PositionFix>,
    _cancel: oneshot::Sender<()>,
}

/// Provider side of a [`FixStream`].
#[derive(Debug)]
pub struct FixPublisher {
    updates: mpsc::Sender<PositionFix>,
    cancelled: oneshot::Receiver<()>,
    closed: bool,
}

impl FixStream {
    pub fn channel() -> (FixStream, FixPublisher) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            FixStream {
                updates: rx,
                _cancel: cancel_tx,
            },
            FixPublisher {
                updates: tx,
                cancelled: cancel_rx,
                closed: false,
            },
        )
    }

    /// Next update, or `None` once the provider stops publishing.
    pub async fn next(&mut self) -> Option<PositionFix> {
        self.updates.recv().await
    }
}

impl FixPublisher {
    /// Returns false once the subscriber is gone.
    pub async fn publish(&self, fix: PositionFix) -> bool {
        self.updates.send(fix).await.is_ok()
    }

    /// Resolves when the subscriber drops its stream.
    pub async fn cancelled(&mut self) {
        if self.closed {
            return;
        }
        let _ = (&mut self.cancelled).await;
        self.closed = true;
    }
}

/// Spawn a task publishing `next()` every `request.interval` until the stream is dropped
/// or `next` runs dry. The first update is published immediately.
pub fn spawn_emitter<F>(request: UpdateRequest, mut next: F) -> FixStream
where
    F: FnMut() -> Option<PositionFix> + Send + 'static,
{
    let (stream, mut publisher) = FixStream::channel();

    tokio::spawn(async move {
        let mut ticker = interval(request.interval.max(MIN_PUBLISH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let cancelled = tokio::select! {
                _ = ticker.tick() => false,
                _ = publisher.cancelled() => true,
            };
            if cancelled {
                break;
            }

            let Some(fix) = next() else {
                break;
            };
            if !publisher.publish(fix).await {
                break;
            }
        }

        log::debug!("location subscription ({}) closed", request.priority);
    });

    stream
}
