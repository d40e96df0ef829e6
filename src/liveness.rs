use std::sync::Arc;

/// User-visible "tracking is active" indicator required by some hosts for long-running
/// background work.
pub trait ForegroundNotice: Send + Sync {
    fn show(&self, message: &str);
    fn hide(&self);
}

/// Host without a notification surface: transitions are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotice;

impl ForegroundNotice for LogNotice {
    fn show(&self, message: &str) {
        log::debug!("foreground notice shown: {}", message);
    }

    fn hide(&self) {
        log::debug!("foreground notice hidden");
    }
}

/// Keeps the notice visible until dropped.
pub struct LivenessGuard {
    notice: Arc<dyn ForegroundNotice>,
}

impl LivenessGuard {
    pub fn show(notice: Arc<dyn ForegroundNotice>, message: &str) -> Self {
        notice.show(message);
        Self { notice }
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.notice.hide();
    }
}
