//! Scheduling of background work.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("scheduling work failed")]
    Scheduling(Box<dyn std::error::Error + Send + Sync>),
    #[error("no scheduler is available in this context")]
    NotImplemented,
}

/// A boxed unit of background work.
pub type ScheduledFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Submits futures to a bounded worker pool. Query paths hand loads to a
/// scheduler and return immediately; nothing on the sampling path ever
/// waits for scheduled work.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, future: ScheduledFuture) -> Result<(), ScheduleError>;
}

/// A scheduler that refuses all work, for contexts without a runtime.
pub struct NopScheduler;

impl Scheduler for NopScheduler {
    fn schedule(&self, _future: ScheduledFuture) -> Result<(), ScheduleError> {
        Err(ScheduleError::NotImplemented)
    }
}

/// Multi-threading with Tokio.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Captures the current runtime. Panics outside a Tokio runtime; use
    /// [`TokioScheduler::from_handle`] from plain threads.
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, future: ScheduledFuture) -> Result<(), ScheduleError> {
        self.handle.spawn(future);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn nop_scheduler_rejects_work() {
        let result = NopScheduler.schedule(Box::pin(async {}));
        assert!(matches!(result, Err(ScheduleError::NotImplemented)));
    }

    #[tokio::test]
    async fn tokio_scheduler_runs_work() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let scheduler = TokioScheduler::new();
        scheduler
            .schedule(Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
