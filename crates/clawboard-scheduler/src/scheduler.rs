//! Interval scheduler with graceful shutdown.
//!
//! Each worker is an independent tokio task driven by a ticker; all tasks
//! share one cancellation token so shutdown is a single signal. Ticks never
//! overlap within one job because the job future is awaited before the next
//! tick is taken.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a periodic job. The first tick fires after one interval.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, interval: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let token = self.token.clone();
        info!(job = name, interval_ms = interval.as_millis() as u64, "scheduling job");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The immediate first tick of tokio's interval is skipped so a
            // fresh process does not stampede every worker at once.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(job = name, "job cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        job().await;
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Signal all jobs and wait for them to finish their current tick.
    pub async fn shutdown(self) {
        info!("scheduler shutting down");
        self.token.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("scheduler shutdown complete");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_tick_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let ticks = counter.clone();
        scheduler.spawn("probe", Duration::from_millis(10), move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;
        let after_shutdown = counter.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_shutdown);
    }
}
