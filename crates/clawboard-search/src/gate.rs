//! Single-flight admission gate for search.
//!
//! One search runs at full limits at a time. A caller that cannot take the
//! gate within the short wait runs a degraded pass instead of queueing
//! behind an expensive scan, so the endpoint stays responsive under burst.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default wait before giving up on the gate.
pub const DEFAULT_GATE_WAIT: Duration = Duration::from_millis(150);

pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max_wait: Duration,
}

/// Result of an admission attempt.
pub struct Admission {
    /// Held for the duration of the full-limit pass; `None` means degraded.
    pub permit: Option<OwnedSemaphorePermit>,
    pub wait: Duration,
}

impl Admission {
    pub fn degraded(&self) -> bool {
        self.permit.is_none()
    }
}

impl AdmissionGate {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            max_wait,
        }
    }

    /// Try to take the gate within the configured wait.
    pub async fn admit(&self) -> Admission {
        let started = Instant::now();
        let permit =
            tokio::time::timeout(self.max_wait, self.semaphore.clone().acquire_owned()).await;
        let wait = started.elapsed();
        match permit {
            Ok(Ok(permit)) => Admission {
                permit: Some(permit),
                wait,
            },
            // Timeout or closed semaphore: degrade rather than queue.
            _ => Admission { permit: None, wait },
        }
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uncontended_gate_admits_immediately() {
        let gate = AdmissionGate::default();
        let admission = gate.admit().await;
        assert!(!admission.degraded());
    }

    #[tokio::test]
    async fn contended_gate_degrades() {
        let gate = AdmissionGate::new(Duration::from_millis(20));
        let held = gate.admit().await;
        assert!(!held.degraded());
        let second = gate.admit().await;
        assert!(second.degraded());
        drop(held);
        let third = gate.admit().await;
        assert!(!third.degraded());
    }
}
