//! Single-flight file lease lock with stale-lock recovery.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ClassifierError;

pub struct LeaseLock {
    path: PathBuf,
    stale_after: Duration,
}

impl LeaseLock {
    /// `stale_after` should be `max(60s, 3 × cycle interval)` so a crashed
    /// holder cannot stall classification forever.
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after: stale_after.max(Duration::from_secs(60)),
        }
    }

    /// Try to take the lease. Returns false when another live holder has it.
    pub fn acquire(&self) -> Result<bool, ClassifierError> {
        if let Ok(meta) = std::fs::metadata(&self.path) {
            let age = meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default();
            if age > self.stale_after {
                warn!(path = %self.path.display(), age_secs = age.as_secs(), "breaking stale classifier lock");
                let _ = std::fs::remove_file(&self.path);
            }
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                debug!(path = %self.path.display(), "acquired classifier lock");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn release(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LeaseLock::new(dir.path().join("classifier.lock"), Duration::from_secs(60));
        assert!(lock.acquire().unwrap());
        assert!(!lock.acquire().unwrap());
        lock.release();
        assert!(lock.acquire().unwrap());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.lock");
        std::fs::write(&path, "12345").unwrap();
        // Backdate the lock beyond the floor.
        let stale = std::time::SystemTime::now() - Duration::from_secs(600);
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(stale).unwrap();
        drop(file);

        let lock = LeaseLock::new(&path, Duration::from_secs(60));
        assert!(lock.acquire().unwrap());
    }
}
