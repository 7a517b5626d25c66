//! Consecutive failed-unlock counter.
//!
//! Kept outside the vault record so a wrong passphrase never mutates the
//! vault, and on disk so restarting the process does not reset the lockout.
//! An unreadable counter is `Corrupt`, never zero.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::vault::write_private;

pub const ATTEMPTS_FILE: &str = "attempts.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AttemptState {
    consecutive_failures: u32,
    last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AttemptCounter {
    path: PathBuf,
}

impl AttemptCounter {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(ATTEMPTS_FILE),
        }
    }

    fn load(&self) -> Result<AttemptState, StoreError> {
        match fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AttemptState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn failures(&self) -> Result<u32, StoreError> {
        Ok(self.load()?.consecutive_failures)
    }

    /// Count one more wrong passphrase; returns the new total.
    pub fn record_failure(&self) -> Result<u32, StoreError> {
        let mut state = self.load()?;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Utc::now());
        write_private(&self.path, &serde_json::to_vec(&state)?)?;
        Ok(state.consecutive_failures)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_survive_reload_and_clear() {
        let dir = tempdir().unwrap();
        let counter = AttemptCounter::new(dir.path());
        assert_eq!(counter.failures().unwrap(), 0);
        assert_eq!(counter.record_failure().unwrap(), 1);
        assert_eq!(counter.record_failure().unwrap(), 2);

        let reloaded = AttemptCounter::new(dir.path());
        assert_eq!(reloaded.failures().unwrap(), 2);

        reloaded.clear().unwrap();
        reloaded.clear().unwrap();
        assert_eq!(counter.failures().unwrap(), 0);
    }

    #[test]
    fn garbage_is_corrupt_not_zero() {
        let dir = tempdir().unwrap();
        let counter = AttemptCounter::new(dir.path());
        counter.record_failure().unwrap();
        fs::write(dir.path().join(ATTEMPTS_FILE), b"{not json").unwrap();

        assert!(matches!(counter.failures(), Err(StoreError::Corrupt(_))));
        assert!(matches!(counter.record_failure(), Err(StoreError::Corrupt(_))));

        // A successful unlock may still clear it.
        counter.clear().unwrap();
        assert_eq!(counter.failures().unwrap(), 0);
    }
}
