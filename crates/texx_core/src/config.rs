//! Account configuration.
//!
//! Resolution order: built-in defaults, then `config.json` in the data
//! directory, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use texx_crypto::KdfParams;
use tracing::debug;

use crate::error::CoreError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "texx";
pub const APP_NAME: &str = "texx";
pub const CONFIG_FILE: &str = "config.json";

pub const ENV_DATA_DIR: &str = "TEXX_DATA_DIR";
pub const ENV_PENDING_LIMIT: &str = "TEXX_PENDING_LIMIT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    /// Undecryptable received messages held per peer.
    pub pending_limit: usize,
    /// Consecutive wrong passphrases before the account is wiped.
    pub max_pin_attempts: u32,
    pub kdf: KdfParams,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().unwrap_or_else(|_| PathBuf::from(".texx")),
            pending_limit: 64,
            max_pin_attempts: 3,
            kdf: KdfParams::default(),
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf, CoreError> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| CoreError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

impl CoreConfig {
    /// Defaults rooted at `dir`, ignoring files and environment.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit;
        self
    }

    /// Full resolution: `TEXX_DATA_DIR` (or the platform default) picks the
    /// directory, then [`CoreConfig::load_from`].
    pub fn load() -> Result<Self, CoreError> {
        let dir = match std::env::var(ENV_DATA_DIR) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };
        Self::load_from(&dir)
    }

    pub fn load_from(dir: &Path) -> Result<Self, CoreError> {
        let mut config = match fs::read(dir.join(CONFIG_FILE)) {
            Ok(data) => serde_json::from_slice::<CoreConfig>(&data)
                .map_err(|e| CoreError::Config(format!("{CONFIG_FILE}: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(CoreError::Config(e.to_string())),
        };
        config.data_dir = dir.to_path_buf();

        if let Ok(limit) = std::env::var(ENV_PENDING_LIMIT) {
            config.pending_limit = limit
                .parse()
                .map_err(|_| CoreError::Config(format!("{ENV_PENDING_LIMIT}={limit:?} is not a number")))?;
        }
        debug!(dir = %config.data_dir.display(), pending_limit = config.pending_limit, "config resolved");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_values_apply_and_data_dir_is_pinned() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"max_pin_attempts": 5, "data_dir": "/somewhere/else"}"#,
        )
        .unwrap();

        let config = CoreConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.max_pin_attempts, 5);
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.kdf, KdfParams::default());
    }

    #[test]
    fn broken_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{").unwrap();
        assert!(matches!(CoreConfig::load_from(dir.path()), Err(CoreError::Config(_))));
    }
}
