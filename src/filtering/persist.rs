//! Persistence hook for rewrite changes.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::config::{load_config, save_config, AppConfig, ConfigError};
use crate::rewrite::RewriteEntry;

/// Called after every successful rewrite mutation with the full list.
pub trait ConfigPersister: Send + Sync {
    fn rewrites_modified(&self, rewrites: &[RewriteEntry]) -> Result<(), ConfigError>;
}

/// Discards changes. Used when running without a config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersister;

impl ConfigPersister for NoopPersister {
    fn rewrites_modified(&self, _rewrites: &[RewriteEntry]) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Writes the rewrites back into the TOML config file.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
    /// Last known config; only its rewrites are replaced on save.
    config: Mutex<AppConfig>,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    /// Reads and validates the config file this persister writes to.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        load_config(&self.path)
    }

    /// Replaces the base config after a reload so later saves keep the
    /// reloaded settings.
    pub fn set_config(&self, config: AppConfig) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }
}

impl ConfigPersister for FilePersister {
    fn rewrites_modified(&self, rewrites: &[RewriteEntry]) -> Result<(), ConfigError> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        config.filtering.rewrites = rewrites.to_vec();
        save_config(&self.path, &config)?;

        tracing::debug!(path = ?self.path, count = rewrites.len(), "rewrites saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_persister_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.admin.api_key = "secret".into();
        let persister = FilePersister::new(&path, config);

        persister
            .rewrites_modified(&[RewriteEntry::new("example.com", "1.2.3.4")])
            .unwrap();

        let saved = load_config(&path).unwrap();
        assert_eq!(saved.admin.api_key, "secret");
        assert_eq!(saved.filtering.rewrites, vec![RewriteEntry::new("example.com", "1.2.3.4")]);
    }
}
