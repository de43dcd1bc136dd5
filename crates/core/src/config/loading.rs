use std::path::Path;

use crate::error::ConfigError;

use super::types::{ConfigLayer, FairshareConfig, SchedulerLayer, ServerLayer, StorageLayer};

impl ConfigLayer {
    /// Parse a layer from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a layer from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load a layer from `path` if it exists, or an empty layer otherwise.
    pub fn from_optional_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading config file");
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using flags only");
            Ok(Self::default())
        }
    }

    /// Stack `self` on top of `base`: any value set here wins.
    pub fn merge_over(self, base: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            server: ServerLayer {
                host: self.server.host.or(base.server.host),
                port: self.server.port.or(base.server.port),
                reply_acks: self.server.reply_acks.or(base.server.reply_acks),
            },
            storage: StorageLayer {
                backend: self.storage.backend.or(base.storage.backend),
                host: self.storage.host.or(base.storage.host),
                port: self.storage.port.or(base.storage.port),
            },
            scheduler: SchedulerLayer {
                maximum: self.scheduler.maximum.or(base.scheduler.maximum),
                tick_ms: self.scheduler.tick_ms.or(base.scheduler.tick_ms),
                lease_secs: self.scheduler.lease_secs.or(base.scheduler.lease_secs),
            },
        }
    }
}

impl FairshareConfig {
    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:     {} (acks: {})", self.server.bind_addr(), self.server.reply_acks);
        match &self.storage.kind {
            super::StorageKind::Memory => tracing::info!("  storage:    memory"),
            super::StorageKind::Redis { host, port } => {
                tracing::info!("  storage:    redis://{}:{}", host, port)
            }
        }
        tracing::info!(
            "  scheduler:  maximum={}, tick={:?}, lease={:?}",
            self.scheduler.maximum,
            self.scheduler.tick,
            self.scheduler.lease
        );
    }
}
