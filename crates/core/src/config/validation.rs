use std::time::Duration;

use crate::error::ConfigError;

use super::types::{
    ConfigLayer, FairshareConfig, SchedulerConfig, ServerConfig, StorageConfig, StorageKind,
    DEFAULT_TICK_MS,
};

impl ConfigLayer {
    /// Validate the merged layer and produce the runtime config.
    pub fn resolve(self) -> Result<FairshareConfig, ConfigError> {
        Ok(FairshareConfig {
            server: self.resolve_server()?,
            storage: self.resolve_storage()?,
            scheduler: self.resolve_scheduler()?,
        })
    }

    fn resolve_server(&self) -> Result<ServerConfig, ConfigError> {
        let host = non_empty(self.server.host.as_deref(), "server.host")?;
        let port = non_zero_port(self.server.port, "server.port")?;
        Ok(ServerConfig {
            host,
            port,
            reply_acks: self.server.reply_acks.unwrap_or(false),
        })
    }

    fn resolve_storage(&self) -> Result<StorageConfig, ConfigError> {
        let kind = match self.storage.backend.as_deref().unwrap_or("memory") {
            "memory" => StorageKind::Memory,
            "redis" => StorageKind::Redis {
                host: non_empty(self.storage.host.as_deref(), "storage.host")?,
                port: non_zero_port(self.storage.port, "storage.port")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    field: "storage.backend",
                    reason: format!("unknown backend '{other}', expected 'memory' or 'redis'"),
                })
            }
        };
        Ok(StorageConfig { kind })
    }

    fn resolve_scheduler(&self) -> Result<SchedulerConfig, ConfigError> {
        let maximum = self
            .scheduler
            .maximum
            .ok_or(ConfigError::Missing("scheduler.maximum"))?;
        if maximum == 0 {
            tracing::warn!("scheduler.maximum is 0, queued jobs will never be dispatched");
        }

        let tick_ms = self.scheduler.tick_ms.unwrap_or(DEFAULT_TICK_MS);
        if tick_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.tick_ms",
                reason: "must be greater than zero".into(),
            });
        }

        let lease = match self.scheduler.lease_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "scheduler.lease_secs",
                    reason: "must be greater than zero when set".into(),
                })
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(SchedulerConfig {
            maximum,
            tick: Duration::from_millis(tick_ms),
            lease,
        })
    }
}

fn non_empty(value: Option<&str>, field: &'static str) -> Result<String, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(field)),
    }
}

fn non_zero_port(value: Option<u16>, field: &'static str) -> Result<u16, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            field,
            reason: "port must be in 1..=65535".into(),
        }),
        Some(port) => Ok(port),
        None => Err(ConfigError::Missing(field)),
    }
}
