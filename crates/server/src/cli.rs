//! Command-line flags and their environment-variable fallbacks.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use fairshare_core::{ConfigLayer, FairshareConfig, SchedulerLayer, ServerLayer, StorageLayer};

/// Config file read when `--config` is not given; missing is fine.
const DEFAULT_CONFIG_FILE: &str = "fairshare.toml";

/// Fair-share WebSocket job dispatcher.
#[derive(Parser, Debug)]
#[command(name = "fairshare", version, about)]
pub struct Cli {
    /// TOML config file. Flags and FAIRSHARE_* variables override it.
    #[arg(long, short, env = "FAIRSHARE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "FAIRSHARE_HOST")]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "FAIRSHARE_PORT")]
    pub port: Option<u16>,

    /// Reply to each client message with an ack/nack frame.
    #[arg(long, env = "FAIRSHARE_REPLY_ACKS")]
    pub reply_acks: Option<bool>,

    /// Storage backend: "memory" or "redis".
    #[arg(long, env = "FAIRSHARE_STORAGE_BACKEND")]
    pub storage_backend: Option<String>,

    /// Storage backend host (redis only).
    #[arg(long, env = "FAIRSHARE_STORAGE_HOST")]
    pub storage_host: Option<String>,

    /// Storage backend port (redis only).
    #[arg(long, env = "FAIRSHARE_STORAGE_PORT")]
    pub storage_port: Option<u16>,

    /// Maximum number of simultaneously running jobs.
    #[arg(long, env = "FAIRSHARE_MAXIMUM")]
    pub maximum: Option<usize>,

    /// Dispatch loop wake interval in milliseconds.
    #[arg(long, env = "FAIRSHARE_TICK_MS")]
    pub tick_ms: Option<u64>,

    /// Release running jobs after this many seconds without completion.
    #[arg(long, env = "FAIRSHARE_LEASE_SECS")]
    pub lease_secs: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "FAIRSHARE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// The flag values as a config layer; unset flags stay unset.
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            server: ServerLayer {
                host: self.host.clone(),
                port: self.port,
                reply_acks: self.reply_acks,
            },
            storage: StorageLayer {
                backend: self.storage_backend.clone(),
                host: self.storage_host.clone(),
                port: self.storage_port,
            },
            scheduler: SchedulerLayer {
                maximum: self.maximum,
                tick_ms: self.tick_ms,
                lease_secs: self.lease_secs,
            },
        }
    }

    /// Merge flags over the config file and validate the result.
    pub fn load_config(&self) -> anyhow::Result<FairshareConfig> {
        let file_layer = match &self.config {
            Some(path) => ConfigLayer::from_file(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?,
            None => ConfigLayer::from_optional_file(DEFAULT_CONFIG_FILE)
                .with_context(|| format!("failed to read config file {DEFAULT_CONFIG_FILE}"))?,
        };

        let config = self
            .to_layer()
            .merge_over(file_layer)
            .resolve()
            .context("invalid configuration")?;
        Ok(config)
    }
}
