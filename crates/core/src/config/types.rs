use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Partial layers ──────────────────────────────────────────────────

/// One source of configuration values. Unset values fall through to the
/// layer underneath when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub server: ServerLayer,

    #[serde(default)]
    pub storage: StorageLayer,

    #[serde(default)]
    pub scheduler: SchedulerLayer,
}

/// `[server]` section: the WebSocket listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerLayer {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Reply to each client message with an ack/nack frame.
    pub reply_acks: Option<bool>,
}

/// `[storage]` section: where queue and job state lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageLayer {
    /// `"memory"` or `"redis"`.
    pub backend: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// `[scheduler]` section: admission and dispatch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerLayer {
    /// Ceiling on simultaneously running jobs.
    pub maximum: Option<usize>,
    /// Dispatch loop wake interval in milliseconds.
    pub tick_ms: Option<u64>,
    /// Running jobs older than this many seconds are released. Unset means
    /// running jobs are held until explicitly completed.
    pub lease_secs: Option<u64>,
}

// ── Resolved config ─────────────────────────────────────────────────

/// Fully validated configuration the server runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct FairshareConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub reply_acks: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub kind: StorageKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// Process-local state, lost on restart.
    Memory,
    Redis { host: String, port: u16 },
}

impl StorageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Redis { .. } => "redis",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub maximum: usize,
    pub tick: Duration,
    pub lease: Option<Duration>,
}

pub(crate) const DEFAULT_TICK_MS: u64 = 1000;
