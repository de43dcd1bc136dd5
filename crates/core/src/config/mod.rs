//! Layered service configuration.
//!
//! A [`ConfigLayer`] is a partial view where every value is optional. Layers
//! come from a TOML file and from the command line (which also reads
//! `FAIRSHARE_*` environment variables). The CLI layer is merged over the
//! file layer and the result is resolved into a validated
//! [`FairshareConfig`].

mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use types::{
    ConfigLayer, FairshareConfig, SchedulerConfig, SchedulerLayer, ServerConfig, ServerLayer,
    StorageConfig, StorageKind, StorageLayer,
};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}
