pub mod config;
pub mod error;

pub use config::{
    load_dotenv, ConfigLayer, FairshareConfig, SchedulerConfig, SchedulerLayer, ServerConfig,
    ServerLayer, StorageConfig, StorageKind, StorageLayer,
};
pub use error::ConfigError;
