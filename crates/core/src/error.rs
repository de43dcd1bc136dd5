use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Every variant is startup-fatal: the server refuses to run with an
/// incomplete or malformed config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config value: {0}")]
    Missing(&'static str),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}
