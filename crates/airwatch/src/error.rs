use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] airwatch_models::ConfigError),

    #[error("Listener error: {0}")]
    Listener(#[from] airwatch_listener::ListenerError),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
