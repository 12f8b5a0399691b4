use thiserror::Error;
use ultron_core::UltronError;

/// Failures that end the agent process
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Startup failed: {0}")]
    StartupFatal(#[source] UltronError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}
