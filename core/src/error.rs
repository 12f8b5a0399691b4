use thiserror::Error;

use crate::types::NetworkId;

/// Failure classes used to decide how far an error may travel.
///
/// Only `StartupFatal` is allowed to terminate the process. Everything else is
/// contained at the smallest scope that produced it (one network, one
/// transaction, one retrain attempt, one collaborator call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StartupFatal,
    NetworkTransient,
    ModelFailure,
    CollaboratorFailure,
    Internal,
}

#[derive(Error, Debug)]
pub enum UltronError {
    #[error("No healthy endpoints: every configured network failed its liveness check")]
    NoHealthyEndpoints,

    #[error("Network not found in registry: {0}")]
    NotFound(NetworkId),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("AI inference error: {0}")]
    InferenceError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UltronError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UltronError::NoHealthyEndpoints | UltronError::ConfigError(_) => {
                ErrorKind::StartupFatal
            }
            UltronError::NotFound(_)
            | UltronError::RpcError(_)
            | UltronError::NetworkError(_)
            | UltronError::Timeout(_)
            | UltronError::ParseError(_)
            | UltronError::ConnectionError(_)
            | UltronError::InvalidTransaction(_) => ErrorKind::NetworkTransient,
            UltronError::InferenceError(_) | UltronError::TrainingError(_) => {
                ErrorKind::ModelFailure
            }
            UltronError::SigningError(_)
            | UltronError::NotificationError(_)
            | UltronError::ReportError(_) => ErrorKind::CollaboratorFailure,
            UltronError::SerializationError(_) | UltronError::Other(_) => ErrorKind::Internal,
        }
    }

    /// True for errors that should be retried on the next tick.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::NetworkTransient
    }
}

pub type Result<T> = std::result::Result<T, UltronError>;
