//! Error types shared across the agent.

use std::fmt::{Display, Formatter};

/// Shared agent result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Agent error enumeration covering all domain failure modes.
///
/// Network-class failures (unreachable servers, lost datagrams, failed
/// lookups) never surface here; the connection manager absorbs them and
/// retries. Only conditions the agent cannot reason about safely do.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Shared key could not be loaded from the keychain or environment.
    Credential(String),
    /// Resolver channel desynchronization. Always fatal.
    Resolver(String),
    /// Audit record could not be written.
    Audit(String),
    /// File-system or socket operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Credential(msg) => write!(f, "credential: {msg}"),
            Self::Resolver(msg) => write!(f, "resolver: {msg}"),
            Self::Audit(msg) => write!(f, "audit: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
