//! Domain error taxonomy.
//!
//! Every failure surfaced over the tool protocol carries one of these
//! variants; [`TeamsError::kind`] yields the wire string for the error
//! envelope. I/O and serialization failures fold into [`TeamsError::Storage`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TeamsError>;

/// Closed error set for all coordination operations.
#[derive(Debug, Error)]
pub enum TeamsError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("dependency cycle: {0}")]
    Cycle(String),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl TeamsError {
    /// The `kind` string reported in the protocol error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            TeamsError::InvalidArg(_) => "ErrInvalidArg",
            TeamsError::InvalidName(_) => "ErrInvalidName",
            TeamsError::NotFound(_) => "ErrNotFound",
            TeamsError::Exists(_) => "ErrExists",
            TeamsError::Busy(_) => "ErrBusy",
            TeamsError::Cycle(_) => "ErrCycle",
            TeamsError::UnknownTemplate(_) => "ErrUnknownTemplate",
            TeamsError::IllegalTransition(_) => "ErrIllegalTransition",
            TeamsError::Spawn(_) => "ErrSpawn",
            TeamsError::Storage(_) => "ErrStorage",
            TeamsError::Timeout(_) => "ErrTimeout",
        }
    }
}

impl From<std::io::Error> for TeamsError {
    fn from(err: std::io::Error) -> Self {
        TeamsError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TeamsError {
    fn from(err: serde_json::Error) -> Self {
        TeamsError::Storage(err.to_string())
    }
}
