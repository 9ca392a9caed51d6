use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Result code errors
    #[error("Unknown result code: {0}")]
    UnknownResultCode(i32),

    #[error("Unknown service class: {0}")]
    UnknownServiceClass(u16),

    // Card errors
    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    // Screen flow errors
    #[error("Invalid state code: {0}")]
    InvalidStateCode(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
