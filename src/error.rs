//! The ambient error taxonomy shared by both relays and both CLIs.
//!
//! Mid-session I/O errors are not routed through this enum — they are
//! logged and the session is torn down (see `relay::local` / `relay::server`).
//! `AppError` exists for failures that cross a CLI or config boundary and
//! need a distinct exit code or diagnostic.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid key")]
    InvalidKey,

    #[error("invalid config file: {0}")]
    InvalidConfigFile(String),

    #[error("invalid config URL: {0}")]
    InvalidConfigURL(String),

    #[error("failed to dial {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}
