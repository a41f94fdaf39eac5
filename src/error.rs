//! Error types for telegram-relay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Ambiguous channel title (multiple dialogs named): {0}")]
    AmbiguousChannel(String),

    #[error("Fetch returned no messages for channel: {0}")]
    EmptyFetch(String),

    #[error("Rate limited by service (retry after {retry_after}s)")]
    RateLimited { retry_after: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Forwarding task failed: {0}")]
    Task(String),
}

/// Process exit codes: 1 = config/IO, 2 = channel resolution, 3 = empty fetch.
impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ChannelNotFound(_) | Error::AmbiguousChannel(_) => 2,
            Error::EmptyFetch(_) => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
