use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("manager connection was lost")]
    ConnectionLost,

    #[error("channel directory unavailable: {reason}")]
    DirectoryUnavailable { reason: String },

    #[error("{action} on {channel} failed: {reason}")]
    ActionFailed {
        action: &'static str,
        channel: String,
        reason: String,
    },

    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

impl RelayError {
    pub fn action_failed(
        action: &'static str,
        channel: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            action,
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
