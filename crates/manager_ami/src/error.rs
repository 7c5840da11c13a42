use std::path::PathBuf;

use manager_api::ManagerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmiError {
    #[error("failed to connect to manager at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected greeting from {addr}: {banner:?}")]
    Banner { addr: String, banner: String },

    #[error("I/O error on manager connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("login rejected for user {username}: {message}")]
    LoginRejected { username: String, message: String },

    #[error("no password given for user {username} and no secret found in {path}")]
    MissingPassword { username: String, path: PathBuf },

    #[error("no password given for user {username} and host {host} is not local")]
    PasswordRequired { username: String, host: String },

    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl AmiError {
    #[must_use]
    pub fn connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }

    #[must_use]
    pub fn config_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }
}
