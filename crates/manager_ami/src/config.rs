use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::{detect_password, DEFAULT_MANAGER_CONF};
use crate::error::AmiError;

pub const DEFAULT_AMI_HOST: &str = "127.0.0.1";
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Connection settings for an AMI session.
#[derive(Debug, Clone)]
pub struct AmiConfig {
    /// Host name or address of the Asterisk server.
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Explicit password. When absent, local connections fall back to manager.conf.
    pub password: Option<String>,
    /// manager.conf consulted for password auto-detection.
    pub manager_conf: PathBuf,
    pub connect_timeout: Duration,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_AMI_HOST.to_string(),
            port: DEFAULT_AMI_PORT,
            username: String::new(),
            password: None,
            manager_conf: PathBuf::from(DEFAULT_MANAGER_CONF),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl AmiConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_manager_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.manager_conf = path.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_local_host(&self) -> bool {
        matches!(self.host.as_str(), "127.0.0.1" | "localhost" | "::1")
    }

    /// Explicit password, or the manager.conf secret when connecting locally.
    pub fn resolve_password(&self) -> Result<String, AmiError> {
        if let Some(password) = self.password.as_deref().filter(|value| !value.is_empty()) {
            return Ok(password.to_string());
        }
        if !self.is_local_host() {
            return Err(AmiError::PasswordRequired {
                username: self.username.clone(),
                host: self.host.clone(),
            });
        }
        detect_password(&self.manager_conf, &self.username)
    }
}
