//! Asterisk Manager Interface (AMI) client over plain TCP.
//!
//! Implements the `manager_api::ManagerClient` contract: banner check, login,
//! `ActionID`-correlated actions (including event-list responses), and a
//! notice queue for unsolicited events and remote disconnects. Credentials may
//! be auto-detected from a local `manager.conf`.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod frame;

pub use client::AmiClient;
pub use config::AmiConfig;
pub use credentials::{secret_from_manager_conf, DEFAULT_MANAGER_CONF};
pub use error::AmiError;
