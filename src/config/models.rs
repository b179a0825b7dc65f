use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ledger::{MARK_LOCK, STATE_TIME_FORMAT, UNSET};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Coordination service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory searched for ledger files by stem
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,
    /// Optional allow-list of client addresses; empty accepts everyone
    #[serde(default)]
    pub accepted_clients: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_dir: default_ledger_dir(),
            accepted_clients: Vec::new(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from("data/records")
}

/// Per-ledger conventions: sentinel labels and the state-time format.
///
/// These are configuration, not process-wide constants, so ledgers with
/// different conventions can coexist in one process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_mark_open")]
    pub mark_open: String,
    #[serde(default = "default_mark_lock")]
    pub mark_lock: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mark_open: default_mark_open(),
            mark_lock: default_mark_lock(),
            time_format: default_time_format(),
        }
    }
}

fn default_mark_open() -> String {
    UNSET.to_owned()
}

fn default_mark_lock() -> String {
    MARK_LOCK.to_owned()
}

fn default_time_format() -> String {
    STATE_TIME_FORMAT.to_owned()
}

/// Worker client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
