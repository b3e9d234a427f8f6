//! Configuration for the wallet core

pub mod rpc;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable holding the base-58 keypair for the local signer
pub const KEYPAIR_ENV: &str = "SOLVIEW_KEYPAIR";

/// Identity the app presents to the wallet during authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub name: String,
    pub uri: String,
    pub icon: String,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            name: "SolView".to_string(),
            uri: "https://solview.io".to_string(),
            icon: "favicon.ico".to_string(),
        }
    }
}

/// Hard ceiling on broadcast attempts per send, whatever the config says
pub const MAX_BROADCAST_ATTEMPTS: u32 = 3;

/// Tuning for the send pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Pause between signing and broadcast (milliseconds, 0 disables)
    ///
    /// Some mobile wallets need a moment to hand foreground control back.
    pub post_sign_delay_ms: u64,
    /// Total broadcast attempts, including the first (1 to 3)
    pub broadcast_attempts: u32,
    /// Fixed delay between broadcast attempts (milliseconds)
    pub broadcast_retry_delay_ms: u64,
    /// Node-side rebroadcast count passed with each send
    pub node_max_retries: Option<usize>,
    /// Interval between confirmation status polls (milliseconds)
    pub confirm_poll_interval_ms: u64,
}

impl SendConfig {
    /// Configured attempts clamped to `1..=MAX_BROADCAST_ATTEMPTS`
    pub fn max_broadcast_attempts(&self) -> u32 {
        self.broadcast_attempts.clamp(1, MAX_BROADCAST_ATTEMPTS)
    }

    pub fn post_sign_delay(&self) -> Duration {
        Duration::from_millis(self.post_sign_delay_ms)
    }

    pub fn broadcast_retry_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_retry_delay_ms)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            post_sign_delay_ms: 500,
            broadcast_attempts: 3,
            broadcast_retry_delay_ms: 1_000,
            node_max_retries: None,
            confirm_poll_interval_ms: 1_000,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity shown by the wallet when authorizing
    #[serde(default)]
    pub app_identity: AppIdentity,
    /// Send pipeline settings
    #[serde(default)]
    pub send: SendConfig,
    /// Directory holding persisted preferences
    pub store_dir: Option<PathBuf>,
    /// Path to the send journal (JSONL), disabled when absent
    pub journal_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Preferences directory, falling back to `.solview` in the working directory
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".solview"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_identity: AppIdentity::default(),
            send: SendConfig::default(),
            store_dir: None,
            journal_path: Some(PathBuf::from(".solview/sends.jsonl")),
        }
    }
}
