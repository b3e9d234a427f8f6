//! RPC endpoint configuration
//!
//! Endpoints are resolved per network environment:
//! 1. Per-cluster env vars (SOLANA_DEVNET_RPC_URL, SOLANA_MAINNET_RPC_URL) - highest priority
//! 2. Provider API key (HELIUS_API_KEY) - builds URLs automatically
//! 3. Public cluster RPCs - rate limited, for testing only
//!
//! # Examples
//!
//! ```bash
//! # Option 1: Per-cluster URLs (recommended for production)
//! export SOLANA_MAINNET_RPC_URL="https://mainnet.helius-rpc.com/?api-key=YOUR_KEY"
//!
//! # Option 2: Single provider API key
//! export HELIUS_API_KEY="YOUR_KEY"
//!
//! # Option 3: No env vars - uses public RPCs (rate limited)
//! ```

use crate::types::Environment;
use std::collections::HashMap;

/// Environment variable names
mod env_vars {
    pub const DEVNET_RPC_URL: &str = "SOLANA_DEVNET_RPC_URL";
    pub const MAINNET_RPC_URL: &str = "SOLANA_MAINNET_RPC_URL";
    pub const HELIUS_API_KEY: &str = "HELIUS_API_KEY";
}

/// Public cluster endpoints (rate limited)
mod public_rpcs {
    pub const DEVNET: &str = "https://api.devnet.solana.com";
    pub const MAINNET: &str = "https://api.mainnet-beta.solana.com";
}

/// RPC endpoints for each network environment
#[derive(Debug, Clone)]
pub struct RpcConfig {
    urls: HashMap<Environment, String>,
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        if let Ok(url) = std::env::var(env_vars::DEVNET_RPC_URL) {
            tracing::debug!("Using SOLANA_DEVNET_RPC_URL for devnet");
            urls.insert(Environment::Test, url);
        }
        if let Ok(url) = std::env::var(env_vars::MAINNET_RPC_URL) {
            tracing::debug!("Using SOLANA_MAINNET_RPC_URL for mainnet");
            urls.insert(Environment::Production, url);
        }

        if let Ok(key) = std::env::var(env_vars::HELIUS_API_KEY) {
            tracing::info!("Building missing RPC URLs from HELIUS_API_KEY");
            urls.entry(Environment::Test)
                .or_insert_with(|| format!("https://devnet.helius-rpc.com/?api-key={}", key));
            urls.entry(Environment::Production)
                .or_insert_with(|| format!("https://mainnet.helius-rpc.com/?api-key={}", key));
        }

        if !urls.contains_key(&Environment::Production) {
            tracing::warn!("No RPC configured for mainnet, using public RPC (rate limited)");
        }
        urls.entry(Environment::Test)
            .or_insert_with(|| public_rpcs::DEVNET.to_string());
        urls.entry(Environment::Production)
            .or_insert_with(|| public_rpcs::MAINNET.to_string());

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<Environment, String>) -> Self {
        Self { urls }
    }

    /// Get the RPC URL for an environment
    pub fn get(&self, environment: Environment) -> Option<&str> {
        self.urls.get(&environment).map(|s| s.as_str())
    }

    /// Get the RPC URL for an environment, validated
    pub fn url(&self, environment: Environment) -> crate::Result<url::Url> {
        let raw = self.get(environment).ok_or_else(|| {
            crate::Error::Config(format!("No RPC URL configured for {}", environment))
        })?;
        raw.parse().map_err(|e| {
            crate::Error::Config(format!("Invalid RPC URL {}: {}", redact_query(raw), e))
        })
    }
}

/// Drops the query string, where providers carry API keys
fn redact_query(raw: &str) -> String {
    match raw.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => raw.to_string(),
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
