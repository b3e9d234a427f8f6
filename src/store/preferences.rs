//! The persisted preferences record
//!
//! Holds favorites, search history, the network flag and the active
//! account. Collection operations keep both lists free of duplicates.

use crate::types::{Environment, Pubkey};
use serde::{Deserialize, Serialize};

/// Maximum number of search history entries kept
pub const MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Saved addresses, most recently added first
    pub favorites: Vec<String>,
    /// Searched addresses, most recent first
    pub search_history: Vec<String>,
    /// Whether devnet is selected instead of mainnet
    pub is_devnet: bool,
    /// Account connected when the app last ran
    pub active_identity: Option<Pubkey>,
}

impl Preferences {
    pub fn environment(&self) -> Environment {
        Environment::from_devnet_flag(self.is_devnet)
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.is_devnet = environment.is_devnet();
    }

    pub fn toggle_network(&mut self) {
        self.is_devnet = !self.is_devnet;
    }

    /// Add to favorites; returns false if already present
    pub fn add_favorite(&mut self, address: &str) -> bool {
        if self.is_favorite(address) {
            return false;
        }
        self.favorites.insert(0, address.to_string());
        true
    }

    /// Remove from favorites; returns false if absent
    pub fn remove_favorite(&mut self, address: &str) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|a| a != address);
        self.favorites.len() != before
    }

    pub fn is_favorite(&self, address: &str) -> bool {
        self.favorites.iter().any(|a| a == address)
    }

    /// Record a search, moving an existing entry to the front
    pub fn add_to_history(&mut self, address: &str) {
        self.search_history.retain(|a| a != address);
        self.search_history.insert(0, address.to_string());
        self.search_history.truncate(MAX_HISTORY);
    }

    pub fn clear_history(&mut self) {
        self.search_history.clear();
    }
}
