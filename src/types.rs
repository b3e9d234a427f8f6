//! Shared Solana types: account identities, signatures, blockhashes,
//! network environments and lamport conversions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub const PUBKEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;
pub const HASH_BYTES: usize = 32;

/// Error produced when a base-58/base-64 string is not a well-formed key or hash
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(bytes: Vec<u8>) -> Result<[u8; N], ParseError> {
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseError::Length { expected: N, actual })
}

fn decode_base58<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| ParseError::Encoding(e.to_string()))?;
    decode_fixed(bytes)
}

macro_rules! base58_string_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// An account identity (ed25519 public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    /// The system program, owner of plain SOL accounts
    pub const SYSTEM_PROGRAM: Pubkey = Pubkey([0u8; PUBKEY_BYTES]);

    pub const fn new(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Decode the base-64 form used by mobile wallet authorization results
    pub fn from_base64(encoded: &str) -> Result<Self, ParseError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ParseError::Encoding(e.to_string()))?;
        decode_fixed(bytes).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_BYTES] {
        &self.0
    }

    /// Shortened `abcd...wxyz` rendering for compact display
    pub fn abbreviated(&self) -> String {
        let full = self.to_string();
        if full.len() <= 8 {
            return full;
        }
        format!("{}...{}", &full[..4], &full[full.len() - 4..])
    }
}

impl FromStr for Pubkey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_base58(s.trim()).map(Self)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

base58_string_serde!(Pubkey);

/// A transaction signature, which doubles as the transaction id
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_BYTES]);

impl Signature {
    pub const fn new(bytes: [u8; SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_BYTES])
    }
}

impl FromStr for Signature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_base58(s.trim()).map(Self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

base58_string_serde!(Signature);

/// A recent blockhash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash([u8; HASH_BYTES]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }
}

impl FromStr for Hash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_base58(s.trim()).map(Self)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

base58_string_serde!(Hash);

/// A recent blockhash together with the last block height at which a
/// transaction referencing it is still accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessToken {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Network environment the wallet operates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Solana devnet
    Test,
    /// Solana mainnet-beta
    #[default]
    Production,
}

impl Environment {
    pub fn from_devnet_flag(is_devnet: bool) -> Self {
        if is_devnet {
            Environment::Test
        } else {
            Environment::Production
        }
    }

    pub fn is_devnet(&self) -> bool {
        matches!(self, Environment::Test)
    }

    /// Solana cluster name
    pub fn cluster(&self) -> &'static str {
        match self {
            Environment::Test => "devnet",
            Environment::Production => "mainnet-beta",
        }
    }

    /// Chain identifier used in wallet authorization requests
    pub fn chain_id(&self) -> String {
        format!("solana:{}", self.cluster())
    }

    pub fn toggled(&self) -> Self {
        match self {
            Environment::Test => Environment::Production,
            Environment::Production => Environment::Test,
        }
    }

    /// Solscan link for a transaction on this environment
    pub fn explorer_url(&self, signature: &Signature) -> String {
        match self {
            Environment::Test => format!("https://solscan.io/tx/{}?cluster=devnet", signature),
            Environment::Production => format!("https://solscan.io/tx/{}", signature),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cluster())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "devnet" | "test" => Ok(Environment::Test),
            "mainnet" | "mainnet-beta" | "production" => Ok(Environment::Production),
            other => Err(format!("Unknown network: {}", other)),
        }
    }
}

/// Convert a display amount of SOL to lamports, rounding to the nearest lamport
///
/// Returns `None` for non-finite, non-positive, or out-of-range amounts and
/// for amounts that round to zero lamports.
pub fn sol_to_lamports(amount_sol: f64) -> Option<u64> {
    if !amount_sol.is_finite() || amount_sol <= 0.0 {
        return None;
    }
    let lamports = (amount_sol * LAMPORTS_PER_SOL as f64).round();
    if lamports < 1.0 || lamports >= u64::MAX as f64 {
        return None;
    }
    Some(lamports as u64)
}

/// Convert lamports to a display amount of SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
