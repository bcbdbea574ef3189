//! Core Chain Types
//!
//! Identifiers and domain records shared by the persistence gateway, the
//! balance applicator and the rollback coordinator.
//!
//! Identifiers are opaque strings on the wire and in the relational store.
//! They are wrapped in newtypes so a block id can never be passed where a
//! transaction id is expected.

pub mod account;
pub mod block;
pub mod transaction;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use account::Account;
pub use block::{Block, ReducedBlock, GENESIS_HEIGHT};
pub use transaction::{Transaction, TransactionAsset, TransactionType};

/// Identity of a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

/// Identity of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

/// Hex-encoded ed25519 public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub String);

/// Account address, derived from a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(BlockId);
string_id!(TransactionId);
string_id!(PublicKey);
string_id!(Address);

impl PublicKey {
    /// Decode the key bytes. Returns `None` for malformed hex.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(&self.0).ok()
    }

    /// Derive the account address owned by this key
    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl Address {
    /// Derive an address from a public key.
    ///
    /// The address is the first 8 bytes of the BLAKE3 digest of the key
    /// bytes read as a little-endian integer, suffixed with `L`. Keys that
    /// are not valid hex are hashed as their UTF-8 text.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let bytes = public_key
            .to_bytes()
            .unwrap_or_else(|| public_key.as_str().as_bytes().to_vec());
        let digest = blake3::hash(&bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self(format!("{}L", u64::from_le_bytes(head)))
    }
}
