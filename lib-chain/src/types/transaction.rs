//! Transaction record and its type-specific asset

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Address, BlockId, PublicKey, TransactionId};

/// Numeric transaction type tag as stored in the `trs.type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    Signature,
    Delegate,
    Vote,
    Multisignature,
}

impl TransactionType {
    pub fn tag(self) -> u8 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Signature => 1,
            TransactionType::Delegate => 2,
            TransactionType::Vote => 3,
            TransactionType::Multisignature => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TransactionType::Transfer),
            1 => Some(TransactionType::Signature),
            2 => Some(TransactionType::Delegate),
            3 => Some(TransactionType::Vote),
            4 => Some(TransactionType::Multisignature),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Signature => "signature",
            TransactionType::Delegate => "delegate",
            TransactionType::Vote => "vote",
            TransactionType::Multisignature => "multisignature",
        };
        f.write_str(name)
    }
}

/// Type-specific payload. Opaque to the chain core apart from the tag and
/// the asset table it is persisted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionAsset {
    Transfer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// Registers a second signature key
    Signature { public_key: PublicKey },
    Delegate { username: String },
    /// `+<publicKey>` adds a vote, `-<publicKey>` removes one
    Vote { votes: Vec<String> },
    Multisignature {
        min: u8,
        lifetime: u32,
        keysgroup: Vec<String>,
    },
}

impl TransactionAsset {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionAsset::Transfer { .. } => TransactionType::Transfer,
            TransactionAsset::Signature { .. } => TransactionType::Signature,
            TransactionAsset::Delegate { .. } => TransactionType::Delegate,
            TransactionAsset::Vote { .. } => TransactionType::Vote,
            TransactionAsset::Multisignature { .. } => TransactionType::Multisignature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub asset: TransactionAsset,
    pub sender_public_key: PublicKey,
    pub sender_id: Address,
    #[serde(default)]
    pub recipient_id: Option<Address>,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub timestamp: u32,
    #[serde(default)]
    pub signature: String,
    /// Assigned when the containing block is persisted
    #[serde(default)]
    pub block_id: Option<BlockId>,
}

impl Transaction {
    /// Build a transfer of `amount` from `sender` to `recipient`
    pub fn transfer(
        id: impl Into<TransactionId>,
        sender: &PublicKey,
        recipient: Address,
        amount: u64,
        fee: u64,
    ) -> Self {
        Self {
            id: id.into(),
            asset: TransactionAsset::Transfer { data: None },
            sender_public_key: sender.clone(),
            sender_id: sender.address(),
            recipient_id: Some(recipient),
            amount,
            fee,
            timestamp: 0,
            signature: String::new(),
            block_id: None,
        }
    }

    /// Build a vote transaction; votes are `+key` / `-key` strings
    pub fn vote(id: impl Into<TransactionId>, sender: &PublicKey, votes: Vec<String>, fee: u64) -> Self {
        Self {
            id: id.into(),
            asset: TransactionAsset::Vote { votes },
            sender_public_key: sender.clone(),
            sender_id: sender.address(),
            recipient_id: Some(sender.address()),
            amount: 0,
            fee,
            timestamp: 0,
            signature: String::new(),
            block_id: None,
        }
    }

    /// Build a delegate registration
    pub fn delegate(id: impl Into<TransactionId>, sender: &PublicKey, username: &str, fee: u64) -> Self {
        Self {
            id: id.into(),
            asset: TransactionAsset::Delegate {
                username: username.to_string(),
            },
            sender_public_key: sender.clone(),
            sender_id: sender.address(),
            recipient_id: None,
            amount: 0,
            fee,
            timestamp: 0,
            signature: String::new(),
            block_id: None,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.asset.transaction_type()
    }

    pub fn is_vote(&self) -> bool {
        self.transaction_type() == TransactionType::Vote
    }
}
