//! Block record

use serde::{Deserialize, Serialize};

use super::{BlockId, PublicKey, Transaction, TransactionId};

/// Height of the genesis block
pub const GENESIS_HEIGHT: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub timestamp: u32,
    pub height: u64,
    /// Parent block. `None` only for the genesis block.
    #[serde(default)]
    pub previous_block: Option<BlockId>,
    pub generator_public_key: PublicKey,
    #[serde(default)]
    pub total_amount: u64,
    #[serde(default)]
    pub total_fee: u64,
    #[serde(default)]
    pub reward: u64,
    #[serde(default)]
    pub payload_hash: String,
    #[serde(default)]
    pub block_signature: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.height == GENESIS_HEIGHT
    }

    /// Copy of the block with `block_id` stamped on every transaction
    pub fn with_stamped_transactions(&self) -> Block {
        let mut block = self.clone();
        for tx in block.transactions.iter_mut() {
            tx.block_id = Some(block.id.clone());
        }
        block
    }

    /// Header-only view used when relaying a block to peers
    pub fn reduce(&self) -> ReducedBlock {
        ReducedBlock {
            id: self.id.clone(),
            version: self.version,
            timestamp: self.timestamp,
            height: self.height,
            previous_block: self.previous_block.clone(),
            generator_public_key: self.generator_public_key.clone(),
            number_of_transactions: self.transactions.len() as u32,
            total_amount: self.total_amount,
            total_fee: self.total_fee,
            reward: self.reward,
            payload_hash: self.payload_hash.clone(),
            block_signature: self.block_signature.clone(),
            transaction_ids: self.transactions.iter().map(|tx| tx.id.clone()).collect(),
        }
    }
}

/// Network-ready block shape: header plus ordered transaction ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducedBlock {
    pub id: BlockId,
    pub version: u32,
    pub timestamp: u32,
    pub height: u64,
    pub previous_block: Option<BlockId>,
    pub generator_public_key: PublicKey,
    pub number_of_transactions: u32,
    pub total_amount: u64,
    pub total_fee: u64,
    pub reward: u64,
    pub payload_hash: String,
    pub block_signature: String,
    pub transaction_ids: Vec<TransactionId>,
}
