//! Row encoding for blocks and transactions
//!
//! Transactions are grouped by the asset table their type writes into so
//! that each group is inserted with a single batched statement.

use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::errors::{PersistenceError, PersistenceResult};
use crate::types::{
    Address, Block, BlockId, PublicKey, Transaction, TransactionAsset, TransactionId,
    TransactionType,
};

/// Row of the `blocks` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BlockRow {
    pub id: String,
    pub version: i64,
    pub timestamp: i64,
    pub height: i64,
    pub previous_block: Option<String>,
    pub number_of_transactions: i64,
    pub total_amount: i64,
    pub total_fee: i64,
    pub reward: i64,
    pub payload_hash: String,
    pub generator_public_key: String,
    pub block_signature: String,
}

/// Row of the `trs` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub block_id: String,
    pub position: i64,
    #[sqlx(rename = "type")]
    pub tx_type: i64,
    pub timestamp: i64,
    pub sender_public_key: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub amount: i64,
    pub fee: i64,
    pub signature: String,
    /// JSON encoding of the full asset, used to rebuild the transaction
    pub asset: String,
}

/// Type-specific asset tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetTable {
    Transfers,
    Signatures,
    Delegates,
    Votes,
    Multisignatures,
}

impl AssetTable {
    pub fn name(self) -> &'static str {
        match self {
            AssetTable::Transfers => "transfers",
            AssetTable::Signatures => "signatures",
            AssetTable::Delegates => "delegates",
            AssetTable::Votes => "votes",
            AssetTable::Multisignatures => "multisignatures",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            AssetTable::Transfers => &["transaction_id", "data"],
            AssetTable::Signatures => &["transaction_id", "public_key"],
            AssetTable::Delegates => &["transaction_id", "username"],
            AssetTable::Votes => &["transaction_id", "votes"],
            AssetTable::Multisignatures => &["transaction_id", "min", "lifetime", "keysgroup"],
        }
    }

    /// Asset table written by a transaction type
    pub fn for_type(ty: TransactionType) -> AssetTable {
        match ty {
            TransactionType::Transfer => AssetTable::Transfers,
            TransactionType::Signature => AssetTable::Signatures,
            TransactionType::Delegate => AssetTable::Delegates,
            TransactionType::Vote => AssetTable::Votes,
            TransactionType::Multisignature => AssetTable::Multisignatures,
        }
    }
}

/// One row of an asset table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRow {
    Transfer {
        transaction_id: String,
        data: String,
    },
    Signature {
        transaction_id: String,
        public_key: String,
    },
    Delegate {
        transaction_id: String,
        username: String,
    },
    Vote {
        transaction_id: String,
        votes: String,
    },
    Multisignature {
        transaction_id: String,
        min: i64,
        lifetime: i64,
        keysgroup: String,
    },
}

impl AssetRow {
    pub fn table(&self) -> AssetTable {
        match self {
            AssetRow::Transfer { .. } => AssetTable::Transfers,
            AssetRow::Signature { .. } => AssetTable::Signatures,
            AssetRow::Delegate { .. } => AssetTable::Delegates,
            AssetRow::Vote { .. } => AssetTable::Votes,
            AssetRow::Multisignature { .. } => AssetTable::Multisignatures,
        }
    }

    /// Asset row for a transaction, if its type carries type-specific data.
    /// Transfers without a data field write no asset row.
    pub fn from_transaction(tx: &Transaction) -> Option<AssetRow> {
        let transaction_id = tx.id.to_string();
        match &tx.asset {
            TransactionAsset::Transfer { data } => data.as_ref().map(|data| AssetRow::Transfer {
                transaction_id,
                data: data.clone(),
            }),
            TransactionAsset::Signature { public_key } => Some(AssetRow::Signature {
                transaction_id,
                public_key: public_key.to_string(),
            }),
            TransactionAsset::Delegate { username } => Some(AssetRow::Delegate {
                transaction_id,
                username: username.clone(),
            }),
            TransactionAsset::Vote { votes } => Some(AssetRow::Vote {
                transaction_id,
                votes: votes.join(","),
            }),
            TransactionAsset::Multisignature {
                min,
                lifetime,
                keysgroup,
            } => Some(AssetRow::Multisignature {
                transaction_id,
                min: i64::from(*min),
                lifetime: i64::from(*lifetime),
                keysgroup: keysgroup.join(","),
            }),
        }
    }
}

/// Every row a block writes, grouped for batched inserts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatches {
    pub transactions: Vec<TransactionRow>,
    pub assets: BTreeMap<AssetTable, Vec<AssetRow>>,
}

impl RowBatches {
    /// Build the rows for every transaction of `block`, stamping each with
    /// the block id.
    pub fn from_block(block: &Block) -> PersistenceResult<Self> {
        let mut batches = RowBatches::default();

        for (position, tx) in block.transactions.iter().enumerate() {
            batches
                .transactions
                .push(TransactionRow::from_transaction(tx, &block.id, position)?);

            if let Some(asset) = AssetRow::from_transaction(tx) {
                batches.assets.entry(asset.table()).or_default().push(asset);
            }
        }

        Ok(batches)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl BlockRow {
    pub fn from_block(block: &Block) -> PersistenceResult<Self> {
        Ok(Self {
            id: block.id.to_string(),
            version: i64::from(block.version),
            timestamp: i64::from(block.timestamp),
            height: to_i64(block.height, "block height")?,
            previous_block: block.previous_block.as_ref().map(ToString::to_string),
            number_of_transactions: block.transactions.len() as i64,
            total_amount: to_i64(block.total_amount, "block total_amount")?,
            total_fee: to_i64(block.total_fee, "block total_fee")?,
            reward: to_i64(block.reward, "block reward")?,
            payload_hash: block.payload_hash.clone(),
            generator_public_key: block.generator_public_key.to_string(),
            block_signature: block.block_signature.clone(),
        })
    }

    /// Rebuild the block from its row and its transaction rows
    pub fn into_block(self, transactions: Vec<TransactionRow>) -> PersistenceResult<Block> {
        let what = || format!("block {}", self.id);
        let transactions = transactions
            .into_iter()
            .map(TransactionRow::into_transaction)
            .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(Block {
            version: from_i64(self.version, what)?,
            timestamp: from_i64(self.timestamp, what)?,
            height: from_i64(self.height, what)?,
            previous_block: self.previous_block.map(BlockId::from),
            generator_public_key: PublicKey::from(self.generator_public_key),
            total_amount: from_i64(self.total_amount, what)?,
            total_fee: from_i64(self.total_fee, what)?,
            reward: from_i64(self.reward, what)?,
            payload_hash: self.payload_hash,
            block_signature: self.block_signature,
            id: BlockId::from(self.id),
            transactions,
        })
    }
}

impl TransactionRow {
    pub fn from_transaction(
        tx: &Transaction,
        block_id: &BlockId,
        position: usize,
    ) -> PersistenceResult<Self> {
        let asset = serde_json::to_string(&tx.asset).map_err(|e| PersistenceError::Serialization {
            what: format!("asset of transaction {}", tx.id),
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: tx.id.to_string(),
            block_id: block_id.to_string(),
            position: position as i64,
            tx_type: i64::from(tx.transaction_type().tag()),
            timestamp: i64::from(tx.timestamp),
            sender_public_key: tx.sender_public_key.to_string(),
            sender_id: tx.sender_id.to_string(),
            recipient_id: tx.recipient_id.as_ref().map(ToString::to_string),
            amount: to_i64(tx.amount, "transaction amount")?,
            fee: to_i64(tx.fee, "transaction fee")?,
            signature: tx.signature.clone(),
            asset,
        })
    }

    pub fn into_transaction(self) -> PersistenceResult<Transaction> {
        let what = || format!("transaction {}", self.id);
        let asset: TransactionAsset =
            serde_json::from_str(&self.asset).map_err(|e| PersistenceError::Corrupt {
                what: what(),
                reason: e.to_string(),
            })?;

        let stored_type = u8::try_from(self.tx_type)
            .ok()
            .and_then(TransactionType::from_tag);
        if stored_type != Some(asset.transaction_type()) {
            return Err(PersistenceError::Corrupt {
                what: what(),
                reason: format!(
                    "type column {} does not match asset {}",
                    self.tx_type,
                    asset.transaction_type()
                ),
            });
        }

        Ok(Transaction {
            amount: from_i64(self.amount, what)?,
            fee: from_i64(self.fee, what)?,
            timestamp: from_i64(self.timestamp, what)?,
            id: TransactionId::from(self.id),
            asset,
            sender_public_key: PublicKey::from(self.sender_public_key),
            sender_id: Address::from(self.sender_id),
            recipient_id: self.recipient_id.map(Address::from),
            signature: self.signature,
            block_id: Some(BlockId::from(self.block_id)),
        })
    }
}

fn to_i64(value: u64, what: &str) -> PersistenceResult<i64> {
    i64::try_from(value).map_err(|_| PersistenceError::Serialization {
        what: what.to_string(),
        reason: format!("{} exceeds the storable range", value),
    })
}

fn from_i64<T: TryFrom<i64>>(value: i64, what: impl Fn() -> String) -> PersistenceResult<T> {
    T::try_from(value).map_err(|_| PersistenceError::Corrupt {
        what: what(),
        reason: format!("column value {} out of range", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PublicKey {
        PublicKey::new(hex::encode([n; 32]))
    }

    fn mixed_block() -> Block {
        let sender = key(1);
        let mut with_data = Transaction::transfer("t2", &sender, key(2).address(), 3, 0);
        with_data.asset = TransactionAsset::Transfer {
            data: Some("memo".to_string()),
        };
        Block {
            id: BlockId::new("b2"),
            version: 0,
            timestamp: 0,
            height: 2,
            previous_block: Some(BlockId::new("b1")),
            generator_public_key: sender.clone(),
            total_amount: 0,
            total_fee: 0,
            reward: 0,
            payload_hash: String::new(),
            block_signature: String::new(),
            transactions: vec![
                Transaction::transfer("t1", &sender, key(2).address(), 5, 0),
                with_data,
                Transaction::vote("t3", &sender, vec![format!("+{}", key(3))], 0),
                Transaction::delegate("t4", &sender, "genesis_1", 0),
                Transaction::vote("t5", &sender, vec![format!("-{}", key(3))], 0),
            ],
        }
    }

    #[test]
    fn test_rows_are_grouped_by_asset_table() {
        let batches = RowBatches::from_block(&mixed_block()).unwrap();

        assert_eq!(batches.transactions.len(), 5);
        // Plain transfer writes no asset row
        assert_eq!(batches.assets[&AssetTable::Transfers].len(), 1);
        assert_eq!(batches.assets[&AssetTable::Votes].len(), 2);
        assert_eq!(batches.assets[&AssetTable::Delegates].len(), 1);
        assert!(!batches.assets.contains_key(&AssetTable::Signatures));

        for rows in batches.assets.values() {
            let table = rows[0].table();
            assert!(rows.iter().all(|row| row.table() == table));
        }
    }

    #[test]
    fn test_transaction_rows_carry_block_id_and_position() {
        let batches = RowBatches::from_block(&mixed_block()).unwrap();
        for (i, row) in batches.transactions.iter().enumerate() {
            assert_eq!(row.block_id, "b2");
            assert_eq!(row.position, i as i64);
        }
    }

    #[test]
    fn test_transaction_row_rebuilds_transaction() {
        let block = mixed_block();
        let row = TransactionRow::from_transaction(&block.transactions[2], &block.id, 2).unwrap();
        let tx = row.into_transaction().unwrap();
        assert_eq!(tx.asset, block.transactions[2].asset);
        assert_eq!(tx.block_id, Some(BlockId::new("b2")));
    }

    #[test]
    fn test_mismatched_type_column_is_corrupt() {
        let block = mixed_block();
        let mut row = TransactionRow::from_transaction(&block.transactions[0], &block.id, 0).unwrap();
        row.tx_type = 3;
        assert!(matches!(
            row.into_transaction(),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_amount_out_of_range_is_rejected() {
        let mut block = mixed_block();
        block.transactions[0].amount = u64::MAX;
        assert!(matches!(
            RowBatches::from_block(&block),
            Err(PersistenceError::Serialization { .. })
        ));
    }
}
