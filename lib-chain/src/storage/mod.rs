//! Chain Storage Layer
//!
//! Persistence gateway for blocks and their transactions. All block writes
//! MUST go through the [`BlockStore`] trait.
//!
//! # Invariants
//!
//! 1. **A block is written whole or not at all** - the block row, every
//!    transaction row and every asset row commit in one storage transaction.
//! 2. **Deleting a block deletes its transactions** - transaction and asset
//!    rows cascade from the block row.
//! 3. **No business logic** - the store never inspects balances or accounts.

pub mod rows;
pub mod sqlite_store;

use async_trait::async_trait;

use crate::errors::PersistenceResult;
use crate::types::{Block, BlockId};

pub use rows::{AssetRow, AssetTable, RowBatches};
pub use sqlite_store::SqliteStore;

/// Response of a bulk delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageResponse {
    pub rows_affected: u64,
}

/// Durable block store
#[async_trait]
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    /// Whether a block with this id is persisted
    async fn block_exists(&self, id: &BlockId) -> PersistenceResult<bool>;

    /// Atomically persist a block with all its transactions.
    ///
    /// Transactions are stored with `block_id = block.id` regardless of the
    /// value carried in memory.
    async fn save_block(&self, block: &Block) -> PersistenceResult<()>;

    /// Delete exactly the rows of one block
    async fn delete_block(&self, id: &BlockId) -> PersistenceResult<()>;

    /// Delete every block with height >= height(id)
    async fn delete_after_block(&self, id: &BlockId) -> PersistenceResult<StorageResponse>;

    /// Load a full block with transactions in stored order
    async fn load_block(&self, id: &BlockId) -> PersistenceResult<Option<Block>>;

    /// Load the highest persisted block
    async fn load_last_block(&self) -> PersistenceResult<Option<Block>>;

    async fn count_blocks(&self) -> PersistenceResult<u64>;
}
