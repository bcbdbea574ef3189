//! Persistence gateway operations on the chain core

use tracing::{debug, error, info};

use super::ChainInner;
use crate::errors::{ChainError, ChainResult};
use crate::events::ChainEvent;
use crate::storage::StorageResponse;
use crate::types::{Block, BlockId, ReducedBlock};

impl ChainInner {
    pub(super) async fn save_genesis_block(&self) -> ChainResult<()> {
        self.ensure_running()?;

        if self.store.block_exists(&self.genesis.id).await? {
            debug!("Genesis block {} already persisted", self.genesis.id);
            return Ok(());
        }

        info!("Saving genesis block {}", self.genesis.id);
        self.save_block(&self.genesis).await
    }

    /// Store the block, then publish `transactionsSaved` and run each
    /// transaction's after-save hook in order.
    pub(super) async fn save_block(&self, block: &Block) -> ChainResult<()> {
        self.ensure_running()?;

        let block = block.with_stamped_transactions();
        if let Err(e) = self.store.save_block(&block).await {
            error!("Failed to save block {} at height {}: {}", block.id, block.height, e);
            return Err(e.into());
        }

        let events = vec![ChainEvent::TransactionsSaved(block.transactions.clone())];
        self.events.dispatch(events).await;

        for tx in &block.transactions {
            self.pool
                .after_save(tx)
                .await
                .map_err(|e| ChainError::AfterSave {
                    transaction_id: tx.id.clone(),
                    reason: format!("{:#}", e),
                })?;
        }

        debug!(
            "Block {} saved with {} transactions",
            block.id,
            block.transactions.len()
        );
        Ok(())
    }

    pub(super) async fn delete_block(&self, id: &BlockId) -> ChainResult<()> {
        self.ensure_running()?;

        self.store.delete_block(id).await.map_err(|e| {
            error!("Failed to delete block {}: {}", id, e);
            ChainError::from(e)
        })
    }

    pub(super) async fn delete_after_block(&self, id: &BlockId) -> ChainResult<StorageResponse> {
        self.ensure_running()?;

        let response = self.store.delete_after_block(id).await.map_err(|e| {
            error!("Failed to delete blocks after {}: {}", id, e);
            ChainError::from(e)
        })?;
        info!("Deleted {} block(s) from block {} upward", response.rows_affected, id);
        Ok(response)
    }

    pub(super) async fn broadcast_reduced_block(&self, reduced: ReducedBlock, id: &BlockId, broadcast: bool) {
        let events = vec![ChainEvent::NewBlock {
            block: reduced,
            block_id: id.clone(),
            broadcast,
        }];
        self.events.dispatch(events).await;
        debug!("Reduced block {} broadcasted", id);
    }
}
