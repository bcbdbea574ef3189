//! Rollback coordinator
//!
//! Reverses the head block. Runs inside the block sequence, so it never
//! interleaves with block application or another rollback.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::apply::sender_unresolved;
use super::{Chain, ChainInner};
use crate::errors::{ChainError, ChainResult, LedgerFault};
use crate::types::Block;

impl ChainInner {
    pub(super) async fn delete_last_block(&self) -> ChainResult<Arc<Block>> {
        self.ensure_running()?;

        let head = self.head.get().ok_or(ChainError::HeadNotSet)?;
        warn!("Deleting last block: {} at height {}", head.id, head.height);

        if head.is_genesis() {
            return Err(ChainError::CannotDeleteGenesis);
        }

        let _active = self.activity.raise();
        let parent = self.pop_last_block(&head).await?;
        self.head.set(Arc::clone(&parent));

        info!("Chain head moved back to {} at height {}", parent.id, parent.height);
        Ok(parent)
    }

    /// Undo `block` and delete its row. Returns its parent.
    async fn pop_last_block(&self, block: &Block) -> ChainResult<Arc<Block>> {
        let parent = match &block.previous_block {
            Some(parent_id) => self.store.load_block(parent_id).await?,
            None => None,
        };
        let parent = parent.ok_or_else(|| {
            error!("Parent of block {} is not persisted", block.id);
            ChainError::Rollback("previousBlock is null".to_string())
        })?;

        for tx in block.transactions.iter().rev() {
            let sender = match self.accounts.resolve(&tx.sender_public_key).await {
                Ok(sender) => sender,
                Err(e) => return Err(self.fatal(sender_unresolved(block, tx, e))),
            };

            if let Err(failure) = self.balances.undo(tx, block, &sender).await {
                return Err(self.fatal(LedgerFault::UndoFailed(failure)));
            }
        }

        if let Err(e) = self.store.delete_block(&block.id).await {
            return Err(self.fatal(LedgerFault::BlockDeletion {
                block_id: block.id.clone(),
                reason: e.to_string(),
            }));
        }

        Ok(Arc::new(parent))
    }

    pub(super) async fn restore_head(&self) -> ChainResult<Option<Arc<Block>>> {
        self.ensure_running()?;

        match self.store.load_last_block().await? {
            Some(block) => {
                info!("Restored chain head {} at height {}", block.id, block.height);
                let block = Arc::new(block);
                self.head.set(Arc::clone(&block));
                Ok(Some(block))
            }
            None => {
                info!("No persisted blocks, chain head left unset");
                Ok(None)
            }
        }
    }
}

/// Drop the head block after a failed chain comparison
pub(super) async fn recover_chain(chain: &Chain) -> ChainResult<Arc<Block>> {
    warn!("Chain comparison failed, starting recovery");

    match chain.delete_last_block().await {
        Ok(block) => {
            info!("Recovery complete, new last block: {}", block.id);
            Ok(block)
        }
        Err(e) => {
            error!("Recovery failed: {}", e);
            Err(e)
        }
    }
}
