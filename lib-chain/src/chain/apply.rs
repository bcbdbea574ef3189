//! Block applicator
//!
//! Runs inside the block sequence only.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::progress::ProgressLogger;
use super::ChainInner;
use crate::errors::{ChainError, ChainResult, LedgerFault, RecordedFault, TransactionFault};
use crate::types::{Account, Block, Transaction};

impl ChainInner {
    /// Apply every genesis transaction (non-votes first), then set the head.
    /// Any failure is fatal.
    pub(super) async fn apply_genesis_block(&self, block: Block) -> ChainResult<()> {
        self.ensure_running()?;
        let _active = self.activity.raise();

        let block = block.with_stamped_transactions();
        let mut ordered: Vec<&Transaction> = block.transactions.iter().collect();
        // Stable: relative order inside each group is kept
        ordered.sort_by_key(|tx| tx.is_vote());

        let mut progress = ProgressLogger::new(
            ordered.len(),
            self.progress_step_percent,
            "Genesis block loading",
        );

        for tx in ordered {
            let sender = match self.accounts.resolve_or_create(&tx.sender_public_key).await {
                Ok(sender) => sender,
                Err(e) => return Err(self.fatal(sender_unresolved(&block, tx, e))),
            };

            if let Err(failure) = self
                .balances
                .apply_confirmed_and_unconfirmed(tx, &block, &sender)
                .await
            {
                return Err(self.fatal(LedgerFault::GenesisApply(failure)));
            }
            progress.apply_next();
        }

        info!(
            "Genesis block {} applied with {} transactions",
            block.id,
            block.transactions.len()
        );
        self.head.set(Arc::new(block));
        Ok(())
    }

    /// Apply confirmed effects, advance the head, optionally persist, then
    /// reconcile the pool.
    ///
    /// Transactions that fail to apply are removed from the block before it
    /// becomes head, so the head and the stored row only carry what a
    /// rollback has to undo.
    pub(super) async fn apply_block(&self, mut block: Block, persist: bool) -> ChainResult<()> {
        self.ensure_running()?;
        let _active = self.activity.raise();

        let mut faults = Vec::new();
        let mut rejected = Vec::new();

        for tx in &block.transactions {
            let sender: Account = match self.accounts.resolve(&tx.sender_public_key).await {
                Ok(sender) => sender,
                Err(e) => return Err(self.fatal(sender_unresolved(&block, tx, e))),
            };

            if let Err(failure) = self.balances.apply_confirmed(tx, &block, &sender).await {
                warn!("Failed to apply transaction {}: {}", tx.id, failure);
                self.pool.evict(&tx.id).await;
                warn!("Transaction {} deleted from block {} and pool", tx.id, block.id);
                faults.push(RecordedFault::Transaction(TransactionFault {
                    block_id: block.id.clone(),
                    transaction_id: tx.id.clone(),
                    reason: failure.message,
                }));
                rejected.push(tx.id.clone());
            }
        }

        if !rejected.is_empty() {
            block.transactions.retain(|tx| !rejected.contains(&tx.id));
        }

        let block = Arc::new(block);
        self.head.set(Arc::clone(&block));

        if persist {
            // The head is not reverted when persisting fails
            if let Err(e) = self.save_block(&block).await {
                warn!("Failed to save block {}: {}", block.id, e);
                faults.push(RecordedFault::Persistence {
                    block_id: block.id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if let Err(e) = self.pool.reconcile_pool(&block.transactions).await {
            warn!("Failed to reconcile transaction pool after block {}: {:#}", block.id, e);
        }

        if faults.is_empty() {
            debug!(
                "Block {} applied correctly with {} transactions",
                block.id,
                block.transactions.len()
            );
            Ok(())
        } else {
            Err(ChainError::BlockApplication {
                block_id: block.id.clone(),
                height: block.height,
                faults,
            })
        }
    }
}

pub(super) fn sender_unresolved(block: &Block, tx: &Transaction, error: anyhow::Error) -> LedgerFault {
    LedgerFault::SenderUnresolved {
        block_id: block.id.clone(),
        transaction_id: tx.id.clone(),
        sender: tx.sender_public_key.clone(),
        reason: format!("{:#}", error),
    }
}
