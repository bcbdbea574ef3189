//! Balance applicator
//!
//! Thin ordering layer over [`TransactionPool`]: decides which apply/undo
//! steps run for a transaction and attaches block context to failures. It
//! never decides whether a failure is fatal; the caller does.

use std::sync::Arc;

use crate::errors::ApplyFailure;
use crate::ledger::TransactionPool;
use crate::types::{Account, Block, Transaction};

#[derive(Clone)]
pub struct BalanceApplicator {
    pool: Arc<dyn TransactionPool>,
}

impl std::fmt::Debug for BalanceApplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceApplicator").finish()
    }
}

impl BalanceApplicator {
    pub fn new(pool: Arc<dyn TransactionPool>) -> Self {
        Self { pool }
    }

    /// Unconfirmed apply, then confirmed apply.
    ///
    /// A confirmed failure does not revert the unconfirmed mutation.
    pub async fn apply_confirmed_and_unconfirmed(
        &self,
        tx: &Transaction,
        block: &Block,
        sender: &Account,
    ) -> Result<(), ApplyFailure> {
        self.pool
            .apply_unconfirmed(tx, sender)
            .await
            .map_err(|e| failure("applyUnconfirmed", e, tx, block))?;

        self.pool
            .apply(tx, block, sender)
            .await
            .map_err(|e| failure("apply", e, tx, block))
    }

    pub async fn apply_confirmed(
        &self,
        tx: &Transaction,
        block: &Block,
        sender: &Account,
    ) -> Result<(), ApplyFailure> {
        self.pool
            .apply(tx, block, sender)
            .await
            .map_err(|e| failure("apply", e, tx, block))
    }

    /// Confirmed undo. The unconfirmed state is left for pool reconciliation.
    pub async fn undo(
        &self,
        tx: &Transaction,
        block: &Block,
        sender: &Account,
    ) -> Result<(), ApplyFailure> {
        self.pool
            .undo(tx, block, sender)
            .await
            .map_err(|e| failure("undo", e, tx, block))
    }
}

fn failure(step: &str, error: anyhow::Error, tx: &Transaction, block: &Block) -> ApplyFailure {
    ApplyFailure {
        message: format!("{} failed: {:#}", step, error),
        transaction_id: tx.id.clone(),
        block_id: block.id.clone(),
        height: block.height,
    }
}
