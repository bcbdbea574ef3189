//! Ledger Collaborators
//!
//! The chain core never touches account rows or pool queues directly. It
//! talks to two collaborators:
//!
//! - [`AccountDirectory`] resolves transaction senders to account snapshots.
//! - [`TransactionPool`] owns the per-type apply/undo logic and the pool of
//!   unconfirmed transactions.
//!
//! Both are `anyhow` at the boundary; the chain core wraps failures into its
//! own typed errors with block and transaction context.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Account, Block, PublicKey, Transaction, TransactionId};

pub use memory::{LedgerOp, MemoryLedger};

/// Account lookup
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Return the account owned by `public_key`, creating it when absent.
    /// Used while applying the genesis block.
    async fn resolve_or_create(&self, public_key: &PublicKey) -> Result<Account>;

    /// Return an existing account. Failing here while applying or undoing a
    /// block means the ledger is inconsistent.
    async fn resolve(&self, public_key: &PublicKey) -> Result<Account>;
}

/// Per-transaction state transitions and the unconfirmed pool
#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Apply the unconfirmed (pool-level) effect of a transaction
    async fn apply_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<()>;

    /// Apply the confirmed effect of a transaction included in `block`
    async fn apply(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<()>;

    /// Reverse exactly what [`TransactionPool::apply`] did
    async fn undo(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<()>;

    /// Per-type hook run after the transaction's block is committed
    async fn after_save(&self, _tx: &Transaction) -> Result<()> {
        Ok(())
    }

    /// Drop a transaction from the unconfirmed pool
    async fn evict(&self, id: &TransactionId);

    /// Bring the pool back in line after a block was applied
    async fn reconcile_pool(&self, applied: &[Transaction]) -> Result<()>;
}
