//! Chain Mutation Core
//!
//! Owns the chain head and every operation that moves it:
//!
//! - persistence of blocks and their transactions ([`Chain::save_block`])
//! - application of genesis and ordinary blocks ([`Chain::apply_block`])
//! - rollback of the head block ([`Chain::delete_last_block`])
//!
//! # Invariants
//!
//! 1. **Ledger state is all or nothing per block** - a block is either fully
//!    applied or not applied. Faults that break this are fatal: the
//!    [`Shutdown`] signal fires and every later mutation returns
//!    [`ChainError::Halted`].
//! 2. **One head writer** - every head mutation runs as a job on the block
//!    [`Sequence`], so mutations never interleave.
//! 3. **Undo mirrors apply** - rollback undoes transactions in exact reverse
//!    order of application.

pub mod apply;
pub mod balances;
pub mod head;
pub mod persist;
pub mod progress;
pub mod rollback;
pub mod sequence;

use std::sync::Arc;

use crate::config::ApplyConfig;
use crate::errors::{ChainError, ChainResult, LedgerFault};
use crate::events::EventBus;
use crate::ledger::{AccountDirectory, TransactionPool};
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::storage::{BlockStore, StorageResponse};
use crate::types::{Block, BlockId, ReducedBlock};

pub use balances::BalanceApplicator;
pub use head::{ActivityFlag, ChainHead};
pub use progress::ProgressLogger;
pub use sequence::Sequence;

/// Collaborators the chain core is wired to
pub struct ChainComponents {
    pub store: Arc<dyn BlockStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub pool: Arc<dyn TransactionPool>,
    pub events: EventBus,
    pub genesis: Block,
}

impl ChainComponents {
    /// Wire one ledger that serves both as account directory and pool
    pub fn with_ledger<L>(store: Arc<dyn BlockStore>, ledger: Arc<L>, genesis: Block) -> Self
    where
        L: AccountDirectory + TransactionPool + 'static,
    {
        Self {
            store,
            accounts: ledger.clone(),
            pool: ledger,
            events: EventBus::new(),
            genesis,
        }
    }
}

/// Handle to the chain core. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<ChainInner>,
}

pub(crate) struct ChainInner {
    store: Arc<dyn BlockStore>,
    accounts: Arc<dyn AccountDirectory>,
    pool: Arc<dyn TransactionPool>,
    balances: BalanceApplicator,
    events: EventBus,
    genesis: Block,
    head: ChainHead,
    activity: ActivityFlag,
    sequence: Sequence,
    shutdown: Shutdown,
    progress_step_percent: u8,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("genesis", &self.inner.genesis.id)
            .field("head", &self.inner.head.height())
            .field("active", &self.inner.activity.is_active())
            .field("halted", &self.inner.shutdown.is_triggered())
            .finish()
    }
}

impl Chain {
    /// Build the core and start its block sequence. Must be called from
    /// within a Tokio runtime.
    pub fn new(components: ChainComponents, config: &ApplyConfig) -> Self {
        let ChainComponents {
            store,
            accounts,
            pool,
            events,
            genesis,
        } = components;

        tracing::trace!("Initializing chain core with genesis {}", genesis.id);

        Self {
            inner: Arc::new(ChainInner {
                store,
                accounts,
                balances: BalanceApplicator::new(Arc::clone(&pool)),
                pool,
                events,
                genesis,
                head: ChainHead::new(),
                activity: ActivityFlag::new(),
                sequence: Sequence::spawn(),
                shutdown: Shutdown::new(),
                progress_step_percent: config.progress_step_percent,
            }),
        }
    }

    /// Snapshot of the last applied block
    pub fn head(&self) -> Option<Arc<Block>> {
        self.inner.head.get()
    }

    /// Whether a block write sequence is in progress
    pub fn is_active(&self) -> bool {
        self.inner.activity.is_active()
    }

    /// The serialization queue shared by every head mutation
    pub fn sequence(&self) -> Sequence {
        self.inner.sequence.clone()
    }

    pub fn genesis(&self) -> &Block {
        &self.inner.genesis
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.inner.shutdown.listener()
    }

    /// Persist the configured genesis block unless it is already stored
    pub async fn save_genesis_block(&self) -> ChainResult<()> {
        self.inner.save_genesis_block().await
    }

    /// Persist a block and run its after-save side effects
    pub async fn save_block(&self, block: &Block) -> ChainResult<()> {
        self.inner.save_block(block).await
    }

    pub async fn delete_block(&self, id: &BlockId) -> ChainResult<()> {
        self.inner.delete_block(id).await
    }

    /// Delete every persisted block at or above the height of `id`
    pub async fn delete_after_block(&self, id: &BlockId) -> ChainResult<StorageResponse> {
        self.inner.delete_after_block(id).await
    }

    /// Relay a reduced block to listeners. No persistence.
    pub async fn broadcast_reduced_block(&self, reduced: ReducedBlock, id: &BlockId, broadcast: bool) {
        self.inner.broadcast_reduced_block(reduced, id, broadcast).await
    }

    /// Apply the genesis block to account state and set it as head
    pub async fn apply_genesis_block(&self, block: Block) -> ChainResult<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequence
            .run(async move { inner.apply_genesis_block(block).await })
            .await
    }

    /// Apply an ordinary block, optionally persisting it.
    ///
    /// Returns [`ChainError::BlockApplication`] when some transactions or the
    /// save failed; the head has advanced to `block` in that case.
    pub async fn apply_block(&self, block: Block, persist: bool) -> ChainResult<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequence
            .run(async move { inner.apply_block(block, persist).await })
            .await
    }

    /// Roll back the head block and return the new head
    pub async fn delete_last_block(&self) -> ChainResult<Arc<Block>> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequence
            .run(async move { inner.delete_last_block().await })
            .await
    }

    /// Recovery entry point after a failed chain comparison
    pub async fn recover_chain(&self) -> ChainResult<Arc<Block>> {
        rollback::recover_chain(self).await
    }

    /// Install the highest persisted block as head, if any
    pub async fn restore_head(&self) -> ChainResult<Option<Arc<Block>>> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequence
            .run(async move { inner.restore_head().await })
            .await
    }
}

impl ChainInner {
    fn ensure_running(&self) -> ChainResult<()> {
        if self.shutdown.is_triggered() {
            return Err(ChainError::Halted);
        }
        Ok(())
    }

    /// Escalate a ledger fault: log, fire the shutdown signal, return the error
    fn fatal(&self, fault: LedgerFault) -> ChainError {
        tracing::error!("Ledger consistency fault: {}", fault);
        self.shutdown.trigger(fault.to_string());
        ChainError::LedgerConsistency(fault)
    }
}
