//! Chain Mutation Core
//!
//! Commits blocks and their transactions to durable storage, applies their
//! effects to account state through the ledger collaborators, and reverses
//! the head block on rollback. Ledger state is always "block N fully
//! applied" or "block N not applied".

pub mod chain;
pub mod config;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod shutdown;
pub mod storage;
pub mod types;

pub use chain::{ActivityFlag, BalanceApplicator, Chain, ChainComponents, ChainHead, ProgressLogger, Sequence};
pub use config::{ApplyConfig, ChainConfig, DatabaseConfig, GenesisConfig};
pub use errors::{
    ApplyFailure, ChainError, ChainResult, LedgerFault, PersistenceError, PersistenceResult,
    RecordedFault, TransactionFault,
};
pub use events::{ChainEvent, ChainEventListener, EventBus, RecordingListener};
pub use ledger::{AccountDirectory, LedgerOp, MemoryLedger, TransactionPool};
pub use shutdown::{Shutdown, ShutdownListener};
pub use storage::{BlockStore, SqliteStore, StorageResponse};
pub use types::{
    Account, Address, Block, BlockId, PublicKey, ReducedBlock, Transaction, TransactionAsset,
    TransactionId, TransactionType, GENESIS_HEIGHT,
};
