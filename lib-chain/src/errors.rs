//! Chain Errors
//!
//! Error taxonomy for block persistence, application and rollback.
//!
//! Two categories matter operationally:
//! - [`LedgerFault`] is fatal. Ledger state may now diverge from consensus and
//!   the node must shut down through the [`crate::shutdown::Shutdown`] signal.
//! - [`TransactionFault`] is recoverable. The offending transaction is evicted
//!   from the pool and the rest of the block still applies.

use thiserror::Error;

use crate::types::{BlockId, PublicKey, TransactionId};

/// Storage access or storage transaction fault.
///
/// Never leaves partial rows behind: every write runs inside one SQL
/// transaction which is rolled back when dropped uncommitted.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to encode {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Corrupt stored row for {what}: {reason}")]
    Corrupt { what: String, reason: String },
}

impl PersistenceError {
    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| PersistenceError::Database { operation, source }
    }
}

/// Failure of one apply/undo step, with the context needed for diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (transaction {transaction_id}, block {block_id} at height {height})")]
pub struct ApplyFailure {
    pub message: String,
    pub transaction_id: TransactionId,
    pub block_id: BlockId,
    pub height: u64,
}

/// Ledger state is provably inconsistent with expectations. Fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    #[error("Failed to resolve sender {sender} for transaction {transaction_id} in block {block_id}: {reason}")]
    SenderUnresolved {
        block_id: BlockId,
        transaction_id: TransactionId,
        sender: PublicKey,
        reason: String,
    },

    #[error("Genesis block apply failed: {0}")]
    GenesisApply(ApplyFailure),

    #[error("Failed to undo transaction: {0}")]
    UndoFailed(ApplyFailure),

    #[error("Failed to delete block {block_id} during rollback: {reason}")]
    BlockDeletion { block_id: BlockId, reason: String },
}

/// A single transaction failed its confirmed apply in an ordinary block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to apply transaction {transaction_id} in block {block_id}: {reason}")]
pub struct TransactionFault {
    pub block_id: BlockId,
    pub transaction_id: TransactionId,
    pub reason: String,
}

/// Non-fatal fault recorded while applying a block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordedFault {
    #[error("applyTransactions: {0}")]
    Transaction(TransactionFault),

    #[error("saveBlock: failed to persist block {block_id}: {reason}")]
    Persistence { block_id: BlockId, reason: String },
}

/// Error returned by the chain core
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Ledger consistency fault: {0}")]
    LedgerConsistency(#[from] LedgerFault),

    /// The block was applied and the head advanced, but faults were recorded
    #[error("Block {block_id} at height {height} applied with {} recorded fault(s): {}", .faults.len(), join_faults(.faults))]
    BlockApplication {
        block_id: BlockId,
        height: u64,
        faults: Vec<RecordedFault>,
    },

    #[error("afterSave hook failed for transaction {transaction_id}: {reason}")]
    AfterSave {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Cannot delete genesis block")]
    CannotDeleteGenesis,

    #[error("Rollback failed: {0}")]
    Rollback(String),

    #[error("Chain head is not set")]
    HeadNotSet,

    #[error("Chain core halted after a ledger consistency fault")]
    Halted,

    #[error("Block sequence is closed")]
    SequenceClosed,
}

impl ChainError {
    /// Whether this error requires the node to shut down
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::LedgerConsistency(_) | ChainError::Halted)
    }
}

fn join_faults(faults: &[RecordedFault]) -> String {
    faults
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for chain operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Result type for storage operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
