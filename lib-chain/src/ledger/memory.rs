//! In-memory reference ledger
//!
//! Implements both collaborators over a single map of accounts so the chain
//! core can run end to end without an account database. Every call is
//! journaled, which lets callers observe apply/undo ordering.
//!
//! Rules:
//! - every transaction debits `amount + fee` from its sender
//! - transfers credit `amount` to the recipient (created on first credit)
//! - votes add (`+key`) or remove (`-key`) a registered delegate
//! - delegate registration sets the sender's username
//! - balances never go negative, except while applying the genesis block

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{AccountDirectory, TransactionPool};
use crate::types::{
    Account, Address, Block, BlockId, PublicKey, Transaction, TransactionAsset, TransactionId,
};

/// Journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    ApplyUnconfirmed(TransactionId),
    Apply(TransactionId),
    Undo(TransactionId),
    AfterSave(TransactionId),
    Evict(TransactionId),
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    pool: Vec<Transaction>,
    journal: Vec<LedgerOp>,
    failing_after_save: HashSet<TransactionId>,
}

#[derive(Debug)]
pub struct MemoryLedger {
    genesis_id: BlockId,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// `genesis_id` is the block whose transactions may overdraw their senders
    pub fn new(genesis_id: BlockId) -> Self {
        Self {
            genesis_id,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.state.read().accounts.get(address).cloned()
    }

    /// Confirmed balance of the account owned by `public_key` (0 if unknown)
    pub fn balance_of(&self, public_key: &PublicKey) -> i64 {
        self.account(&public_key.address())
            .map(|a| a.balance)
            .unwrap_or(0)
    }

    pub fn unconfirmed_balance_of(&self, public_key: &PublicKey) -> i64 {
        self.account(&public_key.address())
            .map(|a| a.u_balance)
            .unwrap_or(0)
    }

    pub fn journal(&self) -> Vec<LedgerOp> {
        self.state.read().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.write().journal.clear();
    }

    pub fn pool_ids(&self) -> Vec<TransactionId> {
        self.state.read().pool.iter().map(|tx| tx.id.clone()).collect()
    }

    /// Make the `after_save` hook of one transaction fail
    pub fn fail_after_save(&self, id: TransactionId) {
        self.state.write().failing_after_save.insert(id);
    }

    /// Admit a transaction to the pool: resolve the sender and apply the
    /// unconfirmed effect.
    pub fn add_to_pool(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state.write();
        if state.pool.iter().any(|pooled| pooled.id == tx.id) {
            bail!("Transaction is already in the pool: {}", tx.id);
        }
        ensure_account(&mut state, &tx.sender_public_key);
        apply_unconfirmed_locked(&mut state, &tx, self.is_genesis_transaction(&tx))?;
        state.pool.push(tx);
        Ok(())
    }

    fn is_genesis_transaction(&self, tx: &Transaction) -> bool {
        tx.block_id.as_ref() == Some(&self.genesis_id)
    }
}

fn ensure_account<'a>(state: &'a mut LedgerState, public_key: &PublicKey) -> &'a mut Account {
    let account = state
        .accounts
        .entry(public_key.address())
        .or_insert_with(|| Account::with_public_key(public_key));
    if account.public_key.is_none() {
        account.public_key = Some(public_key.clone());
    }
    account
}

fn debit(tx: &Transaction) -> Result<i64> {
    let total = tx
        .amount
        .checked_add(tx.fee)
        .ok_or_else(|| anyhow!("Amount overflow in transaction {}", tx.id))?;
    i64::try_from(total).map_err(|_| anyhow!("Amount out of range in transaction {}", tx.id))
}

fn credit(tx: &Transaction) -> Result<i64> {
    i64::try_from(tx.amount).map_err(|_| anyhow!("Amount out of range in transaction {}", tx.id))
}

/// A parsed `+key` / `-key` vote
fn parse_vote(vote: &str) -> Result<(bool, PublicKey)> {
    let (add, key) = if let Some(key) = vote.strip_prefix('+') {
        (true, key)
    } else if let Some(key) = vote.strip_prefix('-') {
        (false, key)
    } else {
        bail!("Invalid vote: {}", vote);
    };
    if key.is_empty() {
        bail!("Invalid vote: {}", vote);
    }
    Ok((add, PublicKey::new(key)))
}

fn is_registered_delegate(state: &LedgerState, key: &PublicKey) -> bool {
    state
        .accounts
        .get(&key.address())
        .map(|a| a.username.is_some())
        .unwrap_or(false)
}

/// Validate and compute the vote list after applying (or reversing) `votes`
fn merge_votes(
    state: &LedgerState,
    current: &[PublicKey],
    votes: &[String],
    reverse: bool,
) -> Result<Vec<PublicKey>> {
    let mut merged = current.to_vec();
    for vote in votes {
        let (add, key) = parse_vote(vote)?;
        let add = add != reverse;
        if add {
            if merged.contains(&key) {
                bail!("Account has already voted for delegate {}", key);
            }
            if !reverse && !is_registered_delegate(state, &key) {
                bail!("Delegate not found: {}", key);
            }
            merged.push(key);
        } else {
            let before = merged.len();
            merged.retain(|k| k != &key);
            if merged.len() == before {
                bail!("Account has not voted for delegate {}", key);
            }
        }
    }
    Ok(merged)
}

fn apply_unconfirmed_locked(state: &mut LedgerState, tx: &Transaction, genesis: bool) -> Result<()> {
    let amount = debit(tx)?;
    let address = tx.sender_public_key.address();
    let sender = state
        .accounts
        .get(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;

    let u_balance = sender.u_balance - amount;
    if u_balance < 0 && !genesis {
        bail!(
            "Account does not have enough balance: {} balance: {}",
            address,
            sender.u_balance
        );
    }

    let u_votes = match &tx.asset {
        TransactionAsset::Vote { votes } => Some(merge_votes(state, &sender.u_votes, votes, false)?),
        _ => None,
    };

    let sender = state
        .accounts
        .get_mut(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;
    sender.u_balance = u_balance;
    if let Some(u_votes) = u_votes {
        sender.u_votes = u_votes;
    }
    state.journal.push(LedgerOp::ApplyUnconfirmed(tx.id.clone()));
    Ok(())
}

fn apply_confirmed_locked(
    state: &mut LedgerState,
    tx: &Transaction,
    block: &Block,
) -> Result<()> {
    let amount = debit(tx)?;
    let address = tx.sender_public_key.address();
    let sender = state
        .accounts
        .get(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;

    let balance = sender.balance - amount;
    if balance < 0 && !block.is_genesis() {
        bail!(
            "Account does not have enough balance: {} balance: {}",
            address,
            sender.balance
        );
    }

    let votes = match &tx.asset {
        TransactionAsset::Vote { votes } => Some(merge_votes(state, &sender.votes, votes, false)?),
        _ => None,
    };
    if let TransactionAsset::Delegate { .. } = &tx.asset {
        if sender.username.is_some() {
            bail!("Account is already a delegate: {}", address);
        }
    }

    let credit = credit(tx)?;
    let sender = state
        .accounts
        .get_mut(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;
    sender.balance = balance;
    if let Some(votes) = votes {
        sender.votes = votes;
    }
    match &tx.asset {
        TransactionAsset::Delegate { username } => sender.username = Some(username.clone()),
        TransactionAsset::Transfer { .. } => {
            if let Some(recipient) = &tx.recipient_id {
                let recipient = state
                    .accounts
                    .entry(recipient.clone())
                    .or_insert_with(|| Account::new(recipient.clone()));
                recipient.balance += credit;
                recipient.u_balance += credit;
            }
        }
        _ => {}
    }

    state.journal.push(LedgerOp::Apply(tx.id.clone()));
    Ok(())
}

fn undo_locked(state: &mut LedgerState, tx: &Transaction) -> Result<()> {
    let amount = debit(tx)?;
    let address = tx.sender_public_key.address();
    let sender = state
        .accounts
        .get(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;

    let votes = match &tx.asset {
        TransactionAsset::Vote { votes } => Some(merge_votes(state, &sender.votes, votes, true)?),
        _ => None,
    };

    let recipient_credit = match (&tx.asset, &tx.recipient_id) {
        (TransactionAsset::Transfer { .. }, Some(recipient)) => {
            let credit = credit(tx)?;
            let account = state
                .accounts
                .get(recipient)
                .ok_or_else(|| anyhow!("Recipient account not found: {}", recipient))?;
            if account.balance - credit < 0 {
                bail!(
                    "Undo would overdraw recipient {} balance: {}",
                    recipient,
                    account.balance
                );
            }
            Some((recipient.clone(), credit))
        }
        _ => None,
    };

    // Every check passed; mutate
    if let Some((recipient, credit)) = recipient_credit {
        if let Some(account) = state.accounts.get_mut(&recipient) {
            account.balance -= credit;
            account.u_balance -= credit;
        }
    }
    let sender = state
        .accounts
        .get_mut(&address)
        .ok_or_else(|| anyhow!("Sender account not found: {}", address))?;
    sender.balance += amount;
    if let Some(votes) = votes {
        sender.votes = votes;
    }
    if let TransactionAsset::Delegate { .. } = &tx.asset {
        sender.username = None;
    }

    state.journal.push(LedgerOp::Undo(tx.id.clone()));
    Ok(())
}

#[async_trait]
impl AccountDirectory for MemoryLedger {
    async fn resolve_or_create(&self, public_key: &PublicKey) -> Result<Account> {
        let mut state = self.state.write();
        Ok(ensure_account(&mut state, public_key).clone())
    }

    async fn resolve(&self, public_key: &PublicKey) -> Result<Account> {
        let address = public_key.address();
        self.state
            .read()
            .accounts
            .get(&address)
            .cloned()
            .ok_or_else(|| anyhow!("Account not found: {}", address))
    }
}

#[async_trait]
impl TransactionPool for MemoryLedger {
    async fn apply_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<()> {
        let genesis = self.is_genesis_transaction(tx);
        apply_unconfirmed_locked(&mut self.state.write(), tx, genesis)
    }

    async fn apply(&self, tx: &Transaction, block: &Block, _sender: &Account) -> Result<()> {
        apply_confirmed_locked(&mut self.state.write(), tx, block)
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<()> {
        undo_locked(&mut self.state.write(), tx)
    }

    async fn after_save(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state.write();
        state.journal.push(LedgerOp::AfterSave(tx.id.clone()));
        if state.failing_after_save.contains(&tx.id) {
            bail!("afterSave rejected transaction {}", tx.id);
        }
        Ok(())
    }

    async fn evict(&self, id: &TransactionId) {
        let mut state = self.state.write();
        state.pool.retain(|tx| &tx.id != id);
        state.journal.push(LedgerOp::Evict(id.clone()));
    }

    async fn reconcile_pool(&self, applied: &[Transaction]) -> Result<()> {
        let applied: HashSet<&TransactionId> = applied.iter().map(|tx| &tx.id).collect();
        self.state.write().pool.retain(|tx| !applied.contains(&tx.id));
        Ok(())
    }
}
