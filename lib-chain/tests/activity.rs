//! The activity flag is up while account state is being written

mod common;

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use common::{child_block, funded_genesis, key};
use lib_chain::{
    Account, AccountDirectory, ApplyConfig, Block, Chain, ChainComponents, MemoryLedger,
    PublicKey, SqliteStore, Transaction, TransactionId, TransactionPool,
};
use parking_lot::Mutex;

/// Ledger that samples `Chain::is_active` on every apply and undo
struct ObservingLedger {
    inner: MemoryLedger,
    chain: OnceLock<Chain>,
    seen: Mutex<Vec<(TransactionId, bool)>>,
}

impl ObservingLedger {
    fn sample(&self, tx: &Transaction) {
        let active = self.chain.get().map(Chain::is_active).unwrap_or(false);
        self.seen.lock().push((tx.id.clone(), active));
    }

    fn take_seen(&self) -> Vec<(TransactionId, bool)> {
        std::mem::take(&mut *self.seen.lock())
    }
}

#[async_trait]
impl AccountDirectory for ObservingLedger {
    async fn resolve_or_create(&self, public_key: &PublicKey) -> Result<Account> {
        self.inner.resolve_or_create(public_key).await
    }

    async fn resolve(&self, public_key: &PublicKey) -> Result<Account> {
        self.inner.resolve(public_key).await
    }
}

#[async_trait]
impl TransactionPool for ObservingLedger {
    async fn apply_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<()> {
        self.inner.apply_unconfirmed(tx, sender).await
    }

    async fn apply(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<()> {
        self.sample(tx);
        self.inner.apply(tx, block, sender).await
    }

    async fn undo(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<()> {
        self.sample(tx);
        self.inner.undo(tx, block, sender).await
    }

    async fn evict(&self, id: &TransactionId) {
        self.inner.evict(id).await
    }

    async fn reconcile_pool(&self, applied: &[Transaction]) -> Result<()> {
        self.inner.reconcile_pool(applied).await
    }
}

async fn observed_chain() -> (Chain, Arc<ObservingLedger>) {
    let genesis = funded_genesis();
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let ledger = Arc::new(ObservingLedger {
        inner: MemoryLedger::new(genesis.id.clone()),
        chain: OnceLock::new(),
        seen: Mutex::new(Vec::new()),
    });
    let chain = Chain::new(
        ChainComponents::with_ledger(store, ledger.clone(), genesis),
        &ApplyConfig::default(),
    );
    ledger.chain.set(chain.clone()).unwrap();
    (chain, ledger)
}

fn all_active(seen: &[(TransactionId, bool)]) -> bool {
    !seen.is_empty() && seen.iter().all(|(_, active)| *active)
}

#[tokio::test]
async fn test_flag_is_up_while_genesis_applies() {
    let (chain, ledger) = observed_chain().await;

    chain.apply_genesis_block(chain.genesis().clone()).await.unwrap();

    assert!(all_active(&ledger.take_seen()));
    assert!(!chain.is_active());
}

#[tokio::test]
async fn test_flag_is_up_while_block_applies_and_rolls_back() {
    let (chain, ledger) = observed_chain().await;
    chain.save_genesis_block().await.unwrap();
    chain.apply_genesis_block(chain.genesis().clone()).await.unwrap();
    ledger.take_seen();

    let b2 = child_block(
        chain.genesis(),
        "b2",
        vec![
            Transaction::transfer("t1", &key(1), key(2).address(), 30, 0),
            Transaction::transfer("t2", &key(1), key(3).address(), 20, 0),
        ],
    );
    chain.apply_block(b2, true).await.unwrap();
    let applied = ledger.take_seen();
    assert_eq!(applied.len(), 2);
    assert!(all_active(&applied));
    assert!(!chain.is_active());

    chain.delete_last_block().await.unwrap();
    let undone = ledger.take_seen();
    assert_eq!(
        undone.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
        vec!["t2", "t1"]
    );
    assert!(all_active(&undone));
    assert!(!chain.is_active());
}
