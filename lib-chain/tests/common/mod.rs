//! Shared fixtures for chain integration tests

#![allow(dead_code)]

use std::sync::Arc;

use lib_chain::{
    ApplyConfig, Block, BlockId, Chain, ChainComponents, MemoryLedger, PublicKey, SqliteStore,
    Transaction,
};

/// Key of the account that funds everything in genesis
pub const GENESIS_KEY: u8 = 200;

pub fn key(n: u8) -> PublicKey {
    PublicKey::new(hex::encode([n; 32]))
}

pub fn genesis_block(transactions: Vec<Transaction>) -> Block {
    Block {
        id: BlockId::new("genesis"),
        version: 0,
        timestamp: 0,
        height: 1,
        previous_block: None,
        generator_public_key: key(GENESIS_KEY),
        total_amount: transactions.iter().map(|tx| tx.amount).sum(),
        total_fee: 0,
        reward: 0,
        payload_hash: String::new(),
        block_signature: String::new(),
        transactions,
    }
}

pub fn child_block(parent: &Block, id: &str, transactions: Vec<Transaction>) -> Block {
    Block {
        id: BlockId::new(id),
        version: 0,
        timestamp: parent.timestamp + 10,
        height: parent.height + 1,
        previous_block: Some(parent.id.clone()),
        generator_public_key: key(GENESIS_KEY),
        total_amount: transactions.iter().map(|tx| tx.amount).sum(),
        total_fee: transactions.iter().map(|tx| tx.fee).sum(),
        reward: 0,
        payload_hash: String::new(),
        block_signature: String::new(),
        transactions,
    }
}

/// Genesis funding `key(1)` with 100
pub fn funded_genesis() -> Block {
    genesis_block(vec![Transaction::transfer(
        "t0",
        &key(GENESIS_KEY),
        key(1).address(),
        100,
        0,
    )])
}

pub struct Harness {
    pub chain: Chain,
    pub store: Arc<SqliteStore>,
    pub ledger: Arc<MemoryLedger>,
}

impl Harness {
    pub async fn new(genesis: Block) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        Self::with_store(store, genesis)
    }

    pub fn with_store(store: Arc<SqliteStore>, genesis: Block) -> Self {
        let ledger = Arc::new(MemoryLedger::new(genesis.id.clone()));
        let chain = Chain::new(
            ChainComponents::with_ledger(store.clone(), ledger.clone(), genesis),
            &ApplyConfig::default(),
        );
        Self { chain, store, ledger }
    }

    /// Save and apply the genesis block
    pub async fn boot(&self) {
        self.chain.save_genesis_block().await.unwrap();
        self.chain
            .apply_genesis_block(self.chain.genesis().clone())
            .await
            .unwrap();
    }

    /// Make `key` known to the account directory without funding it
    pub async fn register(&self, key: &PublicKey) {
        use lib_chain::AccountDirectory;
        self.ledger.resolve_or_create(key).await.unwrap();
    }

    pub fn head_height(&self) -> u64 {
        self.chain.head().map(|b| b.height).unwrap_or(0)
    }
}
