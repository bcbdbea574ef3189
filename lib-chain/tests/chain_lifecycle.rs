//! Block application and persistence through the public chain API

mod common;

use common::{child_block, funded_genesis, genesis_block, key, Harness, GENESIS_KEY};
use lib_chain::{
    BlockId, BlockStore, ChainError, LedgerOp, RecordedFault, RecordingListener, Transaction,
    TransactionId,
};

#[tokio::test]
async fn test_genesis_apply_block_then_delete_last_block() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;

    assert_eq!(h.head_height(), 1);
    assert_eq!(h.ledger.balance_of(&key(1)), 100);

    let genesis = h.chain.genesis().clone();
    let b2 = child_block(
        &genesis,
        "b2",
        vec![Transaction::transfer("t1", &key(1), key(2).address(), 30, 0)],
    );
    h.chain.apply_block(b2, true).await.unwrap();

    assert_eq!(h.head_height(), 2);
    assert_eq!(h.ledger.balance_of(&key(1)), 70);
    assert!(h.store.block_exists(&BlockId::new("b2")).await.unwrap());

    let head = h.chain.delete_last_block().await.unwrap();

    assert_eq!(head.height, 1);
    assert_eq!(h.head_height(), 1);
    assert_eq!(h.ledger.balance_of(&key(1)), 100);
    assert_eq!(h.ledger.balance_of(&key(2)), 0);
    assert!(!h.store.block_exists(&BlockId::new("b2")).await.unwrap());
}

#[tokio::test]
async fn test_genesis_applies_votes_after_other_transactions() {
    let delegate = key(5);
    let voter = key(1);
    // Vote listed first; it only succeeds once the registration has applied
    let genesis = genesis_block(vec![
        Transaction::vote("v1", &voter, vec![format!("+{}", delegate)], 0),
        Transaction::transfer("t0", &key(GENESIS_KEY), voter.address(), 100, 0),
        Transaction::delegate("d1", &delegate, "genesis_1", 0),
    ]);
    let h = Harness::new(genesis).await;
    h.boot().await;

    let applied: Vec<TransactionId> = h
        .ledger
        .journal()
        .into_iter()
        .filter_map(|op| match op {
            LedgerOp::Apply(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(
        applied,
        vec![
            TransactionId::new("t0"),
            TransactionId::new("d1"),
            TransactionId::new("v1")
        ]
    );

    let account = h.ledger.account(&voter.address()).unwrap();
    assert_eq!(account.votes, vec![delegate]);
}

#[tokio::test]
async fn test_genesis_runs_unconfirmed_before_confirmed_per_transaction() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;

    let journal: Vec<LedgerOp> = h
        .ledger
        .journal()
        .into_iter()
        .filter(|op| !matches!(op, LedgerOp::AfterSave(_)))
        .collect();
    assert_eq!(
        journal,
        vec![
            LedgerOp::ApplyUnconfirmed(TransactionId::new("t0")),
            LedgerOp::Apply(TransactionId::new("t0"))
        ]
    );
    // Genesis sender overdraws by design
    assert_eq!(h.ledger.balance_of(&key(GENESIS_KEY)), -100);
}

#[tokio::test]
async fn test_failed_transaction_is_evicted_and_rest_of_block_applies() {
    let poor = key(3);
    let genesis = genesis_block(vec![
        Transaction::transfer("t0", &key(GENESIS_KEY), key(1).address(), 100, 0),
        Transaction::transfer("t0b", &key(GENESIS_KEY), poor.address(), 1, 0),
    ]);
    let h = Harness::new(genesis).await;
    h.boot().await;

    let overspend = Transaction::transfer("bad", &poor, key(2).address(), 500, 0);
    h.ledger.add_to_pool(overspend.clone()).unwrap_err();

    let b2 = child_block(
        h.chain.genesis(),
        "b2",
        vec![
            overspend,
            Transaction::transfer("t1", &key(1), key(2).address(), 30, 0),
        ],
    );
    let err = h.chain.apply_block(b2, true).await.unwrap_err();

    match err {
        ChainError::BlockApplication { block_id, height, faults } => {
            assert_eq!(block_id.as_str(), "b2");
            assert_eq!(height, 2);
            assert_eq!(faults.len(), 1);
            assert!(matches!(
                &faults[0],
                RecordedFault::Transaction(f) if f.transaction_id.as_str() == "bad"
            ));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(h.ledger.journal().contains(&LedgerOp::Evict(TransactionId::new("bad"))));
    assert_eq!(h.ledger.balance_of(&key(1)), 70);
    assert_eq!(h.ledger.balance_of(&poor), 1);
    assert_eq!(h.head_height(), 2);
    assert!(!h.chain.is_active());
    assert!(!h.chain.shutdown().is_triggered());

    // Dropped from the block that became head and from the stored row
    let head = h.chain.head().unwrap();
    let head_ids: Vec<&str> = head.transactions.iter().map(|tx| tx.id.as_str()).collect();
    assert_eq!(head_ids, vec!["t1"]);
    let stored = h.store.load_block(&BlockId::new("b2")).await.unwrap().unwrap();
    assert_eq!(stored.transactions.len(), 1);
    assert_eq!(stored.transactions[0].id.as_str(), "t1");
}

#[tokio::test]
async fn test_persistence_failure_keeps_head_advanced() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;

    let b2 = child_block(
        h.chain.genesis(),
        "b2",
        vec![Transaction::transfer("t1", &key(1), key(2).address(), 30, 0)],
    );
    // Row already present: the save inside apply_block hits the primary key
    h.store.save_block(&b2).await.unwrap();

    let err = h.chain.apply_block(b2, true).await.unwrap_err();

    match err {
        ChainError::BlockApplication { faults, .. } => {
            assert_eq!(faults.len(), 1);
            assert!(matches!(faults[0], RecordedFault::Persistence { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(h.head_height(), 2);
    assert_eq!(h.ledger.balance_of(&key(1)), 70);
    assert!(!h.chain.is_active());
    assert!(!h.chain.shutdown().is_triggered());
}

#[tokio::test]
async fn test_apply_without_persist_reconciles_pool() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;

    let t1 = Transaction::transfer("t1", &key(1), key(2).address(), 30, 0);
    let t2 = Transaction::transfer("t2", &key(1), key(2).address(), 10, 0);
    h.ledger.add_to_pool(t1.clone()).unwrap();
    h.ledger.add_to_pool(t2).unwrap();

    let b2 = child_block(h.chain.genesis(), "b2", vec![t1]);
    h.chain.apply_block(b2, false).await.unwrap();

    assert_eq!(h.ledger.pool_ids(), vec![TransactionId::new("t2")]);
    assert!(!h.store.block_exists(&BlockId::new("b2")).await.unwrap());
    assert_eq!(h.head_height(), 2);
}

#[tokio::test]
async fn test_apply_block_publishes_transactions_saved() {
    let h = Harness::new(funded_genesis()).await;
    let recorder = RecordingListener::new();
    h.chain.events().subscribe(Box::new(recorder.clone())).await;
    h.boot().await;

    let b2 = child_block(
        h.chain.genesis(),
        "b2",
        vec![Transaction::transfer("t1", &key(1), key(2).address(), 30, 0)],
    );
    h.chain.apply_block(b2.clone(), true).await.unwrap();
    h.chain
        .broadcast_reduced_block(b2.reduce(), &b2.id, true)
        .await;

    assert_eq!(
        recorder.topics().await,
        vec!["transactionsSaved", "transactionsSaved", "newBlock"]
    );
}

#[tokio::test]
async fn test_restore_head_from_storage() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;
    let b2 = child_block(
        h.chain.genesis(),
        "b2",
        vec![Transaction::transfer("t1", &key(1), key(2).address(), 30, 0)],
    );
    h.chain.apply_block(b2, true).await.unwrap();

    let restarted = Harness::with_store(h.store.clone(), funded_genesis());
    assert!(restarted.chain.head().is_none());

    let head = restarted.chain.restore_head().await.unwrap().unwrap();
    assert_eq!(head.id.as_str(), "b2");
    assert_eq!(head.transactions.len(), 1);
    assert_eq!(restarted.head_height(), 2);
}

#[tokio::test]
async fn test_delete_after_block_truncates_storage() {
    let h = Harness::new(funded_genesis()).await;
    h.boot().await;
    let b2 = child_block(h.chain.genesis(), "b2", vec![]);
    let b3 = child_block(&b2, "b3", vec![]);
    h.chain.apply_block(b2, true).await.unwrap();
    h.chain.apply_block(b3, true).await.unwrap();

    let response = h.chain.delete_after_block(&BlockId::new("b2")).await.unwrap();

    assert_eq!(response.rows_affected, 2);
    assert_eq!(h.store.count_blocks().await.unwrap(), 1);
}
