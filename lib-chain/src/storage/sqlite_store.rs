//! SQLite block store
//!
//! Relational persistence for blocks, transactions and per-type asset rows.
//!
//! # Features
//!
//! - WAL mode for file databases
//! - Foreign keys enforced so transaction and asset rows cascade with their block
//! - Embedded schema, applied on open
//! - Every block write is one SQL transaction

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::rows::{AssetRow, AssetTable, BlockRow, RowBatches, TransactionRow};
use super::{BlockStore, StorageResponse};
use crate::config::DatabaseConfig;
use crate::errors::{PersistenceError, PersistenceResult};
use crate::types::{Block, BlockId};

/// SQLite's bind parameter ceiling for a single statement
const MAX_BIND_PARAMS: usize = 32_766;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    height INTEGER NOT NULL UNIQUE,
    previous_block TEXT,
    number_of_transactions INTEGER NOT NULL,
    total_amount INTEGER NOT NULL,
    total_fee INTEGER NOT NULL,
    reward INTEGER NOT NULL,
    payload_hash TEXT NOT NULL,
    generator_public_key TEXT NOT NULL,
    block_signature TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_previous ON blocks(previous_block);

CREATE TABLE IF NOT EXISTS trs (
    id TEXT PRIMARY KEY,
    block_id TEXT NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    "type" INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    sender_public_key TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    recipient_id TEXT,
    amount INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    signature TEXT NOT NULL,
    asset TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trs_block ON trs(block_id, position);
CREATE INDEX IF NOT EXISTS idx_trs_sender ON trs(sender_id);

CREATE TABLE IF NOT EXISTS transfers (
    transaction_id TEXT NOT NULL REFERENCES trs(id) ON DELETE CASCADE,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signatures (
    transaction_id TEXT NOT NULL REFERENCES trs(id) ON DELETE CASCADE,
    public_key TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS delegates (
    transaction_id TEXT NOT NULL REFERENCES trs(id) ON DELETE CASCADE,
    username TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS votes (
    transaction_id TEXT NOT NULL REFERENCES trs(id) ON DELETE CASCADE,
    votes TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS multisignatures (
    transaction_id TEXT NOT NULL REFERENCES trs(id) ON DELETE CASCADE,
    min INTEGER NOT NULL,
    lifetime INTEGER NOT NULL,
    keysgroup TEXT NOT NULL
);
"#;

const TRS_COLUMNS: &[&str] = &[
    "id",
    "block_id",
    "position",
    "\"type\"",
    "timestamp",
    "sender_public_key",
    "sender_id",
    "recipient_id",
    "amount",
    "fee",
    "signature",
    "asset",
];

/// SQLite-backed [`BlockStore`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the store described by `config`
    pub async fn connect(config: &DatabaseConfig) -> PersistenceResult<Self> {
        if config.in_memory {
            Self::open_in_memory().await
        } else {
            Self::open(
                &config.path,
                config.max_connections,
                Duration::from_secs(config.acquire_timeout_secs),
            )
            .await
        }
    }

    /// Open or create a database file
    pub async fn open(
        path: impl AsRef<Path>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> PersistenceResult<Self> {
        let path = path.as_ref();
        info!("Opening chain store at: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(PersistenceError::database("connect"))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database (tests, dry runs)
    pub async fn open_in_memory() -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(PersistenceError::database("connect"))?
            .foreign_keys(true);

        // A single connection that never recycles: each new in-memory
        // connection would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(PersistenceError::database("connect"))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> PersistenceResult<()> {
        debug!("Applying chain schema");
        sqlx::raw_sql(SCHEMA_V1)
            .execute(pool)
            .await
            .map_err(PersistenceError::database("migrate"))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Number of persisted transaction rows
    pub async fn count_transactions(&self) -> PersistenceResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trs")
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::database("count transactions"))?;
        Ok(count as u64)
    }

    /// Number of rows in one asset table
    pub async fn count_asset_rows(&self, table: AssetTable) -> PersistenceResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::database("count asset rows"))?;
        Ok(count as u64)
    }

    async fn insert_block_row(conn: &mut SqliteConnection, row: &BlockRow) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks
                (id, version, timestamp, height, previous_block, number_of_transactions,
                 total_amount, total_fee, reward, payload_hash, generator_public_key,
                 block_signature)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(row.version)
        .bind(row.timestamp)
        .bind(row.height)
        .bind(&row.previous_block)
        .bind(row.number_of_transactions)
        .bind(row.total_amount)
        .bind(row.total_fee)
        .bind(row.reward)
        .bind(&row.payload_hash)
        .bind(&row.generator_public_key)
        .bind(&row.block_signature)
        .execute(conn)
        .await
        .map_err(PersistenceError::database("insert block"))?;

        Ok(())
    }

    async fn insert_transaction_rows(
        conn: &mut SqliteConnection,
        rows: &[TransactionRow],
    ) -> PersistenceResult<()> {
        let per_statement = MAX_BIND_PARAMS / TRS_COLUMNS.len();

        for chunk in rows.chunks(per_statement) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO trs ({}) ", TRS_COLUMNS.join(", ")));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id.clone())
                    .push_bind(row.block_id.clone())
                    .push_bind(row.position)
                    .push_bind(row.tx_type)
                    .push_bind(row.timestamp)
                    .push_bind(row.sender_public_key.clone())
                    .push_bind(row.sender_id.clone())
                    .push_bind(row.recipient_id.clone())
                    .push_bind(row.amount)
                    .push_bind(row.fee)
                    .push_bind(row.signature.clone())
                    .push_bind(row.asset.clone());
            });
            builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(PersistenceError::database("insert transactions"))?;
        }

        Ok(())
    }

    /// Insert one homogeneous batch into its asset table
    async fn insert_asset_rows(
        conn: &mut SqliteConnection,
        table: AssetTable,
        rows: &[AssetRow],
    ) -> PersistenceResult<()> {
        let columns = table.columns();
        let per_statement = MAX_BIND_PARAMS / columns.len();

        for chunk in rows.chunks(per_statement) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                table.name(),
                columns.join(", ")
            ));
            builder.push_values(chunk, |mut b, row| match row {
                AssetRow::Transfer { transaction_id, data } => {
                    b.push_bind(transaction_id.clone()).push_bind(data.clone());
                }
                AssetRow::Signature {
                    transaction_id,
                    public_key,
                } => {
                    b.push_bind(transaction_id.clone())
                        .push_bind(public_key.clone());
                }
                AssetRow::Delegate {
                    transaction_id,
                    username,
                } => {
                    b.push_bind(transaction_id.clone()).push_bind(username.clone());
                }
                AssetRow::Vote {
                    transaction_id,
                    votes,
                } => {
                    b.push_bind(transaction_id.clone()).push_bind(votes.clone());
                }
                AssetRow::Multisignature {
                    transaction_id,
                    min,
                    lifetime,
                    keysgroup,
                } => {
                    b.push_bind(transaction_id.clone())
                        .push_bind(*min)
                        .push_bind(*lifetime)
                        .push_bind(keysgroup.clone());
                }
            });
            builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(PersistenceError::database("insert asset rows"))?;
        }

        Ok(())
    }

    async fn load_transaction_rows(&self, block_id: &str) -> PersistenceResult<Vec<TransactionRow>> {
        sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM trs WHERE block_id = ? ORDER BY position ASC",
        )
        .bind(block_id)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::database("load transactions"))
    }

    async fn hydrate(&self, row: Option<BlockRow>) -> PersistenceResult<Option<Block>> {
        match row {
            Some(row) => {
                let transactions = self.load_transaction_rows(&row.id).await?;
                Ok(Some(row.into_block(transactions)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BlockStore for SqliteStore {
    async fn block_exists(&self, id: &BlockId) -> PersistenceResult<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM blocks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::database("lookup block id"))?;
        Ok(found.is_some())
    }

    async fn save_block(&self, block: &Block) -> PersistenceResult<()> {
        let block_row = BlockRow::from_block(block)?;
        let batches = RowBatches::from_block(block)?;

        // Dropping `tx` without commit rolls everything back
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(PersistenceError::database("begin"))?;

        Self::insert_block_row(&mut *tx, &block_row).await?;

        if !batches.is_empty() {
            Self::insert_transaction_rows(&mut *tx, &batches.transactions).await?;
            for (table, rows) in &batches.assets {
                Self::insert_asset_rows(&mut *tx, *table, rows).await?;
            }
        }

        tx.commit()
            .await
            .map_err(PersistenceError::database("commit"))?;

        debug!(
            "Saved block {} at height {} with {} transactions",
            block.id,
            block.height,
            block.transactions.len()
        );
        Ok(())
    }

    async fn delete_block(&self, id: &BlockId) -> PersistenceResult<()> {
        let result = sqlx::query("DELETE FROM blocks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::database("delete block"))?;

        debug!("Deleted block {} ({} row)", id, result.rows_affected());
        Ok(())
    }

    async fn delete_after_block(&self, id: &BlockId) -> PersistenceResult<StorageResponse> {
        let result = sqlx::query(
            "DELETE FROM blocks WHERE height >= (SELECT height FROM blocks WHERE id = ?)",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::database("delete after block"))?;

        Ok(StorageResponse {
            rows_affected: result.rows_affected(),
        })
    }

    async fn load_block(&self, id: &BlockId) -> PersistenceResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>("SELECT * FROM blocks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::database("load block"))?;
        self.hydrate(row).await
    }

    async fn load_last_block(&self) -> PersistenceResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(
            "SELECT * FROM blocks ORDER BY height DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::database("load last block"))?;
        self.hydrate(row).await
    }

    async fn count_blocks(&self) -> PersistenceResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(PersistenceError::database("count blocks"))?;
        Ok(count as u64)
    }
}
