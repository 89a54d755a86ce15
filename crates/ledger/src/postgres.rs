use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgArguments, PgRow},
    query::Query,
};
use uuid::Uuid;

use crate::{
    BalanceKey, EntryId, ItemId, LedgerEntry, LedgerQuery, LedgerSortBy, NewLedgerEntry, Page,
    ReferenceKind, Result, SortOrder, StockBalance, StoreError, TransactionKind, WarehouseId,
    memory::DEFAULT_LOCK_TIMEOUT,
    store::{BalanceStore, LedgerStore, StockStore, UnitOfWork, WorkBuffer},
};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

const ENTRY_COLUMNS: &str = "entry_id, warehouse_id, item_id, kind, recorded_at, qty, unit_cost, \
     reference_kind, reference_id, notes, performed_by";

const BALANCE_COLUMNS: &str =
    "warehouse_id, item_id, on_hand_qty, reserved_qty, reorder_level, last_counted_at";

/// PostgreSQL-backed stock store.
///
/// Each unit of work is one database transaction. Balance keys are locked
/// with transaction-scoped advisory locks taken in key order, and the wait
/// is bounded by `lock_timeout`.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long [`StockStore::begin`] waits for each key lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_balance(row: PgRow) -> Result<StockBalance> {
        Ok(StockBalance {
            warehouse_id: WarehouseId::from_uuid(row.try_get::<Uuid, _>("warehouse_id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            on_hand_qty: row.try_get("on_hand_qty")?,
            reserved_qty: row.try_get("reserved_qty")?,
            reorder_level: row.try_get("reorder_level")?,
            last_counted_at: row.try_get("last_counted_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<LedgerEntry> {
        let kind: String = row.try_get("kind")?;
        let reference_kind: Option<String> = row.try_get("reference_kind")?;

        Ok(LedgerEntry {
            entry_id: EntryId::new(row.try_get("entry_id")?),
            warehouse_id: WarehouseId::from_uuid(row.try_get::<Uuid, _>("warehouse_id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            kind: kind
                .parse::<TransactionKind>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            timestamp: row.try_get("recorded_at")?,
            qty: row.try_get("qty")?,
            unit_cost: row.try_get("unit_cost")?,
            reference_kind: reference_kind
                .map(|k| k.parse::<ReferenceKind>())
                .transpose()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            reference_id: row.try_get("reference_id")?,
            notes: row.try_get("notes")?,
            performed_by: row.try_get("performed_by")?,
        })
    }

    /// Builds the shared WHERE clause for ledger queries.
    fn ledger_filter(query: &LedgerQuery) -> String {
        let mut sql = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if query.warehouse_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if query.item_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND item_id = ${param_count}"));
        }
        if query.kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ${param_count}"));
        }
        if query.reference_kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND reference_kind = ${param_count}"));
        }
        if query.reference_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND reference_id = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at <= ${param_count}"));
        }

        sql
    }

    fn bind_filter<'q>(
        mut sqlx_query: Query<'q, Postgres, PgArguments>,
        query: &LedgerQuery,
    ) -> Query<'q, Postgres, PgArguments> {
        if let Some(id) = query.warehouse_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(id) = query.item_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(kind) = query.kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(kind) = query.reference_kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(ref id) = query.reference_id {
            sqlx_query = sqlx_query.bind(id.clone());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        sqlx_query
    }

    fn order_clause(query: &LedgerQuery) -> String {
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        match query.sort_by {
            LedgerSortBy::Timestamp => {
                format!(" ORDER BY recorded_at {direction}, entry_id {direction}")
            }
            LedgerSortBy::EntryId => format!(" ORDER BY entry_id {direction}"),
            LedgerSortBy::Qty => format!(" ORDER BY qty {direction}, entry_id {direction}"),
        }
    }
}

/// Maps contention errors raised by the database to [`StoreError::Conflict`].
fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && let Some(code) = db_err.code()
        && matches!(
            code.as_ref(),
            LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED | SERIALIZATION_FAILURE
        )
    {
        return StoreError::Conflict(db_err.message().to_string());
    }
    StoreError::Database(err)
}

#[async_trait]
impl BalanceStore for PostgresStockStore {
    async fn get_balance(&self, key: BalanceKey) -> Result<Option<StockBalance>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM stock_balances WHERE warehouse_id = $1 AND item_id = $2"
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_balance).transpose()
    }

    async fn list_balances(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockBalance>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BALANCE_COLUMNS} FROM stock_balances
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
            ORDER BY warehouse_id ASC, item_id ASC
            "#
        ))
        .bind(warehouse_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_balance).collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresStockStore {
    async fn query_entries(&self, query: LedgerQuery) -> Result<Page<LedgerEntry>> {
        let query = query.normalized()?;
        let filter = Self::ledger_filter(&query);

        let count_sql = format!("SELECT COUNT(*) FROM ledger_entries{filter}");
        let total: i64 = Self::bind_filter(sqlx::query(&count_sql), &query)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries{filter}{} LIMIT {} OFFSET {}",
            Self::order_clause(&query),
            query.limit,
            query.offset(),
        );
        let rows = Self::bind_filter(sqlx::query(&sql), &query)
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(
            items,
            u64::try_from(total).unwrap_or_default(),
            query.page,
            query.limit,
        ))
    }

    async fn sum_qty(&self, key: BalanceKey) -> Result<Decimal> {
        let sum: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(qty), 0) FROM ledger_entries WHERE warehouse_id = $1 AND item_id = $2",
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Work = PostgresWork;

    async fn begin(&self, keys: &[BalanceKey]) -> Result<PostgresWork> {
        let ordered = BalanceKey::lock_order(keys.iter().copied());
        let mut tx = self.pool.begin().await?;

        // SET cannot take bind parameters; the value is an integer we format.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        for key in &ordered {
            let locked = sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(format!("{}:{}", key.warehouse_id, key.item_id))
                .execute(&mut *tx)
                .await;

            if let Err(err) = locked {
                return Err(match map_db_error(err) {
                    StoreError::Conflict(_) => {
                        metrics::counter!("stock_lock_conflicts_total").increment(1);
                        tracing::debug!(%key, "balance lock wait timed out");
                        StoreError::LockTimeout {
                            key: *key,
                            waited_ms: self.lock_timeout.as_millis() as u64,
                        }
                    }
                    other => other,
                });
            }
        }

        Ok(PostgresWork {
            tx,
            buffer: WorkBuffer::new(ordered),
        })
    }
}

/// Unit of work over a [`PostgresStockStore`], backed by one transaction.
pub struct PostgresWork {
    tx: Transaction<'static, Postgres>,
    buffer: WorkBuffer,
}

#[async_trait]
impl UnitOfWork for PostgresWork {
    fn locked_keys(&self) -> &[BalanceKey] {
        self.buffer.keys()
    }

    async fn load_balance(&mut self, key: BalanceKey) -> Result<Option<StockBalance>> {
        self.buffer.require_locked(key)?;
        if let Some(staged) = self.buffer.staged_balance(key) {
            return Ok(Some(staged.clone()));
        }

        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM stock_balances WHERE warehouse_id = $1 AND item_id = $2"
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.item_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row.map(PostgresStockStore::row_to_balance).transpose()
    }

    fn stage_balance(&mut self, balance: StockBalance) -> Result<()> {
        self.buffer.stage_balance(balance)
    }

    fn stage_entry(&mut self, entry: NewLedgerEntry) -> Result<()> {
        self.buffer.stage_entry(entry)
    }

    async fn commit(self) -> Result<Vec<LedgerEntry>> {
        let PostgresWork { mut tx, buffer } = self;
        let (balances, entries) = buffer.into_parts();
        // Postgres keeps microseconds; truncate so returned entries match stored ones.
        let timestamp = Utc::now().trunc_subsecs(6);

        let mut committed = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO ledger_entries
                    (warehouse_id, item_id, kind, recorded_at, qty, unit_cost,
                     reference_kind, reference_id, notes, performed_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING entry_id
                "#,
            )
            .bind(entry.warehouse_id.as_uuid())
            .bind(entry.item_id.as_uuid())
            .bind(entry.kind.as_str())
            .bind(timestamp)
            .bind(entry.qty)
            .bind(entry.unit_cost)
            .bind(entry.reference_kind.map(|k| k.as_str()))
            .bind(entry.reference_id.as_deref())
            .bind(entry.notes.as_deref())
            .bind(entry.performed_by.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

            committed.push(entry.into_entry(EntryId::new(entry_id), timestamp));
        }

        for balance in &balances {
            sqlx::query(
                r#"
                INSERT INTO stock_balances
                    (warehouse_id, item_id, on_hand_qty, reserved_qty, reorder_level, last_counted_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW())
                ON CONFLICT (warehouse_id, item_id) DO UPDATE SET
                    on_hand_qty = EXCLUDED.on_hand_qty,
                    reserved_qty = EXCLUDED.reserved_qty,
                    reorder_level = EXCLUDED.reorder_level,
                    last_counted_at = EXCLUDED.last_counted_at,
                    updated_at = NOW()
                "#,
            )
            .bind(balance.warehouse_id.as_uuid())
            .bind(balance.item_id.as_uuid())
            .bind(balance.on_hand_qty)
            .bind(balance.reserved_qty)
            .bind(balance.reorder_level)
            .bind(balance.last_counted_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(committed)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
