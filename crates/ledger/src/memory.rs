use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    BalanceKey, EntryId, LedgerEntry, LedgerQuery, Page, Result, StockBalance, StoreError,
    WarehouseId,
    store::{BalanceStore, LedgerStore, StockStore, UnitOfWork, WorkBuffer},
};

/// Default bound on waiting for a balance key lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

type KeyLocks = Arc<std::sync::Mutex<HashMap<BalanceKey, Arc<Mutex<()>>>>>;

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<BalanceKey, StockBalance>,
    entries: Vec<LedgerEntry>,
    last_entry_id: i64,
}

/// In-memory stock store.
///
/// Balance keys are locked with one async mutex per key, acquired in key
/// order. A key's mutex lives only while some unit of work holds or waits on
/// it. Commits apply every staged entry and balance under a single write
/// lock on the shared state, so readers see either all of a unit of work or
/// none of it.
#[derive(Clone)]
pub struct InMemoryStockStore {
    state: Arc<RwLock<LedgerState>>,
    key_locks: KeyLocks,
    lock_timeout: Duration,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            key_locks: KeyLocks::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long [`StockStore::begin`] waits for each key lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the total number of ledger entries stored.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    fn key_lock(&self, key: BalanceKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Key locks held by one unit of work.
///
/// Dropping releases the guards, then forgets every key whose mutex nobody
/// else holds or waits on.
struct HeldLocks {
    registry: KeyLocks,
    keys: Vec<BalanceKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        self.guards.clear();
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }
}

#[async_trait]
impl BalanceStore for InMemoryStockStore {
    async fn get_balance(&self, key: BalanceKey) -> Result<Option<StockBalance>> {
        Ok(self.state.read().await.balances.get(&key).cloned())
    }

    async fn list_balances(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockBalance>> {
        let state = self.state.read().await;
        let mut balances: Vec<_> = state
            .balances
            .values()
            .filter(|b| warehouse_id.is_none_or(|id| b.warehouse_id == id))
            .cloned()
            .collect();
        balances.sort_by_key(StockBalance::key);
        Ok(balances)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStockStore {
    async fn query_entries(&self, query: LedgerQuery) -> Result<Page<LedgerEntry>> {
        let query = query.normalized()?;
        let state = self.state.read().await;

        let mut entries: Vec<_> = state
            .entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| query.compare(a, b));

        let total = entries.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items: Vec<_> = entries
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok(Page::new(items, total, query.page, query.limit))
    }

    async fn sum_qty(&self, key: BalanceKey) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.key() == key)
            .map(|e| e.qty)
            .sum())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Work = InMemoryWork;

    async fn begin(&self, keys: &[BalanceKey]) -> Result<InMemoryWork> {
        let ordered = BalanceKey::lock_order(keys.iter().copied());
        let mut held = HeldLocks {
            registry: Arc::clone(&self.key_locks),
            keys: ordered.clone(),
            guards: Vec::with_capacity(ordered.len()),
        };

        for key in &ordered {
            let lock = self.key_lock(*key);
            match tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await {
                Ok(guard) => held.guards.push(guard),
                Err(_) => {
                    metrics::counter!("stock_lock_conflicts_total").increment(1);
                    tracing::debug!(%key, "balance lock wait timed out");
                    return Err(StoreError::LockTimeout {
                        key: *key,
                        waited_ms: self.lock_timeout.as_millis() as u64,
                    });
                }
            }
        }

        Ok(InMemoryWork {
            state: Arc::clone(&self.state),
            buffer: WorkBuffer::new(ordered),
            _held: held,
        })
    }
}

/// Unit of work over an [`InMemoryStockStore`].
pub struct InMemoryWork {
    state: Arc<RwLock<LedgerState>>,
    buffer: WorkBuffer,
    _held: HeldLocks,
}

#[async_trait]
impl UnitOfWork for InMemoryWork {
    fn locked_keys(&self) -> &[BalanceKey] {
        self.buffer.keys()
    }

    async fn load_balance(&mut self, key: BalanceKey) -> Result<Option<StockBalance>> {
        self.buffer.require_locked(key)?;
        if let Some(staged) = self.buffer.staged_balance(key) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.state.read().await.balances.get(&key).cloned())
    }

    fn stage_balance(&mut self, balance: StockBalance) -> Result<()> {
        self.buffer.stage_balance(balance)
    }

    fn stage_entry(&mut self, entry: crate::NewLedgerEntry) -> Result<()> {
        self.buffer.stage_entry(entry)
    }

    async fn commit(self) -> Result<Vec<LedgerEntry>> {
        let InMemoryWork {
            state,
            buffer,
            _held,
        } = self;
        if buffer.is_empty() {
            return Ok(Vec::new());
        }

        let (balances, entries) = buffer.into_parts();
        let timestamp = Utc::now();

        let mut state = state.write().await;
        let mut committed = Vec::with_capacity(entries.len());
        for entry in entries {
            state.last_entry_id += 1;
            let entry = entry.into_entry(EntryId::new(state.last_entry_id), timestamp);
            state.entries.push(entry.clone());
            committed.push(entry);
        }
        for balance in balances {
            state.balances.insert(balance.key(), balance);
        }

        Ok(committed)
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
