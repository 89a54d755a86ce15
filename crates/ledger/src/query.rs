use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ItemId, LedgerEntry, ReferenceKind, Result, StoreError, TransactionKind, WarehouseId,
};

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page size a query may request; larger values are clamped.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Field a ledger page is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSortBy {
    #[default]
    Timestamp,
    EntryId,
    Qty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Builder for ledger history queries.
///
/// All filters are conjunctive. Pages are 1-based and, unless overridden,
/// sorted most recent first.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerQuery {
    pub warehouse_id: Option<WarehouseId>,
    pub item_id: Option<ItemId>,
    pub kind: Option<TransactionKind>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,

    /// Entries at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Entries at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    pub page: u32,
    pub limit: u32,
    pub sort_by: LedgerSortBy,
    pub sort_order: SortOrder,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            warehouse_id: None,
            item_id: None,
            kind: None,
            reference_kind: None,
            reference_id: None,
            from_timestamp: None,
            to_timestamp: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            sort_by: LedgerSortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl LedgerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warehouse_id(mut self, id: WarehouseId) -> Self {
        self.warehouse_id = Some(id);
        self
    }

    pub fn item_id(mut self, id: ItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn reference_kind(mut self, kind: ReferenceKind) -> Self {
        self.reference_kind = Some(kind);
        self
    }

    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn sort(mut self, sort_by: LedgerSortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    /// Rejects queries no store can answer and clamps the page size.
    pub fn normalized(mut self) -> Result<Self> {
        if self.page == 0 {
            return Err(StoreError::InvalidQuery("page starts at 1".to_string()));
        }
        if self.limit == 0 {
            return Err(StoreError::InvalidQuery(
                "limit must be at least 1".to_string(),
            ));
        }
        if let (Some(from), Some(to)) = (self.from_timestamp, self.to_timestamp)
            && from > to
        {
            return Err(StoreError::InvalidQuery(format!(
                "date range is inverted: {from} is after {to}"
            )));
        }
        self.limit = self.limit.min(MAX_PAGE_SIZE);
        Ok(self)
    }

    /// Number of entries skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Returns true if the entry passes every filter set on the query.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(id) = self.warehouse_id
            && entry.warehouse_id != id
        {
            return false;
        }
        if let Some(id) = self.item_id
            && entry.item_id != id
        {
            return false;
        }
        if let Some(kind) = self.kind
            && entry.kind != kind
        {
            return false;
        }
        if let Some(kind) = self.reference_kind
            && entry.reference_kind != Some(kind)
        {
            return false;
        }
        if let Some(ref id) = self.reference_id
            && entry.reference_id.as_ref() != Some(id)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && entry.timestamp > to
        {
            return false;
        }
        true
    }

    /// Orders two entries according to the query's sort settings.
    ///
    /// Ties on the sort field are broken by entry id in the same direction.
    pub fn compare(&self, a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
        let primary = match self.sort_by {
            LedgerSortBy::Timestamp => a.timestamp.cmp(&b.timestamp),
            LedgerSortBy::EntryId => Ordering::Equal,
            LedgerSortBy::Qty => a.qty.cmp(&b.qty),
        };
        let ordering = primary.then(a.entry_id.cmp(&b.entry_id));
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }

    /// Returns true if a later page exists.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BalanceKey, EntryId, NewLedgerEntry};
    use rust_decimal_macros::dec;

    fn entry(id: i64, key: BalanceKey, kind: TransactionKind) -> LedgerEntry {
        NewLedgerEntry::new(key, kind, dec!(1), dec!(2)).into_entry(EntryId::new(id), Utc::now())
    }

    #[test]
    fn defaults_to_first_page_most_recent_first() {
        let query = LedgerQuery::new();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort_by, LedgerSortBy::Timestamp);
        assert_eq!(query.sort_order, SortOrder::Desc);
    }

    #[test]
    fn normalized_clamps_limit_and_rejects_page_zero() {
        let query = LedgerQuery::new().limit(10_000).normalized().unwrap();
        assert_eq!(query.limit, MAX_PAGE_SIZE);

        assert!(LedgerQuery::new().page(0).normalized().is_err());
        assert!(LedgerQuery::new().limit(0).normalized().is_err());
    }

    #[test]
    fn normalized_rejects_inverted_date_range() {
        let now = Utc::now();
        let query = LedgerQuery::new()
            .from_timestamp(now)
            .to_timestamp(now - chrono::Duration::hours(1));
        assert!(matches!(
            query.normalized(),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn offset_follows_page_and_limit() {
        assert_eq!(LedgerQuery::new().page(3).limit(20).offset(), 40);
        assert_eq!(LedgerQuery::new().offset(), 0);
    }

    #[test]
    fn filters_are_conjunctive() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let other = BalanceKey::new(key.warehouse_id, ItemId::new());
        let receive = entry(1, key, TransactionKind::Receive);

        let query = LedgerQuery::new()
            .warehouse_id(key.warehouse_id)
            .item_id(key.item_id)
            .kind(TransactionKind::Receive);
        assert!(query.matches(&receive));
        assert!(!query.matches(&entry(2, other, TransactionKind::Receive)));
        assert!(!query.matches(&entry(3, key, TransactionKind::Issue)));
    }

    #[test]
    fn reference_filters_ignore_entries_without_reference() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let plain = entry(1, key, TransactionKind::Receive);
        let query = LedgerQuery::new()
            .reference_kind(ReferenceKind::PurchaseOrder)
            .reference_id("PO-1");
        assert!(!query.matches(&plain));
    }

    #[test]
    fn descending_sort_breaks_ties_by_entry_id() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let mut a = entry(1, key, TransactionKind::Receive);
        let mut b = entry(2, key, TransactionKind::Receive);
        b.timestamp = a.timestamp;
        a.qty = dec!(5);

        let query = LedgerQuery::new();
        assert_eq!(query.compare(&a, &b), Ordering::Greater);

        let by_qty = LedgerQuery::new().sort(LedgerSortBy::Qty, SortOrder::Asc);
        assert_eq!(by_qty.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn page_counts_total_pages() {
        let page: Page<u8> = Page::new(vec![], 101, 1, 50);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());

        let empty: Page<u8> = Page::new(vec![], 0, 1, 50);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next());
    }
}
