//! Shared string deduplication store.
//!
//! XLSX keeps every distinct text value once in `sharedStrings.xml` and refers to it by
//! index. [`SharedStringTable`] is that table: on the read path it is filled in document
//! order and resolved by index while rows are decoded, on the write path it interns values
//! in first-seen order and is rendered once the workbook is closed.
//!
//! Storage is delegated to a [`StringStore`]: either [`MemoryStore`] or, for documents
//! whose estimated footprint exceeds the memory budget, [`PagedStore`] which keeps a
//! single page of strings resident and swaps the rest to temporary files.

mod memory;
mod paged;

pub use memory::MemoryStore;
pub use paged::PagedStore;

use crate::error::SheetStreamError;
use log::debug;
use std::collections::HashMap;
use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use thiserror::Error;

/// Estimated memory cost of one cached string
pub const BYTES_PER_STRING: u64 = 12 * 1024;

/// Default memory budget for the shared strings cache (128 MiB)
pub const DEFAULT_MEMORY_BUDGET: u64 = 128 * 1024 * 1024;

/// Default number of strings per page of the paged store
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Errors raised by string stores
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Shared string {0} not found")]
    NotFound(usize),

    #[error("Cache segment '{0}' not found")]
    SegmentNotFound(String),

    #[error("String store is closed")]
    Closed,
}

/// Append-only, index-addressable string storage
pub trait StringStore {
    /// Appends a value at the next index
    fn push(&mut self, value: &str) -> Result<(), SheetStreamError>;

    /// Returns the value stored at `index`
    fn get(&mut self, index: usize) -> Result<String, SheetStreamError>;

    /// Number of stored values
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freezes the store; later pushes fail with [`CacheError::Closed`]
    fn close(&mut self) -> Result<(), SheetStreamError>;

    /// Releases every held resource. The store is empty afterwards.
    fn clear(&mut self) -> Result<(), SheetStreamError>;
}

/// Backing strategy of a [`SharedStringTable`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CachingStrategy {
    InMemory,
    Paged,
}

/// Configuration of the shared strings cache
#[derive(Clone, Debug)]
pub struct CachingOptions {
    /// Memory the cache may use before strings are paged to disk
    pub memory_budget: u64,
    /// Strings per page when paging
    pub page_size: usize,
    /// Folder for page files, the system temp folder when unset
    pub temp_folder: Option<PathBuf>,
    /// Forces a strategy instead of estimating one
    pub strategy: Option<CachingStrategy>,
}

impl Default for CachingOptions {
    fn default() -> Self {
        CachingOptions {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            page_size: DEFAULT_PAGE_SIZE,
            temp_folder: None,
            strategy: None,
        }
    }
}

impl CachingOptions {
    /// Picks a strategy for a document announcing `unique_count` strings.
    ///
    /// In-memory is chosen when the estimate stays below half of the budget; an unknown
    /// count is treated as large.
    pub fn select_strategy(&self, unique_count: Option<u64>) -> CachingStrategy {
        if let Some(strategy) = self.strategy {
            return strategy;
        }
        match unique_count {
            Some(count) if count.saturating_mul(BYTES_PER_STRING) < self.memory_budget / 2 => CachingStrategy::InMemory,
            _ => CachingStrategy::Paged,
        }
    }

    fn open_store(&self, strategy: CachingStrategy) -> Result<Box<dyn StringStore>, SheetStreamError> {
        Ok(match strategy {
            CachingStrategy::InMemory => Box::new(MemoryStore::new()),
            CachingStrategy::Paged => Box::new(PagedStore::new(self.temp_folder.as_deref(), self.page_size)?),
        })
    }
}

/// Ids of the interned values sharing one 64-bit hash
#[derive(Debug)]
enum Candidates {
    One(u32),
    Many(Vec<u32>),
}

impl Candidates {
    fn ids(&self) -> &[u32] {
        match self {
            Candidates::One(id) => std::slice::from_ref(id),
            Candidates::Many(ids) => ids,
        }
    }

    fn add(&mut self, id: u32) {
        match self {
            Candidates::One(first) => *self = Candidates::Many(vec![*first, id]),
            Candidates::Many(ids) => ids.push(id),
        }
    }
}

fn hash_value(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Document-wide shared string table
pub struct SharedStringTable {
    store: Box<dyn StringStore>,
    strategy: CachingStrategy,
    /// Hash of every interned value to its ids; values themselves live in the store only
    lookup: Option<HashMap<u64, Candidates>>,
    /// Options to page with once the in-memory store outgrows the budget
    spill: Option<CachingOptions>,
}

impl SharedStringTable {
    /// Creates a table filled by a reader in document order.
    ///
    /// # Arguments
    ///
    /// * `options` - Budget, page size and temp folder of the cache
    /// * `unique_count` - `uniqueCount` announced by the document, if any
    pub fn for_reading(options: &CachingOptions, unique_count: Option<u64>) -> Result<Self, SheetStreamError> {
        let strategy = options.select_strategy(unique_count);
        debug!("Caching shared strings with {strategy:?} strategy for {unique_count:?} unique strings");
        Ok(SharedStringTable {
            store: options.open_store(strategy)?,
            strategy,
            lookup: None,
            spill: None,
        })
    }

    /// Creates a table that deduplicates values as a writer interns them.
    ///
    /// The number of values is unknown up front: unless a strategy is forced the table
    /// starts in memory and moves to pages once the estimate reaches half of the budget.
    pub fn for_writing(options: &CachingOptions) -> Result<Self, SheetStreamError> {
        let strategy = options.strategy.unwrap_or(CachingStrategy::InMemory);
        Ok(SharedStringTable {
            store: options.open_store(strategy)?,
            strategy,
            lookup: Some(HashMap::new()),
            spill: options.strategy.is_none().then(|| options.clone()),
        })
    }

    /// Strategy selected for this document
    pub fn strategy(&self) -> CachingStrategy {
        self.strategy
    }

    /// Returns the id of `value`, storing it first when it has not been seen yet.
    pub fn intern(&mut self, value: &str) -> Result<u32, SheetStreamError> {
        let hash = hash_value(value);
        if let Some(candidates) = self.lookup.as_ref().and_then(|lookup| lookup.get(&hash)) {
            for id in candidates.ids().to_vec() {
                if self.store.get(id as usize)? == value {
                    return Ok(id);
                }
            }
        }
        let next = self.push(value)?;
        self.spill_if_needed()?;
        Ok(next)
    }

    /// Appends a value at the next id without deduplication.
    pub fn push(&mut self, value: &str) -> Result<u32, SheetStreamError> {
        let next = self.store.len() as u32;
        self.store.push(value)?;
        if let Some(lookup) = &mut self.lookup {
            lookup
                .entry(hash_value(value))
                .and_modify(|candidates| candidates.add(next))
                .or_insert(Candidates::One(next));
        }
        Ok(next)
    }

    /// Moves the values to a paged store once the in-memory estimate reaches half of the budget
    fn spill_if_needed(&mut self) -> Result<(), SheetStreamError> {
        let options = match &self.spill {
            Some(options) if self.strategy == CachingStrategy::InMemory => options,
            _ => return Ok(()),
        };
        if options.select_strategy(Some(self.store.len() as u64)) == CachingStrategy::InMemory {
            return Ok(());
        }
        debug!("Paging {} interned shared strings past the memory budget", self.store.len());
        let mut paged = options.open_store(CachingStrategy::Paged)?;
        for index in 0..self.store.len() {
            paged.push(&self.store.get(index)?)?;
        }
        self.store.clear()?;
        self.store = paged;
        self.strategy = CachingStrategy::Paged;
        Ok(())
    }

    /// Returns the value stored under `id`
    pub fn resolve(&mut self, id: usize) -> Result<String, SheetStreamError> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Freezes the table. Calling it again has no effect.
    pub fn close(&mut self) -> Result<(), SheetStreamError> {
        self.store.close()
    }

    /// Releases the store and its temporary files.
    pub fn clear(&mut self) -> Result<(), SheetStreamError> {
        if let Some(lookup) = &mut self.lookup {
            lookup.clear();
        }
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn strategy_selection() {
        let options = CachingOptions::default();
        assert_eq!(options.select_strategy(Some(0)), CachingStrategy::InMemory);
        assert_eq!(options.select_strategy(Some(5_000)), CachingStrategy::InMemory);
        assert_eq!(options.select_strategy(Some(6_000)), CachingStrategy::Paged);
        assert_eq!(options.select_strategy(None), CachingStrategy::Paged);
        assert_eq!(options.select_strategy(Some(u64::MAX)), CachingStrategy::Paged);

        let forced = CachingOptions {
            strategy: Some(CachingStrategy::InMemory),
            ..CachingOptions::default()
        };
        assert_eq!(forced.select_strategy(None), CachingStrategy::InMemory);
    }

    #[test]
    fn interning_deduplicates_in_first_seen_order() {
        let mut table = SharedStringTable::for_writing(&CachingOptions::default()).unwrap();
        assert_eq!(table.intern("b").unwrap(), 0);
        assert_eq!(table.intern("a").unwrap(), 1);
        assert_eq!(table.intern("b").unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(1).unwrap(), "a");
    }

    #[test]
    fn colliding_hashes_are_confirmed_against_the_store() {
        let mut table = SharedStringTable::for_writing(&CachingOptions::default()).unwrap();
        table.intern("a").unwrap();
        table.intern("b").unwrap();
        // "c" collides with "a"
        table.lookup.as_mut().unwrap().insert(hash_value("c"), Candidates::One(0));
        assert_eq!(table.intern("c").unwrap(), 2);
        assert_eq!(table.intern("c").unwrap(), 2);
        assert_eq!(table.intern("a").unwrap(), 0);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn interning_pages_once_the_budget_is_reached() {
        let folder = tempfile::tempdir().unwrap();
        let options = CachingOptions {
            memory_budget: 10 * BYTES_PER_STRING,
            page_size: 2,
            temp_folder: Some(folder.path().to_path_buf()),
            strategy: None,
        };
        let mut table = SharedStringTable::for_writing(&options).unwrap();
        for value in ["v0", "v1", "v2", "v3"] {
            table.intern(value).unwrap();
        }
        assert_eq!(table.strategy(), CachingStrategy::InMemory);
        table.intern("v4").unwrap();
        assert_eq!(table.strategy(), CachingStrategy::Paged);

        assert_eq!(table.intern("v1").unwrap(), 1);
        assert_eq!(table.intern("v5").unwrap(), 5);
        assert_eq!(table.resolve(4).unwrap(), "v4");
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn forced_strategies_never_move() {
        let options = CachingOptions {
            memory_budget: 0,
            strategy: Some(CachingStrategy::InMemory),
            ..CachingOptions::default()
        };
        let mut table = SharedStringTable::for_writing(&options).unwrap();
        table.intern("a").unwrap();
        table.intern("b").unwrap();
        assert_eq!(table.strategy(), CachingStrategy::InMemory);
    }

    #[test]
    fn reading_keeps_document_order_and_duplicates() {
        let mut table = SharedStringTable::for_reading(&CachingOptions::default(), Some(3)).unwrap();
        assert_eq!(table.strategy(), CachingStrategy::InMemory);
        for value in ["x", "y", "x"] {
            table.push(value).unwrap();
        }
        assert_eq!(table.resolve(2).unwrap(), "x");
        assert_eq!(table.resolve(3).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn closed_tables_reject_writes() {
        let mut table = SharedStringTable::for_writing(&CachingOptions::default()).unwrap();
        table.intern("a").unwrap();
        table.close().unwrap();
        table.close().unwrap();
        assert_eq!(table.resolve(0).unwrap(), "a");
        assert_eq!(table.intern("b").unwrap_err().kind(), ErrorKind::InvalidArgument);
        table.clear().unwrap();
        assert!(table.is_empty());
    }
}
