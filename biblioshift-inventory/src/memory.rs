//! In-memory inventory store
//!
//! Used for testing and development. Not persistent.
//! A batch apply holds the write lock for its whole duration, which serializes
//! it against every other writer the same way row locks do in PostgreSQL.

use async_trait::async_trait;
use biblioshift_core::{
    Author, AuthorId, Book, BookId, BookMeta, DeltaBatch, Holding, HoldingKey, HoldingRow,
    Library, LibraryId, LibraryUsage,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{InventoryError, Result};
use crate::seed::Catalog;
use crate::store::{CatalogStore, ImportSummary, InventoryStore};

#[derive(Debug, Default)]
struct Tables {
    authors: BTreeMap<AuthorId, Author>,
    books: BTreeMap<BookId, Book>,
    libraries: BTreeMap<LibraryId, Library>,
    holdings: BTreeMap<HoldingKey, i64>,
}

impl Tables {
    fn name_taken(&self, name: &str) -> bool {
        self.libraries.values().any(|l| l.name == name)
    }
}

/// In-memory inventory store
#[derive(Debug, Default)]
pub struct MemoryInventory {
    tables: RwLock<Tables>,

    /// Number of successful batch applies
    applies: AtomicU64,
}

impl MemoryInventory {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a library
    pub fn add_library(&self, id: LibraryId, name: impl Into<String>, capacity: i64) {
        self.tables.write().libraries.insert(
            id,
            Library {
                id,
                name: name.into(),
                capacity,
            },
        );
    }

    /// Add or replace an author
    pub fn add_author(&self, id: AuthorId, full_name: impl Into<String>) {
        self.tables.write().authors.insert(
            id,
            Author {
                id,
                full_name: full_name.into(),
                birth_date: None,
            },
        );
    }

    /// Add or replace a book
    pub fn add_book(&self, id: BookId, title: impl Into<String>, year: i32, author_id: AuthorId) {
        self.tables.write().books.insert(
            id,
            Book {
                id,
                title: title.into(),
                year,
                author_id,
            },
        );
    }

    /// Set a holding row, creating it if absent
    pub fn set_holding(&self, library_id: LibraryId, book_id: BookId, quantity: i64) {
        self.tables
            .write()
            .holdings
            .insert(HoldingKey::new(library_id, book_id), quantity);
    }

    /// Quantity of a holding row, `None` when the row does not exist
    pub fn holding(&self, library_id: LibraryId, book_id: BookId) -> Option<i64> {
        self.tables
            .read()
            .holdings
            .get(&HoldingKey::new(library_id, book_id))
            .copied()
    }

    /// All holding rows, ordered by library then book
    pub fn holdings(&self) -> Vec<Holding> {
        self.tables
            .read()
            .holdings
            .iter()
            .map(|(k, q)| Holding {
                library_id: k.library_id,
                book_id: k.book_id,
                quantity: *q,
            })
            .collect()
    }

    /// Number of successful batch applies so far
    pub fn apply_count(&self) -> u64 {
        self.applies.load(Ordering::SeqCst)
    }

    /// Clear all tables
    pub fn clear(&self) {
        *self.tables.write() = Tables::default();
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn library_count(&self) -> Result<usize> {
        Ok(self.tables.read().libraries.len())
    }

    async fn library_ids(&self) -> Result<Vec<LibraryId>> {
        Ok(self.tables.read().libraries.keys().copied().collect())
    }

    fn under_covered_books(&self, library_count: usize) -> BoxStream<'_, Result<BookId>> {
        // (covered, total) per book
        let mut per_book: BTreeMap<BookId, (usize, i64)> = BTreeMap::new();
        for (key, quantity) in &self.tables.read().holdings {
            let entry = per_book.entry(key.book_id).or_default();
            if *quantity > 0 {
                entry.0 += 1;
            }
            entry.1 += quantity;
        }

        let ids: Vec<BookId> = per_book
            .into_iter()
            .filter(|(_, (covered, total))| *covered < library_count && *total > 0)
            .map(|(id, _)| id)
            .collect();

        stream::iter(ids.into_iter().map(Ok)).boxed()
    }

    async fn book_holdings(&self, book_id: BookId) -> Result<Vec<HoldingRow>> {
        Ok(self
            .tables
            .read()
            .holdings
            .iter()
            .filter(|(k, _)| k.book_id == book_id)
            .map(|(k, q)| HoldingRow::new(k.library_id, *q))
            .collect())
    }

    async fn library_usage(&self) -> Result<Vec<LibraryUsage>> {
        let tables = self.tables.read();

        let mut used: HashMap<LibraryId, i64> = HashMap::new();
        for (key, quantity) in &tables.holdings {
            *used.entry(key.library_id).or_default() += quantity;
        }

        Ok(tables
            .libraries
            .values()
            .map(|l| LibraryUsage {
                id: l.id,
                capacity: l.capacity,
                used: used.get(&l.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn book_meta(&self, ids: &[BookId]) -> Result<Vec<BookMeta>> {
        let tables = self.tables.read();
        let mut metas: Vec<BookMeta> = ids
            .iter()
            .filter_map(|id| tables.books.get(id))
            .map(|b| BookMeta {
                id: b.id,
                year: b.year,
                author_id: b.author_id,
            })
            .collect();
        metas.sort_by_key(|m| m.id);
        metas.dedup_by_key(|m| m.id);
        Ok(metas)
    }

    async fn apply_deltas(&self, batch: &DeltaBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write();

        // Validate everything before the first mutation so a failure leaves
        // no partial update behind
        for (key, _) in batch.increments() {
            if !tables.libraries.contains_key(&key.library_id) {
                return Err(InventoryError::Conflict(format!(
                    "library {} does not exist",
                    key.library_id
                )));
            }
            if !tables.books.contains_key(&key.book_id) {
                return Err(InventoryError::Conflict(format!(
                    "book {} does not exist",
                    key.book_id
                )));
            }
        }
        for (key, quantity) in batch.decrements() {
            let current = tables.holdings.get(&key).copied().ok_or_else(|| {
                InventoryError::Conflict(format!(
                    "holding (library {}, book {}) does not exist",
                    key.library_id, key.book_id
                ))
            })?;
            if current + batch.net(&key) < 0 {
                return Err(InventoryError::Conflict(format!(
                    "holding (library {}, book {}) has {} copies, cannot remove {}",
                    key.library_id, key.book_id, current, quantity
                )));
            }
        }

        for (key, quantity) in batch.increments() {
            *tables.holdings.entry(key).or_insert(0) += quantity;
        }
        for (key, quantity) in batch.decrements() {
            if let Some(current) = tables.holdings.get_mut(&key) {
                *current -= quantity;
            }
        }

        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryInventory {
    async fn import_catalog(&self, catalog: &Catalog, flush: bool) -> Result<ImportSummary> {
        let mut tables = self.tables.write();
        let mut summary = ImportSummary::default();

        if flush {
            *tables = Tables::default();
        }

        for author in &catalog.authors {
            if !tables.authors.contains_key(&author.id) {
                tables.authors.insert(author.id, author.clone());
                summary.authors += 1;
            }
        }
        for book in &catalog.books {
            if !tables.books.contains_key(&book.id) {
                tables.books.insert(book.id, book.clone());
                summary.books += 1;
            }
        }
        for library in &catalog.libraries {
            if !tables.libraries.contains_key(&library.id) && !tables.name_taken(&library.name) {
                tables.libraries.insert(library.id, library.clone());
                summary.libraries += 1;
            }
        }

        Ok(summary)
    }

    async fn insert_holdings(&self, holdings: &[Holding]) -> Result<u64> {
        if let Some(bad) = holdings.iter().find(|h| h.quantity < 0) {
            return Err(InventoryError::Invalid(format!(
                "negative quantity {} for library {}, book {}",
                bad.quantity, bad.library_id, bad.book_id
            )));
        }

        let mut tables = self.tables.write();
        let mut inserted = 0;
        for holding in holdings {
            let key = HoldingKey::new(holding.library_id, holding.book_id);
            if !tables.holdings.contains_key(&key) {
                tables.holdings.insert(key, holding.quantity);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn libraries(&self) -> Result<Vec<Library>> {
        Ok(self.tables.read().libraries.values().cloned().collect())
    }

    async fn library(&self, id: LibraryId) -> Result<Option<Library>> {
        Ok(self.tables.read().libraries.get(&id).cloned())
    }

    async fn book_ids(&self) -> Result<Vec<BookId>> {
        Ok(self.tables.read().books.keys().copied().collect())
    }

    async fn books(&self, ids: &[BookId]) -> Result<Vec<Book>> {
        let tables = self.tables.read();
        let mut books: Vec<Book> = ids
            .iter()
            .filter_map(|id| tables.books.get(id))
            .cloned()
            .collect();
        books.sort_by_key(|b| b.id);
        books.dedup_by_key(|b| b.id);
        Ok(books)
    }

    async fn add_copies(
        &self,
        library_id: LibraryId,
        book_ids: &[BookId],
        copies: i64,
    ) -> Result<u64> {
        if copies < 0 {
            return Err(InventoryError::Invalid(format!(
                "cannot add {copies} copies"
            )));
        }

        let mut tables = self.tables.write();
        if !tables.libraries.contains_key(&library_id) {
            return Err(InventoryError::NotFound(format!("library {library_id}")));
        }
        if let Some(missing) = book_ids.iter().find(|id| !tables.books.contains_key(*id)) {
            return Err(InventoryError::NotFound(format!("book {missing}")));
        }

        let mut unique = book_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        for book_id in &unique {
            *tables
                .holdings
                .entry(HoldingKey::new(library_id, *book_id))
                .or_insert(0) += copies;
        }
        Ok(unique.len() as u64)
    }
}
