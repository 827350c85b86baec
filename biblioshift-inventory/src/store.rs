//! Inventory store traits
//!
//! Defines the interface the rebalancer plans against, and the one the
//! seeding and intake utilities populate.

use async_trait::async_trait;
use biblioshift_core::{
    Book, BookId, BookMeta, DeltaBatch, Holding, HoldingRow, Library, LibraryId, LibraryUsage,
};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::seed::Catalog;

/// Read queries and the locked batch update used by a rebalance run
///
/// Reads are unlocked snapshot reads. Only [`InventoryStore::apply_deltas`]
/// synchronizes with concurrent writers.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Number of libraries
    async fn library_count(&self) -> Result<usize>;

    /// All library ids, ascending
    async fn library_ids(&self) -> Result<Vec<LibraryId>>;

    /// Stream ids of books held in fewer than `library_count` libraries
    /// and with at least one copy overall, ascending.
    ///
    /// Each call starts a fresh scan.
    fn under_covered_books(&self, library_count: usize) -> BoxStream<'_, Result<BookId>>;

    /// Every holding row of a book, zero-quantity rows included
    async fn book_holdings(&self, book_id: BookId) -> Result<Vec<HoldingRow>>;

    /// Capacity and used capacity of every library, ascending by id
    async fn library_usage(&self) -> Result<Vec<LibraryUsage>>;

    /// Year and author of the given books. Unknown ids are omitted.
    async fn book_meta(&self, ids: &[BookId]) -> Result<Vec<BookMeta>>;

    /// Lock every row the batch touches, then apply all increments
    /// (creating missing rows) and decrements as one atomic unit.
    async fn apply_deltas(&self, batch: &DeltaBatch) -> Result<()>;
}

/// Catalog population and intake
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert authors, books and libraries, skipping ids (or library names)
    /// that already exist. With `flush`, everything is deleted first.
    async fn import_catalog(&self, catalog: &Catalog, flush: bool) -> Result<ImportSummary>;

    /// Insert holdings, skipping (library, book) pairs that already exist.
    /// Returns the number of rows inserted.
    async fn insert_holdings(&self, holdings: &[Holding]) -> Result<u64>;

    /// All libraries, ascending by id
    async fn libraries(&self) -> Result<Vec<Library>>;

    async fn library(&self, id: LibraryId) -> Result<Option<Library>>;

    /// All book ids, ascending
    async fn book_ids(&self) -> Result<Vec<BookId>>;

    /// Books with the given ids. Unknown ids are omitted.
    async fn books(&self, ids: &[BookId]) -> Result<Vec<Book>>;

    /// Add `copies` to each book's holding in one library, creating
    /// missing rows first. Returns the number of rows updated.
    async fn add_copies(&self, library_id: LibraryId, book_ids: &[BookId], copies: i64)
        -> Result<u64>;
}

/// Rows inserted by a catalog import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub authors: u64,
    pub books: u64,
    pub libraries: u64,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} authors, {} books, {} libraries imported",
            self.authors, self.books, self.libraries
        )
    }
}
