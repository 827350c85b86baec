//! Candidate Selector
//!
//! Finds books that are held somewhere but missing from at least one library.
//! A book with no positive holding anywhere is never a candidate: there is
//! nothing to move.

use biblioshift_core::BookId;
use biblioshift_inventory::{InventoryStore, Result};
use futures::stream::{BoxStream, TryStreamExt};
use tracing::{debug, instrument};

/// Under-covered book selector
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    library_count: usize,
}

impl Selector {
    /// Create a selector for a catalog with `library_count` libraries
    pub fn new(library_count: usize) -> Self {
        Self { library_count }
    }

    pub fn library_count(&self) -> usize {
        self.library_count
    }

    /// Stream candidate book ids in ascending order
    ///
    /// Candidates are produced lazily so large catalogs are never held in
    /// memory at once.
    pub fn candidates<'a, S>(&self, store: &'a S) -> BoxStream<'a, Result<BookId>>
    where
        S: InventoryStore + ?Sized,
    {
        store.under_covered_books(self.library_count)
    }

    /// Collect every candidate, for orderings that need the full set
    #[instrument(skip(self, store), fields(library_count = self.library_count))]
    pub async fn collect<S>(&self, store: &S) -> Result<Vec<BookId>>
    where
        S: InventoryStore + ?Sized,
    {
        let ids: Vec<BookId> = self.candidates(store).try_collect().await?;
        debug!(candidates = ids.len(), "Candidates collected");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblioshift_inventory::MemoryInventory;
    use futures::StreamExt;

    fn store() -> MemoryInventory {
        let store = MemoryInventory::new();
        store.add_author(1, "Ann Example");
        for lib in 1..=3 {
            store.add_library(lib, format!("Library {lib}"), 100);
        }
        for book in 1..=4 {
            store.add_book(book, format!("Book {book}"), 2000, 1);
        }
        store
    }

    #[tokio::test]
    async fn test_selects_partially_covered_books() {
        let store = store();
        // book 1 everywhere, book 2 in one library, book 3 only zero rows
        for lib in 1..=3 {
            store.set_holding(lib, 1, 1);
        }
        store.set_holding(2, 2, 3);
        store.set_holding(1, 3, 0);
        store.set_holding(2, 3, 0);

        let ids = Selector::new(3).collect(&store).await.unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_zero_rows_do_not_count_as_coverage() {
        let store = store();
        store.set_holding(1, 4, 2);
        store.set_holding(2, 4, 0);
        store.set_holding(3, 4, 0);

        let ids = Selector::new(3).collect(&store).await.unwrap();
        assert_eq!(ids, vec![4]);
    }

    #[tokio::test]
    async fn test_candidates_stream_in_id_order() {
        let store = store();
        store.set_holding(1, 3, 1);
        store.set_holding(1, 1, 1);
        store.set_holding(1, 2, 1);

        let ids: Vec<BookId> = Selector::new(3)
            .candidates(&store)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_single_library_has_no_candidates() {
        let store = MemoryInventory::new();
        store.add_author(1, "Ann Example");
        store.add_library(1, "Only", 10);
        store.add_book(1, "Alone", 1999, 1);
        store.set_holding(1, 1, 5);

        assert!(Selector::new(1).collect(&store).await.unwrap().is_empty());
    }
}
