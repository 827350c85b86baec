//! Intake simulation
//!
//! Adds copies of some books to one library, as if a delivery arrived.

use biblioshift_core::{BookId, Library, LibraryId};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, instrument};

use crate::error::{InventoryError, Result};
use crate::store::CatalogStore;

/// Books picked at random when none are given
pub const DEFAULT_RANDOM_COUNT: usize = 10;

/// Intake request
#[derive(Debug, Clone)]
pub struct IntakeRequest {
    /// Receiving library; defaults to the lowest id
    pub library_id: Option<LibraryId>,
    /// Books to add; random books are sampled when empty
    pub book_ids: Vec<BookId>,
    pub random_count: usize,
    /// Copies added per book (at least one)
    pub copies: i64,
}

impl Default for IntakeRequest {
    fn default() -> Self {
        Self {
            library_id: None,
            book_ids: Vec::new(),
            random_count: DEFAULT_RANDOM_COUNT,
            copies: 1,
        }
    }
}

/// Intake result
#[derive(Debug, Clone)]
pub struct IntakeReport {
    pub library: Library,
    pub book_ids: Vec<BookId>,
    pub copies: i64,
    pub rows_updated: u64,
}

impl IntakeReport {
    pub fn summary(&self) -> String {
        format!(
            "Added +{} copies to {} books in '{}' ({} rows updated)",
            self.copies,
            self.book_ids.len(),
            self.library.name,
            self.rows_updated
        )
    }
}

/// Record an intake
#[instrument(skip(store, rng))]
pub async fn record_intake<S, R>(
    store: &S,
    request: IntakeRequest,
    rng: &mut R,
) -> Result<IntakeReport>
where
    S: CatalogStore + ?Sized,
    R: Rng + Send + ?Sized,
{
    let library = match request.library_id {
        Some(id) => store.library(id).await?,
        None => store.libraries().await?.into_iter().next(),
    }
    .ok_or_else(|| InventoryError::NotFound("target library".to_string()))?;

    let book_ids = if request.book_ids.is_empty() {
        let all = store.book_ids().await?;
        if all.is_empty() {
            return Err(InventoryError::NotFound("books in catalog".to_string()));
        }
        let k = request.random_count.min(all.len());
        let mut picked: Vec<BookId> = all.choose_multiple(rng, k).copied().collect();
        picked.sort_unstable();
        picked
    } else {
        request.book_ids
    };

    let copies = request.copies.max(1);
    let rows_updated = store.add_copies(library.id, &book_ids, copies).await?;

    let report = IntakeReport {
        library,
        book_ids,
        copies,
        rows_updated,
    };
    info!(summary = %report.summary(), "Intake recorded");
    Ok(report)
}
