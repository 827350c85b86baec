//! Plan Applier
//!
//! Folds a move list into per-(library, book) deltas and writes them in one
//! locked batch. Either every delta lands or none does.

use biblioshift_core::{DeltaBatch, Move};
use biblioshift_inventory::{InventoryStore, Result};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// Result of applying a plan
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Moves applied
    pub moves: usize,
    /// Holding rows incremented or created
    pub increments: usize,
    /// Holding rows decremented
    pub decrements: usize,
    /// Copies moved in total
    pub copies: i64,
    pub duration: Duration,
}

impl ApplyReport {
    pub fn summary(&self) -> String {
        format!(
            "{} moves applied ({} copies, {} rows up, {} rows down) in {:?}",
            self.moves, self.copies, self.increments, self.decrements, self.duration
        )
    }
}

/// Applies planned moves to an inventory store
#[derive(Debug, Clone, Copy, Default)]
pub struct Applier;

impl Applier {
    pub fn new() -> Self {
        Self
    }

    /// Apply `moves` as one atomic batch
    #[instrument(skip(self, store, moves), fields(moves = moves.len()))]
    pub async fn apply<S>(&self, store: &S, moves: &[Move]) -> Result<ApplyReport>
    where
        S: InventoryStore + ?Sized,
    {
        let start = Instant::now();
        let batch = DeltaBatch::from_moves(moves);

        if batch.is_empty() {
            info!("Nothing to apply");
            return Ok(ApplyReport::default());
        }

        if let Err(e) = store.apply_deltas(&batch).await {
            error!(error = %e, touched = batch.touched_keys().len(), "Apply failed, no rows changed");
            return Err(e);
        }

        let report = ApplyReport {
            moves: moves.len(),
            increments: batch.increments().count(),
            decrements: batch.decrements().count(),
            copies: batch.total_quantity(),
            duration: start.elapsed(),
        };
        info!(summary = %report.summary(), "Plan applied");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblioshift_inventory::{InventoryError, MemoryInventory};

    fn store() -> MemoryInventory {
        let store = MemoryInventory::new();
        store.add_author(1, "Ann Example");
        for lib in 1..=3 {
            store.add_library(lib, format!("Library {lib}"), 100);
        }
        store.add_book(1, "First", 2000, 1);
        store.add_book(2, "Second", 2001, 1);
        store
    }

    #[tokio::test]
    async fn test_apply_creates_and_decrements_rows() {
        let store = store();
        store.set_holding(1, 1, 5);

        let moves = [Move::unit(1, 1, 2), Move::unit(1, 1, 3)];
        let report = Applier::new().apply(&store, &moves).await.unwrap();

        assert_eq!(report.moves, 2);
        assert_eq!(report.increments, 2);
        assert_eq!(report.decrements, 1);
        assert_eq!(report.copies, 2);
        assert_eq!(store.holding(1, 1), Some(3));
        assert_eq!(store.holding(2, 1), Some(1));
        assert_eq!(store.holding(3, 1), Some(1));
    }

    #[tokio::test]
    async fn test_apply_adds_to_existing_zero_row() {
        let store = store();
        store.set_holding(1, 2, 2);
        store.set_holding(2, 2, 0);

        Applier::new()
            .apply(&store, &[Move::unit(2, 1, 2)])
            .await
            .unwrap();

        assert_eq!(store.holding(1, 2), Some(1));
        assert_eq!(store.holding(2, 2), Some(1));
    }

    #[tokio::test]
    async fn test_empty_plan_is_noop() {
        let store = store();
        let report = Applier::new().apply(&store, &[]).await.unwrap();
        assert_eq!(report.moves, 0);
        assert_eq!(store.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_conflict_leaves_store_untouched() {
        let store = store();
        store.set_holding(1, 1, 1);

        // second move would take library 1 below zero
        let moves = [Move::unit(1, 1, 2), Move::unit(1, 1, 3)];
        let err = Applier::new().apply(&store, &moves).await.unwrap_err();

        assert!(matches!(err, InventoryError::Conflict(_)));
        assert_eq!(store.holding(1, 1), Some(1));
        assert_eq!(store.holding(2, 1), None);
        assert_eq!(store.holding(3, 1), None);
    }
}
