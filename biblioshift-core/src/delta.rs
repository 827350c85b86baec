//! Holding deltas
//!
//! A plan is written back as per-(library, book) increments and decrements.
//! Several moves of the same book into or out of the same library are
//! coalesced into one delta, so the store touches each row exactly once.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{BookId, LibraryId, Move};

/// Key of a holding row. Orders by library, then book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HoldingKey {
    pub library_id: LibraryId,
    pub book_id: BookId,
}

impl HoldingKey {
    pub fn new(library_id: LibraryId, book_id: BookId) -> Self {
        Self {
            library_id,
            book_id,
        }
    }
}

/// Aggregated quantity changes for a batch of moves
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaBatch {
    increments: BTreeMap<HoldingKey, i64>,
    decrements: BTreeMap<HoldingKey, i64>,
}

impl DeltaBatch {
    /// Aggregate moves into increments (destinations) and decrements (sources)
    pub fn from_moves<'a>(moves: impl IntoIterator<Item = &'a Move>) -> Self {
        let mut batch = Self::default();
        for m in moves {
            batch.push(m);
        }
        batch
    }

    /// Add a single move to the batch
    pub fn push(&mut self, m: &Move) {
        *self
            .increments
            .entry(HoldingKey::new(m.to_library_id, m.book_id))
            .or_default() += m.quantity;
        *self
            .decrements
            .entry(HoldingKey::new(m.from_library_id, m.book_id))
            .or_default() += m.quantity;
    }

    /// Quantities to add, in key order
    pub fn increments(&self) -> impl Iterator<Item = (HoldingKey, i64)> + '_ {
        self.increments.iter().map(|(k, q)| (*k, *q))
    }

    /// Quantities to subtract, in key order
    pub fn decrements(&self) -> impl Iterator<Item = (HoldingKey, i64)> + '_ {
        self.decrements.iter().map(|(k, q)| (*k, *q))
    }

    /// Every row the batch touches, sorted and deduplicated.
    ///
    /// This is the lock set: acquiring it in this order keeps concurrent
    /// appliers from deadlocking on each other.
    pub fn touched_keys(&self) -> Vec<HoldingKey> {
        self.increments
            .keys()
            .chain(self.decrements.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Net change for one row (increments minus decrements)
    pub fn net(&self, key: &HoldingKey) -> i64 {
        self.increments.get(key).copied().unwrap_or(0)
            - self.decrements.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.increments.is_empty() && self.decrements.is_empty()
    }

    /// Total copies moved by the batch
    pub fn total_quantity(&self) -> i64 {
        self.increments.values().sum()
    }
}
