//! Database models for the inventory
//!
//! These structs map directly to PostgreSQL tables and aggregate queries.

use biblioshift_core::{Book, BookMeta, HoldingRow, Library, LibraryUsage};
use sqlx::FromRow;

/// Row of the `libraries` table
#[derive(Debug, Clone, FromRow)]
pub struct LibraryRecord {
    pub id: i64,
    pub name: String,
    pub capacity: i64,
}

impl From<LibraryRecord> for Library {
    fn from(r: LibraryRecord) -> Self {
        Library {
            id: r.id,
            name: r.name,
            capacity: r.capacity,
        }
    }
}

/// Row of the `books` table
#[derive(Debug, Clone, FromRow)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub author_id: i64,
}

impl From<BookRecord> for Book {
    fn from(r: BookRecord) -> Self {
        Book {
            id: r.id,
            title: r.title,
            year: r.year,
            author_id: r.author_id,
        }
    }
}

/// Projection of `books` used for priority ordering
#[derive(Debug, Clone, Copy, FromRow)]
pub struct BookMetaRecord {
    pub id: i64,
    pub year: i32,
    pub author_id: i64,
}

impl From<BookMetaRecord> for BookMeta {
    fn from(r: BookMetaRecord) -> Self {
        BookMeta {
            id: r.id,
            year: r.year,
            author_id: r.author_id,
        }
    }
}

/// Projection of `holdings` for a single book
#[derive(Debug, Clone, Copy, FromRow)]
pub struct HoldingRecord {
    pub library_id: i64,
    pub quantity: i64,
}

impl From<HoldingRecord> for HoldingRow {
    fn from(r: HoldingRecord) -> Self {
        HoldingRow::new(r.library_id, r.quantity)
    }
}

/// Library capacity joined with the sum of its holdings
#[derive(Debug, Clone, Copy, FromRow)]
pub struct LibraryUsageRecord {
    pub id: i64,
    pub capacity: i64,
    pub used: i64,
}

impl From<LibraryUsageRecord> for LibraryUsage {
    fn from(r: LibraryUsageRecord) -> Self {
        LibraryUsage {
            id: r.id,
            capacity: r.capacity,
            used: r.used,
        }
    }
}

/// Locked holding key returned by `SELECT ... FOR UPDATE`
#[derive(Debug, Clone, Copy, FromRow)]
pub struct LockedHolding {
    pub library_id: i64,
    pub book_id: i64,
    pub quantity: i64,
}
