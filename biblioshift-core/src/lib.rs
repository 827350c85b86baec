//! Biblioshift Core Library
//!
//! Core abstractions shared by the inventory store and the rebalancer.
//! This crate provides:
//! - Catalog entities (authors, books, libraries)
//! - Holdings: the per-(library, book) copy counts the rebalancer mutates
//! - Moves: single-copy transfers between libraries
//! - Delta aggregation used when a plan is written back

pub mod delta;
pub mod model;

pub use delta::{DeltaBatch, HoldingKey};
pub use model::{
    Author, AuthorId, Book, BookId, BookMeta, Holding, HoldingRow, Library, LibraryId,
    LibraryUsage, Move,
};

/// Copies moved per planned transfer; each move covers exactly one new library.
pub const UNIT_MOVE: i64 = 1;
