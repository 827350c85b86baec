//! Biblioshift Inventory Store
//!
//! Holds authors, books, libraries and the per-(library, book) holdings,
//! with PostgreSQL for persistence and an in-memory store for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          InventoryStore  /  CatalogStore             │
//! │                                                      │
//! │  ┌──────────────────┐      ┌──────────────────────┐  │
//! │  │     Database     │      │   MemoryInventory    │  │
//! │  │   (PostgreSQL)   │      │  (tests, dev runs)   │  │
//! │  └──────────────────┘      └──────────────────────┘  │
//! │           │                                          │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │    seed (catalog import)  ·  intake (copies)   │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use biblioshift_inventory::{Database, DbConfig, InventoryStore};
//!
//! let db = Database::new(DbConfig::default()).await?;
//! db.migrate().await?;
//!
//! let libraries = db.library_count().await?;
//! let holdings = db.book_holdings(42).await?;
//! ```

pub mod error;
pub mod intake;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod seed;
pub mod store;

pub use error::{InventoryError, Result};
pub use intake::{record_intake, IntakeReport, IntakeRequest};
pub use memory::MemoryInventory;
pub use postgres::{Database, DbConfig};
pub use seed::{generate_holdings, seed, Catalog, HoldingsScenario, SeedOptions, SeedReport};
pub use store::{CatalogStore, ImportSummary, InventoryStore};
