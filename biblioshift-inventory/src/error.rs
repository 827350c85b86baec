//! Inventory error types

use thiserror::Error;

/// Inventory store error types
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// A batch update could not be applied as a whole: a row lock was not
    /// obtained in time, a referenced row was missing, or a constraint failed.
    #[error("Apply conflict: {0}")]
    Conflict(String),

    #[error("Invalid data: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;

/// PostgreSQL error codes that mean "the batch lost a race", not "the database broke"
const LOCK_NOT_AVAILABLE: &str = "55P03";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl InventoryError {
    /// Classify an error raised while applying a batch.
    ///
    /// Lock timeouts and constraint violations become [`InventoryError::Conflict`];
    /// everything else stays a database error.
    pub fn from_apply(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());

        match code.as_deref() {
            Some(LOCK_NOT_AVAILABLE) => {
                InventoryError::Conflict(format!("row lock not available: {err}"))
            }
            Some(CHECK_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                InventoryError::Conflict(format!("constraint violated: {err}"))
            }
            _ => InventoryError::Database(err),
        }
    }

    /// Whether re-planning from current state may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, InventoryError::Conflict(_))
    }
}
