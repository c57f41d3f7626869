//! Storage Layer
//!
//! Read access to shifts, deliveries and GPS samples, plus the single
//! shift-distance write-back, behind the [`MileageStore`] trait.
//! Backends: in-memory [`Repository`] and SQLite [`SqliteRepository`].

mod record;
mod repository;
mod sqlite;
mod traits;

pub use record::{DeliveryRecord, SampleRecord, ShiftRecord};
pub use repository::Repository;
pub use sqlite::SqliteRepository;
pub use traits::MileageStore;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::SerializationError(err.to_string())
            }
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}
