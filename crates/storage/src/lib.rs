#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, Storage, StorageError, SubmissionRecord, SubmissionRepository,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
