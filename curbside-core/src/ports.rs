//! Traits describing where database snapshots come from.

use std::io;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::model::Database;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while reading a snapshot source.
pub enum SourceError {
    /// Reading the backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The snapshot could not be decoded.
    #[error("Invalid database format: {0}")]
    Format(String),
    /// The backing store has no snapshot.
    #[error("Database not found: {0}")]
    Missing(String),
}

#[async_trait]
/// Backend holding the current database snapshot of one town.
pub trait SnapshotSource: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Read and decode the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the snapshot is missing or malformed.
    async fn load(&self) -> Result<Database, SourceError>;

    /// Last modification stamp, if the backend tracks one.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the backend cannot be queried.
    async fn modified(&self) -> Result<Option<SystemTime>, SourceError>;
}
