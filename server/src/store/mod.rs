//! SQLite-backed storage for users, pairs and photos.
//!
//! The realtime core only sees this module through the [`PairLookup`] and
//! [`PhotoRecords`] traits; the HTTP handlers call the free functions in the
//! submodules directly.

pub mod pairs;
pub mod photos;
pub mod users;

use crate::db::models::Pair;
use crate::db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Lock,
    #[error("blocking task failed: {0}")]
    Task(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
}

/// Canonical "who is this user paired with" lookup.
pub trait PairLookup: Send + Sync + 'static {
    fn pair_for(&self, user_id: &str) -> Result<Option<Pair>, StoreError>;
}

/// Records the final object location of an uploaded photo.
pub trait PhotoRecords: Send + Sync + 'static {
    fn record_upload(&self, user_id: &str, photo_id: &str, url: &str) -> Result<(), StoreError>;
}

/// Run a synchronous store call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// The production collaborator behind [`PairLookup`] and [`PhotoRecords`].
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl PairLookup for SqliteStore {
    fn pair_for(&self, user_id: &str) -> Result<Option<Pair>, StoreError> {
        pairs::get_by_user(&self.db, user_id)
    }
}

impl PhotoRecords for SqliteStore {
    fn record_upload(&self, user_id: &str, photo_id: &str, url: &str) -> Result<(), StoreError> {
        photos::update_url(&self.db, user_id, photo_id, url)
    }
}
