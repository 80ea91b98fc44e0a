use std::sync::Arc;

use crate::config::{RealtimeConfig, StorageConfig};
use crate::db::DbPool;
use crate::storage::UploadSigner;
use crate::store::SqliteStore;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::relay::Relay;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Live WebSocket connections, one per user
    pub registry: Arc<ConnectionRegistry>,
    pub relay: Relay,
    pub realtime: RealtimeConfig,
    pub uploads: UploadSigner,
}

impl AppState {
    /// Wire the realtime core to the SQLite store. Must be called from within
    /// a tokio runtime (the presence workers are spawned here).
    pub fn new(
        db: DbPool,
        jwt_secret: Vec<u8>,
        realtime: RealtimeConfig,
        storage: &StorageConfig,
    ) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        let registry = ConnectionRegistry::new(store.clone(), &realtime);
        let relay = Relay::new(registry.clone(), store.clone(), store);

        Self {
            db,
            jwt_secret,
            registry,
            relay,
            realtime,
            uploads: UploadSigner::from_config(storage),
        }
    }
}
