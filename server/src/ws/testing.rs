//! In-memory collaborators and channel helpers shared by the ws unit tests.

use axum::extract::ws::Message;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::RealtimeConfig;
use crate::db::models::Pair;
use crate::store::{PairLookup, PhotoRecords, StoreError};
use crate::ws::protocol::ServerMessage;
use crate::ws::registry::ConnectionRegistry;

pub(crate) fn pair(id: &str, a: &str, b: &str) -> Pair {
    Pair {
        id: id.to_string(),
        user_a_id: a.to_string(),
        user_b_id: b.to_string(),
        created_at: "2024-01-15T10:40:00Z".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct StaticPairs {
    pairs: Mutex<Vec<Pair>>,
    fail: bool,
}

impl StaticPairs {
    pub(crate) fn new(pairs: Vec<Pair>) -> Self {
        Self {
            pairs: Mutex::new(pairs),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            pairs: Mutex::default(),
            fail: true,
        }
    }
}

impl PairLookup for StaticPairs {
    fn pair_for(&self, user_id: &str) -> Result<Option<Pair>, StoreError> {
        if self.fail {
            return Err(StoreError::Lock);
        }
        let pairs = self.pairs.lock().map_err(|_| StoreError::Lock)?;
        Ok(pairs.iter().find(|p| p.has_member(user_id)).cloned())
    }
}

/// Records `(user_id, photo_id, url)` for each successful upload.
#[derive(Default)]
pub(crate) struct StaticPhotos {
    pub(crate) recorded: Mutex<Vec<(String, String, String)>>,
    pub(crate) fail: bool,
}

impl PhotoRecords for StaticPhotos {
    fn record_upload(&self, user_id: &str, photo_id: &str, url: &str) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::NotFound("photo not found"));
        }
        self.recorded.lock().map_err(|_| StoreError::Lock)?.push((
            user_id.to_string(),
            photo_id.to_string(),
            url.to_string(),
        ));
        Ok(())
    }
}

pub(crate) fn registry_with_pairs(pairs: StaticPairs) -> Arc<ConnectionRegistry> {
    ConnectionRegistry::new(Arc::new(pairs), &RealtimeConfig::default())
}

/// Next frame on a handle's channel, decoded. Panics after one second.
pub(crate) async fn next_message(rx: &mut mpsc::Receiver<Message>) -> ServerMessage {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("channel closed");
    match frame {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("invalid server frame"),
        other => panic!("unexpected frame: {other:?}"),
    }
}

/// Assert nothing arrives for a short while.
pub(crate) async fn no_message(rx: &mut mpsc::Receiver<Message>) {
    if let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected frame: {frame:?}");
    }
}

/// Drain frames until `expected` shows up. False if the channel goes quiet first.
pub(crate) async fn recv_until(rx: &mut mpsc::Receiver<Message>, expected: &ServerMessage) -> bool {
    loop {
        let frame = match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(frame)) => frame,
            _ => return false,
        };
        if let Message::Text(text) = frame {
            if serde_json::from_str::<ServerMessage>(text.as_str()).ok().as_ref() == Some(expected) {
                return true;
            }
        }
    }
}
