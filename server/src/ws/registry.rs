//! Connection registry: the single owner of the identity → live connection map.
//!
//! At most one connection is registered per identity. Registering a second
//! connection closes the first. Sends go through [`ConnectionRegistry::send`],
//! which evicts a connection whose writer is gone so callers never have to
//! clean up after a broken pipe themselves.

use axum::extract::ws::Message;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::store::PairLookup;
use crate::ws::presence::{PresenceEvent, PresenceNotifier};
use crate::ws::protocol::ServerMessage;

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("connection closed")]
    Closed,
    #[error("connection writer has exited")]
    WriterGone,
    #[error("send timed out")]
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("user is not connected")]
    NotConnected,
    #[error("failed to send message: {0}")]
    SendFailed(#[from] HandleError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

struct HandleInner {
    id: ConnectionId,
    user_id: String,
    tx: mpsc::Sender<Message>,
    closed: CancellationToken,
}

/// Send and close capabilities for one live WebSocket.
///
/// Frames go through a bounded channel to the connection's writer task, so a
/// slow peer stalls its senders instead of growing an unbounded queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer task drains.
    pub fn new(user_id: &str, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                user_id: user_id.to_string(),
                tx,
                closed: CancellationToken::new(),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Queue a raw frame for the writer, waiting at most `timeout` for room.
    pub async fn send_frame(&self, frame: Message, timeout: Duration) -> Result<(), HandleError> {
        if self.inner.closed.is_cancelled() {
            return Err(HandleError::Closed);
        }
        match tokio::time::timeout(timeout, self.inner.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HandleError::WriterGone),
            Err(_) => Err(HandleError::TimedOut),
        }
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Token the writer task watches to flush a close frame and exit.
    pub fn close_signal(&self) -> CancellationToken {
        self.inner.closed.clone()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("user_id", &self.inner.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
    notifier: PresenceNotifier,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    /// Build the registry and start its presence notifier workers.
    /// Must be called from within a tokio runtime.
    pub fn new(pairs: Arc<dyn PairLookup>, config: &RealtimeConfig) -> Arc<Self> {
        let send_timeout = config.send_timeout();
        let workers = config.presence_workers;
        let queue = config.presence_queue;

        Arc::new_cyclic(|registry| Self {
            connections: DashMap::new(),
            notifier: PresenceNotifier::start(registry.clone(), pairs, workers, queue),
            send_timeout,
        })
    }

    pub fn notifier(&self) -> &PresenceNotifier {
        &self.notifier
    }

    /// Install `handle` as the live connection for its identity, closing any
    /// connection it supersedes, then schedule the online notification.
    pub fn register(&self, handle: ConnectionHandle) {
        let user_id = handle.user_id().to_string();
        let connection_id = handle.id();

        match self.connections.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get();
                previous.close();
                tracing::info!(
                    user_id = %user_id,
                    previous_connection = previous.id(),
                    connection_id,
                    "Superseded existing connection"
                );
                entry.insert(handle);
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }

        tracing::info!(user_id = %user_id, connection_id, "Connection registered");
        self.notifier.publish(PresenceEvent::Online(user_id));
    }

    /// Close and remove whatever connection is registered for `user_id`.
    pub fn unregister(&self, user_id: &str) {
        if let Some((_, handle)) = self.connections.remove(user_id) {
            handle.close();
            tracing::info!(
                user_id = %user_id,
                connection_id = handle.id(),
                "Connection unregistered"
            );
            self.notifier
                .publish(PresenceEvent::Offline(user_id.to_string()));
        }
    }

    /// Unregister `user_id` only while `connection_id` is still its live
    /// connection. Returns whether anything was removed.
    ///
    /// A connection that was superseded must not evict its successor when its
    /// own read loop winds down.
    pub fn release(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        match self
            .connections
            .remove_if(user_id, |_, handle| handle.id() == connection_id)
        {
            Some((_, handle)) => {
                handle.close();
                tracing::info!(user_id = %user_id, connection_id, "Connection unregistered");
                self.notifier
                    .publish(PresenceEvent::Offline(user_id.to_string()));
                true
            }
            None => {
                tracing::debug!(
                    user_id = %user_id,
                    connection_id,
                    "Release skipped, connection already replaced or removed"
                );
                false
            }
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver `message` to the live connection of `user_id`.
    ///
    /// A failed write evicts that connection (if it is still the registered
    /// one) and reports `SendFailed`; the caller should not retry.
    pub async fn send(&self, user_id: &str, message: &ServerMessage) -> Result<(), SendError> {
        // Clone the handle out so no shard lock is held across the write.
        let handle = self
            .connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or(SendError::NotConnected)?;

        let frame = message.to_frame()?;

        if let Err(err) = handle.send_frame(frame, self.send_timeout).await {
            tracing::warn!(
                user_id = %user_id,
                connection_id = handle.id(),
                kind = message.kind(),
                error = %err,
                "Send failed, evicting connection"
            );
            self.release(user_id, handle.id());
            return Err(SendError::SendFailed(err));
        }

        tracing::debug!(user_id = %user_id, kind = message.kind(), "Message sent");
        Ok(())
    }
}
