//! Presence notifier: turns registry and pairing lifecycle events into
//! partner-facing messages.
//!
//! Events are queued on bounded per-worker channels and handled off the
//! caller's task, so a slow partner connection never stalls `register`,
//! `unregister` or an HTTP request. Events about the same identity always land
//! on the same worker and are therefore handled in order. Every delivery
//! failure is logged and dropped.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::db::models::Pair;
use crate::store::{self, PairLookup};
use crate::ws::protocol::{PairCreatedData, ServerMessage};
use crate::ws::registry::{ConnectionRegistry, SendError};

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// Identity registered a connection.
    Online(String),
    /// Identity's connection went away.
    Offline(String),
    /// A pair was created through the HTTP API.
    PairCreated(Pair),
    /// A pair was dissolved through the HTTP API.
    PairDeleted(Pair),
}

impl PresenceEvent {
    fn shard_key(&self) -> &str {
        match self {
            PresenceEvent::Online(user_id) | PresenceEvent::Offline(user_id) => user_id,
            PresenceEvent::PairCreated(pair) | PresenceEvent::PairDeleted(pair) => &pair.id,
        }
    }
}

pub struct PresenceNotifier {
    queues: Vec<mpsc::Sender<PresenceEvent>>,
}

impl PresenceNotifier {
    /// Spawn `workers` dispatch tasks. Workers hold only a weak reference to
    /// the registry and exit once it is dropped.
    pub(crate) fn start(
        registry: Weak<ConnectionRegistry>,
        pairs: Arc<dyn PairLookup>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let queues = (0..workers.max(1))
            .map(|worker| {
                let (tx, rx) = mpsc::channel(queue_capacity.max(1));
                tokio::spawn(run_worker(worker, rx, registry.clone(), pairs.clone()));
                tx
            })
            .collect();
        Self { queues }
    }

    /// Queue an event without waiting. A full queue drops the event with a warning.
    pub fn publish(&self, event: PresenceEvent) {
        let mut hasher = DefaultHasher::new();
        event.shard_key().hash(&mut hasher);
        let shard = (hasher.finish() % self.queues.len() as u64) as usize;

        match self.queues[shard].try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(shard, event = ?event, "Presence queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(shard, event = ?event, "Presence worker stopped, dropping event");
            }
        }
    }

    pub fn pair_created(&self, pair: Pair) {
        self.publish(PresenceEvent::PairCreated(pair));
    }

    pub fn pair_deleted(&self, pair: Pair) {
        self.publish(PresenceEvent::PairDeleted(pair));
    }
}

async fn run_worker(
    worker: usize,
    mut rx: mpsc::Receiver<PresenceEvent>,
    registry: Weak<ConnectionRegistry>,
    pairs: Arc<dyn PairLookup>,
) {
    while let Some(event) = rx.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        dispatch(&registry, &pairs, event).await;
    }
    tracing::debug!(worker, "Presence worker stopped");
}

async fn dispatch(registry: &ConnectionRegistry, pairs: &Arc<dyn PairLookup>, event: PresenceEvent) {
    match event {
        PresenceEvent::Online(user_id) => {
            let Some(pair) = lookup_pair(pairs, &user_id).await else {
                return;
            };
            if let Some(partner_id) = pair.as_ref().and_then(|p| p.partner_of(&user_id)) {
                notify_if_online(registry, partner_id, ServerMessage::PartnerStatus { online: true })
                    .await;
            }
            let status = ServerMessage::pair_status(pair.map(|p| p.id));
            deliver(registry, &user_id, &status).await;
        }
        PresenceEvent::Offline(user_id) => {
            let Some(Some(pair)) = lookup_pair(pairs, &user_id).await else {
                return;
            };
            if let Some(partner_id) = pair.partner_of(&user_id) {
                notify_if_online(registry, partner_id, ServerMessage::PartnerStatus { online: false })
                    .await;
            }
        }
        PresenceEvent::PairCreated(pair) => {
            let message = ServerMessage::PairCreated {
                data: PairCreatedData {
                    pair_id: pair.id.clone(),
                    user_a_id: pair.user_a_id.clone(),
                    user_b_id: pair.user_b_id.clone(),
                    created_at: pair.created_at.clone(),
                },
            };
            for member in pair.members() {
                notify_if_online(registry, member, message.clone()).await;
            }
        }
        PresenceEvent::PairDeleted(pair) => {
            for member in pair.members() {
                notify_if_online(registry, member, ServerMessage::PairDeleted {}).await;
            }
        }
    }
}

/// `None` when the lookup itself failed (already logged).
async fn lookup_pair(pairs: &Arc<dyn PairLookup>, user_id: &str) -> Option<Option<Pair>> {
    let pairs = Arc::clone(pairs);
    let uid = user_id.to_string();
    match store::blocking(move || pairs.pair_for(&uid)).await {
        Ok(pair) => Some(pair),
        Err(err) => {
            tracing::error!(user_id = %user_id, error = %err, "Pair lookup failed");
            None
        }
    }
}

async fn notify_if_online(registry: &ConnectionRegistry, user_id: &str, message: ServerMessage) {
    if registry.is_online(user_id) {
        deliver(registry, user_id, &message).await;
    }
}

async fn deliver(registry: &ConnectionRegistry, user_id: &str, message: &ServerMessage) {
    match registry.send(user_id, message).await {
        Ok(()) => {}
        // Went offline between the check and the send.
        Err(SendError::NotConnected) => {
            tracing::debug!(user_id = %user_id, kind = message.kind(), "Notification skipped, user offline");
        }
        Err(err) => {
            tracing::warn!(
                user_id = %user_id,
                kind = message.kind(),
                error = %err,
                "Failed to deliver notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::registry::ConnectionHandle;
    use crate::ws::testing::{next_message, no_message, pair, registry_with_pairs, StaticPairs};

    #[tokio::test]
    async fn test_online_without_pair_sends_pair_status_only() {
        let registry = registry_with_pairs(StaticPairs::default());
        let (alice, mut rx) = ConnectionHandle::new("alice", 8);
        registry.register(alice);

        assert_eq!(next_message(&mut rx).await, ServerMessage::pair_status(None));
        no_message(&mut rx).await;
    }

    #[tokio::test]
    async fn test_presence_symmetry() {
        let registry = registry_with_pairs(StaticPairs::new(vec![pair("p1", "alice", "bob")]));
        let (bob, mut bob_rx) = ConnectionHandle::new("bob", 8);
        registry.register(bob);
        assert_eq!(
            next_message(&mut bob_rx).await,
            ServerMessage::pair_status(Some("p1".to_string()))
        );

        let (alice, mut alice_rx) = ConnectionHandle::new("alice", 8);
        registry.register(alice);
        assert_eq!(
            next_message(&mut bob_rx).await,
            ServerMessage::PartnerStatus { online: true }
        );
        assert_eq!(
            next_message(&mut alice_rx).await,
            ServerMessage::pair_status(Some("p1".to_string()))
        );

        registry.unregister("alice");
        assert_eq!(
            next_message(&mut bob_rx).await,
            ServerMessage::PartnerStatus { online: false }
        );
        no_message(&mut bob_rx).await;
    }

    #[tokio::test]
    async fn test_offline_partner_misses_presence_changes() {
        let registry = registry_with_pairs(StaticPairs::new(vec![pair("p1", "alice", "bob")]));
        let (alice, mut alice_rx) = ConnectionHandle::new("alice", 8);
        registry.register(alice);
        assert_eq!(
            next_message(&mut alice_rx).await,
            ServerMessage::pair_status(Some("p1".to_string()))
        );
        registry.unregister("alice");

        // Let alice's offline event drain while bob is still away.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (bob, mut bob_rx) = ConnectionHandle::new("bob", 8);
        registry.register(bob);
        assert_eq!(
            next_message(&mut bob_rx).await,
            ServerMessage::pair_status(Some("p1".to_string()))
        );
        no_message(&mut bob_rx).await;
        assert!(!registry.is_online("alice"));
    }

    #[tokio::test]
    async fn test_pair_lifecycle_reaches_online_members_only() {
        let registry = registry_with_pairs(StaticPairs::default());
        let (alice, mut alice_rx) = ConnectionHandle::new("alice", 8);
        registry.register(alice);
        assert_eq!(next_message(&mut alice_rx).await, ServerMessage::pair_status(None));

        let p = pair("p1", "alice", "bob");
        registry.notifier().pair_created(p.clone());
        assert_eq!(
            next_message(&mut alice_rx).await,
            ServerMessage::PairCreated {
                data: PairCreatedData {
                    pair_id: "p1".to_string(),
                    user_a_id: "alice".to_string(),
                    user_b_id: "bob".to_string(),
                    created_at: p.created_at.clone(),
                },
            }
        );

        registry.notifier().pair_deleted(p);
        assert_eq!(next_message(&mut alice_rx).await, ServerMessage::PairDeleted {});
        no_message(&mut alice_rx).await;
    }

    #[tokio::test]
    async fn test_failed_lookup_is_swallowed() {
        let registry = registry_with_pairs(StaticPairs::failing());
        let (alice, mut rx) = ConnectionHandle::new("alice", 8);
        registry.register(alice);
        no_message(&mut rx).await;
        assert!(registry.is_online("alice"));
    }
}
