//! Routes one decoded client message to its effects.
//!
//! Messages are handled independently: the only inputs are the sender's
//! identity, the current pairing and who is online. Protocol and domain errors
//! are answered inline with an `error` message and never close the connection.

use chrono::Utc;
use std::sync::Arc;

use crate::store::{self, PairLookup, PhotoRecords, StoreError};
use crate::ws::protocol::{self, ClientMessage, ServerMessage};
use crate::ws::registry::{ConnectionRegistry, SendError};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("take_photo could not be delivered to {partner_id}: {source}")]
    PartnerUnreachable {
        partner_id: String,
        #[source]
        source: SendError,
    },
    #[error("pair lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

impl RelayError {
    /// What the sender is told about this failure.
    pub fn client_message(&self) -> &'static str {
        match self {
            RelayError::PartnerUnreachable { .. } => protocol::ERR_PARTNER_UNREACHABLE,
            RelayError::Lookup(_) => protocol::ERR_INTERNAL,
        }
    }
}

#[derive(Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    pairs: Arc<dyn PairLookup>,
    photos: Arc<dyn PhotoRecords>,
}

impl Relay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pairs: Arc<dyn PairLookup>,
        photos: Arc<dyn PhotoRecords>,
    ) -> Self {
        Self {
            registry,
            pairs,
            photos,
        }
    }

    /// Decode and handle one raw frame payload from `sender`.
    pub async fn handle_frame(&self, sender: &str, data: &[u8]) -> Result<(), RelayError> {
        match protocol::decode(data) {
            Ok(message) => self.handle_message(sender, message).await,
            Err(e) => {
                tracing::debug!(user_id = %sender, error = %e, "Undecodable frame");
                self.reply(sender, protocol::ERR_INVALID_FORMAT).await;
                Ok(())
            }
        }
    }

    pub async fn handle_message(
        &self,
        sender: &str,
        message: ClientMessage,
    ) -> Result<(), RelayError> {
        match message {
            ClientMessage::TriggerPhoto { timestamp } => self.trigger_photo(sender, timestamp).await,
            ClientMessage::PhotoUploaded { photo_id, s3_url } => {
                self.photo_uploaded(sender, photo_id, s3_url).await;
                Ok(())
            }
            ClientMessage::Unknown => {
                self.reply(sender, protocol::ERR_UNKNOWN_TYPE).await;
                Ok(())
            }
        }
    }

    async fn trigger_photo(&self, sender: &str, timestamp: Option<i64>) -> Result<(), RelayError> {
        let pairs = Arc::clone(&self.pairs);
        let uid = sender.to_string();
        let pair = store::blocking(move || pairs.pair_for(&uid)).await?;

        let Some(partner_id) = pair.as_ref().and_then(|p| p.partner_of(sender)) else {
            self.reply(sender, protocol::ERR_NOT_PAIRED).await;
            return Ok(());
        };

        if !self.registry.is_online(partner_id) {
            self.reply(sender, protocol::ERR_PARTNER_OFFLINE).await;
            return Ok(());
        }

        let timestamp = match timestamp {
            Some(ts) if ts != 0 => ts,
            _ => Utc::now().timestamp_millis(),
        };
        let message = ServerMessage::TakePhoto {
            initiator_id: sender.to_string(),
            timestamp,
        };

        if let Err(e) = self.registry.send(sender, &message).await {
            tracing::warn!(user_id = %sender, error = %e, "Failed to echo take_photo to initiator");
        }

        self.registry
            .send(partner_id, &message)
            .await
            .map_err(|source| RelayError::PartnerUnreachable {
                partner_id: partner_id.to_string(),
                source,
            })?;

        tracing::info!(
            user_id = %sender,
            partner_id = %partner_id,
            timestamp,
            "Photo capture triggered"
        );
        Ok(())
    }

    async fn photo_uploaded(&self, sender: &str, photo_id: String, s3_url: String) {
        if photo_id.is_empty() || s3_url.is_empty() {
            self.reply(sender, protocol::ERR_UPLOAD_FIELDS).await;
            return;
        }

        let photos = Arc::clone(&self.photos);
        let uid = sender.to_string();
        let pid = photo_id.clone();
        let result = store::blocking(move || photos.record_upload(&uid, &pid, &s3_url)).await;

        match result {
            Ok(()) => {
                tracing::info!(user_id = %sender, photo_id = %photo_id, "Photo upload recorded");
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %sender,
                    photo_id = %photo_id,
                    error = %e,
                    "Failed to record photo upload"
                );
                self.reply(sender, protocol::ERR_RECORD_UPDATE).await;
            }
        }
    }

    /// Send an `error` back to `sender`. Delivery failures are only logged.
    pub async fn reply(&self, sender: &str, message: &str) {
        if let Err(e) = self.registry.send(sender, &ServerMessage::error(message)).await {
            tracing::debug!(user_id = %sender, error = %e, "Failed to deliver error reply");
        }
    }
}
