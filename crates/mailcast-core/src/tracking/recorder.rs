//! Records opens, clicks and provider-reported delivery events

use super::{TrackingError, TrackingSigner};
use mailcast_common::types::EmailId;
use mailcast_storage::models::{Email, EmailEventType};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::TrackingStore;
use crate::webhooks::WebhookBroadcaster;

/// Tracking recorder
pub struct TrackingRecorder {
    signer: TrackingSigner,
    store: Arc<dyn TrackingStore>,
    webhooks: Arc<dyn WebhookBroadcaster>,
}

impl TrackingRecorder {
    /// Create a new tracking recorder
    pub fn new(
        signer: TrackingSigner,
        store: Arc<dyn TrackingStore>,
        webhooks: Arc<dyn WebhookBroadcaster>,
    ) -> Self {
        Self {
            signer,
            store,
            webhooks,
        }
    }

    async fn load(&self, email_id: EmailId) -> Result<Email, TrackingError> {
        self.store
            .email(email_id)
            .await?
            .ok_or(TrackingError::EmailNotFound(email_id))
    }

    /// Record a pixel load
    pub async fn record_open(&self, token: &str) -> Result<EmailId, TrackingError> {
        let email = self.load(self.signer.decode(token)?).await?;

        self.store
            .add_event(email.id, EmailEventType::Opened, serde_json::json!({}))
            .await?;
        self.store.increment_opens(email.id).await?;

        debug!(email_id = %email.id, "Recorded open");

        self.webhooks
            .broadcast(
                email.user_id,
                EmailEventType::Opened.webhook_event(),
                serde_json::json!({
                    "email_id": email.id,
                    "campaign_id": email.campaign_id,
                }),
            )
            .await;

        Ok(email.id)
    }

    /// Record a click on a rewritten link
    pub async fn record_click(&self, token: &str, url: &str) -> Result<EmailId, TrackingError> {
        let email = self.load(self.signer.decode(token)?).await?;

        self.store
            .add_event(
                email.id,
                EmailEventType::Clicked,
                serde_json::json!({ "url": url }),
            )
            .await?;
        self.store.increment_clicks(email.id).await?;

        debug!(email_id = %email.id, url = %url, "Recorded click");

        self.webhooks
            .broadcast(
                email.user_id,
                EmailEventType::Clicked.webhook_event(),
                serde_json::json!({
                    "email_id": email.id,
                    "campaign_id": email.campaign_id,
                    "url": url,
                }),
            )
            .await;

        Ok(email.id)
    }

    /// Record a delivery status reported by the provider
    pub async fn record_status(
        &self,
        email_id: EmailId,
        event_type: EmailEventType,
        detail: serde_json::Value,
    ) -> Result<(), TrackingError> {
        let email = self.load(email_id).await?;

        self.store
            .add_event(email.id, event_type, detail.clone())
            .await?;

        if let Some(status) = event_type.email_status() {
            self.store.set_status(email.id, status).await?;
        }

        info!(email_id = %email.id, event = %event_type, "Recorded provider event");

        self.webhooks
            .broadcast(
                email.user_id,
                event_type.webhook_event(),
                serde_json::json!({
                    "email_id": email.id,
                    "campaign_id": email.campaign_id,
                    "detail": detail,
                }),
            )
            .await;

        Ok(())
    }
}
