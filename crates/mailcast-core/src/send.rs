//! Send Unit - Renders tracking for one recipient and hands the message off

use mailcast_common::types::{CampaignId, EmailId, SenderAddressId, UserId, WebhookEvent};
use mailcast_storage::models::EmailRecipient;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::interpolate::{unsubscribe_url, MessageContent};
use crate::tracking::{inject_tracking, TrackingSigner};
use crate::transport::{
    FromAddress, OutgoingMessage, SelectedTransport, TransportError, TransportSelector,
};
use crate::webhooks::WebhookBroadcaster;

/// Send errors
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Sender address not found: {0}")]
    SenderNotFound(SenderAddressId),

    #[error("Sender address is inactive: {0}")]
    SenderInactive(SenderAddressId),

    #[error("No SMTP transport configured")]
    NoTransportConfigured,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One recipient's send
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    pub user_id: UserId,
    pub email_id: EmailId,
    pub campaign_id: Option<CampaignId>,
    pub recipient: &'a EmailRecipient,
    /// Contact's unsubscribe token; adds the one-click unsubscribe headers
    pub unsubscribe_token: Option<&'a str>,
    /// Content with every variable already applied
    pub content: &'a MessageContent,
}

/// Per-recipient send-and-track operation.
///
/// Never touches the Email record; the caller persists the outcome.
pub struct SendUnit {
    tracking: Option<TrackingSigner>,
    api_base_url: String,
    webhooks: Arc<dyn WebhookBroadcaster>,
}

impl SendUnit {
    /// Create a new send unit. `tracking = None` disables pixel and link
    /// rewriting.
    pub fn new(
        tracking: Option<TrackingSigner>,
        api_base_url: impl Into<String>,
        webhooks: Arc<dyn WebhookBroadcaster>,
    ) -> Self {
        Self {
            tracking,
            api_base_url: api_base_url.into(),
            webhooks,
        }
    }

    /// Resolve the transport, then send
    pub async fn send(
        &self,
        selector: &TransportSelector,
        sender: Option<SenderAddressId>,
        request: SendRequest<'_>,
    ) -> Result<String, SendError> {
        let transport = selector.select(request.user_id, sender).await?;
        self.send_with(&transport, request).await
    }

    /// Send through an already selected transport, returning the message id
    pub async fn send_with(
        &self,
        transport: &SelectedTransport,
        request: SendRequest<'_>,
    ) -> Result<String, SendError> {
        let html = match (&self.tracking, &request.content.html) {
            (Some(signer), Some(html)) => Some(inject_tracking(
                html,
                &self.api_base_url,
                &signer.token(request.email_id),
            )),
            (_, html) => html.clone(),
        };

        let mut headers = vec![
            ("X-Mailcast-User".to_string(), request.user_id.to_string()),
            ("X-Mailcast-Email".to_string(), request.email_id.to_string()),
        ];
        // RFC 8058: the POST goes to the API, which unsubscribes without a page
        if let Some(url) = request
            .unsubscribe_token
            .and_then(|token| unsubscribe_url(&self.api_base_url, token))
        {
            headers.push(("List-Unsubscribe".to_string(), format!("<{}>", url)));
            headers.push((
                "List-Unsubscribe-Post".to_string(),
                "List-Unsubscribe=One-Click".to_string(),
            ));
        }

        let message = OutgoingMessage {
            from: transport.from.clone(),
            to: request.recipient.clone(),
            subject: request.content.subject.clone(),
            html,
            text: request.content.text.clone(),
            message_id: message_id_for(&transport.from),
            headers,
        };

        let receipt = transport.transport.send(&message).await?;

        debug!(
            email_id = %request.email_id,
            message_id = %receipt.message_id,
            "Message handed to transport"
        );

        self.webhooks
            .broadcast(
                request.user_id,
                WebhookEvent::EmailSent,
                serde_json::json!({
                    "email_id": request.email_id,
                    "campaign_id": request.campaign_id,
                    "message_id": receipt.message_id,
                    "recipient": request.recipient.email,
                }),
            )
            .await;

        Ok(receipt.message_id)
    }
}

/// `<uuid@domain>` using the domain of the From address
fn message_id_for(from: &FromAddress) -> String {
    format!(
        "<{}@{}>",
        Uuid::new_v4(),
        from.domain().unwrap_or("mailcast.local")
    )
}
