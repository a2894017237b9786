//! Common types for Mailcast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for user accounts
pub type UserId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contact groups
pub type GroupId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for brands
pub type BrandId = Uuid;

/// Unique identifier for templates
pub type TemplateId = Uuid;

/// Unique identifier for sender addresses
pub type SenderAddressId = Uuid;

/// Unique identifier for email send records
pub type EmailId = Uuid;

/// Unique identifier for webhook endpoints
pub type WebhookId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Events delivered to user-registered webhook endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "email.sent")]
    EmailSent,
    #[serde(rename = "email.delivered")]
    EmailDelivered,
    #[serde(rename = "email.opened")]
    EmailOpened,
    #[serde(rename = "email.clicked")]
    EmailClicked,
    #[serde(rename = "email.bounced")]
    EmailBounced,
    #[serde(rename = "email.complained")]
    EmailComplained,
}

impl WebhookEvent {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::EmailSent => "email.sent",
            WebhookEvent::EmailDelivered => "email.delivered",
            WebhookEvent::EmailOpened => "email.opened",
            WebhookEvent::EmailClicked => "email.clicked",
            WebhookEvent::EmailBounced => "email.bounced",
            WebhookEvent::EmailComplained => "email.complained",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEvent {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email.sent" => Ok(WebhookEvent::EmailSent),
            "email.delivered" => Ok(WebhookEvent::EmailDelivered),
            "email.opened" => Ok(WebhookEvent::EmailOpened),
            "email.clicked" => Ok(WebhookEvent::EmailClicked),
            "email.bounced" => Ok(WebhookEvent::EmailBounced),
            "email.complained" => Ok(WebhookEvent::EmailComplained),
            other => Err(crate::Error::Validation(format!(
                "Unknown webhook event: {}",
                other
            ))),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
