//! Database models

use chrono::{DateTime, Utc};
use mailcast_common::types::{
    BrandId, CampaignId, ContactId, EmailId, GroupId, SenderAddressId, TemplateId, UserId,
    WebhookEvent, WebhookId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Whether the campaign can still be edited, deleted or dispatched
    pub fn is_pending(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }

    /// Whether the campaign reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub template_id: Option<TemplateId>,
    pub group_id: Option<GroupId>,
    pub brand_id: Option<BrandId>,
    pub sender_address_id: Option<SenderAddressId>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub total_recipients: i32,
    pub successful_sends: i32,
    pub failed_sends: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }
}

/// Create campaign input
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateCampaign {
    pub name: String,
    #[serde(default)]
    pub subject: String,
    pub template_id: Option<TemplateId>,
    pub group_id: Option<GroupId>,
    pub brand_id: Option<BrandId>,
    pub sender_address_id: Option<SenderAddressId>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    /// Campaigns with a scheduled time start in `scheduled`, others in `draft`
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Update campaign input
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub template_id: Option<TemplateId>,
    pub group_id: Option<GroupId>,
    pub brand_id: Option<BrandId>,
    pub sender_address_id: Option<SenderAddressId>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Contact group
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Group {
    pub id: GroupId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update group input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupInput {
    pub name: String,
    pub description: Option<String>,
}

/// Group membership
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub contact_id: ContactId,
    pub joined_at: DateTime<Utc>,
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Contact {
    pub id: ContactId,
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub tags: serde_json::Value,
    pub is_active: bool,
    pub unsubscribe_token: String,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Whether this contact may receive campaign sends
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.unsubscribed_at.is_none()
    }

    /// Get tags as a vector
    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateContact {
    pub email: String,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Update contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateContact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Eligible recipient of a group, as returned by the membership join
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
    pub unsubscribe_token: String,
}

/// Brand model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Brand {
    pub id: BrandId,
    pub user_id: UserId,
    pub name: String,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create brand input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBrand {
    pub name: String,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Update brand input
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateBrand {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
}

/// Email template
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Template {
    pub id: TemplateId,
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub brand_id: Option<BrandId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create template input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTemplate {
    pub name: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub brand_id: Option<BrandId>,
}

/// Update template input
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub brand_id: Option<BrandId>,
    pub is_active: Option<bool>,
}

/// Sender address with its SMTP credentials
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct SenderAddress {
    pub id: SenderAddressId,
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub smtp_host: String,
    pub smtp_port: i32,
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing, default)]
    pub smtp_password: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create sender address input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSenderAddress {
    pub email: String,
    pub name: Option<String>,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: i32,
    #[serde(default)]
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

fn default_smtp_port() -> i32 {
    587
}

/// Email send status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
    Bounced,
    Complained,
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Pending => write!(f, "pending"),
            EmailStatus::Sent => write!(f, "sent"),
            EmailStatus::Failed => write!(f, "failed"),
            EmailStatus::Delivered => write!(f, "delivered"),
            EmailStatus::Bounced => write!(f, "bounced"),
            EmailStatus::Complained => write!(f, "complained"),
        }
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EmailStatus::Pending),
            "sent" => Ok(EmailStatus::Sent),
            "failed" => Ok(EmailStatus::Failed),
            "delivered" => Ok(EmailStatus::Delivered),
            "bounced" => Ok(EmailStatus::Bounced),
            "complained" => Ok(EmailStatus::Complained),
            _ => Err(format!("Invalid email status: {}", s)),
        }
    }
}

/// Entry of an email's recipient list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailRecipient {
    pub email: String,
    pub name: Option<String>,
}

/// Email send record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Email {
    pub id: EmailId,
    pub user_id: UserId,
    pub template_id: Option<TemplateId>,
    pub campaign_id: Option<CampaignId>,
    #[schema(value_type = Vec<EmailRecipient>)]
    pub recipients: serde_json::Value,
    pub subject: String,
    pub status: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub open_count: i32,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Email {
    /// Get status enum
    pub fn status_enum(&self) -> Option<EmailStatus> {
        self.status.parse().ok()
    }

    /// Get the recipient list
    pub fn recipients_vec(&self) -> Vec<EmailRecipient> {
        serde_json::from_value(self.recipients.clone()).unwrap_or_default()
    }
}

/// Create email input
#[derive(Debug, Clone)]
pub struct CreateEmail {
    pub user_id: UserId,
    pub template_id: Option<TemplateId>,
    pub campaign_id: Option<CampaignId>,
    pub recipients: Vec<EmailRecipient>,
    pub subject: String,
}

/// Email event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailEventType {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Complained,
}

impl EmailEventType {
    /// Status an email takes on when this event is reported by the provider
    pub fn email_status(&self) -> Option<EmailStatus> {
        match self {
            EmailEventType::Sent => Some(EmailStatus::Sent),
            EmailEventType::Delivered => Some(EmailStatus::Delivered),
            EmailEventType::Bounced => Some(EmailStatus::Bounced),
            EmailEventType::Complained => Some(EmailStatus::Complained),
            EmailEventType::Opened | EmailEventType::Clicked => None,
        }
    }

    /// Webhook event announcing this email event
    pub fn webhook_event(&self) -> WebhookEvent {
        match self {
            EmailEventType::Sent => WebhookEvent::EmailSent,
            EmailEventType::Delivered => WebhookEvent::EmailDelivered,
            EmailEventType::Opened => WebhookEvent::EmailOpened,
            EmailEventType::Clicked => WebhookEvent::EmailClicked,
            EmailEventType::Bounced => WebhookEvent::EmailBounced,
            EmailEventType::Complained => WebhookEvent::EmailComplained,
        }
    }
}

impl std::fmt::Display for EmailEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailEventType::Sent => write!(f, "sent"),
            EmailEventType::Delivered => write!(f, "delivered"),
            EmailEventType::Opened => write!(f, "opened"),
            EmailEventType::Clicked => write!(f, "clicked"),
            EmailEventType::Bounced => write!(f, "bounced"),
            EmailEventType::Complained => write!(f, "complained"),
        }
    }
}

impl std::str::FromStr for EmailEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EmailEventType::Sent),
            "delivered" => Ok(EmailEventType::Delivered),
            "opened" => Ok(EmailEventType::Opened),
            "clicked" => Ok(EmailEventType::Clicked),
            "bounced" => Ok(EmailEventType::Bounced),
            "complained" => Ok(EmailEventType::Complained),
            _ => Err(format!("Invalid email event type: {}", s)),
        }
    }
}

/// Email event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct EmailEvent {
    pub id: uuid::Uuid,
    pub email_id: EmailId,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
}

/// User-registered webhook endpoint
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Webhook {
    pub id: WebhookId,
    pub user_id: UserId,
    pub url: String,
    #[serde(skip_serializing, default)]
    pub secret: String,
    /// Subscribed event names; empty means every event
    #[schema(value_type = Vec<String>)]
    pub events: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Get subscribed events
    pub fn events_vec(&self) -> Vec<WebhookEvent> {
        serde_json::from_value(self.events.clone()).unwrap_or_default()
    }

    /// Whether this endpoint wants the given event
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        let events = self.events_vec();
        events.is_empty() || events.contains(&event)
    }
}

/// Create webhook input
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateWebhook {
    pub url: String,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub events: Vec<WebhookEvent>,
}
