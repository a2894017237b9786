//! In-memory fakes for pipeline tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_common::types::{
    BrandId, CampaignId, EmailId, GroupId, SenderAddressId, TemplateId, UserId, WebhookEvent,
};
use mailcast_storage::models::{
    Brand, Campaign, CampaignStatus, Contact, CreateEmail, Email, EmailEventType, EmailStatus,
    Recipient, SenderAddress, Template,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::recipients::RecipientSource;
use crate::store::{CampaignStore, EmailStore, TrackingStore};
use crate::transport::{
    MailTransport, OutgoingMessage, SendReceipt, SenderLookup, SmtpCredentials, TransportError,
    TransportFactory,
};
use crate::webhooks::WebhookBroadcaster;

pub fn sender(
    user_id: UserId,
    email: &str,
    name: Option<&str>,
    is_active: bool,
    is_default: bool,
) -> SenderAddress {
    let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or("example.com");
    SenderAddress {
        id: Uuid::now_v7(),
        user_id,
        email: email.to_string(),
        name: name.map(String::from),
        smtp_host: format!("smtp.{}", domain),
        smtp_port: 587,
        smtp_tls: false,
        smtp_username: None,
        smtp_password: None,
        is_default,
        is_active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn contact(email: &str, name: &str) -> Contact {
    Contact {
        id: Uuid::now_v7(),
        user_id: Uuid::now_v7(),
        email: email.to_string(),
        name: Some(name.to_string()),
        tags: serde_json::json!([]),
        is_active: true,
        unsubscribe_token: Uuid::new_v4().simple().to_string(),
        unsubscribed_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn campaign(user_id: UserId, group_id: Option<GroupId>, status: CampaignStatus) -> Campaign {
    Campaign {
        id: Uuid::now_v7(),
        user_id,
        name: "Launch".to_string(),
        subject: "Hello {{name}}".to_string(),
        template_id: None,
        group_id,
        brand_id: None,
        sender_address_id: None,
        html_body: None,
        text_body: None,
        status: status.to_string(),
        scheduled_at: None,
        sent_at: None,
        total_recipients: 0,
        successful_sends: 0,
        failed_sends: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn template(user_id: UserId, subject: &str, text: &str) -> Template {
    Template {
        id: Uuid::now_v7(),
        user_id,
        name: "Welcome".to_string(),
        subject: subject.to_string(),
        html_body: None,
        text_body: Some(text.to_string()),
        brand_id: None,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn brand(user_id: UserId, name: &str) -> Brand {
    Brand {
        id: Uuid::now_v7(),
        user_id,
        name: name.to_string(),
        logo_url: None,
        website: None,
        is_default: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub struct FakeSenders {
    senders: Vec<SenderAddress>,
}

impl FakeSenders {
    pub fn new(senders: Vec<SenderAddress>) -> Self {
        Self { senders }
    }
}

#[async_trait]
impl SenderLookup for FakeSenders {
    async fn sender(&self, id: SenderAddressId) -> Result<Option<SenderAddress>, sqlx::Error> {
        Ok(self.senders.iter().find(|s| s.id == id).cloned())
    }

    async fn default_sender(&self, user_id: UserId) -> Result<Option<SenderAddress>, sqlx::Error> {
        Ok(self
            .senders
            .iter()
            .find(|s| s.user_id == user_id && s.is_default && s.is_active)
            .cloned())
    }
}

#[derive(Default)]
struct TransportState {
    failing: Vec<String>,
    built_hosts: Mutex<Vec<String>>,
    attempted: Mutex<Vec<String>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    gate: Option<Arc<Semaphore>>,
    entered: Notify,
}

/// Records every build and send; fails sends to chosen recipients
#[derive(Default)]
pub struct FakeTransportFactory {
    state: Arc<TransportState>,
}

impl FakeTransportFactory {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            state: Arc::new(TransportState {
                failing: recipients.iter().map(|r| r.to_string()).collect(),
                ..TransportState::default()
            }),
        }
    }

    /// Sends block until the returned semaphore gets permits
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let factory = Self {
            state: Arc::new(TransportState {
                gate: Some(gate.clone()),
                ..TransportState::default()
            }),
        };
        (factory, gate)
    }

    pub fn transport(&self) -> Arc<dyn MailTransport> {
        Arc::new(FakeTransport {
            state: self.state.clone(),
        })
    }

    /// Resolves once a send has started
    pub async fn send_started(&self) {
        self.state.entered.notified().await;
    }

    pub fn built_hosts(&self) -> Vec<String> {
        self.state.built_hosts.lock().unwrap().clone()
    }

    pub fn attempted(&self) -> Vec<String> {
        self.state.attempted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn build(&self, credentials: &SmtpCredentials) -> Result<Arc<dyn MailTransport>, TransportError> {
        self.state
            .built_hosts
            .lock()
            .unwrap()
            .push(credentials.host.clone());
        Ok(self.transport())
    }
}

struct FakeTransport {
    state: Arc<TransportState>,
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, TransportError> {
        self.state.entered.notify_one();
        if let Some(gate) = &self.state.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Smtp(e.to_string()))?
                .forget();
        }

        self.state
            .attempted
            .lock()
            .unwrap()
            .push(message.to.email.clone());

        if self.state.failing.contains(&message.to.email) {
            return Err(TransportError::Smtp("550 mailbox unavailable".to_string()));
        }

        self.state.sent.lock().unwrap().push(message.clone());
        Ok(SendReceipt {
            message_id: message.message_id.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(UserId, WebhookEvent)>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<(UserId, WebhookEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, user_id: UserId, event: WebhookEvent, _data: serde_json::Value) {
        self.events.lock().unwrap().push((user_id, event));
    }
}

#[derive(Default)]
pub struct FakeRecipients {
    groups: HashMap<GroupId, Vec<Contact>>,
}

impl FakeRecipients {
    pub fn with_group(mut self, group_id: GroupId, contacts: Vec<Contact>) -> Self {
        self.groups.insert(group_id, contacts);
        self
    }
}

#[async_trait]
impl RecipientSource for FakeRecipients {
    async fn eligible_recipients(&self, group_id: GroupId) -> Result<Vec<Recipient>, sqlx::Error> {
        Ok(self
            .groups
            .get(&group_id)
            .map(|contacts| {
                contacts
                    .iter()
                    .filter(|c| c.is_eligible())
                    .map(|c| Recipient {
                        email: c.email.clone(),
                        name: c.name.clone(),
                        unsubscribe_token: c.unsubscribe_token.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeCampaignStore {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
    templates: HashMap<TemplateId, Template>,
    brands: HashMap<BrandId, Brand>,
    default_brand: Option<Brand>,
    /// Status writes per campaign, in order
    history: Mutex<HashMap<CampaignId, Vec<String>>>,
    touches: AtomicUsize,
}

impl FakeCampaignStore {
    pub fn with_campaign(self, campaign: Campaign) -> Self {
        self.campaigns.lock().unwrap().insert(campaign.id, campaign);
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.insert(template.id, template);
        self
    }

    pub fn with_brand(mut self, brand: Brand) -> Self {
        self.brands.insert(brand.id, brand);
        self
    }

    pub fn with_default_brand(mut self, mut brand: Brand) -> Self {
        brand.is_default = true;
        self.default_brand = Some(brand);
        self
    }

    pub fn get(&self, id: CampaignId) -> Campaign {
        self.campaigns.lock().unwrap()[&id].clone()
    }

    pub fn status_history(&self, id: CampaignId) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Heartbeats recorded for running sends
    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    /// Overwrite a campaign as another process would
    pub fn force_status(&self, id: CampaignId, status: CampaignStatus) {
        self.write_status(id, status, |_| {});
    }

    fn has_status(&self, id: CampaignId, check: impl FnOnce(CampaignStatus) -> bool) -> bool {
        self.campaigns
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|c| c.status_enum())
            .is_some_and(check)
    }

    fn write_status(&self, id: CampaignId, status: CampaignStatus, update: impl FnOnce(&mut Campaign)) {
        if let Some(campaign) = self.campaigns.lock().unwrap().get_mut(&id) {
            campaign.status = status.to_string();
            campaign.updated_at = Utc::now();
            update(campaign);
            self.history
                .lock()
                .unwrap()
                .entry(id)
                .or_default()
                .push(status.to_string());
        }
    }
}

#[async_trait]
impl CampaignStore for FakeCampaignStore {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        Ok(self.campaigns.lock().unwrap().get(&id).cloned())
    }

    async fn template(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error> {
        Ok(self.templates.get(&id).cloned())
    }

    async fn brand(&self, id: BrandId) -> Result<Option<Brand>, sqlx::Error> {
        Ok(self.brands.get(&id).cloned())
    }

    async fn default_brand(&self, user_id: UserId) -> Result<Option<Brand>, sqlx::Error> {
        Ok(self
            .default_brand
            .clone()
            .filter(|b| b.user_id == user_id))
    }

    async fn mark_sending(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        let pending = self
            .campaigns
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|c| c.status_enum())
            .is_some_and(|s| s.is_pending());
        if pending {
            self.write_status(id, CampaignStatus::Sending, |_| {});
        }
        Ok(pending)
    }

    async fn complete(
        &self,
        id: CampaignId,
        total: i32,
        successful: i32,
        failed: i32,
    ) -> Result<bool, sqlx::Error> {
        if !self.has_status(id, |s| s == CampaignStatus::Sending) {
            return Ok(false);
        }
        self.write_status(id, CampaignStatus::Completed, |c| {
            c.sent_at = Some(Utc::now());
            c.total_recipients = total;
            c.successful_sends = successful;
            c.failed_sends = failed;
        });
        Ok(true)
    }

    async fn mark_failed(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        if !self.has_status(id, |s| !s.is_terminal()) {
            return Ok(false);
        }
        self.write_status(id, CampaignStatus::Failed, |c| c.sent_at = Some(Utc::now()));
        Ok(true)
    }

    async fn touch(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        if let Some(campaign) = self.campaigns.lock().unwrap().get_mut(&id) {
            if campaign.status == "sending" {
                campaign.updated_at = Utc::now();
            }
        }
        self.touches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fail_stuck(&self, id: CampaignId, before: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let idle = self
            .campaigns
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|c| c.status == "sending" && c.updated_at < before);
        if idle {
            self.write_status(id, CampaignStatus::Failed, |c| c.sent_at = Some(Utc::now()));
        }
        Ok(idle)
    }

    async fn due_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, sqlx::Error> {
        let now = Utc::now();
        let mut due: Vec<Campaign> = self
            .campaigns
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status == "scheduled" && c.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn stuck_campaigns(&self, before: DateTime<Utc>) -> Result<Vec<Campaign>, sqlx::Error> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status == "sending" && c.updated_at < before)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeEmailStore {
    emails: Mutex<HashMap<EmailId, Email>>,
    events: Mutex<Vec<(EmailId, EmailEventType, serde_json::Value)>>,
    fail_creates: Mutex<Vec<String>>,
}

impl FakeEmailStore {
    /// Make record creation fail for one recipient address
    pub fn fail_creates_for(&self, email: &str) {
        self.fail_creates.lock().unwrap().push(email.to_string());
    }

    pub fn get(&self, id: EmailId) -> Email {
        self.emails.lock().unwrap()[&id].clone()
    }

    pub fn count_with_status(&self, status: EmailStatus) -> usize {
        self.emails
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.status_enum() == Some(status))
            .count()
    }

    pub fn event_types(&self, id: EmailId) -> Vec<EmailEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(email_id, ..)| *email_id == id)
            .map(|(_, event_type, _)| *event_type)
            .collect()
    }

    pub fn event_details(&self, id: EmailId) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(email_id, ..)| *email_id == id)
            .map(|(.., detail)| detail.clone())
            .collect()
    }

    fn update(&self, id: EmailId, update: impl FnOnce(&mut Email)) -> Result<(), sqlx::Error> {
        match self.emails.lock().unwrap().get_mut(&id) {
            Some(email) => {
                update(email);
                Ok(())
            }
            None => Err(sqlx::Error::RowNotFound),
        }
    }
}

#[async_trait]
impl EmailStore for FakeEmailStore {
    async fn create_email(&self, input: CreateEmail) -> Result<Email, sqlx::Error> {
        let failing = self.fail_creates.lock().unwrap().clone();
        if input.recipients.iter().any(|r| failing.contains(&r.email)) {
            return Err(sqlx::Error::Protocol("connection reset".to_string()));
        }

        let email = Email {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            template_id: input.template_id,
            campaign_id: input.campaign_id,
            recipients: serde_json::to_value(&input.recipients)
                .map_err(|e| sqlx::Error::Protocol(e.to_string()))?,
            subject: input.subject,
            status: EmailStatus::Pending.to_string(),
            message_id: None,
            error: None,
            open_count: 0,
            click_count: 0,
            created_at: Utc::now(),
            sent_at: None,
        };
        self.emails.lock().unwrap().insert(email.id, email.clone());
        Ok(email)
    }

    async fn mark_sent(&self, id: EmailId, message_id: &str) -> Result<(), sqlx::Error> {
        self.update(id, |e| {
            e.status = EmailStatus::Sent.to_string();
            e.message_id = Some(message_id.to_string());
            e.sent_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: EmailId, error: &str) -> Result<(), sqlx::Error> {
        self.update(id, |e| {
            e.status = EmailStatus::Failed.to_string();
            e.error = Some(error.to_string());
        })
    }
}

#[async_trait]
impl TrackingStore for FakeEmailStore {
    async fn email(&self, id: EmailId) -> Result<Option<Email>, sqlx::Error> {
        Ok(self.emails.lock().unwrap().get(&id).cloned())
    }

    async fn add_event(
        &self,
        email_id: EmailId,
        event_type: EmailEventType,
        detail: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        if !self.emails.lock().unwrap().contains_key(&email_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        self.events
            .lock()
            .unwrap()
            .push((email_id, event_type, detail));
        Ok(())
    }

    async fn increment_opens(&self, id: EmailId) -> Result<(), sqlx::Error> {
        self.update(id, |e| e.open_count += 1)
    }

    async fn increment_clicks(&self, id: EmailId) -> Result<(), sqlx::Error> {
        self.update(id, |e| e.click_count += 1)
    }

    async fn set_status(&self, id: EmailId, status: EmailStatus) -> Result<(), sqlx::Error> {
        self.update(id, |e| e.status = status.to_string())
    }
}
