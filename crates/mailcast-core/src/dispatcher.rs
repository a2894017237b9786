//! Campaign Dispatcher - Sends a campaign to its whole audience
//!
//! `draft|scheduled -> sending -> completed|failed`. Recipients are processed
//! by a bounded pool; one recipient's failure never stops the others, and the
//! campaign only reaches a terminal state once every recipient was attempted.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use mailcast_common::types::{CampaignId, EmailId, UserId};
use mailcast_storage::models::{
    Brand, Campaign, CampaignStatus, CreateEmail, EmailRecipient, Recipient,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::interpolate::{brand_variables, recipient_variables, MessageContent};
use crate::metrics::Metrics;
use crate::recipients::{resolve_recipients, RecipientSource};
use crate::send::{SendError, SendRequest, SendUnit};
use crate::store::{CampaignStore, EmailStore};
use crate::transport::{SelectedTransport, TransportSelector};

/// How often a running send refreshes the campaign's `updated_at`
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("Campaign cannot be sent from status '{0}'")]
    InvalidStatus(String),

    #[error("Campaign has no target group")]
    NoTargetGroup,

    #[error("Target group has no eligible recipients")]
    EmptyAudience,

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Raised before anything was sent
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            DispatchError::NotFound(_)
                | DispatchError::InvalidStatus(_)
                | DispatchError::NoTargetGroup
                | DispatchError::EmptyAudience
        )
    }
}

/// Aggregate result of a dispatch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub total: i32,
    pub successful: i32,
    pub failed: i32,
}

/// A campaign whose preconditions hold, with brand variables applied
#[derive(Debug, Clone)]
pub struct PreparedCampaign {
    pub campaign: Campaign,
    pub content: MessageContent,
    pub recipients: Vec<Recipient>,
}

impl PreparedCampaign {
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }
}

/// Result of a test send
#[derive(Debug, Clone)]
pub struct TestSend {
    pub email_id: EmailId,
    pub message_id: String,
}

/// Campaign dispatcher
pub struct CampaignDispatcher {
    campaigns: Arc<dyn CampaignStore>,
    emails: Arc<dyn EmailStore>,
    recipients: Arc<dyn RecipientSource>,
    transports: Arc<TransportSelector>,
    send_unit: Arc<SendUnit>,
    metrics: Metrics,
    client_base_url: String,
    concurrency: usize,
}

impl CampaignDispatcher {
    /// Create a new campaign dispatcher
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        emails: Arc<dyn EmailStore>,
        recipients: Arc<dyn RecipientSource>,
        transports: Arc<TransportSelector>,
        send_unit: Arc<SendUnit>,
        metrics: Metrics,
        client_base_url: impl Into<String>,
    ) -> Self {
        Self {
            campaigns,
            emails,
            recipients,
            transports,
            send_unit,
            metrics,
            client_base_url: client_base_url.into(),
            concurrency: 5,
        }
    }

    /// Set the number of concurrent sends; 1 sends strictly sequentially
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Check status, resolve recipients, and pre-apply brand variables
    pub async fn prepare_campaign(
        &self,
        campaign: Campaign,
    ) -> Result<PreparedCampaign, DispatchError> {
        match campaign.status_enum() {
            Some(status) if status.is_pending() => {}
            _ => return Err(DispatchError::InvalidStatus(campaign.status.clone())),
        }

        let recipients = resolve_recipients(self.recipients.as_ref(), campaign.group_id).await?;
        let content = self.resolve_content(&campaign).await?;

        Ok(PreparedCampaign {
            campaign,
            content,
            recipients,
        })
    }

    /// Template content overridden by the campaign, with the brand applied.
    ///
    /// Brand precedence: campaign, then template, then the user's default.
    async fn resolve_content(&self, campaign: &Campaign) -> Result<MessageContent, DispatchError> {
        let template = match campaign.template_id {
            Some(id) => self
                .campaigns
                .template(id)
                .await?
                .filter(|t| t.user_id == campaign.user_id),
            None => None,
        };

        let subject = if campaign.subject.trim().is_empty() {
            template.as_ref().map(|t| t.subject.clone()).unwrap_or_default()
        } else {
            campaign.subject.clone()
        };

        let content = MessageContent {
            subject,
            html: campaign
                .html_body
                .clone()
                .or_else(|| template.as_ref().and_then(|t| t.html_body.clone())),
            text: campaign
                .text_body
                .clone()
                .or_else(|| template.as_ref().and_then(|t| t.text_body.clone())),
        };

        let brand = self
            .resolve_brand(
                campaign.user_id,
                campaign
                    .brand_id
                    .or_else(|| template.as_ref().and_then(|t| t.brand_id)),
            )
            .await?;

        Ok(content.interpolate(&brand_variables(brand.as_ref())))
    }

    async fn resolve_brand(
        &self,
        user_id: UserId,
        brand_id: Option<mailcast_common::types::BrandId>,
    ) -> Result<Option<Brand>, DispatchError> {
        let brand = match brand_id {
            Some(id) => self.campaigns.brand(id).await?,
            None => self.campaigns.default_brand(user_id).await?,
        };
        Ok(brand.filter(|b| b.user_id == user_id))
    }

    /// Send a due campaign (scheduler path).
    ///
    /// Any failure marks the campaign `failed`, unless another trigger
    /// already moved it out of `draft`/`scheduled`.
    pub async fn dispatch_scheduled(
        &self,
        campaign: Campaign,
    ) -> Result<DispatchOutcome, DispatchError> {
        let campaign_id = campaign.id;

        let result = match self.prepare_campaign(campaign).await {
            Ok(prepared) => self.run(prepared).await,
            Err(e) => Err(e),
        };

        match result {
            Err(DispatchError::InvalidStatus(status)) => {
                Err(DispatchError::InvalidStatus(status))
            }
            Err(e) => {
                warn!(campaign_id = %campaign_id, "Scheduled dispatch failed: {}", e);
                match self.campaigns.mark_failed(campaign_id).await {
                    Ok(true) => self.metrics.campaigns_failed.inc(),
                    Ok(false) => {}
                    Err(db) => {
                        error!(campaign_id = %campaign_id, "Failed to mark campaign failed: {}", db)
                    }
                }
                Err(e)
            }
            ok => ok,
        }
    }

    /// Run a prepared campaign to completion
    pub async fn run(&self, prepared: PreparedCampaign) -> Result<DispatchOutcome, DispatchError> {
        let campaign = &prepared.campaign;

        if !self.campaigns.mark_sending(campaign.id).await? {
            return Err(DispatchError::InvalidStatus(
                CampaignStatus::Sending.to_string(),
            ));
        }

        info!(
            campaign_id = %campaign.id,
            recipients = prepared.recipients.len(),
            concurrency = self.concurrency,
            "Dispatching campaign"
        );

        let transport = self
            .transports
            .select(campaign.user_id, campaign.sender_address_id)
            .await
            .map_err(|e| {
                warn!(campaign_id = %campaign.id, "Transport selection failed: {}", e);
                e.to_string()
            });

        let transport = transport.as_ref();
        let mut results = stream::iter(prepared.recipients.clone())
            .map(|recipient| {
                let email = recipient.email.clone();
                AssertUnwindSafe(self.process_recipient(&prepared, transport, recipient))
                    .catch_unwind()
                    .map(move |result| {
                        result.unwrap_or_else(|_| {
                            error!(recipient = %email, "Recipient task panicked");
                            false
                        })
                    })
                    .boxed()
            })
            .buffer_unordered(self.concurrency);

        let mut outcome = DispatchOutcome::default();
        let mut last_beat = Instant::now();
        while let Some(sent) = results.next().await {
            outcome.total += 1;
            if sent {
                outcome.successful += 1;
            } else {
                outcome.failed += 1;
            }

            if last_beat.elapsed() >= HEARTBEAT_INTERVAL {
                if let Err(e) = self.campaigns.touch(campaign.id).await {
                    warn!(campaign_id = %campaign.id, "Failed to record send progress: {}", e);
                }
                last_beat = Instant::now();
            }
        }

        if !self
            .campaigns
            .complete(campaign.id, outcome.total, outcome.successful, outcome.failed)
            .await?
        {
            warn!(
                campaign_id = %campaign.id,
                successful = outcome.successful,
                failed = outcome.failed,
                "Campaign left sending before the run finished; counters not recorded"
            );
            return Ok(outcome);
        }
        self.metrics.campaigns_completed.inc();

        info!(
            campaign_id = %campaign.id,
            total = outcome.total,
            successful = outcome.successful,
            failed = outcome.failed,
            "Campaign completed"
        );

        Ok(outcome)
    }

    /// One recipient: render, record, send, persist the outcome
    async fn process_recipient(
        &self,
        prepared: &PreparedCampaign,
        transport: Result<&SelectedTransport, &String>,
        recipient: Recipient,
    ) -> bool {
        let campaign = &prepared.campaign;
        let content = prepared
            .content
            .interpolate(&recipient_variables(&recipient, &self.client_base_url));
        let to = EmailRecipient {
            email: recipient.email.clone(),
            name: recipient.name.clone(),
        };

        let email = match self
            .emails
            .create_email(CreateEmail {
                user_id: campaign.user_id,
                template_id: campaign.template_id,
                campaign_id: Some(campaign.id),
                recipients: vec![to.clone()],
                subject: content.subject.clone(),
            })
            .await
        {
            Ok(email) => email,
            Err(e) => {
                warn!(
                    campaign_id = %campaign.id,
                    recipient = %recipient.email,
                    "Failed to create email record: {}",
                    e
                );
                self.metrics.emails_failed.inc();
                return false;
            }
        };

        let result = match transport {
            Ok(transport) => {
                self.send_unit
                    .send_with(
                        transport,
                        SendRequest {
                            user_id: campaign.user_id,
                            email_id: email.id,
                            campaign_id: Some(campaign.id),
                            recipient: &to,
                            unsubscribe_token: Some(recipient.unsubscribe_token.as_str()),
                            content: &content,
                        },
                    )
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(reason) => Err(reason.clone()),
        };

        match result {
            Ok(message_id) => {
                if let Err(e) = self.emails.mark_sent(email.id, &message_id).await {
                    warn!(email_id = %email.id, "Sent but failed to record status: {}", e);
                }
                self.metrics.emails_sent.inc();
                debug!(email_id = %email.id, recipient = %recipient.email, "Recipient sent");
                true
            }
            Err(reason) => {
                warn!(
                    campaign_id = %campaign.id,
                    email_id = %email.id,
                    recipient = %recipient.email,
                    "Send failed: {}",
                    reason
                );
                if let Err(e) = self.emails.mark_failed(email.id, &reason).await {
                    warn!(email_id = %email.id, "Failed to record send failure: {}", e);
                }
                self.metrics.emails_failed.inc();
                false
            }
        }
    }

    /// Render a campaign for one address and send it, outside of the
    /// campaign's audience and statistics
    pub async fn send_test(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        to_email: &str,
        to_name: Option<&str>,
    ) -> Result<TestSend, DispatchError> {
        let campaign = self
            .campaigns
            .campaign(campaign_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or(DispatchError::NotFound(campaign_id))?;

        let recipient = Recipient {
            email: to_email.to_string(),
            name: to_name.map(String::from),
            unsubscribe_token: String::new(),
        };
        let content = self
            .resolve_content(&campaign)
            .await?
            .interpolate(&recipient_variables(&recipient, &self.client_base_url));
        let to = EmailRecipient {
            email: recipient.email.clone(),
            name: recipient.name.clone(),
        };

        let email = self
            .emails
            .create_email(CreateEmail {
                user_id,
                template_id: campaign.template_id,
                campaign_id: None,
                recipients: vec![to.clone()],
                subject: content.subject.clone(),
            })
            .await?;

        let result = self
            .send_unit
            .send(
                &self.transports,
                campaign.sender_address_id,
                SendRequest {
                    user_id,
                    email_id: email.id,
                    campaign_id: None,
                    recipient: &to,
                    unsubscribe_token: None,
                    content: &content,
                },
            )
            .await;

        match result {
            Ok(message_id) => {
                self.emails.mark_sent(email.id, &message_id).await?;
                info!(campaign_id = %campaign_id, to = %to_email, "Test email sent");
                Ok(TestSend {
                    email_id: email.id,
                    message_id,
                })
            }
            Err(e) => {
                self.emails.mark_failed(email.id, &e.to_string()).await?;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        brand, campaign, contact, sender, template, FakeCampaignStore, FakeEmailStore,
        FakeRecipients, FakeSenders, FakeTransportFactory, RecordingBroadcaster,
    };
    use mailcast_common::config::SmtpConfig;
    use mailcast_storage::models::EmailStatus;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    struct Harness {
        store: Arc<FakeCampaignStore>,
        emails: Arc<FakeEmailStore>,
        factory: Arc<FakeTransportFactory>,
        dispatcher: Arc<CampaignDispatcher>,
    }

    impl Harness {
        /// Send-now as the HTTP handler drives it
        async fn dispatch(&self, id: CampaignId) -> Result<DispatchOutcome, DispatchError> {
            let campaign = self
                .store
                .campaign(id)
                .await?
                .ok_or(DispatchError::NotFound(id))?;
            let prepared = self.dispatcher.prepare_campaign(campaign).await?;
            self.dispatcher.run(prepared).await
        }
    }

    fn harness(
        store: FakeCampaignStore,
        recipients: FakeRecipients,
        senders: FakeSenders,
        factory: FakeTransportFactory,
        concurrency: usize,
    ) -> Harness {
        let store = Arc::new(store);
        let emails = Arc::new(FakeEmailStore::default());
        let factory = Arc::new(factory);
        let selector = Arc::new(TransportSelector::new(
            Arc::new(senders),
            factory.clone(),
            SmtpConfig {
                host: Some("relay.test".to_string()),
                from_address: "noreply@mailcast.test".to_string(),
                ..SmtpConfig::default()
            },
        ));
        let send_unit = Arc::new(SendUnit::new(
            None,
            "https://api.test",
            Arc::new(RecordingBroadcaster::default()),
        ));
        let dispatcher = Arc::new(
            CampaignDispatcher::new(
                store.clone(),
                emails.clone(),
                Arc::new(recipients),
                selector,
                send_unit,
                Metrics::new().unwrap(),
                "https://app.test",
            )
            .with_concurrency(concurrency),
        );

        Harness {
            store,
            emails,
            factory,
            dispatcher,
        }
    }

    fn audience(group: Uuid) -> FakeRecipients {
        let mut unsubscribed = contact("dave@example.com", "Dave");
        unsubscribed.unsubscribed_at = Some(chrono::Utc::now());
        FakeRecipients::default().with_group(
            group,
            vec![
                contact("ann@example.com", "Ann"),
                contact("bob@example.com", "Bob"),
                contact("cat@example.com", "Cat"),
                unsubscribed,
            ],
        )
    }

    #[tokio::test]
    async fn test_sends_to_active_subscribed_contacts_only() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = campaign(user, Some(group), CampaignStatus::Draft);
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            audience(group),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        let outcome = h.dispatch(c.id).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome {
                total: 3,
                successful: 3,
                failed: 0
            }
        );

        let mut sent: Vec<_> = h.factory.sent().into_iter().map(|m| m.to.email).collect();
        sent.sort();
        assert_eq!(sent, vec!["ann@example.com", "bob@example.com", "cat@example.com"]);

        let stored = h.store.get(c.id);
        assert_eq!(stored.status, "completed");
        assert_eq!(stored.total_recipients, 3);
        assert!(stored.sent_at.is_some());
        assert_eq!(h.emails.count_with_status(EmailStatus::Sent), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_is_isolated() {
        for concurrency in [1, 4] {
            let user = Uuid::now_v7();
            let group = Uuid::now_v7();
            let c = campaign(user, Some(group), CampaignStatus::Scheduled);
            let h = harness(
                FakeCampaignStore::default().with_campaign(c.clone()),
                audience(group),
                FakeSenders::new(vec![]),
                FakeTransportFactory::failing_for(&["bob@example.com"]),
                concurrency,
            );

            let outcome = h.dispatch(c.id).await.unwrap();
            assert_eq!(outcome.total, 3);
            assert_eq!(outcome.successful, 2);
            assert_eq!(outcome.failed, 1);
            assert_eq!(h.factory.attempted().len(), 3);

            let stored = h.store.get(c.id);
            assert_eq!(stored.status, "completed");
            assert_eq!(stored.successful_sends + stored.failed_sends, 3);
            assert_eq!(h.emails.count_with_status(EmailStatus::Failed), 1);
        }
    }

    #[tokio::test]
    async fn test_email_record_failure_counts_as_failure() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = campaign(user, Some(group), CampaignStatus::Draft);
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            audience(group),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            2,
        );
        h.emails.fail_creates_for("cat@example.com");

        let outcome = h.dispatch(c.id).await.unwrap();
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(h.factory.attempted().len(), 2);
    }

    #[tokio::test]
    async fn test_http_path_precondition_leaves_campaign_untouched() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let no_group = campaign(user, None, CampaignStatus::Draft);
        let empty = campaign(user, Some(group), CampaignStatus::Draft);
        let h = harness(
            FakeCampaignStore::default()
                .with_campaign(no_group.clone())
                .with_campaign(empty.clone()),
            FakeRecipients::default(),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        assert!(matches!(
            h.dispatch(no_group.id).await,
            Err(DispatchError::NoTargetGroup)
        ));
        assert!(matches!(
            h.dispatch(empty.id).await,
            Err(DispatchError::EmptyAudience)
        ));
        assert_eq!(h.store.get(no_group.id).status, "draft");
        assert_eq!(h.store.get(empty.id).status, "draft");
        assert!(h.store.status_history(empty.id).is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_empty_audience_goes_straight_to_failed() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = campaign(user, Some(group), CampaignStatus::Scheduled);
        let mut gone = contact("gone@example.com", "Gone");
        gone.unsubscribed_at = Some(chrono::Utc::now());
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            FakeRecipients::default().with_group(group, vec![gone]),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        let err = h.dispatcher.dispatch_scheduled(c.clone()).await.unwrap_err();
        assert!(matches!(err, DispatchError::EmptyAudience));

        let stored = h.store.get(c.id);
        assert_eq!(stored.status, "failed");
        assert!(stored.sent_at.is_some());
        assert_eq!(h.store.status_history(c.id), vec!["failed".to_string()]);
    }

    #[tokio::test]
    async fn test_only_pending_campaigns_dispatch() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let done = campaign(user, Some(group), CampaignStatus::Completed);
        let h = harness(
            FakeCampaignStore::default().with_campaign(done.clone()),
            audience(group),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        assert!(matches!(
            h.dispatch(done.id).await,
            Err(DispatchError::InvalidStatus(s)) if s == "completed"
        ));
        assert!(matches!(
            h.dispatch(Uuid::now_v7()).await,
            Err(DispatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_brand_and_recipient_variables_applied() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let acme = brand(user, "Acme");
        let tpl = template(user, "Welcome {{name}}", "Hello {{name}}, welcome to {{company}}");
        let mut c = campaign(user, Some(group), CampaignStatus::Draft);
        c.subject = String::new();
        c.template_id = Some(tpl.id);
        c.brand_id = Some(acme.id);

        let h = harness(
            FakeCampaignStore::default()
                .with_campaign(c.clone())
                .with_template(tpl)
                .with_brand(acme),
            FakeRecipients::default().with_group(group, vec![contact("bob@example.com", "Bob")]),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        h.dispatch(c.id).await.unwrap();

        let sent = h.factory.sent();
        assert_eq!(sent[0].subject, "Welcome Bob");
        assert_eq!(sent[0].text.as_deref(), Some("Hello Bob, welcome to Acme"));
    }

    #[tokio::test]
    async fn test_user_default_brand_used_when_none_set() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let mut c = campaign(user, Some(group), CampaignStatus::Draft);
        c.text_body = Some("From {{brand_name}}".to_string());

        let h = harness(
            FakeCampaignStore::default()
                .with_campaign(c.clone())
                .with_default_brand(brand(user, "Default Co")),
            FakeRecipients::default().with_group(group, vec![contact("bob@example.com", "Bob")]),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        h.dispatch(c.id).await.unwrap();
        assert_eq!(h.factory.sent()[0].text.as_deref(), Some("From Default Co"));
    }

    #[tokio::test]
    async fn test_inactive_campaign_sender_fails_every_recipient() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let inactive = sender(user, "old@acme.test", None, false, false);
        let mut c = campaign(user, Some(group), CampaignStatus::Draft);
        c.sender_address_id = Some(inactive.id);

        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            audience(group),
            FakeSenders::new(vec![inactive]),
            FakeTransportFactory::default(),
            2,
        );

        let outcome = h.dispatch(c.id).await.unwrap();
        assert_eq!(outcome.failed, 3);
        assert!(h.factory.attempted().is_empty());
        assert_eq!(h.emails.count_with_status(EmailStatus::Failed), 3);
        assert_eq!(h.store.get(c.id).status, "completed");
    }

    #[tokio::test]
    async fn test_send_test_leaves_campaign_aggregates_alone() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let mut c = campaign(user, Some(group), CampaignStatus::Draft);
        c.text_body = Some("Hi {{name}}".to_string());
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            FakeRecipients::default(),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        let result = h
            .dispatcher
            .send_test(user, c.id, "qa@example.com", Some("QA"))
            .await
            .unwrap();

        let sent = h.factory.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text.as_deref(), Some("Hi QA"));
        assert_eq!(sent[0].message_id, result.message_id);

        let stored = h.store.get(c.id);
        assert_eq!(stored.status, "draft");
        assert_eq!(stored.total_recipients, 0);
        assert_eq!(h.emails.get(result.email_id).campaign_id, None);
    }

    #[tokio::test]
    async fn test_send_test_rejects_other_users_campaign() {
        let group = Uuid::now_v7();
        let c = campaign(Uuid::now_v7(), Some(group), CampaignStatus::Draft);
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            FakeRecipients::default(),
            FakeSenders::new(vec![]),
            FakeTransportFactory::default(),
            1,
        );

        assert!(matches!(
            h.dispatcher
                .send_test(Uuid::now_v7(), c.id, "qa@example.com", None)
                .await,
            Err(DispatchError::NotFound(_))
        ));
    }

    fn pair(group: Uuid) -> FakeRecipients {
        FakeRecipients::default().with_group(
            group,
            vec![
                contact("ann@example.com", "Ann"),
                contact("bob@example.com", "Bob"),
            ],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_run_refreshes_campaign_while_sending() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = campaign(user, Some(group), CampaignStatus::Draft);
        let (factory, gate) = FakeTransportFactory::gated();
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            pair(group),
            FakeSenders::new(vec![]),
            factory,
            1,
        );

        let prepared = h.dispatcher.prepare_campaign(c.clone()).await.unwrap();
        let dispatcher = h.dispatcher.clone();
        let handle = tokio::spawn(async move { dispatcher.run(prepared).await });

        h.factory.send_started().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        gate.add_permits(2);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.successful, 2);
        assert!(h.store.touches() >= 1);
        assert_eq!(h.store.get(c.id).status, "completed");
    }

    #[tokio::test]
    async fn test_run_keeps_campaign_failed_by_the_sweep() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = campaign(user, Some(group), CampaignStatus::Scheduled);
        let (factory, gate) = FakeTransportFactory::gated();
        let h = harness(
            FakeCampaignStore::default().with_campaign(c.clone()),
            pair(group),
            FakeSenders::new(vec![]),
            factory,
            2,
        );

        let prepared = h.dispatcher.prepare_campaign(c.clone()).await.unwrap();
        let dispatcher = h.dispatcher.clone();
        let handle = tokio::spawn(async move { dispatcher.run(prepared).await });

        h.factory.send_started().await;
        h.store.force_status(c.id, CampaignStatus::Failed);
        gate.add_permits(2);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.successful, 2);

        let stored = h.store.get(c.id);
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.total_recipients, 0);
    }
}
