//! Persistence seams used by the dispatcher and scheduler

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_common::types::{BrandId, CampaignId, EmailId, TemplateId, UserId};
use mailcast_storage::models::{
    Brand, Campaign, CreateEmail, Email, EmailEventType, EmailStatus, Template,
};
use mailcast_storage::repository::{
    BrandRepository, CampaignRepository, EmailEventRepository, EmailRepository,
    TemplateRepository,
};
use mailcast_storage::DatabasePool;

/// Campaign reads and lifecycle writes
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error>;
    async fn template(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error>;
    async fn brand(&self, id: BrandId) -> Result<Option<Brand>, sqlx::Error>;
    async fn default_brand(&self, user_id: UserId) -> Result<Option<Brand>, sqlx::Error>;

    /// Move to `sending`; `false` if the campaign was no longer dispatchable
    async fn mark_sending(&self, id: CampaignId) -> Result<bool, sqlx::Error>;
    /// Move `sending` to `completed`; `false` if it had already left `sending`
    async fn complete(
        &self,
        id: CampaignId,
        total: i32,
        successful: i32,
        failed: i32,
    ) -> Result<bool, sqlx::Error>;
    /// `false` if the campaign was already `completed` or `failed`
    async fn mark_failed(&self, id: CampaignId) -> Result<bool, sqlx::Error>;
    /// Heartbeat for a campaign in `sending`
    async fn touch(&self, id: CampaignId) -> Result<(), sqlx::Error>;
    /// Fail a `sending` campaign only if it is still idle since `before`
    async fn fail_stuck(&self, id: CampaignId, before: DateTime<Utc>) -> Result<bool, sqlx::Error>;

    async fn due_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, sqlx::Error>;
    async fn stuck_campaigns(&self, before: DateTime<Utc>) -> Result<Vec<Campaign>, sqlx::Error>;
}

/// Email record writes
#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn create_email(&self, input: CreateEmail) -> Result<Email, sqlx::Error>;
    async fn mark_sent(&self, id: EmailId, message_id: &str) -> Result<(), sqlx::Error>;
    async fn mark_failed(&self, id: EmailId, error: &str) -> Result<(), sqlx::Error>;
}

/// Reads and writes behind open, click and provider event recording
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn email(&self, id: EmailId) -> Result<Option<Email>, sqlx::Error>;
    async fn add_event(
        &self,
        email_id: EmailId,
        event_type: EmailEventType,
        detail: serde_json::Value,
    ) -> Result<(), sqlx::Error>;
    async fn increment_opens(&self, id: EmailId) -> Result<(), sqlx::Error>;
    async fn increment_clicks(&self, id: EmailId) -> Result<(), sqlx::Error>;
    async fn set_status(&self, id: EmailId, status: EmailStatus) -> Result<(), sqlx::Error>;
}

/// PostgreSQL-backed [`CampaignStore`]
#[derive(Clone)]
pub struct PgCampaignStore {
    campaigns: CampaignRepository,
    templates: TemplateRepository,
    brands: BrandRepository,
}

impl PgCampaignStore {
    pub fn new(db: &DatabasePool) -> Self {
        let pool = db.pool().clone();
        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            brands: BrandRepository::new(pool),
        }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        self.campaigns.get(id).await
    }

    async fn template(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error> {
        self.templates.get(id).await
    }

    async fn brand(&self, id: BrandId) -> Result<Option<Brand>, sqlx::Error> {
        self.brands.get(id).await
    }

    async fn default_brand(&self, user_id: UserId) -> Result<Option<Brand>, sqlx::Error> {
        self.brands.get_default(user_id).await
    }

    async fn mark_sending(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        Ok(self.campaigns.mark_sending(id).await?.is_some())
    }

    async fn complete(
        &self,
        id: CampaignId,
        total: i32,
        successful: i32,
        failed: i32,
    ) -> Result<bool, sqlx::Error> {
        self.campaigns.complete(id, total, successful, failed).await
    }

    async fn mark_failed(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        self.campaigns.mark_failed(id).await
    }

    async fn touch(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        self.campaigns.touch(id).await
    }

    async fn fail_stuck(&self, id: CampaignId, before: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        self.campaigns.fail_stuck(id, before).await
    }

    async fn due_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, sqlx::Error> {
        self.campaigns.list_due(limit).await
    }

    async fn stuck_campaigns(&self, before: DateTime<Utc>) -> Result<Vec<Campaign>, sqlx::Error> {
        self.campaigns.list_stuck(before).await
    }
}

#[async_trait]
impl EmailStore for EmailRepository {
    async fn create_email(&self, input: CreateEmail) -> Result<Email, sqlx::Error> {
        self.create(input).await
    }

    async fn mark_sent(&self, id: EmailId, message_id: &str) -> Result<(), sqlx::Error> {
        EmailRepository::mark_sent(self, id, message_id).await
    }

    async fn mark_failed(&self, id: EmailId, error: &str) -> Result<(), sqlx::Error> {
        EmailRepository::mark_failed(self, id, error).await
    }
}

/// PostgreSQL-backed [`TrackingStore`]
#[derive(Clone)]
pub struct PgTrackingStore {
    emails: EmailRepository,
    events: EmailEventRepository,
}

impl PgTrackingStore {
    pub fn new(db: &DatabasePool) -> Self {
        let pool = db.pool().clone();
        Self {
            emails: EmailRepository::new(pool.clone()),
            events: EmailEventRepository::new(pool),
        }
    }
}

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn email(&self, id: EmailId) -> Result<Option<Email>, sqlx::Error> {
        self.emails.get(id).await
    }

    async fn add_event(
        &self,
        email_id: EmailId,
        event_type: EmailEventType,
        detail: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        self.events.create(email_id, event_type, detail).await?;
        Ok(())
    }

    async fn increment_opens(&self, id: EmailId) -> Result<(), sqlx::Error> {
        self.emails.increment_opens(id).await
    }

    async fn increment_clicks(&self, id: EmailId) -> Result<(), sqlx::Error> {
        self.emails.increment_clicks(id).await
    }

    async fn set_status(&self, id: EmailId, status: EmailStatus) -> Result<(), sqlx::Error> {
        self.emails.set_status(id, status).await
    }
}
