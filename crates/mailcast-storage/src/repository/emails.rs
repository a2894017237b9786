//! Email send record repository

use mailcast_common::types::{CampaignId, EmailId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateEmail, Email, EmailStatus};

/// Email repository
#[derive(Clone)]
pub struct EmailRepository {
    pool: PgPool,
}

impl EmailRepository {
    /// Create a new email repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a `pending` send record
    pub async fn create(&self, input: CreateEmail) -> Result<Email, sqlx::Error> {
        let recipients =
            serde_json::to_value(&input.recipients).unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query_as::<_, Email>(
            r#"
            INSERT INTO emails (id, user_id, template_id, campaign_id, recipients, subject, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(input.template_id)
        .bind(input.campaign_id)
        .bind(&recipients)
        .bind(&input.subject)
        .fetch_one(&self.pool)
        .await
    }

    /// Get an email by ID
    pub async fn get(&self, id: EmailId) -> Result<Option<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get an email by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: EmailId,
    ) -> Result<Option<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List emails for a user, optionally restricted to one campaign
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        campaign_id: Option<CampaignId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>(
            r#"
            SELECT * FROM emails
            WHERE user_id = $1 AND ($2::uuid IS NULL OR campaign_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count emails for a user, optionally restricted to one campaign
    pub async fn count_for_user(
        &self,
        user_id: UserId,
        campaign_id: Option<CampaignId>,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM emails WHERE user_id = $1 AND ($2::uuid IS NULL OR campaign_id = $2)",
        )
        .bind(user_id)
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Record a successful hand-off to the transport
    pub async fn mark_sent(&self, id: EmailId, message_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE emails SET status = 'sent', message_id = $2, sent_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failed send
    pub async fn mark_failed(&self, id: EmailId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE emails SET status = 'failed', error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Set the delivery status reported by the provider
    pub async fn set_status(&self, id: EmailId, status: EmailStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE emails SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Atomically bump the open counter
    pub async fn increment_opens(&self, id: EmailId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE emails SET open_count = open_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Atomically bump the click counter
    pub async fn increment_clicks(&self, id: EmailId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE emails SET click_count = click_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
