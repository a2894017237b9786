//! Campaign repository

use chrono::{DateTime, Utc};
use mailcast_common::types::{CampaignId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CreateCampaign, UpdateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign
    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateCampaign,
    ) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::now_v7();
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, user_id, name, subject, template_id, group_id, brand_id,
                sender_address_id, html_body, text_body, status, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(input.template_id)
        .bind(input.group_id)
        .bind(input.brand_id)
        .bind(input.sender_address_id)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(status.to_string())
        .bind(input.scheduled_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns for a user
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count campaigns for a user
    pub async fn count_for_user(
        &self,
        user_id: UserId,
        status: Option<CampaignStatus>,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaigns WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status.map(|s| s.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Update a campaign that has not started sending.
    ///
    /// Returns `None` when the campaign does not exist, belongs to another
    /// user, or is no longer `draft`/`scheduled`. Setting `scheduled_at`
    /// moves a draft to `scheduled`.
    pub async fn update(
        &self,
        user_id: UserId,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($3, name),
                subject = COALESCE($4, subject),
                template_id = COALESCE($5, template_id),
                group_id = COALESCE($6, group_id),
                brand_id = COALESCE($7, brand_id),
                sender_address_id = COALESCE($8, sender_address_id),
                html_body = COALESCE($9, html_body),
                text_body = COALESCE($10, text_body),
                scheduled_at = COALESCE($11, scheduled_at),
                status = CASE WHEN $11::timestamptz IS NOT NULL THEN 'scheduled' ELSE status END,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status IN ('draft', 'scheduled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(input.template_id)
        .bind(input.group_id)
        .bind(input.brand_id)
        .bind(input.sender_address_id)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(input.scheduled_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a campaign that has not started sending
    pub async fn delete(&self, user_id: UserId, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM campaigns WHERE id = $1 AND user_id = $2 AND status IN ('draft', 'scheduled')",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a `draft`/`scheduled` campaign to `sending`.
    ///
    /// Returns `None` if the campaign was not in a dispatchable state, so two
    /// concurrent triggers cannot both start the same campaign.
    pub async fn mark_sending(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET status = 'sending', updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'scheduled')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Finalize a dispatch run with its aggregate counters.
    ///
    /// Only a campaign still in `sending` is finalized; `false` means another
    /// writer (the stuck sweep) already moved it on.
    pub async fn complete(
        &self,
        id: CampaignId,
        total_recipients: i32,
        successful_sends: i32,
        failed_sends: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'completed',
                sent_at = NOW(),
                total_recipients = $2,
                successful_sends = $3,
                failed_sends = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(total_recipients)
        .bind(successful_sends)
        .bind(failed_sends)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a campaign as failed unless it already reached a terminal state
    pub async fn mark_failed(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET status = 'failed', sent_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record progress on a running send so the stuck sweep leaves it alone
    pub async fn touch(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET updated_at = NOW() WHERE id = $1 AND status = 'sending'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Fail a campaign that has made no progress in `sending` since `before`
    pub async fn fail_stuck(
        &self,
        id: CampaignId,
        before: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET status = 'failed', sent_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'sending' AND updated_at < $2
            "#,
        )
        .bind(id)
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Scheduled campaigns whose time has come, oldest first
    pub async fn list_due(&self, limit: i64) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled' AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Campaigns in `sending` with no progress since the given instant
    pub async fn list_stuck(&self, before: DateTime<Utc>) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'sending' AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn sending(repo: &CampaignRepository) -> Campaign {
        let campaign = repo
            .create(
                Uuid::now_v7(),
                CreateCampaign {
                    name: "Launch".to_string(),
                    ..CreateCampaign::default()
                },
            )
            .await
            .unwrap();
        repo.mark_sending(campaign.id).await.unwrap().unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires a PostgreSQL DATABASE_URL"]
    async fn test_complete_only_from_sending(pool: PgPool) {
        let repo = CampaignRepository::new(pool);
        let campaign = sending(&repo).await;

        assert!(repo.mark_failed(campaign.id).await.unwrap());
        assert!(!repo.complete(campaign.id, 3, 3, 0).await.unwrap());

        let stored = repo.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.successful_sends, 0);
        assert!(!repo.mark_failed(campaign.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires a PostgreSQL DATABASE_URL"]
    async fn test_fail_stuck_skips_campaigns_with_recent_progress(pool: PgPool) {
        let repo = CampaignRepository::new(pool);
        let campaign = sending(&repo).await;

        let long_ago = Utc::now() - Duration::hours(1);
        assert!(repo.list_stuck(long_ago).await.unwrap().is_empty());
        assert!(!repo.fail_stuck(campaign.id, long_ago).await.unwrap());

        repo.touch(campaign.id).await.unwrap();
        let later = Utc::now() + Duration::seconds(1);
        assert_eq!(repo.list_stuck(later).await.unwrap().len(), 1);
        assert!(repo.fail_stuck(campaign.id, later).await.unwrap());
        assert_eq!(
            repo.get(campaign.id).await.unwrap().unwrap().status,
            "failed"
        );
    }
}
