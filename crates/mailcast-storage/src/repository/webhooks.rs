//! Webhook endpoint repository

use mailcast_common::types::{UserId, WebhookEvent, WebhookId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateWebhook, Webhook};

/// Webhook repository
#[derive(Clone)]
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    /// Create a new webhook repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an endpoint with the given signing secret
    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateWebhook,
        secret: &str,
    ) -> Result<Webhook, sqlx::Error> {
        let events = serde_json::to_value(&input.events).unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (id, user_id, url, secret, events)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&input.url)
        .bind(secret)
        .bind(&events)
        .fetch_one(&self.pool)
        .await
    }

    /// List endpoints for a user
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Webhook>, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(
            "SELECT * FROM webhooks WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Active endpoints of a user subscribed to an event (empty list = all)
    pub async fn list_active_for_event(
        &self,
        user_id: UserId,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM webhooks
            WHERE user_id = $1
              AND is_active
              AND (jsonb_array_length(events) = 0 OR events @> jsonb_build_array($2::text))
            "#,
        )
        .bind(user_id)
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await
    }

    /// Delete an endpoint
    pub async fn delete(&self, user_id: UserId, id: WebhookId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
