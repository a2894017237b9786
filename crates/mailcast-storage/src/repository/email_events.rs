//! Email event repository

use mailcast_common::types::EmailId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EmailEvent, EmailEventType};

/// Email event repository
#[derive(Clone)]
pub struct EmailEventRepository {
    pool: PgPool,
}

impl EmailEventRepository {
    /// Create a new email event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event to an email's history
    pub async fn create(
        &self,
        email_id: EmailId,
        event_type: EmailEventType,
        detail: serde_json::Value,
    ) -> Result<EmailEvent, sqlx::Error> {
        sqlx::query_as::<_, EmailEvent>(
            r#"
            INSERT INTO email_events (id, email_id, event_type, detail)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(email_id)
        .bind(event_type.to_string())
        .bind(&detail)
        .fetch_one(&self.pool)
        .await
    }

    /// List events of an email, oldest first
    pub async fn list_for_email(&self, email_id: EmailId) -> Result<Vec<EmailEvent>, sqlx::Error> {
        sqlx::query_as::<_, EmailEvent>(
            "SELECT * FROM email_events WHERE email_id = $1 ORDER BY occurred_at ASC",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await
    }
}
