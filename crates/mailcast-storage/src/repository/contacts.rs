//! Contact repository

use mailcast_common::types::{ContactId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Contact, CreateContact, UpdateContact};

/// Contact repository
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a contact with a fresh unsubscribe token
    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateContact,
    ) -> Result<Contact, sqlx::Error> {
        let tags = serde_json::to_value(input.tags.unwrap_or_default())
            .unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, user_id, email, name, tags, unsubscribe_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(input.email.trim().to_lowercase())
        .bind(&input.name)
        .bind(&tags)
        .bind(Uuid::new_v4().simple().to_string())
        .fetch_one(&self.pool)
        .await
    }

    /// Get a contact by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: ContactId,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List contacts for a user
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count contacts for a user
    pub async fn count_for_user(&self, user_id: UserId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    /// Update a contact
    pub async fn update(
        &self,
        user_id: UserId,
        id: ContactId,
        input: UpdateContact,
    ) -> Result<Option<Contact>, sqlx::Error> {
        let tags = input
            .tags
            .map(|t| serde_json::to_value(t).unwrap_or_else(|_| serde_json::json!([])));

        sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                email = COALESCE($3, email),
                name = COALESCE($4, name),
                tags = COALESCE($5, tags),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(input.email.map(|e| e.trim().to_lowercase()))
        .bind(&input.name)
        .bind(&tags)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a contact
    pub async fn delete(&self, user_id: UserId, id: ContactId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unsubscribe the contact owning this token.
    ///
    /// Repeated calls keep the first `unsubscribed_at`.
    pub async fn unsubscribe_by_token(&self, token: &str) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                unsubscribed_at = COALESCE(unsubscribed_at, NOW()),
                updated_at = NOW()
            WHERE unsubscribe_token = $1
            RETURNING *
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }
}
