//! Template repository

use mailcast_common::types::{TemplateId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateTemplate, Template, UpdateTemplate};

/// Template repository
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    /// Create a new template repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a template
    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateTemplate,
    ) -> Result<Template, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            r#"
            INSERT INTO templates (id, user_id, name, subject, html_body, text_body, brand_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(input.brand_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a template by ID
    pub async fn get(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a template by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: TemplateId,
    ) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List templates for a user
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            r#"
            SELECT * FROM templates
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Update a template
    pub async fn update(
        &self,
        user_id: UserId,
        id: TemplateId,
        input: UpdateTemplate,
    ) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            r#"
            UPDATE templates SET
                name = COALESCE($3, name),
                subject = COALESCE($4, subject),
                html_body = COALESCE($5, html_body),
                text_body = COALESCE($6, text_body),
                brand_id = COALESCE($7, brand_id),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(input.brand_id)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a template
    pub async fn delete(&self, user_id: UserId, id: TemplateId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM templates WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
