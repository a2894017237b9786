//! Group and membership repository

use mailcast_common::types::{ContactId, GroupId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Contact, Group, GroupInput, GroupMember, Recipient};

/// Group repository
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    /// Create a new group repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a group
    pub async fn create(&self, user_id: UserId, input: GroupInput) -> Result<Group, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (id, user_id, name, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a group by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: GroupId,
    ) -> Result<Option<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List groups for a user
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            "SELECT * FROM groups WHERE user_id = $1 ORDER BY name ASC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Rename or re-describe a group
    pub async fn update(
        &self,
        user_id: UserId,
        id: GroupId,
        input: GroupInput,
    ) -> Result<Option<Group>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups SET name = $3, description = $4, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a group; memberships cascade
    pub async fn delete(&self, user_id: UserId, id: GroupId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a contact to a group. Adding an existing member is a no-op.
    pub async fn add_contact(
        &self,
        group_id: GroupId,
        contact_id: ContactId,
    ) -> Result<GroupMember, sqlx::Error> {
        sqlx::query_as::<_, GroupMember>(
            r#"
            INSERT INTO group_members (group_id, contact_id)
            VALUES ($1, $2)
            ON CONFLICT (group_id, contact_id) DO UPDATE SET group_id = EXCLUDED.group_id
            RETURNING *
            "#,
        )
        .bind(group_id)
        .bind(contact_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Remove a contact from a group
    pub async fn remove_contact(
        &self,
        group_id: GroupId,
        contact_id: ContactId,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND contact_id = $2")
                .bind(group_id)
                .bind(contact_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List every contact of a group, eligible or not
    pub async fn list_contacts(
        &self,
        group_id: GroupId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT c.* FROM contacts c
            JOIN group_members gm ON gm.contact_id = c.id
            WHERE gm.group_id = $1
            ORDER BY gm.joined_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Active, subscribed contacts of a group
    pub async fn eligible_recipients(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            r#"
            SELECT c.email, c.name, c.unsubscribe_token
            FROM contacts c
            JOIN group_members gm ON gm.contact_id = c.id
            WHERE gm.group_id = $1
              AND c.is_active = TRUE
              AND c.unsubscribed_at IS NULL
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }
}
