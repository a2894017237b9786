//! Sender address repository

use mailcast_common::types::{SenderAddressId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateSenderAddress, SenderAddress};

/// Sender address repository
#[derive(Clone)]
pub struct SenderAddressRepository {
    pool: PgPool,
}

impl SenderAddressRepository {
    /// Create a new sender address repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a sender address, clearing any other default first when it
    /// is the default
    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateSenderAddress,
    ) -> Result<SenderAddress, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            sqlx::query(
                "UPDATE sender_addresses SET is_default = FALSE WHERE user_id = $1 AND is_default",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        let sender = sqlx::query_as::<_, SenderAddress>(
            r#"
            INSERT INTO sender_addresses (
                id, user_id, email, name, smtp_host, smtp_port, smtp_tls,
                smtp_username, smtp_password, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(input.email.trim())
        .bind(&input.name)
        .bind(&input.smtp_host)
        .bind(input.smtp_port)
        .bind(input.smtp_tls)
        .bind(&input.smtp_username)
        .bind(&input.smtp_password)
        .bind(input.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(sender)
    }

    /// Get a sender address by ID
    pub async fn get(&self, id: SenderAddressId) -> Result<Option<SenderAddress>, sqlx::Error> {
        sqlx::query_as::<_, SenderAddress>("SELECT * FROM sender_addresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a sender address by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: SenderAddressId,
    ) -> Result<Option<SenderAddress>, sqlx::Error> {
        sqlx::query_as::<_, SenderAddress>(
            "SELECT * FROM sender_addresses WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get the user's default sender, if it is active
    pub async fn get_default_active(
        &self,
        user_id: UserId,
    ) -> Result<Option<SenderAddress>, sqlx::Error> {
        sqlx::query_as::<_, SenderAddress>(
            "SELECT * FROM sender_addresses WHERE user_id = $1 AND is_default AND is_active",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List sender addresses for a user
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<SenderAddress>, sqlx::Error> {
        sqlx::query_as::<_, SenderAddress>(
            "SELECT * FROM sender_addresses WHERE user_id = $1 ORDER BY is_default DESC, email ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Make this sender the user's only default, in one transaction
    pub async fn set_default(
        &self,
        user_id: UserId,
        id: SenderAddressId,
    ) -> Result<Option<SenderAddress>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE sender_addresses SET is_default = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND is_default AND id <> $2
            "#,
        )
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let sender = sqlx::query_as::<_, SenderAddress>(
            r#"
            UPDATE sender_addresses SET is_default = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if sender.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        Ok(sender)
    }

    /// Enable or disable a sender address
    pub async fn set_active(
        &self,
        user_id: UserId,
        id: SenderAddressId,
        is_active: bool,
    ) -> Result<Option<SenderAddress>, sqlx::Error> {
        sqlx::query_as::<_, SenderAddress>(
            r#"
            UPDATE sender_addresses SET is_active = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a sender address
    pub async fn delete(&self, user_id: UserId, id: SenderAddressId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sender_addresses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sender(email: &str, is_default: bool) -> CreateSenderAddress {
        CreateSenderAddress {
            email: email.to_string(),
            name: None,
            smtp_host: "smtp.acme.test".to_string(),
            smtp_port: 587,
            smtp_tls: false,
            smtp_username: None,
            smtp_password: None,
            is_default,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires a PostgreSQL DATABASE_URL"]
    async fn test_set_default_moves_the_single_default(pool: PgPool) {
        let repo = SenderAddressRepository::new(pool);
        let user = Uuid::now_v7();

        let first = repo.create(user, sender("a@acme.test", true)).await.unwrap();
        let second = repo.create(user, sender("b@acme.test", false)).await.unwrap();

        repo.set_default(user, second.id).await.unwrap().unwrap();

        let defaults: Vec<_> = repo
            .list_for_user(user)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_default)
            .map(|s| s.id)
            .collect();
        assert_eq!(defaults, vec![second.id]);
        assert!(!repo.get(first.id).await.unwrap().unwrap().is_default);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "Requires a PostgreSQL DATABASE_URL"]
    async fn test_inactive_default_is_not_used(pool: PgPool) {
        let repo = SenderAddressRepository::new(pool);
        let user = Uuid::now_v7();
        let default = repo.create(user, sender("a@acme.test", true)).await.unwrap();

        assert_eq!(
            repo.get_default_active(user).await.unwrap().map(|s| s.id),
            Some(default.id)
        );

        repo.set_active(user, default.id, false).await.unwrap().unwrap();
        assert!(repo.get_default_active(user).await.unwrap().is_none());
    }
}
