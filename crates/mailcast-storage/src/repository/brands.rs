//! Brand repository

use mailcast_common::types::{BrandId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Brand, CreateBrand, UpdateBrand};

/// Brand repository
#[derive(Clone)]
pub struct BrandRepository {
    pool: PgPool,
}

impl BrandRepository {
    /// Create a new brand repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a brand, clearing any other default first when it is the default
    pub async fn create(&self, user_id: UserId, input: CreateBrand) -> Result<Brand, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            sqlx::query("UPDATE brands SET is_default = FALSE WHERE user_id = $1 AND is_default")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let brand = sqlx::query_as::<_, Brand>(
            r#"
            INSERT INTO brands (id, user_id, name, logo_url, website, is_default)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.logo_url)
        .bind(&input.website)
        .bind(input.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(brand)
    }

    /// Get a brand by ID
    pub async fn get(&self, id: BrandId) -> Result<Option<Brand>, sqlx::Error> {
        sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a brand by ID and owner
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: BrandId,
    ) -> Result<Option<Brand>, sqlx::Error> {
        sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get the user's default brand
    pub async fn get_default(&self, user_id: UserId) -> Result<Option<Brand>, sqlx::Error> {
        sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List brands for a user
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Brand>, sqlx::Error> {
        sqlx::query_as::<_, Brand>(
            "SELECT * FROM brands WHERE user_id = $1 ORDER BY is_default DESC, name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Update a brand
    pub async fn update(
        &self,
        user_id: UserId,
        id: BrandId,
        input: UpdateBrand,
    ) -> Result<Option<Brand>, sqlx::Error> {
        sqlx::query_as::<_, Brand>(
            r#"
            UPDATE brands SET
                name = COALESCE($3, name),
                logo_url = COALESCE($4, logo_url),
                website = COALESCE($5, website),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.logo_url)
        .bind(&input.website)
        .fetch_optional(&self.pool)
        .await
    }

    /// Make this brand the user's only default.
    ///
    /// The unset and set run in one transaction; the partial unique index on
    /// `(user_id) WHERE is_default` rejects any concurrent second default.
    pub async fn set_default(
        &self,
        user_id: UserId,
        id: BrandId,
    ) -> Result<Option<Brand>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE brands SET is_default = FALSE, updated_at = NOW() WHERE user_id = $1 AND is_default AND id <> $2",
        )
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let brand = sqlx::query_as::<_, Brand>(
            r#"
            UPDATE brands SET is_default = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if brand.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        Ok(brand)
    }

    /// Delete a brand
    pub async fn delete(&self, user_id: UserId, id: BrandId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM brands WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
