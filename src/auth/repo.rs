use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::User;

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, disabled, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, disabled, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password. A taken email surfaces as a
    /// unique violation.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, disabled, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Removes the account; recipes and subscriptions cascade.
    /// Deletes the user (recipes cascade) and returns the storage keys of
    /// the mirrored images that belonged to them.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Vec<String>> {
        let mut tx = db.begin().await.context("begin tx")?;
        let keys: Vec<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT i.storage_key
            FROM images i
            JOIN recipes r ON r.id = i.recipe_id
            WHERE r.user_id = $1
            FOR UPDATE OF i
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .context("collect image keys")?;
        sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user")?;
        tx.commit().await.context("commit tx")?;
        Ok(keys.into_iter().filter_map(|(k,)| k).collect())
    }
}
