use anyhow::{Context, Result};
use sqlx::Row;

use crate::models::{NewUser, User};

use super::ChatRepository;

fn map_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        profile_image: row.get("profile_image"),
        is_admin: row.get::<i64, _>("is_admin") != 0,
        is_verified: row.get::<i64, _>("is_verified") != 0,
        created_at: row.get("created_at"),
    }
}

impl ChatRepository {
    /// Create a user (unverified, non-admin). Returns the assigned row id.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO users (display_name, email, profile_image) VALUES (?, ?, ?)",
        )
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.profile_image)
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, profile_image, is_admin, is_verified, created_at
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| map_user(&r)))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, profile_image, is_admin, is_verified, created_at
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| map_user(&r)))
    }

    /// Admin moderation: verify a user, or clear the flag to ban them.
    /// Users are never hard-deleted by the core.
    pub async fn set_user_verified(&self, user_id: i64, verified: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_verified = ? WHERE id = ?")
            .bind(verified)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update user verified flag")?;
        Ok(())
    }

    /// Admin inspection listing, newest accounts first.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, display_name, email, profile_image, is_admin, is_verified, created_at
             FROM users ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_user).collect())
    }
}
