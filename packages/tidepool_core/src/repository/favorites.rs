use anyhow::{Context, Result};
use sqlx::Row;
use tracing::debug;

use crate::models::{Chat, FavoriteOutcome};

use super::ChatRepository;

impl ChatRepository {
    /// Idempotent favorite toggle. The UNIQUE(user_id, chat_public_id)
    /// constraint is the source of truth: a concurrent duplicate insert
    /// resolves to `AlreadyFavorited` via `INSERT OR IGNORE`, never an error.
    pub async fn set_favorite(
        &self,
        user_id: i64,
        chat_public_id: &str,
        value: bool,
    ) -> Result<FavoriteOutcome> {
        let outcome = if value {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO favorites (user_id, chat_public_id) VALUES (?, ?)",
            )
            .bind(user_id)
            .bind(chat_public_id)
            .execute(&self.pool)
            .await
            .context("Failed to insert favorite")?
            .rows_affected();

            if inserted > 0 {
                FavoriteOutcome::Added
            } else {
                FavoriteOutcome::AlreadyFavorited
            }
        } else {
            let removed = sqlx::query(
                "DELETE FROM favorites WHERE user_id = ? AND chat_public_id = ?",
            )
            .bind(user_id)
            .bind(chat_public_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete favorite")?
            .rows_affected();

            if removed > 0 {
                FavoriteOutcome::Removed
            } else {
                FavoriteOutcome::NotFavorited
            }
        };

        debug!(
            "Favorite toggle user={} chat={} value={} -> {:?}",
            user_id, chat_public_id, value, outcome
        );
        Ok(outcome)
    }

    /// A user's favorited chats in favorite-creation order. The inner join
    /// means a dangling favorite referencing a deleted chat can never
    /// surface.
    pub async fn list_favorites(&self, user_id: i64) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.public_id, c.user_id, c.title, c.is_shareable, c.created_at
            FROM favorites f
            JOIN chats c ON c.public_id = f.chat_public_id
            WHERE f.user_id = ?
            ORDER BY f.created_at ASC, f.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Chat {
                id: row.get("id"),
                public_id: row.get("public_id"),
                user_id: row.get("user_id"),
                title: row.get("title"),
                is_shareable: row.get::<i64, _>("is_shareable") != 0,
                created_at: row.get("created_at"),
            })
            .collect())
    }

    #[cfg(test)]
    pub(crate) async fn count_favorite_rows(
        &self,
        user_id: i64,
        chat_public_id: &str,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM favorites WHERE user_id = ? AND chat_public_id = ?",
        )
        .bind(user_id)
        .bind(chat_public_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
