use anyhow::{Context, Result};
use sqlx::Row;
use tracing::debug;

use crate::models::Chat;

use super::ChatRepository;

fn map_chat(row: &sqlx::sqlite::SqliteRow) -> Chat {
    Chat {
        id: row.get("id"),
        public_id: row.get("public_id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        is_shareable: row.get::<i64, _>("is_shareable") != 0,
        created_at: row.get("created_at"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl ChatRepository {
    /// Create a chat with a freshly generated opaque id and `is_shareable`
    /// off. A colliding id is regenerated and retried exactly once; any other
    /// write failure propagates.
    pub async fn create_chat(&self, owner_id: i64, title: &str) -> Result<Chat> {
        for attempt in 0..2 {
            let public_id = uuid::Uuid::new_v4().simple().to_string();
            let mut chat = Chat::new(public_id, owner_id, title.to_string());
            let result = sqlx::query(
                "INSERT INTO chats (public_id, user_id, title, is_shareable, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chat.public_id)
            .bind(chat.user_id)
            .bind(&chat.title)
            .bind(chat.is_shareable)
            .bind(chat.created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(r) => {
                    chat.id = r.last_insert_rowid();
                    debug!("Created chat {} for user {}", chat.public_id, owner_id);
                    return Ok(chat);
                }
                Err(e) if attempt == 0 && is_unique_violation(&e) => {
                    debug!("Chat id collision on {}, regenerating", chat.public_id);
                    continue;
                }
                Err(e) => return Err(e).context("Failed to create chat"),
            }
        }
        unreachable!("create_chat loop returns on every branch of the second attempt")
    }

    pub async fn get_chat(&self, public_id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, public_id, user_id, title, is_shareable, created_at
             FROM chats WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| map_chat(&r)))
    }

    /// All chats owned by a user, newest first.
    pub async fn list_chats(&self, owner_id: i64) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT id, public_id, user_id, title, is_shareable, created_at
             FROM chats WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_chat).collect())
    }

    pub async fn set_chat_shareable(&self, public_id: &str, shareable: bool) -> Result<()> {
        sqlx::query("UPDATE chats SET is_shareable = ? WHERE public_id = ?")
            .bind(shareable)
            .bind(public_id)
            .execute(&self.pool)
            .await
            .context("Failed to update chat shareable flag")?;
        Ok(())
    }

    /// Cascade-delete one chat: favorites first, then messages, then the chat
    /// row, inside a single transaction. Favorites must go before the chat row
    /// because they reference it. Each step is a plain `DELETE`, so absence of
    /// the targeted rows is never an error and a retry is always safe.
    ///
    /// Returns `false` if the chat row was already gone (a concurrent delete
    /// won the race).
    pub async fn delete_chat_cascade(&self, public_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM favorites WHERE chat_public_id = ?")
            .bind(public_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete chat favorites")?;

        sqlx::query("DELETE FROM messages WHERE chat_public_id = ?")
            .bind(public_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete chat messages")?;

        let deleted = sqlx::query("DELETE FROM chats WHERE public_id = ?")
            .bind(public_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete chat")?
            .rows_affected();

        tx.commit().await?;

        debug!("Deleted chat {} (existed: {})", public_id, deleted > 0);
        Ok(deleted > 0)
    }

    /// Bulk cascade across every chat a user owns. One filtered delete per
    /// step, same step ordering as the single-chat cascade so no transient
    /// foreign-key violation can occur. Returns the number of chats removed.
    pub async fn delete_all_chats_cascade(&self, owner_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM favorites WHERE chat_public_id IN
               (SELECT public_id FROM chats WHERE user_id = ?)",
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .context("Failed to bulk-delete favorites")?;

        sqlx::query(
            "DELETE FROM messages WHERE chat_public_id IN
               (SELECT public_id FROM chats WHERE user_id = ?)",
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .context("Failed to bulk-delete messages")?;

        let deleted = sqlx::query("DELETE FROM chats WHERE user_id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to bulk-delete chats")?
            .rows_affected();

        tx.commit().await?;

        debug!("Deleted {} chats for user {}", deleted, owner_id);
        Ok(deleted)
    }
}
