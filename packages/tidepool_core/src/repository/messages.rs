use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::Row;

use crate::models::{Message, Sender};

use super::ChatRepository;

fn map_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let sender_str: String = row.get("sender");
    let sender = Sender::from_str(&sender_str)
        .map_err(|e| anyhow::anyhow!("corrupt message row: {e}"))?;
    Ok(Message {
        id: row.get("id"),
        chat_public_id: row.get("chat_public_id"),
        body: row.get("body"),
        sender,
        created_at: row.get("created_at"),
    })
}

impl ChatRepository {
    /// Append one message to a chat's transcript. Chat existence is the
    /// caller's responsibility; the request handler has already resolved the
    /// chat before appending.
    pub async fn append_message(
        &self,
        chat_public_id: &str,
        body: &str,
        sender: Sender,
    ) -> Result<Message> {
        let result = sqlx::query(
            "INSERT INTO messages (chat_public_id, body, sender) VALUES (?, ?, ?)",
        )
        .bind(chat_public_id)
        .bind(body)
        .bind(sender.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to append message")?;

        let id = result.last_insert_rowid();
        let row = sqlx::query(
            "SELECT id, chat_public_id, body, sender, created_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to read back appended message")?;

        map_message(&row)
    }

    /// Full transcript of a chat, oldest first. A chat with no messages
    /// yields an empty vec, not an error. The id tiebreak keeps append order
    /// stable when a user/bot pair lands within the same second.
    pub async fn fetch_transcript(&self, chat_public_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, chat_public_id, body, sender, created_at
             FROM messages WHERE chat_public_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_public_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_message).collect()
    }
}
