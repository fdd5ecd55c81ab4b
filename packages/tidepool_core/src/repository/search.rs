use anyhow::Result;
use sqlx::Row;

use crate::models::ChatSearchResult;

use super::ChatRepository;

impl ChatRepository {
    /// Substring search across a user's own chats: a chat matches when its
    /// title or any of its messages contains the query case-insensitively.
    /// Each result carries the favorite flag (left join against favorites)
    /// and the most recent message for typeahead context, newest chat first.
    ///
    /// An empty or whitespace-only query returns an empty result set, not
    /// the full chat list.
    pub async fn search_chats(
        &self,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<ChatSearchResult>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(vec![]);
        }

        let pattern = format!("%{}%", Self::escape_like_pattern(trimmed));

        let rows = sqlx::query(
            r#"
            SELECT c.public_id,
                   c.title,
                   c.created_at,
                   f.id IS NOT NULL AS favorite,
                   (SELECT m.body FROM messages m
                    WHERE m.chat_public_id = c.public_id
                    ORDER BY m.created_at DESC, m.id DESC
                    LIMIT 1) AS latest_message
            FROM chats c
            LEFT JOIN favorites f
              ON f.chat_public_id = c.public_id AND f.user_id = c.user_id
            WHERE c.user_id = ?
              AND (c.title LIKE ? ESCAPE '\'
                   OR EXISTS (SELECT 1 FROM messages m
                              WHERE m.chat_public_id = c.public_id
                                AND m.body LIKE ? ESCAPE '\'))
            ORDER BY c.created_at DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChatSearchResult {
                chat_public_id: row.get("public_id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
                favorite: row.get::<i64, _>("favorite") != 0,
                latest_message: row.get("latest_message"),
            })
            .collect())
    }

    /// Escape a raw user query for a LIKE pattern so `%`, `_` and the escape
    /// character itself match literally instead of acting as wildcards.
    pub(crate) fn escape_like_pattern(raw: &str) -> String {
        raw.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }
}
