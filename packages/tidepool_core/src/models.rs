use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub is_admin: bool,
    pub is_verified: bool,
    pub created_at: i64,
}

/// A request to create a user. The row id is assigned by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// Externally-visible opaque identifier; the only id exposed outside the core.
    pub public_id: String,
    pub user_id: i64,
    pub title: String,
    pub is_shareable: bool,
    pub created_at: i64,
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            other => Err(format!("unknown sender tag: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_public_id: String,
    pub body: String,
    pub sender: Sender,
    pub created_at: i64,
}

/// A transcript message annotated for the requesting viewer, so the caller
/// knows whether to render owner-only affordances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    #[serde(flatten)]
    pub message: Message,
    pub is_owner_view: bool,
}

/// One row of a cross-entity search: the chat, its favorite flag (computed
/// against the favorites table, not stored on the chat), and the most recent
/// message for typeahead context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSearchResult {
    pub chat_public_id: String,
    pub title: String,
    pub created_at: i64,
    pub favorite: bool,
    pub latest_message: Option<String>,
}

/// Outcome of a favorite toggle. The no-op variants are successes, reported
/// distinctly so callers can word their response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteOutcome {
    Added,
    AlreadyFavorited,
    Removed,
    NotFavorited,
}

impl FavoriteOutcome {
    /// Whether the toggle actually changed stored state.
    pub fn changed(&self) -> bool {
        matches!(self, FavoriteOutcome::Added | FavoriteOutcome::Removed)
    }
}

/// Result of creating a chat: the opaque id plus the derived title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedChat {
    pub chat_public_id: String,
    pub title: String,
}

/// The stored user message and the generated bot reply from one
/// append-and-respond round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageExchange {
    pub user_message: Message,
    pub bot_message: Message,
}

impl Chat {
    pub fn new(public_id: String, user_id: i64, title: String) -> Self {
        Self {
            id: 0,
            public_id,
            user_id,
            title,
            is_shareable: false,
            created_at: Utc::now().timestamp(),
        }
    }
}


#[cfg(test)]
mod serde_tests {
    use super::*;

    #[test]
    fn sender_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Sender::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(Sender::Bot).unwrap(), "bot");
    }

    #[test]
    fn transcript_message_flattens() {
        let tm = TranscriptMessage {
            message: Message {
                id: 1,
                chat_public_id: "abc123".into(),
                body: "Where should I go?".into(),
                sender: Sender::User,
                created_at: 1000,
            },
            is_owner_view: true,
        };
        let json = serde_json::to_value(&tm).unwrap();
        // #[serde(flatten)] means message fields appear at top level
        assert_eq!(json["body"], "Where should I go?");
        assert_eq!(json["sender"], "user");
        assert_eq!(json["is_owner_view"], true);
    }

    #[test]
    fn search_result_serde() {
        let r = ChatSearchResult {
            chat_public_id: "abc123".into(),
            title: "Plan a trip".into(),
            created_at: 42,
            favorite: true,
            latest_message: Some("see you there".into()),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["favorite"], true);
        assert_eq!(json["latest_message"], "see you there");
        let rt: ChatSearchResult = serde_json::from_value(json).unwrap();
        assert_eq!(rt.title, "Plan a trip");
    }

    #[test]
    fn favorite_outcome_snake_case() {
        assert_eq!(
            serde_json::to_value(FavoriteOutcome::AlreadyFavorited).unwrap(),
            "already_favorited"
        );
        assert_eq!(
            serde_json::to_value(FavoriteOutcome::NotFavorited).unwrap(),
            "not_favorited"
        );
    }
}
