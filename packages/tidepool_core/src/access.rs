//! Access rules for chats. Pure functions so every call site re-evaluates
//! against the chat row it just loaded; nothing here is cached.

use crate::models::Chat;

/// Whether `requester_id` may read the chat's transcript. The owner always
/// can; anyone else only while the owner has sharing switched on.
pub fn can_read(requester_id: i64, chat: &Chat) -> bool {
    requester_id == chat.user_id || chat.is_shareable
}

/// Whether `requester_id` may mutate the chat (append, delete, favorite,
/// share). Owner only; sharing grants read access, never write access.
pub fn can_mutate(requester_id: i64, chat: &Chat) -> bool {
    requester_id == chat.user_id
}
