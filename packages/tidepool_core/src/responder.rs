//! Seam between the conversation core and whatever produces AI replies.
//! The core never talks to a model directly; a host hands in an
//! implementation and the service calls it with a bounded history window.

use std::future::Future;

use crate::models::Sender;

/// One prior turn of the conversation, passed to the responder for context.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub sender: Sender,
    pub body: String,
}

/// Produces the assistant's reply to a prompt given recent history.
///
/// Also used for title derivation via [`title_prompt`]; implementations see
/// an ordinary completion request either way. Retry and backoff policy
/// belongs to the implementation, not the core.
pub trait AiResponder: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// The instruction used to derive a chat title from its opening message.
pub fn title_prompt(first_message: &str) -> String {
    format!(
        "Reply with a title of at most five words for a conversation that \
         starts with the following message. Reply with the title only.\n\n\
         {first_message}"
    )
}
