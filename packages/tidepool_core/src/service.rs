//! The service facade: authentication checks, access control, validation and
//! change notification wrapped around the repository. A transport layer calls
//! these operations and translates [`CoreError`] into its own status codes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access;
use crate::config::TidepoolConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Chat, ChatSearchResult, CreatedChat, FavoriteOutcome, MessageExchange, Sender,
    TranscriptMessage,
};
use crate::notify::ChangeNotifier;
use crate::repository::ChatRepository;
use crate::responder::{AiResponder, HistoryTurn, title_prompt};

/// Longest fallback title, in characters, when the responder cannot produce one.
const FALLBACK_TITLE_CHARS: usize = 40;

pub struct ChatService<R: AiResponder> {
    repository: ChatRepository,
    notifier: Arc<ChangeNotifier>,
    responder: R,
    max_message_bytes: usize,
    history_window: usize,
}

impl<R: AiResponder> ChatService<R> {
    pub fn new(
        repository: ChatRepository,
        notifier: Arc<ChangeNotifier>,
        responder: R,
        config: &TidepoolConfig,
    ) -> Self {
        Self {
            repository,
            notifier,
            responder,
            max_message_bytes: config.max_message_bytes,
            history_window: config.history_window,
        }
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Start a new private chat from its opening message. The title comes
    /// from the responder; if that fails the chat still gets created with a
    /// prefix of the message as its title. The opening message itself is
    /// sent through [`Self::append_message_and_respond`] by the caller.
    pub async fn create_chat(
        &self,
        requester: Option<i64>,
        first_message: &str,
    ) -> CoreResult<CreatedChat> {
        let owner = require_identity(requester)?;
        self.validate_body(first_message)?;

        let title = match self
            .responder
            .complete(&title_prompt(first_message), &[])
            .await
        {
            Ok(raw) => clean_title(&raw).unwrap_or_else(|| fallback_title(first_message)),
            Err(e) => {
                debug!("Title derivation failed, using message prefix: {e:#}");
                fallback_title(first_message)
            }
        };

        let chat = self.repository.create_chat(owner, &title).await?;
        info!("User {} created chat {}", owner, chat.public_id);

        Ok(CreatedChat {
            chat_public_id: chat.public_id,
            title: chat.title,
        })
    }

    /// The requester's own chats, newest first.
    pub async fn list_chats(&self, requester: Option<i64>) -> CoreResult<Vec<Chat>> {
        let owner = require_identity(requester)?;
        Ok(self.repository.list_chats(owner).await?)
    }

    pub async fn get_chat(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
    ) -> CoreResult<Chat> {
        let requester = require_identity(requester)?;
        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_read(requester, &chat) {
            return Err(CoreError::Forbidden);
        }
        Ok(chat)
    }

    /// Delete a chat and everything hanging off it. A missing chat and a
    /// chat owned by someone else report identically.
    pub async fn delete_chat(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
    ) -> CoreResult<()> {
        let requester = require_identity(requester)?;
        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_mutate(requester, &chat) {
            return Err(CoreError::NotFoundOrUnauthorized);
        }

        let existed = self.repository.delete_chat_cascade(chat_public_id).await?;
        if !existed {
            // A concurrent delete got there first
            return Err(CoreError::NotFoundOrUnauthorized);
        }

        info!("User {} deleted chat {}", requester, chat_public_id);
        self.notifier.publish();
        Ok(())
    }

    /// Delete every chat the requester owns. Returns how many were removed.
    pub async fn delete_all_chats(&self, requester: Option<i64>) -> CoreResult<u64> {
        let owner = require_identity(requester)?;
        let deleted = self.repository.delete_all_chats_cascade(owner).await?;
        if deleted > 0 {
            info!("User {} deleted all {} of their chats", owner, deleted);
            self.notifier.publish();
        }
        Ok(deleted)
    }

    /// Append a user message and generate the bot's reply. Owner only. Both
    /// bodies are validated against the configured limit before they are
    /// stored. The user message is stored before the responder runs, so it
    /// survives a responder failure; no lock is held across the responder
    /// call.
    pub async fn append_message_and_respond(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
        body: &str,
    ) -> CoreResult<MessageExchange> {
        let requester = require_identity(requester)?;
        self.validate_body(body)?;

        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_mutate(requester, &chat) {
            return Err(CoreError::NotFoundOrUnauthorized);
        }

        let user_message = self
            .repository
            .append_message(chat_public_id, body, Sender::User)
            .await?;

        let history = self.recent_history(chat_public_id, user_message.id).await?;
        let reply = self.responder.complete(body, &history).await?;

        // The bot side is bound by the same body limit as the user side;
        // a runaway reply must not land in storage.
        self.validate_body(&reply)?;

        let bot_message = self
            .repository
            .append_message(chat_public_id, &reply, Sender::Bot)
            .await?;

        debug!("Chat {} exchanged a message pair", chat_public_id);
        self.notifier.publish();

        Ok(MessageExchange {
            user_message,
            bot_message,
        })
    }

    /// Full transcript for anyone allowed to read the chat. Each message is
    /// annotated with whether the requester owns the chat, so a viewer of a
    /// shared transcript gets a read-only rendering.
    pub async fn fetch_transcript(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
    ) -> CoreResult<Vec<TranscriptMessage>> {
        let requester = require_identity(requester)?;
        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_read(requester, &chat) {
            return Err(CoreError::Forbidden);
        }

        let is_owner_view = requester == chat.user_id;
        let messages = self.repository.fetch_transcript(chat_public_id).await?;
        Ok(messages
            .into_iter()
            .map(|message| TranscriptMessage {
                message,
                is_owner_view,
            })
            .collect())
    }

    /// Toggle the favorite marker on one of the requester's own chats.
    /// Repeating a toggle is a successful no-op; subscribers are only
    /// notified when stored state actually changed.
    pub async fn toggle_favorite(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
        value: bool,
    ) -> CoreResult<FavoriteOutcome> {
        let requester = require_identity(requester)?;
        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_mutate(requester, &chat) {
            return Err(CoreError::NotFoundOrUnauthorized);
        }

        let outcome = self
            .repository
            .set_favorite(requester, chat_public_id, value)
            .await?;
        if outcome.changed() {
            self.notifier.publish();
        }
        Ok(outcome)
    }

    /// The requester's favorited chats, in the order they were favorited.
    pub async fn list_favorites(&self, requester: Option<i64>) -> CoreResult<Vec<Chat>> {
        let requester = require_identity(requester)?;
        Ok(self.repository.list_favorites(requester).await?)
    }

    /// Switch sharing on or off. Owner only. Returns the flag as now stored.
    pub async fn toggle_share(
        &self,
        requester: Option<i64>,
        chat_public_id: &str,
        value: bool,
    ) -> CoreResult<bool> {
        let requester = require_identity(requester)?;
        let chat = self.load_chat(chat_public_id).await?;
        if !access::can_mutate(requester, &chat) {
            return Err(CoreError::NotFoundOrUnauthorized);
        }

        if chat.is_shareable != value {
            self.repository
                .set_chat_shareable(chat_public_id, value)
                .await?;
            info!(
                "User {} set chat {} shareable={}",
                requester, chat_public_id, value
            );
            self.notifier.publish();
        }
        Ok(value)
    }

    /// Search the requester's own chats by title or message content.
    pub async fn search(
        &self,
        requester: Option<i64>,
        query: &str,
    ) -> CoreResult<Vec<ChatSearchResult>> {
        let requester = require_identity(requester)?;
        Ok(self.repository.search_chats(requester, query).await?)
    }

    async fn load_chat(&self, chat_public_id: &str) -> CoreResult<Chat> {
        self.repository
            .get_chat(chat_public_id)
            .await?
            .ok_or(CoreError::NotFoundOrUnauthorized)
    }

    fn validate_body(&self, body: &str) -> CoreResult<()> {
        if body.trim().is_empty() {
            return Err(CoreError::Validation("message body is empty".into()));
        }
        if body.len() > self.max_message_bytes {
            return Err(CoreError::Validation(format!(
                "message body exceeds {} bytes",
                self.max_message_bytes
            )));
        }
        Ok(())
    }

    /// The most recent messages before `exclude_id`, bounded by the
    /// configured history window, oldest first.
    async fn recent_history(
        &self,
        chat_public_id: &str,
        exclude_id: i64,
    ) -> CoreResult<Vec<HistoryTurn>> {
        let transcript = self.repository.fetch_transcript(chat_public_id).await?;
        let mut history: Vec<HistoryTurn> = transcript
            .into_iter()
            .filter(|m| m.id != exclude_id)
            .map(|m| HistoryTurn {
                sender: m.sender,
                body: m.body,
            })
            .collect();
        if history.len() > self.history_window {
            history.drain(..history.len() - self.history_window);
        }
        Ok(history)
    }
}

fn require_identity(requester: Option<i64>) -> CoreResult<i64> {
    requester.ok_or(CoreError::Unauthenticated)
}

/// Normalize a responder-produced title: first line only, quotes stripped.
/// Returns `None` when nothing usable is left.
fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().next().unwrap_or("");
    let cleaned = line.trim().trim_matches(['"', '\'']).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Title of last resort: a character-bounded prefix of the opening message.
fn fallback_title(first_message: &str) -> String {
    let line = first_message.trim().lines().next().unwrap_or("").trim();
    line.chars().take(FALLBACK_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::NewUser;
    use crate::repository::test_helpers;

    /// Responder that hands out canned replies and records what it was asked.
    struct ScriptedResponder {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        seen_history_lens: Mutex<Vec<usize>>,
    }

    impl ScriptedResponder {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen_history_lens: Mutex::new(Vec::new()),
            }
        }

        /// Empty script: every call gets the default canned reply.
        fn canned() -> Self {
            Self::new(Vec::new())
        }
    }

    impl AiResponder for ScriptedResponder {
        async fn complete(
            &self,
            _prompt: &str,
            history: &[HistoryTurn],
        ) -> anyhow::Result<String> {
            self.seen_history_lens.lock().unwrap().push(history.len());
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => Ok("canned reply".to_string()),
            }
        }
    }

    async fn test_service(responder: ScriptedResponder) -> ChatService<ScriptedResponder> {
        let repo = test_helpers::test_repository().await;
        let config = TidepoolConfig {
            db_path: ":memory:".into(),
            db_max_connections: 1,
            max_message_bytes: 100,
            history_window: 5,
        };
        ChatService::new(repo, Arc::new(ChangeNotifier::new()), responder, &config)
    }

    async fn seed_user(service: &ChatService<ScriptedResponder>, email: &str) -> i64 {
        service
            .repository
            .create_user(&NewUser {
                display_name: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                profile_image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn anonymous_requests_are_rejected() {
        let service = test_service(ScriptedResponder::canned()).await;

        assert!(matches!(
            service.create_chat(None, "hello").await,
            Err(CoreError::Unauthenticated)
        ));
        assert!(matches!(
            service.list_chats(None).await,
            Err(CoreError::Unauthenticated)
        ));
        assert!(matches!(
            service.search(None, "q").await,
            Err(CoreError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn create_chat_uses_responder_title() {
        let service =
            test_service(ScriptedResponder::new(vec![Ok("Trip planning".into())])).await;
        let alice = seed_user(&service, "alice@example.com").await;

        let created = service
            .create_chat(Some(alice), "Where should I travel in May?")
            .await
            .unwrap();
        assert_eq!(created.title, "Trip planning");

        let chats = service.list_chats(Some(alice)).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert!(!chats[0].is_shareable, "new chats start private");
    }

    #[tokio::test]
    async fn create_chat_falls_back_to_message_prefix() {
        let service = test_service(ScriptedResponder::new(vec![Err(anyhow::anyhow!(
            "model offline"
        ))]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;

        let created = service
            .create_chat(Some(alice), "Where should I travel in May?")
            .await
            .unwrap();
        assert_eq!(created.title, "Where should I travel in May?");
    }

    #[tokio::test]
    async fn create_chat_fallback_truncates_long_messages() {
        let service = test_service(ScriptedResponder::new(vec![Ok("  ".into())])).await;
        let alice = seed_user(&service, "alice@example.com").await;

        let long = "x".repeat(90);
        let created = service.create_chat(Some(alice), &long).await.unwrap();
        assert_eq!(created.title.chars().count(), FALLBACK_TITLE_CHARS);
    }

    #[tokio::test]
    async fn create_chat_strips_quoted_titles() {
        let service =
            test_service(ScriptedResponder::new(vec![Ok("\"Trip planning\"\n".into())])).await;
        let alice = seed_user(&service, "alice@example.com").await;

        let created = service.create_chat(Some(alice), "hello").await.unwrap();
        assert_eq!(created.title, "Trip planning");
    }

    #[tokio::test]
    async fn empty_and_oversized_bodies_are_rejected_before_storage() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;

        assert!(matches!(
            service.create_chat(Some(alice), "   ").await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            service.create_chat(Some(alice), &"x".repeat(101)).await,
            Err(CoreError::Validation(_))
        ));
        assert!(service.list_chats(Some(alice)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_stores_both_sides_of_the_exchange() {
        let service = test_service(ScriptedResponder::new(vec![
            Ok("T".into()),
            Ok("Go to Lisbon.".into()),
        ]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let exchange = service
            .append_message_and_respond(Some(alice), &created.chat_public_id, "Where to?")
            .await
            .unwrap();
        assert_eq!(exchange.user_message.body, "Where to?");
        assert_eq!(exchange.user_message.sender, Sender::User);
        assert_eq!(exchange.bot_message.body, "Go to Lisbon.");
        assert_eq!(exchange.bot_message.sender, Sender::Bot);

        let transcript = service
            .fetch_transcript(Some(alice), &created.chat_public_id)
            .await
            .unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].message.body, "Where to?");
        assert_eq!(transcript[1].message.body, "Go to Lisbon.");
        assert!(transcript.iter().all(|m| m.is_owner_view));
    }

    #[tokio::test]
    async fn append_history_is_bounded_by_the_window() {
        let responder = ScriptedResponder::new(vec![Ok("T".into())]);
        let service = test_service(responder).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        for i in 0..6 {
            service
                .append_message_and_respond(
                    Some(alice),
                    &created.chat_public_id,
                    &format!("msg {i}"),
                )
                .await
                .unwrap();
        }

        let lens = service.responder.seen_history_lens.lock().unwrap().clone();
        // First call is title derivation with no history
        assert_eq!(lens[0], 0);
        // First append has nothing before the prompt message
        assert_eq!(lens[1], 0);
        // Later appends grow until the window caps them at 5
        assert_eq!(*lens.last().unwrap(), 5);
        assert!(lens.iter().all(|&n| n <= 5));
    }

    #[tokio::test]
    async fn append_by_non_owner_is_conflated_not_found() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let bob = seed_user(&service, "bob@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        // Even with sharing on, writing stays owner-only
        service
            .toggle_share(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();
        let err = service
            .append_message_and_respond(Some(bob), &created.chat_public_id, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundOrUnauthorized));
    }

    #[tokio::test]
    async fn user_message_survives_responder_failure() {
        let service = test_service(ScriptedResponder::new(vec![
            Ok("T".into()),
            Err(anyhow::anyhow!("model offline")),
        ]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let err = service
            .append_message_and_respond(Some(alice), &created.chat_public_id, "Where to?")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Persistence(_)));

        let transcript = service
            .fetch_transcript(Some(alice), &created.chat_public_id)
            .await
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].message.body, "Where to?");
    }

    #[tokio::test]
    async fn oversized_bot_reply_is_rejected_not_stored() {
        let service = test_service(ScriptedResponder::new(vec![
            Ok("T".into()),
            Ok("x".repeat(10_000)),
        ]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let err = service
            .append_message_and_respond(Some(alice), &created.chat_public_id, "Where to?")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // Only the user message made it into the transcript
        let transcript = service
            .fetch_transcript(Some(alice), &created.chat_public_id)
            .await
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].message.sender, Sender::User);
    }

    #[tokio::test]
    async fn two_user_share_scenario() {
        let service = test_service(ScriptedResponder::new(vec![
            Ok("T".into()),
            Ok("reply".into()),
        ]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;
        let bob = seed_user(&service, "bob@example.com").await;

        let created = service.create_chat(Some(alice), "hello").await.unwrap();
        service
            .append_message_and_respond(Some(alice), &created.chat_public_id, "hello")
            .await
            .unwrap();

        // Private: bob holds the id but cannot read
        let err = service
            .fetch_transcript(Some(bob), &created.chat_public_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));

        // Shared: bob reads, flagged as a non-owner view
        service
            .toggle_share(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();
        let transcript = service
            .fetch_transcript(Some(bob), &created.chat_public_id)
            .await
            .unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(transcript.iter().all(|m| !m.is_owner_view));

        // Unshared: access revoked again
        service
            .toggle_share(Some(alice), &created.chat_public_id, false)
            .await
            .unwrap();
        let err = service
            .fetch_transcript(Some(bob), &created.chat_public_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));
    }

    #[tokio::test]
    async fn missing_chat_and_foreign_chat_report_identically() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let bob = seed_user(&service, "bob@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let missing = service.delete_chat(Some(alice), "no-such-chat").await.unwrap_err();
        let foreign = service
            .delete_chat(Some(bob), &created.chat_public_id)
            .await
            .unwrap_err();
        assert!(matches!(missing, CoreError::NotFoundOrUnauthorized));
        assert!(matches!(foreign, CoreError::NotFoundOrUnauthorized));
        assert_eq!(missing.to_string(), foreign.to_string());
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        service
            .delete_chat(Some(alice), &created.chat_public_id)
            .await
            .unwrap();
        let err = service
            .get_chat(Some(alice), &created.chat_public_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundOrUnauthorized));
    }

    #[tokio::test]
    async fn delete_cascades_to_favorites_and_messages() {
        let service = test_service(ScriptedResponder::new(vec![
            Ok("T".into()),
            Ok("reply".into()),
        ]))
        .await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();
        service
            .append_message_and_respond(Some(alice), &created.chat_public_id, "hello")
            .await
            .unwrap();
        service
            .toggle_favorite(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();

        service
            .delete_chat(Some(alice), &created.chat_public_id)
            .await
            .unwrap();

        assert!(service.list_favorites(Some(alice)).await.unwrap().is_empty());
        assert!(service
            .repository
            .fetch_transcript(&created.chat_public_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_all_clears_everything_owned() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let bob = seed_user(&service, "bob@example.com").await;

        for msg in ["one", "two", "three"] {
            service.create_chat(Some(alice), msg).await.unwrap();
        }
        service.create_chat(Some(bob), "bob's chat").await.unwrap();

        let deleted = service.delete_all_chats(Some(alice)).await.unwrap();
        assert_eq!(deleted, 3);
        assert!(service.list_chats(Some(alice)).await.unwrap().is_empty());
        assert_eq!(service.list_chats(Some(bob)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn favorite_notifications_fire_only_on_change() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = service.notifier().subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        service
            .toggle_favorite(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Repeating the same toggle is a no-op and stays silent
        let outcome = service
            .toggle_favorite(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();
        assert_eq!(outcome, FavoriteOutcome::AlreadyFavorited);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        service
            .toggle_favorite(Some(alice), &created.chat_public_id, false)
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn share_toggle_is_silent_when_already_in_that_state() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = service.notifier().subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!service
            .toggle_share(Some(alice), &created.chat_public_id, false)
            .await
            .unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(service
            .toggle_share(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn favoriting_a_foreign_chat_is_conflated_not_found() {
        let service = test_service(ScriptedResponder::canned()).await;
        let alice = seed_user(&service, "alice@example.com").await;
        let bob = seed_user(&service, "bob@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        // Sharing grants read, not favoriting
        service
            .toggle_share(Some(alice), &created.chat_public_id, true)
            .await
            .unwrap();
        let err = service
            .toggle_favorite(Some(bob), &created.chat_public_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundOrUnauthorized));
    }

    #[tokio::test]
    async fn concurrent_favorite_toggles_leave_one_row() {
        let service = Arc::new(test_service(ScriptedResponder::canned()).await);
        let alice = seed_user(&service, "alice@example.com").await;
        let created = service.create_chat(Some(alice), "hello").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let chat_id = created.chat_public_id.clone();
            handles.push(tokio::spawn(async move {
                service.toggle_favorite(Some(alice), &chat_id, true).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        // Both calls succeed; between them exactly one actually inserted
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == FavoriteOutcome::Added)
                .count(),
            1
        );
        assert_eq!(
            service
                .repository
                .count_favorite_rows(alice, &created.chat_public_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn search_goes_through_the_repository() {
        let service = test_service(ScriptedResponder::new(vec![Ok("Lisbon trip".into())])).await;
        let alice = seed_user(&service, "alice@example.com").await;
        service.create_chat(Some(alice), "hello").await.unwrap();

        assert!(service.search(Some(alice), "").await.unwrap().is_empty());
        let results = service.search(Some(alice), "lisbon").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Lisbon trip");
    }
}
