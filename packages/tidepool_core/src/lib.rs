//! # Tidepool Core
//!
//! Conversation management and access control for a multi-user AI chat
//! application. The crate owns chats, their transcripts, favorites, sharing
//! and search on top of SQLite; it deliberately does not own the web
//! transport, session issuance or the AI model itself.
//!
//! ## Layering
//!
//! - [`repository::ChatRepository`] — raw SQLite access, one domain per file.
//! - [`service::ChatService`] — the facade a host embeds: authentication
//!   checks, access control, validation, change notification.
//! - [`responder::AiResponder`] — the seam where the host plugs in whatever
//!   produces assistant replies and chat titles.
//! - [`notify::ChangeNotifier`] — process-local callbacks so a host can push
//!   UI refreshes when conversation state changes.
//!
//! A host constructs a [`db::Database`] from a [`config::TidepoolConfig`],
//! wraps its pool in a repository, and hands that plus a responder to
//! [`service::ChatService::new`]. All service operations take the requester's
//! identity as an `Option<i64>`; `None` means unauthenticated.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod repository;
pub mod responder;
pub mod service;

pub use config::TidepoolConfig;
pub use db::Database;
pub use error::{CoreError, CoreResult};
pub use models::{
    Chat, ChatSearchResult, CreatedChat, FavoriteOutcome, Message, MessageExchange, NewUser,
    Sender, TranscriptMessage, User,
};
pub use notify::{ChangeNotifier, Subscription};
pub use repository::ChatRepository;
pub use responder::{AiResponder, HistoryTurn};
pub use service::ChatService;
