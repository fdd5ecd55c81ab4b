use thiserror::Error;

/// Service-boundary error taxonomy. Repository functions stay `anyhow`-based;
/// [`crate::service::ChatService`] maps failures into these categories so a
/// transport layer can translate them without inspecting strings.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No verified requester identity was supplied.
    #[error("authentication required")]
    Unauthenticated,

    /// The target either does not exist or does not belong to the requester.
    /// The two cases are deliberately conflated so a non-owner cannot probe
    /// for the existence of other users' chats.
    #[error("not found")]
    NotFoundOrUnauthorized,

    /// The chat exists but is private. Used only on read paths, where the
    /// requester already holds the opaque id (normally obtainable only via
    /// sharing), so confirming existence is accepted.
    #[error("forbidden: this conversation is private")]
    Forbidden,

    /// Malformed input, rejected before any persistence access.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The storage layer failed. Propagated opaquely; retries belong to the
    /// caller, not the core.
    #[error("storage failure")]
    Persistence(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
