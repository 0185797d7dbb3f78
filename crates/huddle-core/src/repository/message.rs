//! Message repository trait definition.

use huddle_types::error::RepositoryError;
use huddle_types::identity::Identity;
use huddle_types::message::{MessageKind, StoredMessage};

/// Repository trait for chat message persistence.
///
/// Persistence is best-effort from the pipeline's point of view: a failed
/// `save` is logged by the caller and never blocks a broadcast.
pub trait MessageRepository: Send + Sync + 'static {
    /// Append a message to the shared conversation.
    fn save(
        &self,
        kind: MessageKind,
        sender: &Identity,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The latest `limit` messages (all when `None`), ordered oldest first.
    fn load_history(
        &self,
        limit: Option<u32>,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>, RepositoryError>> + Send;

    /// Record `identity` as a participant, returning its stable user id.
    fn ensure_participant(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<String, RepositoryError>> + Send;

    /// Total number of persisted messages.
    fn count_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
