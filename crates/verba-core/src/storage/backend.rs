use crate::error::Result;
use crate::model::*;
use uuid::Uuid;

/// Abstract storage backend. SQLite is the only implementation; the chat
/// service is written against this trait so it can be driven by any store.
pub trait StorageBackend: Send + Sync {
    // -- Users --

    /// Insert a new account. A taken username is an `InvalidInput` error.
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> impl std::future::Future<Output = Result<User>> + Send;

    fn find_user_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>>> + Send;

    /// Delete an account. Login tokens, sessions and messages go with it.
    fn delete_user(&self, user_id: Uuid) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Logins --

    fn create_login(&self, user_id: Uuid) -> impl std::future::Future<Output = Result<Uuid>> + Send;

    fn user_for_token(
        &self,
        token: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<User>>> + Send;

    fn delete_login(&self, token: Uuid) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Sessions --

    /// Return the user's session, creating it if there is none.
    /// The flag is `true` when the session was created by this call.
    fn get_or_create_session(
        &self,
        user_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(ChatSession, bool)>> + Send;

    /// Set `last_active` to now.
    fn touch_session(
        &self,
        session_id: Uuid,
    ) -> impl std::future::Future<Output = Result<ChatSession>> + Send;

    // -- Messages --

    fn append_message(
        &self,
        session_id: Uuid,
        content: &str,
        role: MessageRole,
    ) -> impl std::future::Future<Output = Result<ChatMessage>> + Send;

    /// All messages of a session, oldest first.
    fn list_messages(
        &self,
        session_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>>> + Send;

    // -- Health --

    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}
