//! Per-request chat flow: bootstrapping a session on page load and
//! exchanging one turn with the completion service.

use uuid::Uuid;

use crate::attachment::{file_message, Attachment};
use crate::config::{ChatConfig, UploadConfig};
use crate::conversation::{assemble, ChatTurn};
use crate::error::{Result, VerbaError};
use crate::llm::LlmService;
use crate::model::{ChatMessage, ChatSession, MessageRole};
use crate::storage::StorageBackend;

/// Shown on the page when the greeting could not be generated.
pub const GREETING_FAILED: &str = "Failed to load the assistant's greeting. You can still send a message.";

/// Everything the chat page needs to render.
#[derive(Debug, Clone)]
pub struct ChatPage {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
    pub greeting_error: Option<String>,
}

/// One submitted turn: the message text and an optional file.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub message: String,
    pub attachment: Option<Attachment>,
}

impl TurnInput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachment: None,
        }
    }
}

/// The persisted assistant reply for a turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub session: ChatSession,
    pub reply: ChatMessage,
}

pub struct ChatService<S> {
    store: S,
    llm: Option<LlmService>,
    chat: ChatConfig,
    uploads: UploadConfig,
}

impl<S: StorageBackend> ChatService<S> {
    pub fn new(
        store: S,
        llm: Option<LlmService>,
        chat: ChatConfig,
        uploads: UploadConfig,
    ) -> Self {
        Self {
            store,
            llm,
            chat,
            uploads,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn llm(&self) -> Option<&LlmService> {
        self.llm.as_ref()
    }

    fn require_llm(&self) -> Result<&LlmService> {
        self.llm
            .as_ref()
            .ok_or_else(|| VerbaError::Unavailable("chat client not initialized".into()))
    }

    /// Load (or start) the user's session. A new session is seeded with a
    /// greeting; if that call fails the page still loads with an error note.
    pub async fn open_session(&self, user_id: Uuid) -> Result<ChatPage> {
        let llm = self.require_llm()?;
        let (session, created) = self.store.get_or_create_session(user_id).await?;

        let mut greeting_error = None;
        if created {
            tracing::info!(session = %session.id, user = %user_id, "started chat session");

            let turns = [ChatTurn::system(self.chat.greeting_prompt.as_str())];
            match llm.complete(&turns, self.chat.greeting_max_tokens).await {
                Ok(greeting) => {
                    self.store
                        .append_message(session.id, greeting.trim(), MessageRole::Ai)
                        .await?;
                    tracing::debug!(session = %session.id, "stored greeting");
                }
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "greeting failed");
                    greeting_error = Some(GREETING_FAILED.to_string());
                }
            }
        }

        let messages = self.store.list_messages(session.id).await?;
        Ok(ChatPage {
            session,
            messages,
            greeting_error,
        })
    }

    /// Store the user's turn, ask for a reply and store that too.
    ///
    /// Nothing is written when validation fails. A failed completion leaves
    /// the user's messages in place.
    pub async fn exchange(&self, user_id: Uuid, input: TurnInput) -> Result<TurnReply> {
        let message = input.message.trim();
        if message.is_empty() && input.attachment.is_none() {
            return Err(VerbaError::InvalidInput("Message cannot be empty".into()));
        }
        if let Some(attachment) = &input.attachment {
            attachment.ensure_within(self.uploads.max_bytes)?;
        }
        let llm = self.require_llm()?;

        let (session, created) = self.store.get_or_create_session(user_id).await?;
        if created {
            tracing::info!(session = %session.id, user = %user_id, "started chat session without greeting");
        }
        let session = self.store.touch_session(session.id).await?;
        let history = self.store.list_messages(session.id).await?;

        if !message.is_empty() {
            self.store
                .append_message(session.id, message, MessageRole::User)
                .await?;
        }

        let file_text = match &input.attachment {
            Some(attachment) => {
                let extracted = attachment.extract(self.uploads.max_extract_chars);
                let text = file_message(&attachment.file_name, &extracted);
                self.store
                    .append_message(session.id, &text, MessageRole::User)
                    .await?;
                Some(text)
            }
            None => None,
        };

        let prompt = match (message.is_empty(), file_text) {
            (_, None) => message.to_string(),
            (true, Some(file_text)) => file_text,
            (false, Some(file_text)) => format!("{message}\n\n{file_text}"),
        };
        let mut final_turn = ChatTurn::user(prompt);

        let mut remote_file = None;
        if let Some(attachment) = &input.attachment {
            if self.uploads.remote_copy && llm.supports_files() {
                let file_id = llm.upload_file(attachment).await?;
                tracing::debug!(file_id = %file_id, "attached remote file copy");
                final_turn = final_turn.with_file(file_id.clone());
                remote_file = Some(file_id);
            }
        }

        let mut turns = assemble(&history);
        turns.push(final_turn);

        let completion = llm.complete(&turns, self.chat.reply_max_tokens).await;

        if let Some(file_id) = remote_file {
            if let Err(e) = llm.delete_file(&file_id).await {
                tracing::warn!(file_id = %file_id, error = %e, "failed to delete remote file copy");
            }
        }

        let text = completion?;
        let reply = self
            .store
            .append_message(session.id, text.trim(), MessageRole::Ai)
            .await?;

        Ok(TurnReply { session, reply })
    }
}
