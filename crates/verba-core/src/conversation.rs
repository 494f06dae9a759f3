//! Turning stored messages into the role-tagged history the completion
//! service expects.

use serde::Serialize;

use crate::model::{ChatMessage, MessageRole};

/// Role of a turn as the completion API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiRole {
    System,
    User,
    Assistant,
}

impl ApiRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<MessageRole> for ApiRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Ai => Self::Assistant,
        }
    }
}

/// One entry in the history sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ApiRole,
    pub content: String,
    /// Remote file attached to this turn, if the provider holds a copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl ChatTurn {
    pub fn new(role: ApiRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            file_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ApiRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ApiRole::User, content)
    }

    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }
}

impl From<&ChatMessage> for ChatTurn {
    fn from(message: &ChatMessage) -> Self {
        Self::new(message.role.into(), message.content.clone())
    }
}

/// Map stored messages to API turns, preserving order.
pub fn assemble(messages: &[ChatMessage]) -> Vec<ChatTurn> {
    messages.iter().map(ChatTurn::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(content: &str, role: MessageRole) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7(),
            session_id: Uuid::nil(),
            content: content.to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_assemble_maps_roles_in_order() {
        let history = vec![
            message("Hello! How can I help?", MessageRole::Ai),
            message("What is Rust?", MessageRole::User),
            message("A systems language.", MessageRole::Ai),
        ];

        let turns = assemble(&history);
        let roles: Vec<&str> = turns.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, ["assistant", "user", "assistant"]);
        assert_eq!(turns[1].content, "What is Rust?");
        assert!(turns.iter().all(|t| t.file_id.is_none()));
    }

    #[test]
    fn test_assemble_empty() {
        assert!(assemble(&[]).is_empty());
    }

    #[test]
    fn test_assemble_keeps_empty_content() {
        let turns = assemble(&[message("", MessageRole::User)]);
        assert_eq!(turns, vec![ChatTurn::user("")]);
    }

    #[test]
    fn test_constructors() {
        assert_eq!(ChatTurn::system("be nice").role, ApiRole::System);
        let turn = ChatTurn::user("see file").with_file("file-abc");
        assert_eq!(turn.role, ApiRole::User);
        assert_eq!(turn.file_id.as_deref(), Some("file-abc"));
    }

    #[test]
    fn test_serializes_api_role_names() {
        let json = serde_json::to_value(ChatTurn::new(ApiRole::Assistant, "hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }
}
