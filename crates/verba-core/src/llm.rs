use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::multipart;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::config::{resolve_api_key, LlmConfig};
use crate::conversation::{ApiRole, ChatTurn};
use crate::error::{Result, VerbaError};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const ECHO_GREETING: &str = "Hello! I'm here to help. What would you like to talk about?";

/// Chat completion client for the configured provider.
///
/// Besides completions, providers that can hold files (`openai`, `echo`)
/// accept uploads for the duration of a turn.
pub struct LlmService {
    provider: LlmProvider,
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
    /// Files held by the echo provider, id -> file name.
    echo_files: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for LlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmService")
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmProvider {
    OpenAI,
    Ollama,
    Echo,
}

impl LlmService {
    /// Create an LLM service from configuration.
    ///
    /// The API key is resolved here, so a missing key surfaces at startup.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "openai" => LlmProvider::OpenAI,
            "ollama" => LlmProvider::Ollama,
            "echo" => LlmProvider::Echo,
            other => {
                return Err(VerbaError::Config(format!(
                    "unknown LLM provider: '{other}' (expected 'openai', 'ollama', or 'echo')"
                )));
            }
        };

        let api_key = match provider {
            LlmProvider::OpenAI => Some(resolve_api_key(
                config.api_key.as_deref(),
                config.env_var.as_deref(),
                "OPENAI_API_KEY",
                "openai",
            )?),
            LlmProvider::Ollama | LlmProvider::Echo => None,
        };

        Ok(Self {
            provider,
            config: config.clone(),
            api_key,
            client: reqwest::Client::new(),
            echo_files: Mutex::new(HashMap::new()),
        })
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Echo => "echo",
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Whether [`upload_file`](Self::upload_file) is available.
    pub fn supports_files(&self) -> bool {
        matches!(self.provider, LlmProvider::OpenAI | LlmProvider::Echo)
    }

    /// Generate the next assistant message for `turns`.
    pub async fn complete(&self, turns: &[ChatTurn], max_tokens: u32) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_openai(turns, max_tokens).await,
            LlmProvider::Ollama => self.complete_ollama(turns, max_tokens).await,
            LlmProvider::Echo => Ok(echo_reply(turns, max_tokens)),
        }
    }

    /// Store a copy of `attachment` with the provider, returning its file id.
    pub async fn upload_file(&self, attachment: &Attachment) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.upload_openai(attachment).await,
            LlmProvider::Echo => {
                let id = format!("file-echo-{}", Uuid::new_v4().simple());
                self.echo_files()?
                    .insert(id.clone(), attachment.file_name.clone());
                Ok(id)
            }
            LlmProvider::Ollama => Err(VerbaError::Llm(
                "ollama does not support file storage".into(),
            )),
        }
    }

    /// Remove a file previously returned by [`upload_file`](Self::upload_file).
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        match self.provider {
            LlmProvider::OpenAI => self.delete_openai(file_id).await,
            LlmProvider::Echo => match self.echo_files()?.remove(file_id) {
                Some(_) => Ok(()),
                None => Err(VerbaError::Llm(format!("no such file: {file_id}"))),
            },
            LlmProvider::Ollama => Err(VerbaError::Llm(
                "ollama does not support file storage".into(),
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn stored_file_count(&self) -> usize {
        self.echo_files().map(|files| files.len()).unwrap_or(0)
    }

    fn echo_files(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.echo_files
            .lock()
            .map_err(|e| VerbaError::Llm(format!("echo file store poisoned: {e}")))
    }

    fn base_url(&self, default: &str) -> String {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    fn bearer(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| VerbaError::Config("openai LLM provider requires an API key".into()))
    }

    /// OpenAI: POST {base_url}/v1/chat/completions
    async fn complete_openai(&self, turns: &[ChatTurn], max_tokens: u32) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url(OPENAI_DEFAULT_URL));

        let body = json!({
            "model": self.config.model,
            "messages": openai_messages(turns),
            "max_tokens": max_tokens,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp, "OpenAI").await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| VerbaError::Llm("OpenAI response missing content".into()))
    }

    /// OpenAI: POST {base_url}/v1/files (multipart, purpose `user_data`)
    async fn upload_openai(&self, attachment: &Attachment) -> Result<String> {
        let url = format!("{}/v1/files", self.base_url(OPENAI_DEFAULT_URL));

        let form = multipart::Form::new()
            .text("purpose", "user_data")
            .part("file", file_part(attachment)?);

        tracing::debug!(file = %attachment.file_name, bytes = attachment.len(), "uploading file to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer()?)
            .multipart(form)
            .send()
            .await?;

        let json = read_json(resp, "OpenAI file upload").await?;
        json["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| VerbaError::Llm("OpenAI file upload response missing id".into()))
    }

    /// OpenAI: DELETE {base_url}/v1/files/{id}
    async fn delete_openai(&self, file_id: &str) -> Result<()> {
        let url = format!("{}/v1/files/{file_id}", self.base_url(OPENAI_DEFAULT_URL));

        let resp = self
            .client
            .delete(&url)
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        read_json(resp, "OpenAI file delete").await.map(|_| ())
    }

    /// Ollama: POST {base_url}/api/chat
    async fn complete_ollama(&self, turns: &[ChatTurn], max_tokens: u32) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url(OLLAMA_DEFAULT_URL));

        let messages: Vec<Value> = turns
            .iter()
            .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
            .collect();

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": max_tokens,
            }
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp, "Ollama").await?;
        json["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| VerbaError::Llm("Ollama response missing 'message.content'".into()))
    }
}

async fn read_json(resp: reqwest::Response, what: &str) -> Result<Value> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(VerbaError::Llm(format!("{what} error {status}: {text}")));
    }

    Ok(resp.json().await?)
}

/// The multipart `file` part. A declared content type that does not parse
/// is replaced by the one guessed from the file name.
fn file_part(attachment: &Attachment) -> Result<multipart::Part> {
    let part = || {
        multipart::Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone())
    };
    let declared = attachment.mime_type();
    match part().mime_str(&declared) {
        Ok(part) => Ok(part),
        Err(_) => {
            tracing::debug!(file = %attachment.file_name, content_type = %declared, "ignoring malformed content type");
            Ok(part().mime_str(&attachment.guessed_mime_type())?)
        }
    }
}

/// Chat messages in the OpenAI wire shape. A turn carrying a file id
/// becomes a text part plus a file part.
fn openai_messages(turns: &[ChatTurn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| match &turn.file_id {
            Some(file_id) => json!({
                "role": turn.role.as_str(),
                "content": [
                    {"type": "text", "text": turn.content},
                    {"type": "file", "file": {"file_id": file_id}},
                ],
            }),
            None => json!({"role": turn.role.as_str(), "content": turn.content}),
        })
        .collect()
}

fn echo_reply(turns: &[ChatTurn], max_tokens: u32) -> String {
    let Some(last) = turns.iter().rev().find(|t| t.role == ApiRole::User) else {
        return ECHO_GREETING.to_string();
    };

    let words: Vec<&str> = last
        .content
        .split_whitespace()
        .take(max_tokens as usize)
        .collect();
    format!("You said: {}", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::TestServer;

    fn echo() -> LlmService {
        LlmService::from_config(&LlmConfig {
            provider: "echo".into(),
            model: "echo".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_from_config_ollama() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3.2".into(),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        assert_eq!(service.provider_name(), "ollama");
        assert!(!service.supports_files());
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: "banana".into(),
            ..Default::default()
        };
        let result = LlmService::from_config(&config);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unknown LLM provider"));
    }

    #[test]
    fn test_from_config_openai_without_key_errors() {
        let config = LlmConfig {
            provider: "openai".into(),
            api_key: None,
            env_var: Some("VERBA_TEST_NO_SUCH_KEY".into()),
            ..Default::default()
        };
        let result = LlmService::from_config(&config);
        assert!(result.unwrap_err().to_string().contains("API key"));
    }

    #[test]
    fn test_from_config_openai_with_key() {
        let config = LlmConfig {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        assert_eq!(service.model(), "gpt-4o-mini");
        assert!(service.supports_files());
    }

    #[tokio::test]
    async fn test_echo_repeats_last_user_turn() {
        let turns = vec![
            ChatTurn::new(ApiRole::Assistant, "Hi there"),
            ChatTurn::user("first"),
            ChatTurn::new(ApiRole::Assistant, "You said: first"),
            ChatTurn::user("second  question"),
        ];
        let reply = echo().complete(&turns, 300).await.unwrap();
        assert_eq!(reply, "You said: second question");
    }

    #[tokio::test]
    async fn test_echo_respects_budget() {
        let turns = vec![ChatTurn::user("one two three four five")];
        let reply = echo().complete(&turns, 2).await.unwrap();
        assert_eq!(reply, "You said: one two");
    }

    #[tokio::test]
    async fn test_echo_greets_without_user_turn() {
        let turns = vec![ChatTurn::system("Greet the user")];
        let reply = echo().complete(&turns, 50).await.unwrap();
        assert_eq!(reply, ECHO_GREETING);
    }

    #[tokio::test]
    async fn test_echo_file_lifecycle() {
        let service = echo();
        let file = Attachment::new("notes.txt", None, b"hello".to_vec());

        let id = service.upload_file(&file).await.unwrap();
        assert!(id.starts_with("file-echo-"));
        assert_eq!(service.stored_file_count(), 1);

        service.delete_file(&id).await.unwrap();
        assert_eq!(service.stored_file_count(), 0);
        assert!(service.delete_file(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_ollama_rejects_uploads() {
        let service = LlmService::from_config(&LlmConfig {
            provider: "ollama".into(),
            ..Default::default()
        })
        .unwrap();
        let file = Attachment::new("a.txt", None, b"x".to_vec());
        assert!(matches!(
            service.upload_file(&file).await,
            Err(VerbaError::Llm(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_openai_is_http_error() {
        let service = LlmService::from_config(&LlmConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        })
        .unwrap();
        let err = service
            .complete(&[ChatTurn::user("hi")], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VerbaError::Http(_)));
        assert!(err.is_external());
    }

    fn openai_at(base_url: &str) -> LlmService {
        LlmService::from_config(&LlmConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: Some(base_url.into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_openai_error_status_is_llm_error() {
        let server = TestServer::start(|_, _| (500, json!({"error": {"message": "boom"}}))).await;
        let err = openai_at(&server.base_url)
            .complete(&[ChatTurn::user("hi")], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VerbaError::Llm(_)));
        assert!(err.to_string().contains("OpenAI error 500"));
    }

    #[tokio::test]
    async fn test_openai_upload_and_delete() {
        let server = TestServer::start(|method, _| match method {
            "POST" => (200, json!({"id": "file-abc", "object": "file"})),
            _ => (200, json!({"id": "file-abc", "deleted": true})),
        })
        .await;
        let service = openai_at(&server.base_url);
        let file = Attachment::new("notes.txt", None, b"hello".to_vec());

        let id = service.upload_file(&file).await.unwrap();
        assert_eq!(id, "file-abc");
        service.delete_file(&id).await.unwrap();

        assert_eq!(server.lines(), ["POST /v1/files", "DELETE /v1/files/file-abc"]);
        let upload = server.requests()[0].body_text();
        assert!(upload.contains("user_data"));
        assert!(upload.contains("filename=\"notes.txt\""));
        assert!(upload.contains("hello"));
    }

    #[tokio::test]
    async fn test_malformed_content_type_falls_back_to_guess() {
        let server =
            TestServer::start(|_, _| (200, json!({"id": "file-abc", "object": "file"}))).await;
        let file = Attachment::new("notes.txt", Some("not a mime type".into()), b"hi".to_vec());

        let id = openai_at(&server.base_url).upload_file(&file).await.unwrap();
        assert_eq!(id, "file-abc");

        let upload = server.requests()[0].body_text();
        assert!(upload.contains("text/plain"));
        assert!(!upload.contains("not a mime type"));
    }

    #[test]
    fn test_openai_messages_shape() {
        let turns = vec![
            ChatTurn::new(ApiRole::Assistant, "hello"),
            ChatTurn::user("see attached").with_file("file-123"),
        ];
        let messages = openai_messages(&turns);
        assert_eq!(messages[0], json!({"role": "assistant", "content": "hello"}));
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["text"], "see attached");
        assert_eq!(messages[1]["content"][1]["file"]["file_id"], "file-123");
    }
}
