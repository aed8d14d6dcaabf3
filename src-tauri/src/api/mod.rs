pub mod agents;
pub mod conversations;
pub mod knowledge;
pub mod models;

use crate::config::{normalize_base_url, ClientConfig};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::Stream;
use models::{
    Agent, AgentDraft, ChatReply, Conversation, ConversationPatch, ConversationSummary,
    GroupDraft, KnowledgeGroup, KnowledgeSource, NewConversation, SendMessageRequest,
    UploadFile,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Raw response body of a streaming reply.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;
    async fn search_conversations(&self, query: &str) -> Result<Vec<ConversationSummary>>;
    async fn create_conversation(&self, request: &NewConversation) -> Result<Conversation>;
    async fn get_conversation(&self, id: &str) -> Result<Conversation>;
    async fn update_conversation(&self, id: &str, patch: &ConversationPatch) -> Result<Conversation>;
    async fn delete_conversation(&self, id: &str) -> Result<()>;
    async fn send_message(&self, conversation_id: &str, request: &SendMessageRequest) -> Result<ChatReply>;
    async fn stream_message(&self, conversation_id: &str, request: &SendMessageRequest) -> Result<ByteStream>;
}

#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<KnowledgeGroup>>;
    async fn create_group(&self, draft: &GroupDraft) -> Result<KnowledgeGroup>;
    async fn delete_group(&self, id: &str) -> Result<()>;
    async fn list_sources(&self, group_id: &str) -> Result<Vec<KnowledgeSource>>;
    /// Upload documents for indexing. Returns the backend's acknowledgement.
    async fn upload_files(&self, group_id: &str, files: Vec<UploadFile>) -> Result<String>;
    async fn import_url(&self, group_id: &str, url: &str) -> Result<String>;
    /// Remove sources by name (file name or URL).
    async fn delete_sources(&self, group_id: &str, names: &[String]) -> Result<()>;
}

#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<Agent>>;
    async fn create_agent(&self, draft: &AgentDraft) -> Result<Agent>;
    async fn update_agent(&self, id: &str, draft: &AgentDraft) -> Result<Agent>;
    async fn delete_agent(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    token: Option<String>,
}

/// HTTP client for the assistant backend. Clones share the endpoint, so a
/// settings change is seen by every store at once.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: Arc<RwLock<Endpoint>>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: Arc::new(RwLock::new(Endpoint {
                base_url: normalize_base_url(&config.api_base_url)?,
                token: config.api_token.clone(),
            })),
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> String {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .base_url
            .clone()
    }

    pub fn set_base_url(&self, url: &str) -> Result<()> {
        let url = normalize_base_url(url)?;
        log::info!("API base URL set to {}", url);
        self.endpoint
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .base_url = url;
        Ok(())
    }

    pub fn set_token(&self, token: Option<String>) {
        self.endpoint
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .token = token.filter(|t| !t.trim().is_empty());
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Request without a total timeout; used for streamed bodies.
    pub(crate) fn stream_request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self
            .endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone();
        let req = self.http.request(method, self.url(path));
        match token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.stream_request(method, path).timeout(self.timeout)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        let resp = ensure_success(req.send().await?).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Parse(format!("{}: {}", e, body)))
    }

    pub(crate) async fn send_empty(req: RequestBuilder) -> Result<()> {
        ensure_success(req.send().await?).await?;
        Ok(())
    }
}

pub(crate) async fn ensure_success(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    log::warn!("backend returned {}: {}", status, text);
    Err(ClientError::Api {
        status,
        message: error_message(&text),
    })
}

/// The backend reports failures as `{"error": "..."}`; fall back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => "request failed".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
