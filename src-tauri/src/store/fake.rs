//! In-memory backend for store tests.

use crate::api::models::{
    Agent, AgentDraft, ChatReply, Conversation, ConversationPatch, ConversationSummary,
    GroupDraft, KnowledgeGroup, KnowledgeSource, ReplyAnswer, SendMessageRequest, SourceKind,
    UploadFile,
};
use crate::api::{AgentApi, ByteStream, ConversationApi, KnowledgeApi};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeBackend {
    conversations: Mutex<Vec<Conversation>>,
    groups: Mutex<Vec<KnowledgeGroup>>,
    sources: Mutex<HashMap<String, Vec<KnowledgeSource>>>,
    index_uploads: Mutex<bool>,
    deleted_sources: Mutex<Vec<String>>,
    agents: Mutex<Vec<Agent>>,
    stream_script: Mutex<Option<Vec<String>>>,
    stream_feed: Mutex<Option<UnboundedReceiver<Result<Vec<u8>>>>>,
    reply: Mutex<Option<String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<SendMessageRequest>>,
    next_id: Mutex<u32>,
}

impl FakeBackend {
    pub fn with_conversation(id: &str, title: &str) -> Self {
        let backend = Self::default();
        backend.add_conversation(id, title);
        backend
    }

    pub fn add_conversation(&self, id: &str, title: &str) {
        self.conversations.lock().unwrap().push(Conversation {
            id: id.to_string(),
            title: Some(title.to_string()),
            created_at: "2025-07-01T10:00:00".to_string(),
            updated_at: None,
            group_ids: Vec::new(),
            agent_id: None,
            messages: Vec::new(),
        });
    }

    pub fn add_group(&self, id: &str, name: &str) {
        self.groups.lock().unwrap().push(KnowledgeGroup {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            embedding_model: None,
            rerank_model: None,
        });
    }

    pub fn set_sources(&self, group_id: &str, sources: Vec<KnowledgeSource>) {
        self.sources.lock().unwrap().insert(group_id.to_string(), sources);
    }

    /// When set, uploads and imports show up in the next listing. Uploaded
    /// files are listed under a `<id>_<name>` storage name.
    pub fn index_uploads(&self, on: bool) {
        *self.index_uploads.lock().unwrap() = on;
    }

    pub fn deleted_sources(&self) -> Vec<String> {
        self.deleted_sources.lock().unwrap().clone()
    }

    pub fn add_agent(&self, id: &str, name: &str) {
        self.agents.lock().unwrap().push(Agent {
            id: id.to_string(),
            name: name.to_string(),
            system_prompt: format!("You are {}.", name),
            description: String::new(),
            enable_mcp: false,
            tools: String::new(),
            created_at: None,
        });
    }

    /// Chunks handed out by the next `stream_message`. Without a script the
    /// stream endpoint fails.
    pub fn script_stream(&self, chunks: &[&str]) {
        *self.stream_script.lock().unwrap() = Some(chunks.iter().map(|c| c.to_string()).collect());
    }

    /// Feed the next `stream_message` by hand. The stream ends when the
    /// returned sender is dropped.
    pub fn open_stream(&self) -> UnboundedSender<Result<Vec<u8>>> {
        let (tx, rx) = unbounded();
        *self.stream_feed.lock().unwrap() = Some(rx);
        tx
    }

    /// Answer for `send_message`. Without one the call fails.
    pub fn set_reply(&self, text: &str) {
        *self.reply.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail_on(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn was_called(&self, op: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == op)
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    pub fn last_request(&self) -> Option<SendMessageRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn record(&self, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.failing.lock().unwrap().contains(op) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("{} failed", op),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}-{}", prefix, *next)
    }

    fn not_found(what: &str) -> ClientError {
        ClientError::Api {
            status: 404,
            message: format!("{} not found", what),
        }
    }
}

#[async_trait]
impl ConversationApi for FakeBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.record("list_conversations")?;
        Ok(self.conversations.lock().unwrap().iter().map(Conversation::summary).collect())
    }

    async fn search_conversations(&self, query: &str) -> Result<Vec<ConversationSummary>> {
        self.record("search_conversations")?;
        let query = query.to_lowercase();
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&query))
            })
            .map(Conversation::summary)
            .collect())
    }

    async fn create_conversation(
        &self,
        request: &crate::api::models::NewConversation,
    ) -> Result<Conversation> {
        self.record("create_conversation")?;
        let conversation = Conversation {
            id: self.next_id("conv"),
            title: request.title.clone(),
            created_at: "2025-07-02T09:00:00".to_string(),
            updated_at: None,
            group_ids: request.group_ids.clone(),
            agent_id: request.agent_id.clone(),
            messages: Vec::new(),
        };
        self.conversations.lock().unwrap().push(conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.record("get_conversation")?;
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found("conversation"))
    }

    async fn update_conversation(&self, id: &str, patch: &ConversationPatch) -> Result<Conversation> {
        self.record("update_conversation")?;
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found("conversation"))?;
        if let Some(title) = &patch.title {
            conversation.title = Some(title.clone());
        }
        if let Some(group_ids) = &patch.group_ids {
            conversation.group_ids = group_ids.clone();
        }
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.record("delete_conversation")?;
        self.conversations.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn send_message(&self, _conversation_id: &str, request: &SendMessageRequest) -> Result<ChatReply> {
        self.record("send_message")?;
        self.requests.lock().unwrap().push(request.clone());
        match self.reply.lock().unwrap().clone() {
            Some(text) => Ok(ChatReply {
                answer: ReplyAnswer::Text(text),
                source_nodes: Vec::new(),
                title: None,
            }),
            None => Err(ClientError::Api {
                status: 503,
                message: "model unavailable".into(),
            }),
        }
    }

    async fn stream_message(&self, _conversation_id: &str, request: &SendMessageRequest) -> Result<ByteStream> {
        self.record("stream_message")?;
        self.requests.lock().unwrap().push(request.clone());
        if let Some(rx) = self.stream_feed.lock().unwrap().take() {
            return Ok(Box::pin(rx));
        }
        match self.stream_script.lock().unwrap().take() {
            Some(chunks) => {
                let items: Vec<Result<Vec<u8>>> = chunks.into_iter().map(|c| Ok(c.into_bytes())).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            None => Err(Self::not_found("stream endpoint")),
        }
    }
}

#[async_trait]
impl KnowledgeApi for FakeBackend {
    async fn list_groups(&self) -> Result<Vec<KnowledgeGroup>> {
        self.record("list_groups")?;
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn create_group(&self, draft: &GroupDraft) -> Result<KnowledgeGroup> {
        self.record("create_group")?;
        let mut groups = self.groups.lock().unwrap();
        if groups.iter().any(|g| g.name == draft.name) {
            return Err(ClientError::Api {
                status: 409,
                message: format!("名为 '{}' 的组已存在。", draft.name),
            });
        }
        let group = KnowledgeGroup {
            id: self.next_id("group"),
            name: draft.name.clone(),
            description: draft.description.clone(),
            embedding_model: draft.embedding_model.clone(),
            rerank_model: draft.rerank_model.clone(),
        };
        groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        self.record("delete_group")?;
        self.groups.lock().unwrap().retain(|g| g.id != id);
        Ok(())
    }

    async fn list_sources(&self, group_id: &str) -> Result<Vec<KnowledgeSource>> {
        self.record("list_sources")?;
        Ok(self.sources.lock().unwrap().get(group_id).cloned().unwrap_or_default())
    }

    async fn upload_files(&self, group_id: &str, files: Vec<UploadFile>) -> Result<String> {
        self.record("upload_files")?;
        let count = files.len();
        if *self.index_uploads.lock().unwrap() {
            let listed: Vec<KnowledgeSource> = files
                .into_iter()
                .map(|f| KnowledgeSource {
                    kind: SourceKind::File,
                    name: format!("{}_{}", self.next_id("upload"), f.file_name),
                    status: None,
                    error: None,
                })
                .collect();
            self.sources
                .lock()
                .unwrap()
                .entry(group_id.to_string())
                .or_default()
                .extend(listed);
        }
        Ok(format!("{} file(s) accepted for processing", count))
    }

    async fn import_url(&self, group_id: &str, url: &str) -> Result<String> {
        self.record("import_url")?;
        if *self.index_uploads.lock().unwrap() {
            self.sources
                .lock()
                .unwrap()
                .entry(group_id.to_string())
                .or_default()
                .push(KnowledgeSource {
                    kind: SourceKind::Web,
                    name: url.to_string(),
                    status: None,
                    error: None,
                });
        }
        Ok(format!("Imported {}", url))
    }

    async fn delete_sources(&self, group_id: &str, names: &[String]) -> Result<()> {
        self.record("delete_sources")?;
        if let Some(sources) = self.sources.lock().unwrap().get_mut(group_id) {
            sources.retain(|s| !names.contains(&s.name));
        }
        self.deleted_sources.lock().unwrap().extend(names.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl AgentApi for FakeBackend {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.record("list_agents")?;
        Ok(self.agents.lock().unwrap().clone())
    }

    async fn create_agent(&self, draft: &AgentDraft) -> Result<Agent> {
        self.record("create_agent")?;
        let mut agent = Agent {
            id: self.next_id("agent"),
            name: String::new(),
            system_prompt: String::new(),
            description: String::new(),
            enable_mcp: false,
            tools: String::new(),
            created_at: Some("2025-07-03T12:00:00".to_string()),
        };
        draft.apply_to(&mut agent);
        self.agents.lock().unwrap().push(agent.clone());
        Ok(agent)
    }

    async fn update_agent(&self, id: &str, draft: &AgentDraft) -> Result<Agent> {
        self.record("update_agent")?;
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Self::not_found("agent"))?;
        draft.apply_to(agent);
        Ok(agent.clone())
    }

    async fn delete_agent(&self, id: &str) -> Result<()> {
        self.record("delete_agent")?;
        self.agents.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }
}
