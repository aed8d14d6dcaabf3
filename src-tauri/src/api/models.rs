use crate::error::ClientError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the last-message preview shown in the conversation list.
const SUMMARY_CHARS: usize = 50;

fn local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Conversations ──

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub last_message_summary: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn summary(&self) -> ConversationSummary {
        let last_message_summary = self
            .messages
            .iter()
            .rev()
            .find(|m| !m.generating)
            .map(|m| summarize(&m.content.text()))
            .unwrap_or_default();
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            group_ids: self.group_ids.clone(),
            last_message_summary,
        }
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

/// First 50 characters of a message, with an ellipsis when cut.
pub fn summarize(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > SUMMARY_CHARS {
        let head: String = text.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NewConversation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConversationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<String>>,
}

// ── Messages ──

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    #[serde(default = "local_id")]
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, alias = "source_nodes", skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceNode>,
    #[serde(default)]
    pub generating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn user(content: MessageContent) -> Self {
        Self {
            id: local_id(),
            role: Role::User,
            content,
            sources: Vec::new(),
            generating: false,
            timestamp: None,
        }
    }

    /// Empty assistant message shown while a reply is being produced.
    pub fn placeholder() -> Self {
        Self {
            id: local_id(),
            role: Role::Assistant,
            content: MessageContent::Text(String::new()),
            sources: Vec::new(),
            generating: true,
            timestamp: None,
        }
    }
}

/// Plain text, or an ordered list of text and image parts.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

impl MessageContent {
    /// Build content from what the user typed plus attached images.
    pub fn compose(text: &str, images: &[String]) -> Self {
        if images.is_empty() {
            return MessageContent::Text(text.to_string());
        }
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        parts.extend(images.iter().map(|url| ContentPart::Image { url: url.clone() }));
        MessageContent::Parts(parts)
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(t) => t.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Append a streamed delta. Part lists get a trailing text part.
    pub fn push_str(&mut self, delta: &str) {
        match self {
            MessageContent::Text(t) => t.push_str(delta),
            MessageContent::Parts(parts) => match parts.last_mut() {
                Some(ContentPart::Text { text }) => text.push_str(delta),
                _ => parts.push(ContentPart::Text {
                    text: delta.to_string(),
                }),
            },
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Multimodal(LegacyMultimodal),
}

/// Older history files store `{"type": "multimodal", "text": ..., "images": [...]}`.
#[derive(Deserialize)]
struct LegacyMultimodal {
    #[serde(default)]
    text: String,
    #[serde(default)]
    images: Vec<String>,
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawContent::deserialize(deserializer)? {
            RawContent::Text(t) => MessageContent::Text(t),
            RawContent::Parts(parts) => MessageContent::Parts(parts),
            RawContent::Multimodal(legacy) => MessageContent::compose(&legacy.text, &legacy.images),
        })
    }
}

/// A retrieved passage cited by an answer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SourceNode {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub page_label: String,
    #[serde(default)]
    pub text_snippet: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Normal,
    Rag,
    WebSearch,
}

impl FromStr for ChatMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(ChatMode::Normal),
            "rag" => Ok(ChatMode::Rag),
            "web_search" | "web" => Ok(ChatMode::WebSearch),
            other => Err(ClientError::validation(format!("Unknown chat mode: {}", other))),
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChatMode::Normal => "normal",
            ChatMode::Rag => "rag",
            ChatMode::WebSearch => "web_search",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SendMessageRequest {
    pub query_text: String,
    pub group_ids: Vec<String>,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub mode: ChatMode,
    pub enable_deep_thinking: bool,
}

/// Blocking reply. `answer` is either a message object or a bare string.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatReply {
    pub answer: ReplyAnswer,
    #[serde(default)]
    pub source_nodes: Vec<SourceNode>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ReplyAnswer {
    Text(String),
    Message(Message),
}

impl ReplyAnswer {
    pub fn into_content(self) -> MessageContent {
        match self {
            ReplyAnswer::Text(t) => MessageContent::Text(t),
            ReplyAnswer::Message(m) => m.content,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub query_text: String,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub source_nodes: Vec<SourceNode>,
}

// ── Knowledge base ──

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KnowledgeGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub rerank_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GroupDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Completed,
    Processing,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Web,
}

/// Entry of `GET groups/{id}/sources`. The backend identifies sources by name
/// (file name or URL) and only lists them once indexed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KnowledgeSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    #[serde(default)]
    pub status: Option<SourceStatus>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KnowledgeFile {
    pub id: String,
    #[serde(alias = "file_name")]
    pub name: String,
    pub status: SourceStatus,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl KnowledgeFile {
    pub fn new(name: &str, status: SourceStatus) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            status,
            size: None,
            error: None,
            created_at: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KnowledgeUrl {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub status: SourceStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl KnowledgeUrl {
    pub fn new(url: &str, status: SourceStatus) -> Self {
        Self {
            id: url.to_string(),
            url: url.to_string(),
            title: None,
            status,
            error: None,
            created_at: None,
        }
    }
}

/// Split a source listing into files and web pages. Listed sources without a
/// status are indexed.
pub fn split_sources(sources: Vec<KnowledgeSource>) -> (Vec<KnowledgeFile>, Vec<KnowledgeUrl>) {
    let mut files = Vec::new();
    let mut urls = Vec::new();
    for source in sources {
        let status = source.status.unwrap_or(SourceStatus::Completed);
        match source.kind {
            SourceKind::File => {
                let mut file = KnowledgeFile::new(&source.name, status);
                file.error = source.error;
                files.push(file);
            }
            SourceKind::Web => {
                let mut url = KnowledgeUrl::new(&source.name, status);
                url.error = source.error;
                urls.push(url);
            }
        }
    }
    (files, urls)
}

/// JSON body that imports a web page through the upload endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UrlImport {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourcesDelete {
    pub sources: Vec<String>,
}

/// `{"message": ...}` acknowledgement returned by write endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

/// A file read from disk, ready for a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

// ── Agents ──

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "enable_MCP")]
    pub enable_mcp: bool,
    #[serde(default)]
    pub tools: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AgentDraft {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "enable_MCP")]
    pub enable_mcp: bool,
    #[serde(default)]
    pub tools: String,
}

impl AgentDraft {
    /// Apply a successful update to a local copy.
    pub fn apply_to(&self, agent: &mut Agent) {
        agent.name = self.name.clone();
        agent.system_prompt = self.system_prompt.clone();
        agent.description = self.description.clone();
        agent.enable_mcp = self.enable_mcp;
        agent.tools = self.tools.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_plain_and_parts() {
        let text: MessageContent = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, MessageContent::Text("hello".into()));

        let parts: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "look"},
            {"type": "image", "url": "data:image/png;base64,AAAA"}
        ]))
        .unwrap();
        assert_eq!(parts.text(), "look");
        assert!(matches!(&parts, MessageContent::Parts(p) if p.len() == 2));
    }

    #[test]
    fn test_legacy_multimodal_becomes_parts() {
        let content: MessageContent = serde_json::from_value(json!({
            "type": "multimodal",
            "text": "what is this",
            "images": ["data:image/jpeg;base64,/9j/"]
        }))
        .unwrap();
        assert_eq!(
            content,
            MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "what is this".into()
                },
                ContentPart::Image {
                    url: "data:image/jpeg;base64,/9j/".into()
                },
            ])
        );
    }

    #[test]
    fn test_message_without_id_gets_one() {
        let msg: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hi",
            "timestamp": "2025-07-01T10:00:00"
        }))
        .unwrap();
        assert!(!msg.id.is_empty());
        assert_eq!(msg.role, Role::Assistant);
        assert!(!msg.generating);
    }

    #[test]
    fn test_push_str_on_parts_appends_text_part() {
        let mut content = MessageContent::compose("", &["data:image/png;base64,AA".into()]);
        content.push_str("An ");
        content.push_str("image.");
        assert_eq!(content.text(), "An image.");
    }

    #[test]
    fn test_reply_answer_shapes() {
        let reply: ChatReply = serde_json::from_value(json!({
            "answer": {"role": "assistant", "content": "42"},
            "source_nodes": [{"score": 0.9, "group_id": "g", "file_name": "a.pdf",
                              "page_label": "3", "text_snippet": "..."}]
        }))
        .unwrap();
        assert_eq!(reply.source_nodes.len(), 1);
        assert_eq!(reply.answer.into_content().text(), "42");

        let reply: ChatReply = serde_json::from_value(json!({"answer": "plain"})).unwrap();
        assert_eq!(reply.answer.into_content().text(), "plain");
    }

    #[test]
    fn test_summary_truncates() {
        let long = "x".repeat(80);
        assert_eq!(summarize(&long).chars().count(), 53);
        assert_eq!(summarize("  short  "), "short");
    }

    #[test]
    fn test_agent_mcp_field_name() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1", "name": "Astro", "system_prompt": "You answer space questions.",
            "enable_MCP": true
        }))
        .unwrap();
        assert!(agent.enable_mcp);
        let out = serde_json::to_value(&agent).unwrap();
        assert_eq!(out["enable_MCP"], json!(true));
    }

    #[test]
    fn test_chat_mode_parse() {
        assert_eq!("Web_Search".parse::<ChatMode>().unwrap(), ChatMode::WebSearch);
        assert_eq!(ChatMode::Rag.to_string(), "rag");
        assert!("turbo".parse::<ChatMode>().is_err());
    }

    #[test]
    fn test_split_sources_by_type() {
        let sources: Vec<KnowledgeSource> = serde_json::from_value(json!([
            {"type": "file", "name": "orbits.pdf"},
            {"type": "web", "name": "https://nasa.gov/moons"},
            {"type": "file", "name": "comets.md", "status": "failed", "error": "unreadable"}
        ]))
        .unwrap();
        let (files, urls) = split_sources(sources);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "orbits.pdf");
        assert_eq!(files[0].status, SourceStatus::Completed);
        assert_eq!(files[1].error.as_deref(), Some("unreadable"));
        assert_eq!(urls[0].url, "https://nasa.gov/moons");
        assert_eq!(urls[0].status, SourceStatus::Completed);
    }

    #[test]
    fn test_knowledge_file_accepts_file_name() {
        let file: KnowledgeFile = serde_json::from_value(json!({
            "id": "f1", "file_name": "orbits.pdf", "status": "processing"
        }))
        .unwrap();
        assert_eq!(file.name, "orbits.pdf");
        assert_eq!(file.status, SourceStatus::Processing);
    }
}
