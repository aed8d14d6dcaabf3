use crate::api::models::{
    ChatMode, Conversation, ConversationPatch, ConversationSummary, Message, MessageContent,
    NewConversation, Role, SendMessageRequest, SourceNode,
};
use crate::api::ConversationApi;
use crate::error::{ClientError, Result};
use crate::stream::{self, StreamEvent, StreamOutcome};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    pub conversations: Vec<ConversationSummary>,
    pub current: Option<Conversation>,
    pub is_loading: bool,
    pub is_generating: bool,
    pub search_query: Option<String>,
    pub streaming_enabled: bool,
    pub default_mode: ChatMode,
    pub error: Option<String>,
    #[serde(skip)]
    loads: usize,
}

impl ConversationState {
    fn begin_load(&mut self) {
        self.loads += 1;
        self.is_loading = true;
    }

    fn end_load(&mut self) {
        self.loads = self.loads.saturating_sub(1);
        self.is_loading = self.loads > 0;
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            current: None,
            is_loading: false,
            is_generating: false,
            search_query: None,
            streaming_enabled: true,
            default_mode: ChatMode::Normal,
            error: None,
            loads: 0,
        }
    }
}

/// Per-message choices made in the composer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub mode: Option<ChatMode>,
    #[serde(default)]
    pub enable_deep_thinking: bool,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl SendOptions {
    /// Use `agent_id` unless the composer already picked an agent.
    pub fn or_agent(mut self, agent_id: Option<String>) -> Self {
        if self.agent_id.is_none() {
            self.agent_id = agent_id;
        }
        self
    }
}

/// Pushed to the webview while a reply is produced.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatStreamEvent {
    pub conversation_id: String,
    pub message_id: String,
    pub delta: String,
    /// The placeholder was cleared; drop any text shown so far.
    pub reset: bool,
    pub done: bool,
}

struct Reply {
    content: MessageContent,
    sources: Vec<SourceNode>,
    title: Option<String>,
}

/// Conversation list plus the open conversation, kept in sync with the backend.
pub struct ConversationStore<B> {
    backend: Arc<B>,
    state: Arc<Mutex<ConversationState>>,
}

impl<B> Clone for ConversationStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: ConversationApi> ConversationStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(ConversationState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail<T>(&self, err: ClientError) -> Result<T> {
        log::error!("conversation store: {}", err);
        self.lock().error = Some(err.to_string());
        Err(err)
    }

    pub fn snapshot(&self) -> ConversationState {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn configure(&self, streaming_enabled: bool, default_mode: ChatMode) {
        let mut state = self.lock();
        state.streaming_enabled = streaming_enabled;
        state.default_mode = default_mode;
    }

    pub async fn load_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.lock().begin_load();
        let result = self.backend.list_conversations().await;
        self.lock().end_load();
        match result {
            Ok(list) => {
                let mut state = self.lock();
                state.conversations = list.clone();
                state.search_query = None;
                state.error = None;
                Ok(list)
            }
            Err(e) => self.fail(e),
        }
    }

    /// A blank query restores the full list.
    pub async fn search_conversations(&self, query: &str) -> Result<Vec<ConversationSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return self.load_conversations().await;
        }
        match self.backend.search_conversations(query).await {
            Ok(list) => {
                let mut state = self.lock();
                state.conversations = list.clone();
                state.search_query = Some(query.to_string());
                Ok(list)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn open_conversation(&self, id: &str) -> Result<Conversation> {
        self.lock().begin_load();
        let result = self.backend.get_conversation(id).await;
        self.lock().end_load();
        match result {
            Ok(conversation) => {
                self.lock().current = Some(conversation.clone());
                Ok(conversation)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn new_conversation(
        &self,
        group_ids: Vec<String>,
        agent_id: Option<String>,
    ) -> Result<Conversation> {
        let request = NewConversation {
            title: None,
            group_ids,
            agent_id,
        };
        match self.backend.create_conversation(&request).await {
            Ok(conversation) => {
                log::info!("created conversation {}", conversation.id);
                let mut state = self.lock();
                state.conversations.retain(|c| c.id != conversation.id);
                state.conversations.insert(0, conversation.summary());
                state.current = Some(conversation.clone());
                Ok(conversation)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return self.fail(ClientError::validation("Title cannot be empty"));
        }

        let previous = {
            let mut state = self.lock();
            let previous = state
                .conversations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.title.clone())
                .or_else(|| {
                    state
                        .current
                        .as_ref()
                        .filter(|c| c.id == id)
                        .map(|c| c.title.clone())
                });
            set_title(&mut state, id, Some(title.to_string()));
            previous.flatten()
        };

        let patch = ConversationPatch {
            title: Some(title.to_string()),
            group_ids: None,
        };
        if let Err(e) = self.backend.update_conversation(id, &patch).await {
            set_title(&mut self.lock(), id, previous);
            return self.fail(e);
        }
        Ok(())
    }

    pub async fn set_conversation_groups(&self, id: &str, group_ids: Vec<String>) -> Result<()> {
        let patch = ConversationPatch {
            title: None,
            group_ids: Some(group_ids.clone()),
        };
        match self.backend.update_conversation(id, &patch).await {
            Ok(_) => {
                let mut state = self.lock();
                if let Some(summary) = state.conversations.iter_mut().find(|c| c.id == id) {
                    summary.group_ids = group_ids.clone();
                }
                if let Some(current) = state.current.as_mut().filter(|c| c.id == id) {
                    current.group_ids = group_ids;
                }
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let (removed, closed) = {
            let mut state = self.lock();
            let removed = state
                .conversations
                .iter()
                .position(|c| c.id == id)
                .map(|idx| (idx, state.conversations.remove(idx)));
            let closed = if state.current.as_ref().is_some_and(|c| c.id == id) {
                state.current.take()
            } else {
                None
            };
            (removed, closed)
        };

        if let Err(e) = self.backend.delete_conversation(id).await {
            let mut state = self.lock();
            if let Some((idx, summary)) = removed {
                let idx = idx.min(state.conversations.len());
                state.conversations.insert(idx, summary);
            }
            if closed.is_some() && state.current.is_none() {
                state.current = closed;
            }
            drop(state);
            return self.fail(e);
        }
        log::info!("deleted conversation {}", id);
        Ok(())
    }

    /// Send a message in the open conversation (creating one if needed).
    ///
    /// The user message and an assistant placeholder are appended immediately.
    /// The reply is streamed into the placeholder; if streaming fails for any
    /// reason the placeholder is cleared and one blocking request is made. If
    /// that fails too, both messages are removed again.
    pub async fn send_message<F>(
        &self,
        text: &str,
        images: Vec<String>,
        options: SendOptions,
        on_event: F,
    ) -> Result<Message>
    where
        F: Fn(ChatStreamEvent) + Send + Sync,
    {
        let text = text.trim().to_string();
        if text.is_empty() && images.is_empty() {
            return self.fail(ClientError::validation("Message is empty"));
        }
        {
            let mut state = self.lock();
            if state.is_generating {
                drop(state);
                return self.fail(ClientError::validation(
                    "A reply is still being generated",
                ));
            }
            state.is_generating = true;
            state.error = None;
        }

        let open_id = self.lock().current.as_ref().map(|c| c.id.clone());
        let conversation_id = match open_id {
            Some(id) => id,
            None => match self
                .new_conversation(Vec::new(), options.agent_id.clone())
                .await
            {
                Ok(conversation) => conversation.id,
                Err(e) => {
                    self.lock().is_generating = false;
                    return Err(e);
                }
            },
        };

        let prepared = {
            let mut state = self.lock();
            let streaming = state.streaming_enabled;
            let default_mode = state.default_mode;
            match state.current.as_mut().filter(|c| c.id == conversation_id) {
                Some(conversation) => {
                    let user = Message::user(MessageContent::compose(&text, &images));
                    let placeholder = Message::placeholder();
                    let ids = (user.id.clone(), placeholder.id.clone());
                    conversation.messages.push(user);
                    conversation.messages.push(placeholder);

                    let mode = options.mode.unwrap_or(if conversation.group_ids.is_empty() {
                        default_mode
                    } else {
                        ChatMode::Rag
                    });
                    let request = SendMessageRequest {
                        query_text: text.clone(),
                        group_ids: conversation.group_ids.clone(),
                        images,
                        agent_id: options.agent_id.clone().or_else(|| conversation.agent_id.clone()),
                        mode,
                        enable_deep_thinking: options.enable_deep_thinking,
                    };
                    Some((ids, request, streaming))
                }
                None => None,
            }
        };
        let Some(((user_id, placeholder_id), request, streaming)) = prepared else {
            self.lock().is_generating = false;
            return self.fail(ClientError::validation("Conversation is no longer open"));
        };

        let event = |delta: String, reset: bool, done: bool| ChatStreamEvent {
            conversation_id: conversation_id.clone(),
            message_id: placeholder_id.clone(),
            delta,
            reset,
            done,
        };

        let mut streamed = None;
        if streaming {
            match self
                .stream_reply(&conversation_id, &placeholder_id, &request, &on_event)
                .await
            {
                Ok(outcome) => streamed = Some(outcome),
                Err(e) => {
                    log::warn!("streaming reply failed, retrying without stream: {}", e);
                    self.reset_placeholder(&conversation_id, &placeholder_id);
                    on_event(event(String::new(), true, false));
                }
            }
        }

        let reply = match streamed {
            Some(outcome) => Ok(Reply {
                content: MessageContent::Text(outcome.content),
                sources: outcome.sources,
                title: outcome.title,
            }),
            None => self
                .backend
                .send_message(&conversation_id, &request)
                .await
                .map(|reply| {
                    let content = reply.answer.into_content();
                    on_event(event(content.text(), false, false));
                    Reply {
                        content,
                        sources: reply.source_nodes,
                        title: reply.title,
                    }
                }),
        };

        match reply {
            Ok(reply) => {
                let message = self.finalize(&conversation_id, &placeholder_id, reply);
                on_event(event(String::new(), false, true));
                Ok(message)
            }
            Err(e) => {
                {
                    let mut state = self.lock();
                    state.is_generating = false;
                    if let Some(conversation) =
                        state.current.as_mut().filter(|c| c.id == conversation_id)
                    {
                        conversation
                            .messages
                            .retain(|m| m.id != user_id && m.id != placeholder_id);
                    }
                }
                on_event(event(String::new(), true, true));
                self.fail(e)
            }
        }
    }

    async fn stream_reply<F>(
        &self,
        conversation_id: &str,
        placeholder_id: &str,
        request: &SendMessageRequest,
        on_event: &F,
    ) -> Result<StreamOutcome>
    where
        F: Fn(ChatStreamEvent) + Send + Sync,
    {
        let body = self.backend.stream_message(conversation_id, request).await?;
        stream::consume(body, |event| match event {
            StreamEvent::Delta(delta) => {
                self.with_placeholder(conversation_id, placeholder_id, |m| {
                    m.content.push_str(delta)
                });
                on_event(ChatStreamEvent {
                    conversation_id: conversation_id.to_string(),
                    message_id: placeholder_id.to_string(),
                    delta: delta.clone(),
                    reset: false,
                    done: false,
                });
            }
            StreamEvent::Sources(sources) => {
                self.with_placeholder(conversation_id, placeholder_id, |m| {
                    m.sources = sources.clone()
                });
            }
            StreamEvent::Done(_) | StreamEvent::Error(_) => {}
        })
        .await
    }

    fn with_placeholder(&self, conversation_id: &str, placeholder_id: &str, f: impl FnOnce(&mut Message)) {
        let mut state = self.lock();
        if let Some(message) = state
            .current
            .as_mut()
            .filter(|c| c.id == conversation_id)
            .and_then(|c| c.message_mut(placeholder_id))
        {
            f(message);
        }
    }

    fn reset_placeholder(&self, conversation_id: &str, placeholder_id: &str) {
        self.with_placeholder(conversation_id, placeholder_id, |m| {
            m.content = MessageContent::Text(String::new());
            m.sources.clear();
        });
    }

    fn finalize(&self, conversation_id: &str, placeholder_id: &str, reply: Reply) -> Message {
        let message = Message {
            id: placeholder_id.to_string(),
            role: Role::Assistant,
            content: reply.content,
            sources: reply.sources,
            generating: false,
            timestamp: None,
        };

        let mut state = self.lock();
        state.is_generating = false;

        let mut summary = None;
        if let Some(conversation) = state.current.as_mut().filter(|c| c.id == conversation_id) {
            if let Some(slot) = conversation.message_mut(placeholder_id) {
                *slot = message.clone();
            }
            if let Some(title) = &reply.title {
                conversation.title = Some(title.clone());
            }
            summary = Some(conversation.summary());
        }

        let idx = state.conversations.iter().position(|c| c.id == conversation_id);
        let mut entry = match (summary, idx) {
            (Some(summary), Some(idx)) => {
                state.conversations.remove(idx);
                summary
            }
            (Some(summary), None) => summary,
            (None, Some(idx)) => {
                let mut entry = state.conversations.remove(idx);
                entry.last_message_summary = crate::api::models::summarize(&message.content.text());
                entry
            }
            (None, None) => return message,
        };
        if reply.title.is_some() {
            entry.title = reply.title;
        }
        state.conversations.insert(0, entry);
        message
    }
}

fn set_title(state: &mut ConversationState, id: &str, title: Option<String>) {
    if let Some(summary) = state.conversations.iter_mut().find(|c| c.id == id) {
        summary.title = title.clone();
    }
    if let Some(current) = state.current.as_mut().filter(|c| c.id == id) {
        current.title = title;
    }
}
