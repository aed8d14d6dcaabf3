use super::{Agents, Conversations};
use crate::api::models::{Conversation, ConversationSummary, Message, QueryResponse};
use crate::api::ApiClient;
use crate::attachments;
use crate::store::conversation::{ChatStreamEvent, ConversationState, SendOptions};
use std::path::PathBuf;
use tauri::{AppHandle, Emitter, State};

#[tauri::command]
pub async fn list_conversations(
    store: State<'_, Conversations>,
) -> Result<Vec<ConversationSummary>, String> {
    store.load_conversations().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn search_conversations(
    store: State<'_, Conversations>,
    query: String,
) -> Result<Vec<ConversationSummary>, String> {
    store
        .search_conversations(&query)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn open_conversation(
    store: State<'_, Conversations>,
    id: String,
) -> Result<Conversation, String> {
    store.open_conversation(&id).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn create_conversation(
    store: State<'_, Conversations>,
    agents: State<'_, Agents>,
    group_ids: Vec<String>,
    agent_id: Option<String>,
) -> Result<Conversation, String> {
    let agent_id = agent_id.or(agents.snapshot().selected_agent_id);
    store
        .new_conversation(group_ids, agent_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn rename_conversation(
    store: State<'_, Conversations>,
    id: String,
    title: String,
) -> Result<(), String> {
    store
        .rename_conversation(&id, &title)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_conversation_groups(
    store: State<'_, Conversations>,
    id: String,
    group_ids: Vec<String>,
) -> Result<(), String> {
    store
        .set_conversation_groups(&id, group_ids)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_conversation(
    store: State<'_, Conversations>,
    id: String,
) -> Result<(), String> {
    store.delete_conversation(&id).await.map_err(|e| e.to_string())
}

/// Send a message in the open conversation. Reply text arrives as
/// `chat-stream` events; the finished message is returned. Without an explicit
/// agent the one selected in the agent panel is used.
#[tauri::command]
pub async fn send_message(
    app: AppHandle,
    store: State<'_, Conversations>,
    agents: State<'_, Agents>,
    text: String,
    images: Option<Vec<String>>,
    options: Option<SendOptions>,
) -> Result<Message, String> {
    let options = options
        .unwrap_or_default()
        .or_agent(agents.snapshot().selected_agent_id);
    store
        .send_message(
            &text,
            images.unwrap_or_default(),
            options,
            move |event: ChatStreamEvent| {
                let _ = app.emit("chat-stream", event);
            },
        )
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_conversation_state(store: State<'_, Conversations>) -> ConversationState {
    store.snapshot()
}

#[tauri::command]
pub fn clear_conversation_error(store: State<'_, Conversations>) {
    store.clear_error();
}

/// Read a picked image into a `data:` URL for the composer preview.
#[tauri::command]
pub async fn load_image_attachment(path: PathBuf) -> Result<String, String> {
    attachments::load_image(&path)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn query_knowledge(
    api: State<'_, ApiClient>,
    query_text: String,
    group_ids: Vec<String>,
) -> Result<QueryResponse, String> {
    api.query(&query_text, &group_ids)
        .await
        .map_err(|e| e.to_string())
}
