use super::Agents;
use crate::api::models::{Agent, AgentDraft};
use crate::store::agent::AgentState;
use tauri::State;

#[tauri::command]
pub async fn list_agents(store: State<'_, Agents>) -> Result<Vec<Agent>, String> {
    store.load_agents().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn create_agent(store: State<'_, Agents>, draft: AgentDraft) -> Result<Agent, String> {
    store.create_agent(draft).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn update_agent(
    store: State<'_, Agents>,
    id: String,
    draft: AgentDraft,
) -> Result<Agent, String> {
    store.update_agent(&id, draft).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_agent(store: State<'_, Agents>, id: String) -> Result<(), String> {
    store.delete_agent(&id).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn select_agent(store: State<'_, Agents>, id: Option<String>) -> Result<(), String> {
    store.select_agent(id.as_deref()).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_agent_state(store: State<'_, Agents>) -> AgentState {
    store.snapshot()
}

#[tauri::command]
pub fn clear_agent_error(store: State<'_, Agents>) {
    store.clear_error();
}
