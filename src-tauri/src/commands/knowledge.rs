use super::Knowledge;
use crate::api::models::{GroupDraft, KnowledgeGroup};
use crate::config::ClientConfig;
use crate::db::Database;
use crate::poller::Poller;
use crate::store::knowledge::KnowledgeState;
use std::path::PathBuf;
use tauri::{AppHandle, Emitter, State};

/// Poll the selected group while any of its sources is still processing.
/// Each refresh is pushed to the webview as `knowledge-updated`.
fn watch_processing(app: &AppHandle, db: &Database, store: &Knowledge, poller: &Poller) {
    if !store.has_pending() {
        return;
    }
    let interval = match ClientConfig::load(db) {
        Ok(config) => config.poll_interval(),
        Err(e) => {
            log::warn!("using default poll interval: {}", e);
            ClientConfig::default().poll_interval()
        }
    };

    let store = store.clone();
    let app = app.clone();
    let started = poller.start(interval, move || {
        let store = store.clone();
        let app = app.clone();
        async move {
            if let Err(e) = store.refresh_sources().await {
                log::warn!("stopped polling knowledge sources: {}", e);
                return false;
            }
            let _ = app.emit("knowledge-updated", store.snapshot());
            store.has_pending()
        }
    });
    if started {
        log::debug!("polling knowledge sources every {:?}", interval);
    }
}

#[tauri::command]
pub async fn list_groups(store: State<'_, Knowledge>) -> Result<Vec<KnowledgeGroup>, String> {
    store.load_groups().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn create_group(
    store: State<'_, Knowledge>,
    draft: GroupDraft,
) -> Result<KnowledgeGroup, String> {
    store.create_group(draft).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_group(
    store: State<'_, Knowledge>,
    poller: State<'_, Poller>,
    id: String,
) -> Result<(), String> {
    let was_selected = store.snapshot().selected_group_id.as_deref() == Some(id.as_str());
    store.delete_group(&id).await.map_err(|e| e.to_string())?;
    if was_selected {
        poller.stop();
    }
    Ok(())
}

#[tauri::command]
pub async fn select_group(
    app: AppHandle,
    db: State<'_, Database>,
    store: State<'_, Knowledge>,
    poller: State<'_, Poller>,
    id: String,
) -> Result<KnowledgeState, String> {
    poller.stop();
    store.select_group(&id).await.map_err(|e| e.to_string())?;
    watch_processing(&app, &db, &store, &poller);
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn refresh_sources(store: State<'_, Knowledge>) -> Result<KnowledgeState, String> {
    store.refresh_sources().await.map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn upload_files(
    app: AppHandle,
    db: State<'_, Database>,
    store: State<'_, Knowledge>,
    poller: State<'_, Poller>,
    paths: Vec<PathBuf>,
) -> Result<String, String> {
    let message = store.upload_files(&paths).await.map_err(|e| e.to_string())?;
    let _ = app.emit("knowledge-updated", store.snapshot());
    watch_processing(&app, &db, &store, &poller);
    Ok(message)
}

#[tauri::command]
pub async fn import_url(
    app: AppHandle,
    db: State<'_, Database>,
    store: State<'_, Knowledge>,
    poller: State<'_, Poller>,
    url: String,
) -> Result<String, String> {
    let message = store.import_url(&url).await.map_err(|e| e.to_string())?;
    let _ = app.emit("knowledge-updated", store.snapshot());
    watch_processing(&app, &db, &store, &poller);
    Ok(message)
}

#[tauri::command]
pub async fn delete_file(store: State<'_, Knowledge>, name: String) -> Result<(), String> {
    store.delete_file(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_url(store: State<'_, Knowledge>, url: String) -> Result<(), String> {
    store.delete_url(&url).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_knowledge_state(store: State<'_, Knowledge>) -> KnowledgeState {
    store.snapshot()
}

#[tauri::command]
pub fn clear_knowledge_error(store: State<'_, Knowledge>) {
    store.clear_error();
}
