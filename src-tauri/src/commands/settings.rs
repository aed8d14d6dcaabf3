use super::Conversations;
use crate::api::ApiClient;
use crate::config::{self, ClientConfig, SETTING_KEYS};
use crate::db::Database;
use std::collections::HashMap;
use tauri::State;

/// Push persisted settings into the live client and stores. The request
/// timeout is read once at startup.
fn apply(db: &Database, api: &ApiClient, conversations: &Conversations) -> Result<(), String> {
    let config = ClientConfig::load(db).map_err(|e| e.to_string())?;
    api.set_base_url(&config.api_base_url)
        .map_err(|e| e.to_string())?;
    api.set_token(config.api_token);
    conversations.configure(config.streaming_enabled, config.default_chat_mode);
    Ok(())
}

#[tauri::command]
pub fn get_settings(db: State<'_, Database>) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for (key, value) in db.all_settings().map_err(|e| e.to_string())? {
        if !SETTING_KEYS.contains(&key.as_str()) {
            continue;
        }
        // Mask API tokens for display
        if key == "api_token" {
            map.insert(key, config::mask_secret(&value));
        } else {
            map.insert(key, value);
        }
    }
    Ok(map)
}

#[tauri::command]
pub fn set_setting(
    db: State<'_, Database>,
    api: State<'_, ApiClient>,
    conversations: State<'_, Conversations>,
    key: String,
    value: String,
) -> Result<(), String> {
    config::validate_setting(&key, &value).map_err(|e| e.to_string())?;
    db.set_setting(&key, value.trim()).map_err(|e| e.to_string())?;
    log::info!("setting {} updated", key);
    apply(&db, &api, &conversations)
}

#[tauri::command]
pub fn delete_setting(
    db: State<'_, Database>,
    api: State<'_, ApiClient>,
    conversations: State<'_, Conversations>,
    key: String,
) -> Result<(), String> {
    if !SETTING_KEYS.contains(&key.as_str()) {
        return Err(format!("Unknown setting key: {}", key));
    }
    if db.delete_setting(&key).map_err(|e| e.to_string())? {
        log::info!("setting {} reset to default", key);
    }
    apply(&db, &api, &conversations)
}
