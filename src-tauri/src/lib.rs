//! Desktop client for a retrieval-augmented assistant backend.
//!
//! The client core (HTTP API, reply streaming, state stores, settings) builds
//! without a webview. The `desktop` feature adds the Tauri shell in `run()`.

pub mod api;
pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod poller;
pub mod store;
pub mod stream;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use api::ApiClient;
    use config::ClientConfig;
    use db::Database;
    use poller::Poller;
    use std::sync::Arc;
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            let app_dir = app.path().app_data_dir()?;
            let database = Database::new(&app_dir)?;
            let config = ClientConfig::load(&database)?;
            log::info!("using backend at {}", config.api_base_url);

            let api = ApiClient::new(&config)?;
            let backend = Arc::new(api.clone());
            let conversations = commands::Conversations::new(Arc::clone(&backend));
            conversations.configure(config.streaming_enabled, config.default_chat_mode);

            app.manage(conversations);
            app.manage(commands::Knowledge::new(Arc::clone(&backend)));
            app.manage(commands::Agents::new(backend));
            app.manage(Poller::new());
            app.manage(api);
            app.manage(database);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::chat::list_conversations,
            commands::chat::search_conversations,
            commands::chat::open_conversation,
            commands::chat::create_conversation,
            commands::chat::rename_conversation,
            commands::chat::set_conversation_groups,
            commands::chat::delete_conversation,
            commands::chat::send_message,
            commands::chat::get_conversation_state,
            commands::chat::clear_conversation_error,
            commands::chat::load_image_attachment,
            commands::chat::query_knowledge,
            commands::knowledge::list_groups,
            commands::knowledge::create_group,
            commands::knowledge::delete_group,
            commands::knowledge::select_group,
            commands::knowledge::refresh_sources,
            commands::knowledge::upload_files,
            commands::knowledge::import_url,
            commands::knowledge::delete_file,
            commands::knowledge::delete_url,
            commands::knowledge::get_knowledge_state,
            commands::knowledge::clear_knowledge_error,
            commands::agents::list_agents,
            commands::agents::create_agent,
            commands::agents::update_agent,
            commands::agents::delete_agent,
            commands::agents::select_agent,
            commands::agents::get_agent_state,
            commands::agents::clear_agent_error,
            commands::settings::get_settings,
            commands::settings::set_setting,
            commands::settings::delete_setting,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
