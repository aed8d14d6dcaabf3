//! Tauri command handlers. Each one forwards to a store and turns the error
//! into the string the webview shows.

pub mod agents;
pub mod chat;
pub mod knowledge;
pub mod settings;

use crate::api::ApiClient;
use crate::store::agent::AgentStore;
use crate::store::conversation::ConversationStore;
use crate::store::knowledge::KnowledgeStore;

pub type Conversations = ConversationStore<ApiClient>;
pub type Knowledge = KnowledgeStore<ApiClient>;
pub type Agents = AgentStore<ApiClient>;
