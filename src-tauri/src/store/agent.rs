use crate::api::models::{Agent, AgentDraft};
use crate::api::AgentApi;
use crate::error::{ClientError, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentState {
    pub agents: Vec<Agent>,
    pub selected_agent_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    #[serde(skip)]
    loads: usize,
}

impl AgentState {
    fn begin_load(&mut self) {
        self.loads += 1;
        self.is_loading = true;
    }

    fn end_load(&mut self) {
        self.loads = self.loads.saturating_sub(1);
        self.is_loading = self.loads > 0;
    }

    pub fn selected(&self) -> Option<&Agent> {
        let id = self.selected_agent_id.as_deref()?;
        self.agents.iter().find(|a| a.id == id)
    }
}

pub struct AgentStore<B> {
    backend: Arc<B>,
    state: Arc<Mutex<AgentState>>,
}

impl<B> Clone for AgentStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: AgentApi> AgentStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(AgentState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail<T>(&self, err: ClientError) -> Result<T> {
        log::error!("agent store: {}", err);
        self.lock().error = Some(err.to_string());
        Err(err)
    }

    /// Trim the draft and check it against the agents already loaded.
    /// `editing` is excluded from the name check.
    fn validate(&self, draft: &mut AgentDraft, editing: Option<&str>) -> Result<()> {
        draft.name = draft.name.trim().to_string();
        draft.system_prompt = draft.system_prompt.trim().to_string();
        if draft.name.is_empty() {
            return Err(ClientError::validation("Agent name cannot be empty"));
        }
        if draft.system_prompt.is_empty() {
            return Err(ClientError::validation("System prompt cannot be empty"));
        }
        let taken = self
            .lock()
            .agents
            .iter()
            .any(|a| a.name == draft.name && Some(a.id.as_str()) != editing);
        if taken {
            return Err(ClientError::validation(format!(
                "An agent named '{}' already exists",
                draft.name
            )));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> AgentState {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub async fn load_agents(&self) -> Result<Vec<Agent>> {
        self.lock().begin_load();
        let result = self.backend.list_agents().await;
        self.lock().end_load();
        match result {
            Ok(agents) => {
                let mut state = self.lock();
                if let Some(id) = state.selected_agent_id.clone() {
                    if !agents.iter().any(|a| a.id == id) {
                        state.selected_agent_id = None;
                    }
                }
                state.agents = agents.clone();
                state.error = None;
                Ok(agents)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn create_agent(&self, mut draft: AgentDraft) -> Result<Agent> {
        if let Err(e) = self.validate(&mut draft, None) {
            return self.fail(e);
        }
        match self.backend.create_agent(&draft).await {
            Ok(agent) => {
                log::info!("created agent {} ({})", agent.name, agent.id);
                self.lock().agents.push(agent.clone());
                Ok(agent)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn update_agent(&self, id: &str, mut draft: AgentDraft) -> Result<Agent> {
        if !self.lock().agents.iter().any(|a| a.id == id) {
            return self.fail(ClientError::validation(format!("Unknown agent: {}", id)));
        }
        if let Err(e) = self.validate(&mut draft, Some(id)) {
            return self.fail(e);
        }
        match self.backend.update_agent(id, &draft).await {
            Ok(updated) => {
                let mut state = self.lock();
                if let Some(slot) = state.agents.iter_mut().find(|a| a.id == id) {
                    *slot = updated.clone();
                }
                Ok(updated)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete_agent(&self, id: &str) -> Result<()> {
        let (removed, was_selected) = {
            let mut state = self.lock();
            let removed = state
                .agents
                .iter()
                .position(|a| a.id == id)
                .map(|idx| (idx, state.agents.remove(idx)));
            let was_selected = state.selected_agent_id.as_deref() == Some(id);
            if was_selected {
                state.selected_agent_id = None;
            }
            (removed, was_selected)
        };

        if let Err(e) = self.backend.delete_agent(id).await {
            {
                let mut state = self.lock();
                if let Some((idx, agent)) = removed {
                    let idx = idx.min(state.agents.len());
                    state.agents.insert(idx, agent);
                }
                if was_selected && state.selected_agent_id.is_none() {
                    state.selected_agent_id = Some(id.to_string());
                }
            }
            return self.fail(e);
        }
        log::info!("deleted agent {}", id);
        Ok(())
    }

    /// Choose the agent for new conversations; `None` chats without one.
    pub fn select_agent(&self, id: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        match id {
            Some(id) if !state.agents.iter().any(|a| a.id == id) => {
                drop(state);
                self.fail(ClientError::validation(format!("Unknown agent: {}", id)))
            }
            id => {
                state.selected_agent_id = id.map(str::to_string);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeBackend;

    fn draft(name: &str, prompt: &str) -> AgentDraft {
        AgentDraft {
            name: name.into(),
            system_prompt: prompt.into(),
            ..Default::default()
        }
    }

    async fn store_with(backend: FakeBackend) -> (AgentStore<FakeBackend>, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let store = AgentStore::new(Arc::clone(&backend));
        store.load_agents().await.unwrap();
        (store, backend)
    }

    #[tokio::test]
    async fn test_create_agent_validation() {
        let backend = FakeBackend::default();
        backend.add_agent("a1", "Astronomer");
        let (store, backend) = store_with(backend).await;

        let err = store.create_agent(draft("", "prompt")).await.unwrap_err();
        assert_eq!(err.to_string(), "Agent name cannot be empty");
        let err = store.create_agent(draft("Geologist", "  ")).await.unwrap_err();
        assert_eq!(err.to_string(), "System prompt cannot be empty");
        let err = store
            .create_agent(draft("Astronomer", "You study stars."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(!backend.was_called("create_agent"));
        assert!(store.snapshot().error.is_some());

        store.clear_error();
        let agent = store
            .create_agent(draft(" Geologist ", "You study rocks."))
            .await
            .unwrap();
        assert_eq!(agent.name, "Geologist");
        assert_eq!(store.snapshot().agents.len(), 2);
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_own_name() {
        let backend = FakeBackend::default();
        backend.add_agent("a1", "Astronomer");
        backend.add_agent("a2", "Geologist");
        let (store, _backend) = store_with(backend).await;

        let mut edit = draft("Astronomer", "You study galaxies.");
        edit.enable_mcp = true;
        let updated = store.update_agent("a1", edit).await.unwrap();
        assert!(updated.enable_mcp);
        assert_eq!(store.snapshot().agents[0].system_prompt, "You study galaxies.");

        assert!(store
            .update_agent("a2", draft("Astronomer", "Rocks."))
            .await
            .is_err());
        assert!(store.update_agent("a9", draft("X", "Y")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_selected_agent() {
        let backend = FakeBackend::default();
        backend.add_agent("a1", "Astronomer");
        let (store, _backend) = store_with(backend).await;
        store.select_agent(Some("a1")).unwrap();
        assert_eq!(store.snapshot().selected().unwrap().name, "Astronomer");

        store.delete_agent("a1").await.unwrap();
        let state = store.snapshot();
        assert!(state.agents.is_empty());
        assert!(state.selected_agent_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_restores_agent_and_selection() {
        let backend = FakeBackend::default();
        backend.add_agent("a1", "Astronomer");
        backend.add_agent("a2", "Geologist");
        backend.fail_on("delete_agent");
        let (store, _backend) = store_with(backend).await;
        store.select_agent(Some("a1")).unwrap();

        assert!(store.delete_agent("a1").await.is_err());
        let state = store.snapshot();
        assert_eq!(state.agents[0].id, "a1");
        assert_eq!(state.selected_agent_id.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_select_unknown_agent_fails() {
        let (store, _backend) = store_with(FakeBackend::default()).await;
        assert!(store.select_agent(Some("ghost")).is_err());
        store.select_agent(None).unwrap();
        assert!(store.snapshot().selected_agent_id.is_none());
    }

    #[tokio::test]
    async fn test_load_failure_sets_error() {
        let backend = FakeBackend::default();
        backend.fail_on("list_agents");
        let backend = Arc::new(backend);
        let store = AgentStore::new(Arc::clone(&backend));
        let err = store.load_agents().await.unwrap_err();
        assert!(err.is_status(500));
        let state = store.snapshot();
        assert_eq!(state.error, Some(err.to_string()));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_overlapping_loads_keep_spinner() {
        let backend = FakeBackend::default();
        backend.add_agent("a1", "Astronomer");
        let (store, _backend) = store_with(backend).await;

        store.lock().begin_load();
        store.load_agents().await.unwrap();
        assert!(store.snapshot().is_loading);
        store.lock().end_load();
        assert!(!store.snapshot().is_loading);
    }
}
