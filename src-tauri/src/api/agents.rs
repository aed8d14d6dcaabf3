use super::models::{Agent, AgentDraft};
use super::{AgentApi, ApiClient};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
impl AgentApi for ApiClient {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        Self::send_json(self.request(Method::GET, "agents")).await
    }

    async fn create_agent(&self, draft: &AgentDraft) -> Result<Agent> {
        Self::send_json(self.request(Method::POST, "agents").json(draft)).await
    }

    async fn update_agent(&self, id: &str, draft: &AgentDraft) -> Result<Agent> {
        Self::send_json(self.request(Method::PUT, &format!("agents/{}", id)).json(draft)).await
    }

    async fn delete_agent(&self, id: &str) -> Result<()> {
        Self::send_empty(self.request(Method::DELETE, &format!("agents/{}", id))).await
    }
}
