use super::models::{
    ChatReply, Conversation, ConversationPatch, ConversationSummary, NewConversation,
    QueryRequest, QueryResponse, SendMessageRequest,
};
use super::{ensure_success, ApiClient, ByteStream, ConversationApi};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;

#[async_trait]
impl ConversationApi for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        Self::send_json(self.request(Method::GET, "conversations")).await
    }

    async fn search_conversations(&self, query: &str) -> Result<Vec<ConversationSummary>> {
        let req = self
            .request(Method::GET, "conversations/search")
            .query(&[("q", query)]);
        Self::send_json(req).await
    }

    async fn create_conversation(&self, request: &NewConversation) -> Result<Conversation> {
        Self::send_json(self.request(Method::POST, "conversations").json(request)).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        Self::send_json(self.request(Method::GET, &format!("conversations/{}", id))).await
    }

    async fn update_conversation(&self, id: &str, patch: &ConversationPatch) -> Result<Conversation> {
        let req = self
            .request(Method::PATCH, &format!("conversations/{}", id))
            .json(patch);
        Self::send_json(req).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        Self::send_empty(self.request(Method::DELETE, &format!("conversations/{}", id))).await
    }

    async fn send_message(&self, conversation_id: &str, request: &SendMessageRequest) -> Result<ChatReply> {
        let req = self
            .request(
                Method::POST,
                &format!("conversations/{}/messages", conversation_id),
            )
            .json(request);
        Self::send_json(req).await
    }

    async fn stream_message(&self, conversation_id: &str, request: &SendMessageRequest) -> Result<ByteStream> {
        let resp = self
            .stream_request(
                Method::POST,
                &format!("conversations/{}/messages/stream", conversation_id),
            )
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ClientError::from))
            .boxed())
    }
}

impl ApiClient {
    /// One-shot retrieval query against the given knowledge groups.
    pub async fn query(&self, query_text: &str, group_ids: &[String]) -> Result<QueryResponse> {
        if query_text.trim().is_empty() {
            return Err(ClientError::validation("Query text is empty"));
        }
        if group_ids.is_empty() {
            return Err(ClientError::validation(
                "Select at least one knowledge group to query",
            ));
        }
        let body = QueryRequest {
            query_text: query_text.trim().to_string(),
            group_ids: group_ids.to_vec(),
        };
        Self::send_json(self.request(Method::POST, "query").json(&body)).await
    }
}
