use super::models::{Ack, GroupDraft, KnowledgeGroup, KnowledgeSource, SourcesDelete, UploadFile, UrlImport};
use super::{ApiClient, KnowledgeApi};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Method;

#[async_trait]
impl KnowledgeApi for ApiClient {
    async fn list_groups(&self) -> Result<Vec<KnowledgeGroup>> {
        Self::send_json(self.request(Method::GET, "groups")).await
    }

    async fn create_group(&self, draft: &GroupDraft) -> Result<KnowledgeGroup> {
        Self::send_json(self.request(Method::POST, "groups").json(draft)).await
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        Self::send_empty(self.request(Method::DELETE, &format!("groups/{}", id))).await
    }

    async fn list_sources(&self, group_id: &str) -> Result<Vec<KnowledgeSource>> {
        Self::send_json(self.request(Method::GET, &format!("groups/{}/sources", group_id))).await
    }

    async fn upload_files(&self, group_id: &str, files: Vec<UploadFile>) -> Result<String> {
        let form = files.into_iter().fold(Form::new(), |form, file| {
            form.part("files", Part::bytes(file.bytes).file_name(file.file_name))
        });
        // Indexing runs inside the request; no total timeout.
        let req = self
            .stream_request(Method::POST, &format!("groups/{}/files", group_id))
            .multipart(form);
        let ack: Ack = Self::send_json(req).await?;
        Ok(ack.message)
    }

    /// Web pages go through the upload endpoint as a JSON body.
    async fn import_url(&self, group_id: &str, url: &str) -> Result<String> {
        let body = UrlImport {
            url: url.to_string(),
        };
        let req = self
            .stream_request(Method::POST, &format!("groups/{}/files", group_id))
            .json(&body);
        let ack: Ack = Self::send_json(req).await?;
        Ok(ack.message)
    }

    async fn delete_sources(&self, group_id: &str, names: &[String]) -> Result<()> {
        let body = SourcesDelete {
            sources: names.to_vec(),
        };
        let req = self
            .request(Method::DELETE, &format!("groups/{}/sources", group_id))
            .json(&body);
        Self::send_empty(req).await
    }
}
