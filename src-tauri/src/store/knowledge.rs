use crate::api::models::{
    split_sources, GroupDraft, KnowledgeFile, KnowledgeGroup, KnowledgeSource, KnowledgeUrl,
    SourceKind, SourceStatus,
};
use crate::api::KnowledgeApi;
use crate::attachments;
use crate::error::{ClientError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Refreshes an upload may stay unlisted before it is shown as failed.
pub const MAX_PENDING_REFRESHES: u32 = 20;

/// A source sent to the backend that has not shown up in the listing yet.
#[derive(Debug, Clone, PartialEq)]
struct PendingSource {
    kind: SourceKind,
    name: String,
    misses: u32,
    failed: bool,
}

impl PendingSource {
    fn status(&self) -> SourceStatus {
        if self.failed {
            SourceStatus::Failed
        } else {
            SourceStatus::Processing
        }
    }

    fn error(&self) -> Option<String> {
        self.failed
            .then(|| "Source was not indexed by the backend".to_string())
    }

    /// The backend may store uploads as `<uuid>_<name>`.
    fn is_listed_as(&self, listed: &str) -> bool {
        match self.kind {
            SourceKind::File => listed == self.name || listed.ends_with(&format!("_{}", self.name)),
            SourceKind::Web => listed.trim_end_matches('/') == self.name.trim_end_matches('/'),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeState {
    pub groups: Vec<KnowledgeGroup>,
    pub selected_group_id: Option<String>,
    pub files: Vec<KnowledgeFile>,
    pub urls: Vec<KnowledgeUrl>,
    pub is_loading: bool,
    pub is_uploading: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pending: Vec<PendingSource>,
    #[serde(skip)]
    loads: usize,
}

impl KnowledgeState {
    /// Any source still being ingested by the backend.
    pub fn has_pending(&self) -> bool {
        self.files.iter().any(|f| f.status == SourceStatus::Processing)
            || self.urls.iter().any(|u| u.status == SourceStatus::Processing)
    }

    fn begin_load(&mut self) {
        self.loads += 1;
        self.is_loading = true;
    }

    fn end_load(&mut self) {
        self.loads = self.loads.saturating_sub(1);
        self.is_loading = self.loads > 0;
    }

    fn clear_sources(&mut self) {
        self.files.clear();
        self.urls.clear();
        self.pending.clear();
    }

    /// Show a just-submitted source as processing until the listing has it.
    fn track(&mut self, kind: SourceKind, name: &str) {
        self.pending.retain(|p| !(p.kind == kind && p.name == name));
        self.pending.push(PendingSource {
            kind,
            name: name.to_string(),
            misses: 0,
            failed: false,
        });
        match kind {
            SourceKind::File => {
                self.files.retain(|f| f.name != name);
                self.files.push(KnowledgeFile::new(name, SourceStatus::Processing));
            }
            SourceKind::Web => {
                self.urls.retain(|u| u.url != name);
                self.urls.push(KnowledgeUrl::new(name, SourceStatus::Processing));
            }
        }
    }

    /// Replace the source lists with a fresh listing plus pending uploads.
    fn apply_listing(&mut self, sources: Vec<KnowledgeSource>) {
        let (mut files, mut urls) = split_sources(sources);
        self.pending.retain_mut(|p| {
            let listed = match p.kind {
                SourceKind::File => files.iter().any(|f| p.is_listed_as(&f.name)),
                SourceKind::Web => urls.iter().any(|u| p.is_listed_as(&u.url)),
            };
            if listed {
                return false;
            }
            if !p.failed {
                p.misses += 1;
                if p.misses > MAX_PENDING_REFRESHES {
                    log::warn!("{} never appeared in the source listing", p.name);
                    p.failed = true;
                }
            }
            true
        });

        for p in &self.pending {
            match p.kind {
                SourceKind::File => {
                    let mut file = KnowledgeFile::new(&p.name, p.status());
                    file.error = p.error();
                    files.push(file);
                }
                SourceKind::Web => {
                    let mut url = KnowledgeUrl::new(&p.name, p.status());
                    url.error = p.error();
                    urls.push(url);
                }
            }
        }
        self.files = files;
        self.urls = urls;
    }
}

/// Knowledge groups and the sources of the selected group.
pub struct KnowledgeStore<B> {
    backend: Arc<B>,
    state: Arc<Mutex<KnowledgeState>>,
}

impl<B> Clone for KnowledgeStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: KnowledgeApi> KnowledgeStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(KnowledgeState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, KnowledgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail<T>(&self, err: ClientError) -> Result<T> {
        log::error!("knowledge store: {}", err);
        self.lock().error = Some(err.to_string());
        Err(err)
    }

    fn selected(&self) -> Result<String> {
        let selected = self.lock().selected_group_id.clone();
        match selected {
            Some(id) => Ok(id),
            None => self.fail(ClientError::validation("No knowledge group selected")),
        }
    }

    pub fn snapshot(&self) -> KnowledgeState {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn has_pending(&self) -> bool {
        self.lock().has_pending()
    }

    pub async fn load_groups(&self) -> Result<Vec<KnowledgeGroup>> {
        self.lock().begin_load();
        let result = self.backend.list_groups().await;
        self.lock().end_load();
        match result {
            Ok(groups) => {
                let mut state = self.lock();
                state.groups = groups.clone();
                state.error = None;
                Ok(groups)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn create_group(&self, mut draft: GroupDraft) -> Result<KnowledgeGroup> {
        draft.name = draft.name.trim().to_string();
        if draft.name.is_empty() {
            return self.fail(ClientError::validation("Group name cannot be empty"));
        }
        if self.lock().groups.iter().any(|g| g.name == draft.name) {
            return self.fail(ClientError::validation(format!(
                "A group named '{}' already exists",
                draft.name
            )));
        }

        match self.backend.create_group(&draft).await {
            Ok(group) => {
                log::info!("created knowledge group {} ({})", group.name, group.id);
                self.lock().groups.push(group.clone());
                Ok(group)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete_group(&self, id: &str) -> Result<()> {
        let (removed, selection) = {
            let mut state = self.lock();
            let removed = state
                .groups
                .iter()
                .position(|g| g.id == id)
                .map(|idx| (idx, state.groups.remove(idx)));
            let selection = if state.selected_group_id.as_deref() == Some(id) {
                state.selected_group_id = None;
                Some((
                    std::mem::take(&mut state.files),
                    std::mem::take(&mut state.urls),
                    std::mem::take(&mut state.pending),
                ))
            } else {
                None
            };
            (removed, selection)
        };

        if let Err(e) = self.backend.delete_group(id).await {
            {
                let mut state = self.lock();
                if let Some((idx, group)) = removed {
                    let idx = idx.min(state.groups.len());
                    state.groups.insert(idx, group);
                }
                if let Some((files, urls, pending)) = selection {
                    if state.selected_group_id.is_none() {
                        state.selected_group_id = Some(id.to_string());
                        state.files = files;
                        state.urls = urls;
                        state.pending = pending;
                    }
                }
            }
            return self.fail(e);
        }
        log::info!("deleted knowledge group {}", id);
        Ok(())
    }

    /// Select a group and load its sources.
    pub async fn select_group(&self, id: &str) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.groups.iter().any(|g| g.id == id) {
                drop(state);
                return self.fail(ClientError::validation(format!("Unknown knowledge group: {}", id)));
            }
            state.selected_group_id = Some(id.to_string());
            state.clear_sources();
        }
        self.refresh_sources().await
    }

    /// Re-fetch the sources of the selected group. Results for a group that is
    /// no longer selected are dropped.
    pub async fn refresh_sources(&self) -> Result<()> {
        match self.fetch_sources().await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    async fn fetch_sources(&self) -> Result<()> {
        let Some(group_id) = self.lock().selected_group_id.clone() else {
            return Ok(());
        };

        self.lock().begin_load();
        let result = self.backend.list_sources(&group_id).await;
        let mut state = self.lock();
        state.end_load();
        let sources = result?;
        if state.selected_group_id.as_deref() == Some(group_id.as_str()) {
            state.apply_listing(sources);
        }
        Ok(())
    }

    /// Read files from disk and upload them to the selected group. The new
    /// files show as processing until the source listing includes them.
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<String> {
        if paths.is_empty() {
            return self.fail(ClientError::validation("No files selected"));
        }
        let group_id = self.selected()?;

        let mut uploads = Vec::with_capacity(paths.len());
        for path in paths {
            match attachments::load_upload(path).await {
                Ok(upload) => uploads.push(upload),
                Err(e) => return self.fail(e),
            }
        }
        let names: Vec<String> = uploads.iter().map(|u| u.file_name.clone()).collect();

        self.lock().is_uploading = true;
        let result = self.backend.upload_files(&group_id, uploads).await;
        self.lock().is_uploading = false;

        match result {
            Ok(message) => {
                log::info!("uploaded {} file(s) to group {}: {}", names.len(), group_id, message);
                self.submitted(&group_id, SourceKind::File, &names).await;
                Ok(message)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn import_url(&self, url: &str) -> Result<String> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return self.fail(ClientError::validation(
                "URL must start with http:// or https://",
            ));
        }
        let group_id = self.selected()?;

        match self.backend.import_url(&group_id, url).await {
            Ok(message) => {
                log::info!("imported {} into group {}: {}", url, group_id, message);
                self.submitted(&group_id, SourceKind::Web, &[url.to_string()])
                    .await;
                Ok(message)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn submitted(&self, group_id: &str, kind: SourceKind, names: &[String]) {
        {
            let mut state = self.lock();
            if state.selected_group_id.as_deref() != Some(group_id) {
                return;
            }
            for name in names {
                state.track(kind, name);
            }
        }
        if let Err(e) = self.fetch_sources().await {
            log::warn!("could not refresh sources after submit: {}", e);
        }
    }

    pub async fn delete_file(&self, name: &str) -> Result<()> {
        self.delete_source(SourceKind::File, name).await
    }

    pub async fn delete_url(&self, url: &str) -> Result<()> {
        self.delete_source(SourceKind::Web, url).await
    }

    /// Optimistic removal by name. Sources the backend never listed are only
    /// dropped locally.
    async fn delete_source(&self, kind: SourceKind, name: &str) -> Result<()> {
        let group_id = self.selected()?;
        let (removed, was_pending) = {
            let mut state = self.lock();
            let was_pending = state
                .pending
                .iter()
                .any(|p| p.kind == kind && p.name == name);
            state.pending.retain(|p| !(p.kind == kind && p.name == name));
            let removed = match kind {
                SourceKind::File => state
                    .files
                    .iter()
                    .position(|f| f.name == name)
                    .map(|idx| (idx, Removed::File(state.files.remove(idx)))),
                SourceKind::Web => state
                    .urls
                    .iter()
                    .position(|u| u.url == name)
                    .map(|idx| (idx, Removed::Url(state.urls.remove(idx)))),
            };
            (removed, was_pending)
        };
        if was_pending {
            return Ok(());
        }

        if let Err(e) = self.backend.delete_sources(&group_id, &[name.to_string()]).await {
            if let Some((idx, removed)) = removed {
                let mut state = self.lock();
                if state.selected_group_id.as_deref() == Some(group_id.as_str()) {
                    match removed {
                        Removed::File(file) => {
                            let idx = idx.min(state.files.len());
                            state.files.insert(idx, file);
                        }
                        Removed::Url(url) => {
                            let idx = idx.min(state.urls.len());
                            state.urls.insert(idx, url);
                        }
                    }
                }
            }
            return self.fail(e);
        }
        log::info!("deleted source {} from group {}", name, group_id);
        Ok(())
    }
}

enum Removed {
    File(KnowledgeFile),
    Url(KnowledgeUrl),
}
