//! In-memory [`ManifestSource`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use seedhub_shared::{HubError, ManifestSource, RepoRef, Result};

#[derive(Default)]
pub(crate) struct MemorySource {
    branches: HashMap<String, String>,
    files: HashMap<(String, String, String), String>,
    failures: HashMap<(String, String, String), String>,
    topic_hits: Vec<RepoRef>,
    topic_error: Option<String>,
    fetched: Mutex<Vec<String>>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `owner/repo` with a resolvable default branch.
    pub(crate) fn repo(mut self, full_name: &str, branch: &str) -> Self {
        self.branches.insert(full_name.into(), branch.into());
        self
    }

    pub(crate) fn file(mut self, full_name: &str, branch: &str, path: &str, text: &str) -> Self {
        self.files.insert(
            (full_name.into(), branch.into(), path.into()),
            text.into(),
        );
        self
    }

    /// A path whose fetch fails with a non-absent error.
    pub(crate) fn failing_file(mut self, full_name: &str, branch: &str, path: &str, message: &str) -> Self {
        self.failures.insert(
            (full_name.into(), branch.into(), path.into()),
            message.into(),
        );
        self
    }

    /// Make topic search fail with a network error.
    pub(crate) fn topic_error(mut self, message: &str) -> Self {
        self.topic_error = Some(message.into());
        self
    }

    pub(crate) fn topic_hit(mut self, repo: RepoRef) -> Self {
        self.topic_hits.push(repo);
        self
    }

    /// `owner/repo@branch:path` for every fetch attempted, in order.
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl ManifestSource for MemorySource {
    async fn fetch_manifest(&self, repo: &RepoRef, branch: &str, path: &str) -> Result<String> {
        let full = repo.full_name();
        self.fetched
            .lock()
            .unwrap()
            .push(format!("{full}@{branch}:{path}"));
        let key = (full.clone(), branch.to_string(), path.to_string());
        if let Some(message) = self.failures.get(&key) {
            return Err(HubError::validation(message.clone()));
        }
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("{full}/{branch}/{path}")))
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String> {
        self.branches
            .get(&repo.full_name())
            .cloned()
            .ok_or_else(|| HubError::NotFound(repo.full_name()))
    }

    async fn search_by_topic(&self, _topic: &str, _owner: Option<&str>) -> Result<Vec<RepoRef>> {
        match &self.topic_error {
            Some(message) => Err(HubError::Network(message.clone())),
            None => Ok(self.topic_hits.clone()),
        }
    }
}
