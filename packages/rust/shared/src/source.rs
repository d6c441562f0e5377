//! The remote-content seam between the reconciliation engine and transport.

use std::future::Future;

use crate::error::Result;
use crate::types::RepoRef;

/// Where manifests, branches and discovered repositories come from.
///
/// Implementations make exactly one attempt per call. A missing path or any
/// non-success status is reported as [`HubError::NotFound`] or
/// [`HubError::Network`]; callers treat both as "absent".
///
/// [`HubError::NotFound`]: crate::HubError::NotFound
/// [`HubError::Network`]: crate::HubError::Network
pub trait ManifestSource {
    /// Raw text of `path` in `repo` at `branch`.
    fn fetch_manifest(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// The repository's default branch name.
    fn default_branch(&self, repo: &RepoRef) -> impl Future<Output = Result<String>> + Send;

    /// Repositories tagged with `topic`, optionally restricted to one owner.
    fn search_by_topic(
        &self,
        topic: &str,
        owner: Option<&str>,
    ) -> impl Future<Output = Result<Vec<RepoRef>>> + Send;
}
