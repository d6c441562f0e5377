//! End-to-end reconciliation: registry → index → artifact → document.

use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use seedhub_shared::{HubConfig, ManifestSource, Result, ValidationProblem};

use crate::artifact::{WriteOutcome, write_if_changed};
use crate::index::{RepoOrigin, build_index, resolve_repos};
use crate::patch::{PatchOutcome, patch_document};

/// Result of one [`reconcile`] run.
#[derive(Debug)]
pub struct ReconcileResult {
    /// Where the repository list came from.
    pub origin: RepoOrigin,
    /// Rows in the written index.
    pub module_count: usize,
    pub artifact: WriteOutcome,
    pub document: PatchOutcome,
    /// Every problem found; none of them stopped the run.
    pub problems: Vec<ValidationProblem>,
    /// Timestamp stamped on every row and into the document.
    pub reconciled_at: String,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a repository is indexed.
    fn repo_started(&self, repo: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &ReconcileResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn repo_started(&self, _repo: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &ReconcileResult) {}
}

/// Run a full reconciliation stamped with the current time.
pub async fn reconcile<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileResult> {
    reconcile_at(source, config, Utc::now(), progress).await
}

/// Run a full reconciliation stamped with `now`.
///
/// 1. Select repositories (declared registry, else topic discovery)
/// 2. Build the index
/// 3. Write the index artifact if it changed
/// 4. Patch the hub document's health region
///
/// Only configuration and local I/O failures abort the run.
#[instrument(skip_all, fields(at = %now))]
pub async fn reconcile_at<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    now: DateTime<Utc>,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileResult> {
    let start = Instant::now();
    let reconciled_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    progress.phase("Selecting repositories");
    let selection = resolve_repos(source, config).await?;
    info!(
        origin = ?selection.origin,
        repos = selection.repos.len(),
        "repositories selected"
    );

    progress.phase("Indexing modules");
    let report = build_index(source, config, &selection.repos, &reconciled_at, progress).await;

    let mut problems = selection.problems;
    problems.extend(report.problems);
    for problem in &problems {
        warn!(location = %problem.location, reason = %problem.reason, "validation problem");
    }

    progress.phase("Writing index artifact");
    let artifact_path = config.hub_path(&config.outputs.artifact_path);
    let artifact = write_if_changed(&artifact_path, &report.index)?;

    progress.phase("Patching document");
    let document_path = config.hub_path(&config.outputs.document_path);
    let document = patch_document(&document_path, &report.index, &reconciled_at)?;

    let result = ReconcileResult {
        origin: selection.origin,
        module_count: report.index.modules.len(),
        artifact,
        document,
        problems,
        reconciled_at,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        modules = result.module_count,
        problems = result.problems.len(),
        artifact = %result.artifact,
        document = %result.document,
        elapsed_ms = result.elapsed.as_millis(),
        "reconciliation complete"
    );

    Ok(result)
}
