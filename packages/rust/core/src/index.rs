//! Registry index construction.
//!
//! For every tracked repository: resolve the default branch, fetch each
//! manifest, normalize, validate the status vocabulary and summarize the
//! result as one [`ModuleRow`]. Failures are decided here, per error kind:
//!
//! | failure                         | effect                               |
//! |---------------------------------|--------------------------------------|
//! | branch cannot be resolved       | repository skipped, problem recorded |
//! | manifest missing / non-200      | manifest silently absent             |
//! | manifest malformed              | manifest absent, problem recorded    |
//! | schema violation                | record kept, problem recorded        |

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_yaml_ng::Value;
use tracing::{debug, info, instrument, warn};

use seedhub_shared::{
    HubConfig, HubError, ManifestKind, ManifestSource, ModuleRow, Record, RegistryIndex, RepoRef,
    Result, ValidationProblem,
};

use crate::dedupe::dedupe;
use crate::normalize::normalize_manifest;
use crate::pipeline::ProgressReporter;
use crate::validate::{STATUS_CONTRACT, validate};

/// Number of status ids kept in `sample_status_ids`.
const SAMPLE_SIZE: usize = 5;

/// Problem reason for a repository whose default branch is unknown.
pub const BRANCH_UNRESOLVED: &str = "cannot read default branch";

// ---------------------------------------------------------------------------
// Repository selection
// ---------------------------------------------------------------------------

/// Where the tracked repository list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOrigin {
    Declared,
    Discovered,
    /// Empty registry and no usable discovery result.
    Empty,
}

#[derive(Debug, Clone)]
pub struct RepoSelection {
    pub repos: Vec<RepoRef>,
    pub origin: RepoOrigin,
    pub problems: Vec<ValidationProblem>,
}

/// Registry file shape: `modules: [{owner, repo}, ...]`.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    modules: Option<Vec<RepoRef>>,
}

/// Load the declared registry. A missing or empty file declares nothing;
/// a malformed one is a config error.
pub fn load_registry(path: &Path) -> Result<Vec<RepoRef>> {
    if !path.exists() {
        debug!(path = %path.display(), "registry file not found");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: Option<RegistryFile> = serde_yaml_ng::from_str(&content).map_err(|e| {
        HubError::config(format!("failed to parse registry {}: {e}", path.display()))
    })?;

    Ok(file.and_then(|f| f.modules).unwrap_or_default())
}

/// Pick the repository list: the declared registry if it names anything,
/// otherwise topic discovery. The two are never merged.
#[instrument(skip_all)]
pub async fn resolve_repos<S: ManifestSource>(source: &S, config: &HubConfig) -> Result<RepoSelection> {
    let declared = load_registry(&config.hub_path(&config.sources.registry_path))?;
    if !declared.is_empty() {
        info!(count = declared.len(), "using declared registry");
        return Ok(RepoSelection {
            repos: declared,
            origin: RepoOrigin::Declared,
            problems: Vec::new(),
        });
    }

    let topic = config.sources.topic.trim();
    if topic.is_empty() {
        warn!("registry is empty and no discovery topic is configured");
        return Ok(RepoSelection {
            repos: Vec::new(),
            origin: RepoOrigin::Empty,
            problems: Vec::new(),
        });
    }

    info!(topic, "registry is empty, discovering by topic");
    match source.search_by_topic(topic, config.discovery_owner()).await {
        Ok(repos) => Ok(RepoSelection {
            repos,
            origin: RepoOrigin::Discovered,
            problems: Vec::new(),
        }),
        Err(e) => {
            warn!(error = %e, "topic discovery failed");
            Ok(RepoSelection {
                repos: Vec::new(),
                origin: RepoOrigin::Empty,
                problems: vec![ValidationProblem::new(
                    format!("topic:{topic}"),
                    format!("discovery failed: {e}"),
                )],
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Index building
// ---------------------------------------------------------------------------

/// The built index plus every problem found along the way.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub index: RegistryIndex,
    pub problems: Vec<ValidationProblem>,
}

/// Accumulates one repository's row as manifests arrive.
struct RowBuilder {
    row: ModuleRow,
}

impl RowBuilder {
    fn new(repo: String, branch: String, reconciled_at: &str) -> Self {
        Self {
            row: ModuleRow {
                repo,
                branch,
                seeds_found: Vec::new(),
                counts: Default::default(),
                sample_status_ids: Vec::new(),
                last_pulsed_utc: reconciled_at.to_string(),
            },
        }
    }

    /// Fold one successfully parsed manifest into the row.
    ///
    /// Validation runs on the records as published so problem positions match
    /// the source; counts and samples use the de-duplicated records.
    fn absorb(
        &mut self,
        kind: ManifestKind,
        path: &str,
        records: Vec<Record>,
        problems: &mut Vec<ValidationProblem>,
    ) {
        if kind == ManifestKind::Statuses {
            problems.extend(validate(&records, &STATUS_CONTRACT, &self.row.repo));
        }

        let records = dedupe(records);
        if kind == ManifestKind::Statuses {
            self.row.sample_status_ids = records
                .iter()
                .filter_map(status_id)
                .take(SAMPLE_SIZE)
                .collect();
        }

        debug!(repo = %self.row.repo, manifest = kind.name(), records = records.len(), "manifest absorbed");
        self.row.counts.set(kind, records.len());
        self.row.seeds_found.push(path.to_string());
    }

    fn finish(self) -> ModuleRow {
        self.row
    }
}

/// A status's `id`, falling back to its canonical key.
fn status_id(record: &Record) -> Option<String> {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => record.canonical_key(),
    }
}

/// Build the index for `repos`, in order, plus the local hub row.
///
/// Repository names compare case-insensitively, so the hub is represented by
/// exactly one row whatever case the registry uses. Never fails: every per-repository failure becomes a problem or an absent
/// manifest. Rows come back sorted by repository name.
#[instrument(skip_all, fields(repos = repos.len()))]
pub async fn build_index<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    repos: &[RepoRef],
    reconciled_at: &str,
    progress: &dyn ProgressReporter,
) -> IndexReport {
    let mut problems = Vec::new();
    let mut rows: Vec<ModuleRow> = Vec::new();
    let mut seen = HashSet::new();

    for (i, repo) in repos.iter().enumerate() {
        let name = repo.full_name();
        progress.repo_started(&name, i + 1, repos.len());

        if !seen.insert(name.to_lowercase()) {
            debug!(repo = %name, "duplicate repository entry skipped");
            continue;
        }

        if let Some(row) = build_row(source, config, repo, reconciled_at, &mut problems).await {
            rows.push(row);
        }
    }

    let hub_name = config.hub_name();
    if rows.iter().any(|r| r.repo.eq_ignore_ascii_case(&hub_name)) {
        debug!(repo = %hub_name, "hub already indexed remotely");
    } else {
        rows.push(synthesize_hub_row(config, hub_name, reconciled_at, &mut problems));
    }

    rows.sort_by(|a, b| {
        a.repo
            .to_lowercase()
            .cmp(&b.repo.to_lowercase())
            .then_with(|| a.repo.cmp(&b.repo))
    });

    info!(
        modules = rows.len(),
        problems = problems.len(),
        "registry index built"
    );

    IndexReport {
        index: RegistryIndex { modules: rows },
        problems,
    }
}

async fn build_row<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    repo: &RepoRef,
    reconciled_at: &str,
    problems: &mut Vec<ValidationProblem>,
) -> Option<ModuleRow> {
    let name = repo.full_name();

    let branch = match &repo.default_branch {
        Some(branch) => branch.clone(),
        None => match source.default_branch(repo).await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(repo = %name, error = %e, "skipping repository");
                problems.push(ValidationProblem::new(&name, BRANCH_UNRESOLVED));
                return None;
            }
        },
    };

    let mut builder = RowBuilder::new(name.clone(), branch.clone(), reconciled_at);

    for kind in ManifestKind::ALL {
        let path = config.manifests.path(kind);

        let text = match source.fetch_manifest(repo, &branch, path).await {
            Ok(text) => text,
            Err(e) if e.is_absent() => {
                debug!(repo = %name, path, error = %e, "manifest absent");
                continue;
            }
            Err(e) => {
                warn!(repo = %name, path, error = %e, "manifest unreadable");
                problems.push(ValidationProblem::new(format!("{name} {path}"), e.to_string()));
                continue;
            }
        };

        match normalize_manifest(&text) {
            Ok(records) => builder.absorb(kind, path, records, problems),
            Err(e) => {
                warn!(repo = %name, path, error = %e, "malformed manifest");
                problems.push(ValidationProblem::new(format!("{name} {path}"), e.to_string()));
            }
        }
    }

    let row = builder.finish();
    debug!(repo = %name, seeds = row.seeds_found.len(), "module row built");
    Some(row)
}

/// Row for the hub repository itself, read from the local checkout.
fn synthesize_hub_row(
    config: &HubConfig,
    hub_name: String,
    reconciled_at: &str,
    problems: &mut Vec<ValidationProblem>,
) -> ModuleRow {
    let mut builder = RowBuilder::new(hub_name.clone(), config.hub.branch.clone(), reconciled_at);

    for kind in ManifestKind::ALL {
        let path = config.manifests.path(kind);
        let local = config.hub.root.join(path);
        if !local.is_file() {
            continue;
        }

        let parsed = std::fs::read_to_string(&local)
            .map_err(|e| HubError::io(&local, e))
            .and_then(|text| normalize_manifest(&text));

        match parsed {
            Ok(records) => builder.absorb(kind, path, records, problems),
            Err(e) => {
                problems.push(ValidationProblem::new(format!("{hub_name} {path}"), e.to_string()));
            }
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::pipeline::SilentProgress;
    use crate::testing::MemorySource;

    const AT: &str = "2026-03-01T12:00:00Z";

    const HUB: &str = "acme/hub";

    const OPEN_STATUS: &str = "- id: open\n  label: Open\n  emoji: \"🟢\"\n  order: 1\n  meaning: m\n  criteria: [a]\n  allowed_next: [closed]";

    const OPEN_STATUS_NO_ORDER: &str = "- id: open\n  label: Open\n  emoji: \"🟢\"\n  meaning: m\n  criteria: [a]\n  allowed_next: [closed]";

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seedhub-index-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_at(root: &Path) -> HubConfig {
        let mut config = HubConfig::default();
        config.hub.owner = "acme".into();
        config.hub.repo = "hub".into();
        config.hub.root = root.to_path_buf();
        config
    }

    /// Hub config whose root holds no local manifests.
    fn remote_only_config() -> HubConfig {
        config_at(&std::env::temp_dir().join(format!("seedhub-absent-{}", uuid::Uuid::now_v7())))
    }

    async fn build(source: &MemorySource, config: &HubConfig, repos: &[RepoRef]) -> IndexReport {
        build_index(source, config, repos, AT, &SilentProgress).await
    }

    fn row<'a>(report: &'a IndexReport, repo: &str) -> &'a ModuleRow {
        report
            .index
            .modules
            .iter()
            .find(|r| r.repo == repo)
            .unwrap_or_else(|| panic!("no row for {repo}"))
    }

    fn names(report: &IndexReport) -> Vec<&str> {
        report.index.modules.iter().map(|r| r.repo.as_str()).collect()
    }

    #[tokio::test]
    async fn single_status_manifest_end_to_end() {
        let source = MemorySource::new()
            .repo("acme/launch-model", "main")
            .file("acme/launch-model", "main", "seeds/statuses.yml", OPEN_STATUS);
        let config = remote_only_config();

        let report = build(&source, &config, &[RepoRef::new("acme", "launch-model")]).await;

        assert!(report.problems.is_empty(), "{:?}", report.problems);
        assert_eq!(names(&report), vec![HUB, "acme/launch-model"]);
        let row = row(&report, "acme/launch-model");
        assert_eq!(row.branch, "main");
        assert_eq!(row.counts.statuses, 1);
        assert_eq!(row.sample_status_ids, vec!["open"]);
        assert_eq!(row.seeds_found, vec!["seeds/statuses.yml"]);
        assert_eq!(row.last_pulsed_utc, AT);
    }

    #[tokio::test]
    async fn missing_field_is_reported_but_record_counted() {
        let source = MemorySource::new()
            .repo("acme/launch-model", "main")
            .file("acme/launch-model", "main", "seeds/statuses.yml", OPEN_STATUS_NO_ORDER);
        let config = remote_only_config();

        let report = build(&source, &config, &[RepoRef::new("acme", "launch-model")]).await;

        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].location, "acme/launch-model status[0]");
        assert_eq!(report.problems[0].reason, "missing: ['order']");
        assert_eq!(row(&report, "acme/launch-model").counts.statuses, 1);
    }

    #[tokio::test]
    async fn unresolvable_branch_skips_repository_only() {
        let source = MemorySource::new()
            .repo("acme/good", "main")
            .file("acme/good", "main", "seeds/tags.yml", "- key: infra\n- key: ops\n");
        let config = remote_only_config();

        let repos = [RepoRef::new("acme", "ghost"), RepoRef::new("acme", "good")];
        let report = build(&source, &config, &repos).await;

        assert_eq!(names(&report), vec!["acme/good", HUB]);
        assert_eq!(row(&report, "acme/good").counts.tags, 2);
        assert_eq!(
            report.problems,
            vec![ValidationProblem::new("acme/ghost", BRANCH_UNRESOLVED)]
        );
    }

    #[tokio::test]
    async fn malformed_manifest_is_recorded_and_others_continue() {
        let source = MemorySource::new()
            .repo("acme/x", "main")
            .file("acme/x", "main", "seeds/statuses.yml", OPEN_STATUS)
            .file("acme/x", "main", "seeds/glossary.yml", "key: [unclosed\n")
            .file("acme/x", "main", "seeds/tags.yml", "- a\n- b\n- a\n");
        let config = remote_only_config();

        let report = build(&source, &config, &[RepoRef::new("acme", "x")]).await;

        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].location, "acme/x seeds/glossary.yml");
        assert!(report.problems[0].reason.starts_with("parse error"));

        let row = row(&report, "acme/x");
        assert_eq!(row.seeds_found, vec!["seeds/statuses.yml", "seeds/tags.yml"]);
        assert_eq!(row.counts.glossary, 0);
        // Duplicate bare tags collapse by content.
        assert_eq!(row.counts.tags, 2);
    }

    #[tokio::test]
    async fn unreadable_manifest_is_recorded_not_skipped() {
        let source = MemorySource::new()
            .repo("acme/x", "main")
            .file("acme/x", "main", "seeds/statuses.yml", OPEN_STATUS)
            .failing_file("acme/x", "main", "seeds/tags.yml", "body is not text");
        let config = remote_only_config();

        let report = build(&source, &config, &[RepoRef::new("acme", "x")]).await;

        assert_eq!(
            report.problems,
            vec![ValidationProblem::new(
                "acme/x seeds/tags.yml",
                "validation error: body is not text"
            )]
        );
        let row = row(&report, "acme/x");
        assert_eq!(row.seeds_found, vec!["seeds/statuses.yml"]);
        assert_eq!(row.counts.tags, 0);
    }

    #[tokio::test]
    async fn items_wrapper_is_unwrapped() {
        let source = MemorySource::new().repo("acme/x", "main").file(
            "acme/x",
            "main",
            "seeds/glossary.yml",
            "version: 1\nitems:\n  - key: sla\n  - key: slo\n",
        );
        let config = remote_only_config();

        let report = build(&source, &config, &[RepoRef::new("acme", "x")]).await;
        assert_eq!(row(&report, "acme/x").counts.glossary, 2);
    }

    #[tokio::test]
    async fn discovered_branch_skips_resolution() {
        // No branch registered: resolution would fail.
        let source = MemorySource::new().file("acme/x", "dev", "seeds/statuses.yml", OPEN_STATUS);
        let config = remote_only_config();

        let mut repo = RepoRef::new("acme", "x");
        repo.default_branch = Some("dev".into());
        let report = build(&source, &config, &[repo]).await;

        assert!(report.problems.is_empty());
        assert_eq!(row(&report, "acme/x").branch, "dev");
        assert_eq!(
            source.fetched(),
            vec![
                "acme/x@dev:seeds/statuses.yml",
                "acme/x@dev:seeds/glossary.yml",
                "acme/x@dev:seeds/tags.yml",
            ]
        );
    }

    #[tokio::test]
    async fn rows_sorted_by_name_and_duplicates_skipped() {
        let source = MemorySource::new()
            .repo("acme/zeta", "main")
            .repo("acme/Alpha", "main")
            .repo("acme/beta", "main");
        let config = remote_only_config();

        let repos = [
            RepoRef::new("acme", "zeta"),
            RepoRef::new("acme", "beta"),
            RepoRef::new("acme", "Alpha"),
            RepoRef::new("acme", "zeta"),
            RepoRef::new("ACME", "Zeta"),
        ];
        let report = build(&source, &config, &repos).await;

        assert_eq!(
            names(&report),
            vec!["acme/Alpha", "acme/beta", HUB, "acme/zeta"]
        );
    }

    #[tokio::test]
    async fn hub_row_synthesized_from_local_files() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("seeds")).unwrap();
        std::fs::write(tmp.join("seeds/statuses.yml"), OPEN_STATUS).unwrap();
        std::fs::write(tmp.join("seeds/tags.yml"), "infra: Infrastructure\n").unwrap();

        let config = config_at(&tmp);

        let source = MemorySource::new().repo("acme/mod", "main");
        let report = build(&source, &config, &[RepoRef::new("acme", "mod")]).await;

        assert_eq!(names(&report), vec![HUB, "acme/mod"]);
        let hub = row(&report, HUB);
        assert_eq!(hub.branch, "main");
        assert_eq!(hub.seeds_found, vec!["seeds/statuses.yml", "seeds/tags.yml"]);
        assert_eq!(hub.counts.statuses, 1);
        assert_eq!(hub.counts.tags, 1);
        assert_eq!(hub.sample_status_ids, vec!["open"]);

        // Local synthesis never touches the remote source.
        assert!(source.fetched().iter().all(|f| f.starts_with("acme/mod@")));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn unnamed_hub_row_uses_root_directory_name() {
        let tmp = temp_dir();
        let root = tmp.join("seed-hub");
        std::fs::create_dir_all(root.join("seeds")).unwrap();
        std::fs::write(root.join("seeds/tags.yml"), "- key: infra\n").unwrap();

        let mut config = HubConfig::default();
        config.hub.root = root;

        let source = MemorySource::new().repo("acme/mod", "main");
        let report = build(&source, &config, &[RepoRef::new("acme", "mod")]).await;

        assert_eq!(names(&report), vec!["acme/mod", "seed-hub"]);
        assert_eq!(row(&report, "seed-hub").counts.tags, 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn remote_hub_entry_wins_over_synthesized() {
        let config = remote_only_config();

        let source = MemorySource::new()
            .repo("acme/hub", "trunk")
            .file("acme/hub", "trunk", "seeds/statuses.yml", OPEN_STATUS);
        let report = build(&source, &config, &[RepoRef::new("acme", "hub")]).await;

        assert_eq!(names(&report), vec![HUB]);
        assert_eq!(report.index.modules[0].branch, "trunk");
    }

    #[tokio::test]
    async fn hub_identity_ignores_case() {
        let mut config = remote_only_config();
        config.hub.owner = "Acme".into();
        config.hub.repo = "Hub".into();

        let source = MemorySource::new().repo("acme/hub", "trunk");
        let report = build(&source, &config, &[RepoRef::new("acme", "hub")]).await;

        assert_eq!(names(&report), vec!["acme/hub"]);
        assert_eq!(report.index.modules[0].branch, "trunk");
    }

    #[tokio::test]
    async fn declared_registry_suppresses_discovery() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("registry")).unwrap();
        std::fs::write(
            tmp.join("registry/modules.yml"),
            "modules:\n  - owner: acme\n    repo: launch-model\n",
        )
        .unwrap();
        let config = config_at(&tmp);

        let source = MemorySource::new().topic_hit(RepoRef::new("acme", "found-by-topic"));
        let selection = resolve_repos(&source, &config).await.unwrap();

        assert_eq!(selection.origin, RepoOrigin::Declared);
        assert_eq!(selection.repos, vec![RepoRef::new("acme", "launch-model")]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn empty_registry_falls_back_to_discovery() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("registry")).unwrap();
        std::fs::write(tmp.join("registry/modules.yml"), "modules: []\n").unwrap();
        let config = config_at(&tmp);

        let source = MemorySource::new().topic_hit(RepoRef::new("acme", "found-by-topic"));
        let selection = resolve_repos(&source, &config).await.unwrap();

        assert_eq!(selection.origin, RepoOrigin::Discovered);
        assert_eq!(selection.repos[0].repo, "found-by-topic");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn discovery_failure_is_recorded() {
        let tmp = temp_dir();
        let mut config = config_at(&tmp);
        config.sources.topic = "seed-module".into();

        let source = MemorySource::new().topic_error("HTTP 403 Forbidden");
        let selection = resolve_repos(&source, &config).await.unwrap();

        assert_eq!(selection.origin, RepoOrigin::Empty);
        assert!(selection.repos.is_empty());
        assert_eq!(
            selection.problems,
            vec![ValidationProblem::new(
                "topic:seed-module",
                "discovery failed: network error: HTTP 403 Forbidden"
            )]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_registry_is_config_error() {
        let tmp = temp_dir();
        let path = tmp.join("modules.yml");
        std::fs::write(&path, "modules:\n  - owner: [\n").unwrap();

        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, HubError::Config { .. }));

        assert!(load_registry(&tmp.join("absent.yml")).unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
