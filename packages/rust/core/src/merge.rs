//! Seed merging and harvesting.
//!
//! A merge plan names target manifests in the hub and the remote manifests
//! that feed each one. Harvesting does the same for a fixed list of seed
//! files across every tracked module. Both de-duplicate first-write-wins in
//! source order and persist through [`write_if_changed`].

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use seedhub_github::TreeUrl;
use seedhub_shared::{HubConfig, HubError, ManifestSource, Record, RepoRef, Result};

use crate::artifact::{WriteOutcome, write_if_changed};
use crate::dedupe::dedupe;
use crate::normalize::normalize_manifest;

/// Directory holding seed manifests in every module repository.
const SEEDS_DIR: &str = "seeds";

#[derive(Debug, Clone, Deserialize)]
pub struct MergePlan {
    #[serde(default)]
    pub targets: Vec<MergeTarget>,
}

/// One hub manifest and the tree URLs merged into it, in priority order.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeTarget {
    pub target: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Result of merging one target.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Hub-relative path written.
    pub target: String,
    pub sources_used: usize,
    pub sources_skipped: usize,
    /// Records after de-duplication.
    pub records: usize,
    /// `None` when no source contributed and nothing was written.
    pub outcome: Option<WriteOutcome>,
}

/// Load a merge plan. A plan without targets is an error.
pub fn load_plan(path: &Path) -> Result<MergePlan> {
    if !path.exists() {
        return Err(HubError::config(format!(
            "merge plan not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;
    let plan: Option<MergePlan> = serde_yaml_ng::from_str(&content).map_err(|e| {
        HubError::config(format!("failed to parse merge plan {}: {e}", path.display()))
    })?;

    match plan {
        Some(plan) if !plan.targets.is_empty() => Ok(plan),
        _ => Err(HubError::config(format!(
            "merge plan has no targets: {}",
            path.display()
        ))),
    }
}

/// Merge every target of `plan` into the local hub checkout.
#[instrument(skip_all, fields(targets = plan.targets.len()))]
pub async fn merge_targets<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    plan: &MergePlan,
) -> Result<Vec<MergeReport>> {
    let hub = config.hub.full_name();
    let mut reports = Vec::new();

    for entry in &plan.targets {
        let target = match TreeUrl::parse(&entry.target) {
            Ok(t) => t,
            Err(e) => {
                warn!(merge_target = %entry.target, error = %e, "skipping invalid merge target");
                continue;
            }
        };

        let target_repo = target.repo_ref().full_name();
        if !hub.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(&target_repo)) {
            warn!(
                merge_target = %target,
                hub = hub.as_deref().unwrap_or("<unset>"),
                "merge target is outside the configured hub, writing to the local checkout"
            );
        }

        let mut records = Vec::new();
        let mut used = 0;
        let mut skipped = 0;

        for raw in &entry.sources {
            let src = match TreeUrl::parse(raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(source = %raw, error = %e, "skipping invalid merge source");
                    skipped += 1;
                    continue;
                }
            };

            match fetch_records(source, &src.repo_ref(), &src.branch, &src.path).await {
                Ok(found) => {
                    used += 1;
                    records.extend(found);
                }
                Err(e) => {
                    warn!(source = %src, error = %e, "skipping merge source");
                    skipped += 1;
                }
            }
        }

        let report = persist(config, &target.path, records, used, skipped)?;
        reports.push(report);
    }

    Ok(reports)
}

/// Pull each configured seed file from every module and merge it into the
/// hub's harvest directory. The hub itself is never harvested.
#[instrument(skip_all, fields(repos = repos.len()))]
pub async fn harvest<S: ManifestSource>(
    source: &S,
    config: &HubConfig,
    repos: &[RepoRef],
) -> Result<Vec<MergeReport>> {
    let hub = config.hub.full_name();

    let mut branches = Vec::new();
    for repo in repos {
        if hub.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(&repo.full_name())) {
            continue;
        }
        let branch = match &repo.default_branch {
            Some(b) => b.clone(),
            None => match source.default_branch(repo).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(repo = %repo, error = %e, "skipping repository");
                    continue;
                }
            },
        };
        branches.push((repo, branch));
    }

    let mut reports = Vec::new();
    for seed in &config.merge.harvest_seeds {
        let path = format!("{SEEDS_DIR}/{seed}");
        let mut records = Vec::new();
        let mut used = 0;
        let mut skipped = 0;

        for (repo, branch) in &branches {
            match fetch_records(source, repo, branch, &path).await {
                Ok(found) => {
                    used += 1;
                    records.extend(found);
                }
                Err(e) => {
                    debug!(repo = %repo, path = %path, error = %e, "seed not harvested");
                    skipped += 1;
                }
            }
        }

        let out = config.merge.harvest_out_dir.join(seed);
        let out = out.to_string_lossy();
        reports.push(persist(config, &out, records, used, skipped)?);
    }

    Ok(reports)
}

async fn fetch_records<S: ManifestSource>(
    source: &S,
    repo: &RepoRef,
    branch: &str,
    path: &str,
) -> Result<Vec<Record>> {
    let text = source.fetch_manifest(repo, branch, path).await?;
    normalize_manifest(&text)
}

fn persist(
    config: &HubConfig,
    relative: &str,
    records: Vec<Record>,
    used: usize,
    skipped: usize,
) -> Result<MergeReport> {
    let merged = dedupe(records);

    let outcome = if used == 0 {
        warn!(path = relative, "no source contributed, leaving target untouched");
        None
    } else {
        let path = config.hub_path(Path::new(relative));
        let outcome = write_if_changed(&path, &merged)?;
        info!(path = relative, records = merged.len(), %outcome, "merged");
        Some(outcome)
    };

    Ok(MergeReport {
        target: relative.to_string(),
        sources_used: used,
        sources_skipped: skipped,
        records: merged.len(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::testing::MemorySource;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seedhub-merge-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn hub_config(root: &Path) -> HubConfig {
        let mut config = HubConfig::default();
        config.hub.owner = "acme".into();
        config.hub.repo = "hub".into();
        config.hub.root = root.to_path_buf();
        config
    }

    fn read_records(path: &Path) -> Vec<Record> {
        serde_yaml_ng::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn plan(target: &str, sources: &[&str]) -> MergePlan {
        MergePlan {
            targets: vec![MergeTarget {
                target: target.into(),
                sources: sources.iter().map(|s| s.to_string()).collect(),
            }],
        }
    }

    #[tokio::test]
    async fn merges_sources_first_write_wins() {
        let tmp = temp_dir();
        let config = hub_config(&tmp);
        let source = MemorySource::new()
            .file("acme/a", "main", "seeds/glossary.yml", "- key: sla\n  def: first\n")
            .file(
                "acme/b",
                "dev",
                "seeds/glossary.yml",
                "sla:\n  def: second\nslo:\n  def: objective\n",
            );

        let plan = plan(
            "https://github.com/acme/hub/tree/main/seeds/glossary.yml",
            &[
                "https://github.com/acme/a/tree/main/seeds/glossary.yml",
                "https://github.com/acme/b/tree/dev/seeds/glossary.yml",
                "https://github.com/acme/gone/tree/main/seeds/glossary.yml",
                "not a url",
            ],
        );

        let reports = merge_targets(&source, &config, &plan).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].target, "seeds/glossary.yml");
        assert_eq!(reports[0].sources_used, 2);
        assert_eq!(reports[0].sources_skipped, 2);
        assert_eq!(reports[0].records, 2);
        assert_eq!(reports[0].outcome, Some(WriteOutcome::Written));

        let written = read_records(&tmp.join("seeds/glossary.yml"));
        assert_eq!(written[0].canonical_key().as_deref(), Some("sla"));
        assert_eq!(
            written[0].get("def"),
            Some(&serde_yaml_ng::Value::String("first".into()))
        );
        assert_eq!(written[1].canonical_key().as_deref(), Some("slo"));

        let again = merge_targets(&source, &config, &plan).await.unwrap();
        assert_eq!(again[0].outcome, Some(WriteOutcome::Unchanged));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn invalid_target_is_skipped() {
        let tmp = temp_dir();
        let config = hub_config(&tmp);
        let source = MemorySource::new();

        let plan = plan("https://example.com/not/a/tree", &[]);
        let reports = merge_targets(&source, &config, &plan).await.unwrap();
        assert!(reports.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn target_without_sources_is_left_untouched() {
        let tmp = temp_dir();
        let config = hub_config(&tmp);
        let source = MemorySource::new();

        let plan = plan(
            "https://github.com/acme/hub/tree/main/seeds/tags.yml",
            &["https://github.com/acme/gone/tree/main/seeds/tags.yml"],
        );
        let reports = merge_targets(&source, &config, &plan).await.unwrap();

        assert_eq!(reports[0].outcome, None);
        assert!(!tmp.join("seeds/tags.yml").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn harvest_collects_from_modules_but_not_hub() {
        let tmp = temp_dir();
        let mut config = hub_config(&tmp);
        config.merge.harvest_seeds = vec!["tags.yml".into()];
        config.merge.harvest_out_dir = PathBuf::from("harvested");

        let source = MemorySource::new()
            .repo("acme/a", "main")
            .file("acme/a", "main", "seeds/tags.yml", "- key: infra\n")
            .file("acme/b", "trunk", "seeds/tags.yml", "- key: infra\n- key: ops\n")
            .file("Acme/Hub", "main", "seeds/tags.yml", "- key: hub-only\n");

        let mut b = RepoRef::new("acme", "b");
        b.default_branch = Some("trunk".into());
        // Differently cased hub entry that would be fetchable if not excluded.
        let mut hub = RepoRef::new("Acme", "Hub");
        hub.default_branch = Some("main".into());
        let repos = [
            RepoRef::new("acme", "a"),
            b,
            RepoRef::new("acme", "ghost"),
            hub,
        ];

        let reports = harvest(&source, &config, &repos).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sources_used, 2);
        assert_eq!(reports[0].records, 2);

        let written = read_records(&tmp.join("harvested/tags.yml"));
        let keys: Vec<_> = written.iter().filter_map(Record::canonical_key).collect();
        assert_eq!(keys, vec!["infra", "ops"]);
        assert!(!source.fetched().iter().any(|f| f.to_lowercase().starts_with("acme/hub@")));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn plan_loading() {
        let tmp = temp_dir();
        let path = tmp.join("plan.yml");

        assert!(load_plan(&path).is_err());

        std::fs::write(&path, "targets: []\n").unwrap();
        assert!(matches!(load_plan(&path), Err(HubError::Config { .. })));

        std::fs::write(
            &path,
            "targets:\n  - target: https://github.com/acme/hub/tree/main/seeds/tags.yml\n    sources:\n      - https://github.com/acme/a/tree/main/seeds/tags.yml\n",
        )
        .unwrap();
        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].sources.len(), 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
