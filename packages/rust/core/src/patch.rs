//! Marker-delimited document patching.
//!
//! The hub README carries a generated health table between
//! `<!-- HEALTH:START -->` and `<!-- HEALTH:END -->`, and optionally a
//! reconciliation stamp between `<!-- HEALTH:STAMP:START -->` and
//! `<!-- HEALTH:STAMP:END -->`. Everything outside the markers is left
//! byte-for-byte intact. Markers are never created.

use std::path::Path;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use tracing::{info, instrument, warn};

use seedhub_shared::{HubError, ManifestKind, ModuleRow, RegistryIndex, Result};

pub const HEALTH_START: &str = "<!-- HEALTH:START -->";
pub const HEALTH_END: &str = "<!-- HEALTH:END -->";
pub const STAMP_START: &str = "<!-- HEALTH:STAMP:START -->";
pub const STAMP_END: &str = "<!-- HEALTH:STAMP:END -->";

/// Body row rendered for an empty index.
pub const EMPTY_ROW: &str = "| _no modules indexed_ | | | | | | |";

/// First start marker through the first end marker after it.
static HEALTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}.*?{}",
        regex::escape(HEALTH_START),
        regex::escape(HEALTH_END)
    ))
    .expect("health marker regex")
});

static STAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}.*?{}",
        regex::escape(STAMP_START),
        regex::escape(STAMP_END)
    ))
    .expect("stamp marker regex")
});

/// What [`patch_document`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The document does not exist.
    MissingDocument,
    /// The health markers are not both present (in order).
    MarkersAbsent,
    Unchanged,
    Updated,
}

impl std::fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDocument => f.write_str("document missing"),
            Self::MarkersAbsent => f.write_str("markers absent"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Updated => f.write_str("updated"),
        }
    }
}

/// Render the health table (header, alignment row, one row per module).
pub fn render_table(index: &RegistryIndex) -> String {
    let mut out = String::new();
    out.push_str("| Repository | Branch | Statuses | Glossary | Tags | Seeds | Last pulse |\n");
    out.push_str("|---|---|---:|---:|---:|---|---|\n");

    if index.is_empty() {
        out.push_str(EMPTY_ROW);
        out.push('\n');
        return out;
    }

    for row in &index.modules {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out
}

fn render_row(row: &ModuleRow) -> String {
    let counts: Vec<String> = ManifestKind::ALL
        .iter()
        .map(|kind| row.counts.get(*kind).to_string())
        .collect();
    format!(
        "| `{}` | {} | {} | {} | {} |",
        row.repo,
        row.branch,
        counts.join(" | "),
        seeds_summary(&row.seeds_found),
        row.last_pulsed_utc,
    )
}

/// File names of the fetched manifests, or `none`.
fn seeds_summary(seeds: &[String]) -> String {
    if seeds.is_empty() {
        return "none".into();
    }
    seeds
        .iter()
        .map(|s| s.rsplit('/').next().unwrap_or(s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply the table and stamp to document text.
///
/// Returns `None` when the health markers are not both present.
pub fn patch_content(content: &str, index: &RegistryIndex, reconciled_at: &str) -> Option<String> {
    if !HEALTH_RE.is_match(content) {
        return None;
    }

    let block = format!("{HEALTH_START}\n{}{HEALTH_END}", render_table(index));
    let patched = HEALTH_RE.replacen(content, 1, NoExpand(&block));

    let stamp = format!("{STAMP_START}{reconciled_at}{STAMP_END}");
    let patched = STAMP_RE.replacen(&patched, 1, NoExpand(&stamp));

    Some(patched.into_owned())
}

/// Rewrite the generated region of the document at `path`, writing only on change.
#[instrument(skip_all, fields(path = %path.display(), modules = index.modules.len()))]
pub fn patch_document(path: &Path, index: &RegistryIndex, reconciled_at: &str) -> Result<PatchOutcome> {
    if !path.exists() {
        warn!("document not found, skipping patch");
        return Ok(PatchOutcome::MissingDocument);
    }

    let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;

    let Some(patched) = patch_content(&content, index, reconciled_at) else {
        warn!(start = HEALTH_START, end = HEALTH_END, "health markers not found, skipping patch");
        return Ok(PatchOutcome::MarkersAbsent);
    };

    if patched == content {
        info!("document unchanged");
        return Ok(PatchOutcome::Unchanged);
    }

    std::fs::write(path, patched).map_err(|e| HubError::io(path, e))?;
    info!("document updated");
    Ok(PatchOutcome::Updated)
}
