//! Idempotent artifact persistence.
//!
//! An artifact is rewritten only when its logical content changes, so repeated
//! runs over unchanged remote state leave the working tree clean.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};

use seedhub_shared::{HubError, Result};

/// What [`write_if_changed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Written => f.write_str("written"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// On-disk encoding, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Yaml,
}

impl ArtifactFormat {
    /// `.json` is JSON; everything else is YAML.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    fn render<T: Serialize>(self, obj: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(obj)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| HubError::validation(format!("cannot serialize artifact: {e}"))),
            Self::Yaml => serde_yaml_ng::to_string(obj)
                .map_err(|e| HubError::validation(format!("cannot serialize artifact: {e}"))),
        }
    }

    /// Whether `prior` (raw file text) decodes to the same structure as `obj`.
    /// Undecodable prior content compares unequal.
    fn same_content<T: Serialize>(self, obj: &T, prior: &str) -> bool {
        match self {
            Self::Json => {
                let Ok(old) = serde_json::from_str::<serde_json::Value>(prior) else {
                    return false;
                };
                serde_json::to_value(obj).is_ok_and(|new| new == old)
            }
            Self::Yaml => {
                let Ok(old) = serde_yaml_ng::from_str::<serde_yaml_ng::Value>(prior) else {
                    return false;
                };
                serde_yaml_ng::to_value(obj).is_ok_and(|new| new == old)
            }
        }
    }
}

/// Persist `obj` at `path` unless the file already holds the same structure.
///
/// Comparison is structural, not byte-wise: reformatting the file by hand
/// does not trigger a rewrite. A missing or unreadable prior file counts as
/// absent. Parent directories are created; the write goes through a temp
/// file and a rename.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_if_changed<T: Serialize>(path: &Path, obj: &T) -> Result<WriteOutcome> {
    let format = ArtifactFormat::for_path(path);

    if let Ok(prior) = std::fs::read_to_string(path) {
        if format.same_content(obj, &prior) {
            debug!("artifact unchanged");
            return Ok(WriteOutcome::Unchanged);
        }
    }

    let content = format.render(obj)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HubError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HubError::validation(format!("invalid artifact path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, &content).map_err(|e| HubError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| HubError::io(path, e))?;

    info!(bytes = content.len(), "artifact written");
    Ok(WriteOutcome::Written)
}
