//! Core domain types for SeedHub: canonical records, module rows, the
//! registry index and validation problems.

use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One canonical manifest entry: always a mapping, fields in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Mapping);

impl Record {
    /// Wrap an already-mapped value.
    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    /// Wrap a bare value as `{value: <v>}`.
    pub fn from_value(value: Value) -> Self {
        let mut mapping = Mapping::new();
        mapping.insert(Value::from("value"), value);
        Self(mapping)
    }

    /// Look up a top-level field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the record has a top-level field with this name.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Set `field` to `value` only if the field is absent.
    pub fn set_default(&mut self, field: &str, value: Value) {
        if !self.contains(field) {
            self.0.insert(Value::from(field), value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identity used for key-based deduplication.
    ///
    /// Taken from `key`, then `id`, when the field holds a non-empty string
    /// or a number. Records without one dedupe by content instead.
    pub fn canonical_key(&self) -> Option<String> {
        ["key", "id"]
            .iter()
            .find_map(|field| self.get(field).and_then(scalar_identity))
    }

    /// SHA-256 over a sorted-key JSON rendering of the record.
    ///
    /// Two records with the same fields and values produce the same
    /// fingerprint regardless of field order.
    pub fn fingerprint(&self) -> String {
        let canonical = canonical_json(&Value::Mapping(self.0.clone()));
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn scalar_identity(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert a YAML value into JSON with sorted object keys.
///
/// `serde_json::Map` is a `BTreeMap` here (no `preserve_order`), so the
/// rendered string is stable. Non-string keys are stringified.
fn canonical_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(n.to_string()))
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(canonical_json).collect())
        }
        Value::Mapping(mapping) => serde_json::Value::Object(
            mapping
                .iter()
                .map(|(k, v)| (key_string(k), canonical_json(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => {
            let mut object = serde_json::Map::new();
            object.insert(tagged.tag.to_string(), canonical_json(&tagged.value));
            serde_json::Value::Object(object)
        }
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".into(),
        other => canonical_json(other).to_string(),
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// A tracked repository, either declared in the registry file or discovered
/// by topic search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    /// Default branch reported by discovery; resolved on demand otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            default_branch: None,
        }
    }

    /// `owner/repo`, the identity used for row de-duplication.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// The manifests tracked per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    Statuses,
    Glossary,
    Tags,
}

impl ManifestKind {
    /// Fetch order within a repository.
    pub const ALL: [ManifestKind; 3] = [Self::Statuses, Self::Glossary, Self::Tags];

    pub fn name(self) -> &'static str {
        match self {
            Self::Statuses => "statuses",
            Self::Glossary => "glossary",
            Self::Tags => "tags",
        }
    }
}

/// Per-manifest record counts for one repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCounts {
    pub statuses: usize,
    pub glossary: usize,
    pub tags: usize,
}

impl ManifestCounts {
    pub fn get(&self, kind: ManifestKind) -> usize {
        match kind {
            ManifestKind::Statuses => self.statuses,
            ManifestKind::Glossary => self.glossary,
            ManifestKind::Tags => self.tags,
        }
    }

    pub fn set(&mut self, kind: ManifestKind, count: usize) {
        match kind {
            ManifestKind::Statuses => self.statuses = count,
            ManifestKind::Glossary => self.glossary = count,
            ManifestKind::Tags => self.tags = count,
        }
    }
}

// ---------------------------------------------------------------------------
// ModuleRow / RegistryIndex
// ---------------------------------------------------------------------------

/// Per-repository summary in the hub index. Field order is the persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRow {
    /// `owner/repo`.
    pub repo: String,
    /// Resolved default branch.
    pub branch: String,
    /// Manifest paths fetched successfully, in fetch order.
    pub seeds_found: Vec<String>,
    pub counts: ManifestCounts,
    /// First few status ids in source order.
    pub sample_status_ids: Vec<String>,
    /// RFC 3339 timestamp of the reconciliation run.
    pub last_pulsed_utc: String,
}

/// The persisted hub index: `{modules: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryIndex {
    #[serde(default)]
    pub modules: Vec<ModuleRow>,
}

impl RegistryIndex {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ValidationProblem
// ---------------------------------------------------------------------------

/// A single non-fatal problem found during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationProblem {
    pub location: String,
    pub reason: String,
}

impl ValidationProblem {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}
