//! Manifest normalization.
//!
//! Seed manifests come in three shapes: a list of entries, a mapping keyed by
//! entry id, or (rarely) a bare scalar. Parsing classifies the document into a
//! [`ParsedDocument`] and each variant has one conversion into canonical
//! [`Record`]s.

use serde_yaml_ng::{Mapping, Value};
use seedhub_shared::{HubError, Record, Result};

/// Field whose sequence value some manifests wrap their entries in.
const ITEMS_FIELD: &str = "items";

/// A manifest classified by its top-level shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDocument {
    /// Empty text, comments only, or an explicit null.
    Empty,
    Sequence(Vec<Value>),
    Mapping(Mapping),
    /// Any other top-level value (string, number, bool, tagged).
    Scalar(Value),
}

impl From<Value> for ParsedDocument {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Sequence(items) => Self::Sequence(items),
            Value::Mapping(mapping) => Self::Mapping(mapping),
            other => Self::Scalar(other),
        }
    }
}

impl ParsedDocument {
    /// Replace a `{items: [...]}` wrapper with its sequence. Other shapes,
    /// including an `items` field that is not a sequence, pass through.
    pub fn unwrap_items(self) -> Self {
        match self {
            Self::Mapping(mut mapping) => {
                if let Some(Value::Sequence(items)) = mapping.get_mut(ITEMS_FIELD) {
                    return Self::Sequence(std::mem::take(items));
                }
                Self::Mapping(mapping)
            }
            other => other,
        }
    }

    /// Convert into canonical records, preserving source order.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Empty => Vec::new(),
            Self::Sequence(items) => sequence_records(items),
            Self::Mapping(mapping) => mapping_records(mapping),
            Self::Scalar(value) => vec![Record::from_value(value)],
        }
    }
}

/// Parse raw YAML text. Only malformed syntax is an error.
pub fn parse_document(raw: &str) -> Result<ParsedDocument> {
    if raw.trim().is_empty() {
        return Ok(ParsedDocument::Empty);
    }

    let value: Value = serde_yaml_ng::from_str(raw).map_err(|e| HubError::parse(e.to_string()))?;
    Ok(ParsedDocument::from(value))
}

/// Parse and normalize a manifest into canonical records.
pub fn normalize(raw: &str) -> Result<Vec<Record>> {
    parse_document(raw).map(ParsedDocument::into_records)
}

/// Like [`normalize`], but a top-level `items` sequence is unwrapped first.
pub fn normalize_manifest(raw: &str) -> Result<Vec<Record>> {
    parse_document(raw).map(|doc| doc.unwrap_items().into_records())
}

fn sequence_records(items: Vec<Value>) -> Vec<Record> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Mapping(mapping) => Record::from_mapping(mapping),
            other => Record::from_value(other),
        })
        .collect()
}

fn mapping_records(mapping: Mapping) -> Vec<Record> {
    mapping
        .into_iter()
        .map(|(key, value)| match value {
            Value::Mapping(inner) => {
                let mut record = Record::from_mapping(inner);
                record.set_default("key", key);
                record
            }
            other => {
                let mut entry = Mapping::new();
                entry.insert(Value::from("key"), key);
                entry.insert(Value::from("value"), other);
                Record::from_mapping(entry)
            }
        })
        .collect()
}
