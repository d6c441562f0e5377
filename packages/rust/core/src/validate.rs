//! Structural validation of normalized manifests.
//!
//! Checks field presence and coarse type only. Values are never compared
//! across records, so an `allowed_next` entry naming an unknown status id is
//! accepted.

use serde_yaml_ng::Value;
use seedhub_shared::{Record, ValidationProblem};

/// Required-field contract for one manifest kind.
#[derive(Debug, Clone, Copy)]
pub struct SchemaContract {
    /// Label used in problem locations, e.g. `status[3]`.
    pub entry_label: &'static str,
    /// Fields every record must carry, in reporting order.
    pub required: &'static [&'static str],
    /// Fields that must be sequences when present.
    pub list_fields: &'static [&'static str],
}

/// Contract for the status vocabulary (`seeds/statuses.yml`).
pub const STATUS_CONTRACT: SchemaContract = SchemaContract {
    entry_label: "status",
    required: &[
        "id",
        "label",
        "emoji",
        "order",
        "meaning",
        "criteria",
        "allowed_next",
    ],
    list_fields: &["criteria", "allowed_next"],
};

/// Validate `records` against `contract`. Never fails; returns every problem found.
///
/// All missing required fields of one record are reported together as
/// `missing: ['a', 'b']`. Each list field with the wrong type gets its own problem.
pub fn validate(
    records: &[Record],
    contract: &SchemaContract,
    location: &str,
) -> Vec<ValidationProblem> {
    let mut problems = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let at = format!("{location} {}[{i}]", contract.entry_label);

        let missing: Vec<&str> = contract
            .required
            .iter()
            .copied()
            .filter(|field| !record.contains(field))
            .collect();
        if !missing.is_empty() {
            problems.push(ValidationProblem::new(
                at.clone(),
                format!("missing: {}", quoted_list(&missing)),
            ));
        }

        for field in contract.list_fields {
            match record.get(field) {
                None | Some(Value::Sequence(_)) => {}
                Some(_) => problems.push(ValidationProblem::new(
                    at.clone(),
                    format!("{field} must be a list"),
                )),
            }
        }
    }

    problems
}

/// `['a', 'b']`
fn quoted_list(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| format!("'{f}'")).collect();
    format!("[{}]", quoted.join(", "))
}
