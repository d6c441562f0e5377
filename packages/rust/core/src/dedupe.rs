//! First-write-wins de-duplication of records merged from several sources.

use std::collections::HashSet;

use seedhub_shared::Record;

/// Keep the first occurrence of every record, in arrival order.
///
/// Records with a canonical key (`key`, else `id`) are unique by that key; a
/// later record with the same key is dropped even if its content differs.
/// Records without one are unique by content fingerprint. The two spaces are
/// independent: a keyed record never shadows an unkeyed one.
pub fn dedupe<I>(records: I) -> Vec<Record>
where
    I: IntoIterator<Item = Record>,
{
    let mut seen_keys = HashSet::new();
    let mut seen_fingerprints = HashSet::new();
    let mut out = Vec::new();

    for record in records {
        let fresh = match record.canonical_key() {
            Some(key) => seen_keys.insert(key),
            None => seen_fingerprints.insert(record.fingerprint()),
        };
        if fresh {
            out.push(record);
        }
    }

    out
}
