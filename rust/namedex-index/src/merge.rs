use namedex_common::Result;

use crate::record::{Completion, IndexEntry, IndexLimits};

/// Folds `incoming` into `existing` without dropping anything `existing` already holds.
///
/// Locations and completions of `incoming` that are not yet present are appended in
/// order until the respective quota is reached. A sealed completion list is left alone,
/// and no overflow marker is added here even when a list fills up.
pub fn merge_entries(existing: &mut IndexEntry, incoming: IndexEntry, limits: IndexLimits) {
    for record in incoming.exact {
        if existing.exact.len() >= limits.location_limit {
            break;
        }
        if !existing.has_location(&record) {
            existing.exact.push(record);
        }
    }

    if existing.is_sealed() {
        return;
    }
    for completion in incoming.prefix {
        if existing.prefix.len() >= limits.completion_limit {
            break;
        }
        if let Completion::Name(name) = completion {
            if !existing.has_completion(&name) {
                existing.prefix.push(Completion::Name(name));
            }
        }
    }
}

/// Byte-level wrapper of [`merge_entries`] for the store's bulk loader.
pub fn merge_serialized(existing: &[u8], incoming: &[u8], limits: IndexLimits) -> Result<Vec<u8>> {
    let mut merged = IndexEntry::from_bytes(existing)?;
    merge_entries(&mut merged, IndexEntry::from_bytes(incoming)?, limits);
    merged.to_bytes()
}
