//! Data model of the name index: raw source records, normalized name records, and the
//! per-key index entry persisted in the stores.

use namedex_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record as produced by a record source, before normalization.
///
/// `aliases` may hold strings or one level of nested string lists. `fields` is the
/// format-dependent location payload; by convention `fields[0]` is the primary feature
/// name, `fields[1..4]` are the reference sequence, start and end.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub aliases: Vec<Value>,
    pub track_label: String,
    pub fields: Vec<Value>,
}

impl RawRecord {
    /// Builds a record from one JSON tuple `[aliases, trackLabel, ...fields]`.
    ///
    /// A bare string in the alias position is treated as a single alias.
    pub fn from_json(value: Value) -> std::result::Result<RawRecord, String> {
        let Value::Array(items) = value else {
            return Err("record is not a JSON array".to_string());
        };
        if items.len() < 2 {
            return Err(format!("record has {} elements, expected at least 2", items.len()));
        }
        let mut items = items.into_iter();
        let aliases = match items.next() {
            Some(Value::Array(aliases)) => aliases,
            Some(Value::String(alias)) => vec![Value::String(alias)],
            other => return Err(format!("alias list is not an array: {other:?}")),
        };
        let track_label = match items.next() {
            Some(Value::String(label)) => label,
            other => return Err(format!("track label is not a string: {other:?}")),
        };
        let fields = items.collect();
        Ok(RawRecord {
            aliases,
            track_label,
            fields,
        })
    }
}

/// One name occurrence: a display name, the dense id of the track it came from, and
/// its location fields.
///
/// `fields` is persisted as-is and read back by browsers, so its layout is fixed:
///
/// - features: `[name, ref_seq, start, end, ...]`, the names file record minus its aliases
///   and track label;
/// - reference sequences: `[name, name, 0, end, seq_dir, chunk_size, length]`, with no
///   track (`track == None`), so positions 1 to 3 are reference, start and end for both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub track: Option<u32>,
    pub fields: Vec<Value>,
}

impl NameRecord {
    /// Reference sequence, start and end, i.e. `fields[1..4]`.
    pub fn location(&self) -> &[Value] {
        let end = self.fields.len().min(4);
        self.fields.get(1..end).unwrap_or_default()
    }

    /// Two records point at the same place when they share the track and the
    /// reference/start/end triple.
    pub fn same_location(&self, other: &NameRecord) -> bool {
        self.track == other.track && self.location() == other.location()
    }
}

/// An element of a key's completion list.
///
/// The overflow marker is stored as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Completion {
    Name(String),
    Overflow,
}

impl Completion {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Completion::Name(name) => Some(name),
            Completion::Overflow => None,
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Completion::Overflow)
    }
}

/// The value stored for one lowercased key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Locations whose name equals the key, at most `location_limit` of them.
    pub exact: Vec<NameRecord>,
    /// Display names starting with the key, at most `completion_limit`, optionally
    /// followed by a single overflow marker.
    pub prefix: Vec<Completion>,
}

impl IndexEntry {
    pub fn from_bytes(bytes: &[u8]) -> Result<IndexEntry> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns `true` once the completion list ends with the overflow marker.
    pub fn is_sealed(&self) -> bool {
        self.prefix.last().is_some_and(Completion::is_overflow)
    }

    pub fn has_completion(&self, name: &str) -> bool {
        self.prefix.iter().any(|c| c.as_name() == Some(name))
    }

    pub fn has_location(&self, record: &NameRecord) -> bool {
        self.exact.iter().any(|r| r.same_location(record))
    }
}

/// Per-key quotas applied while accumulating and merging entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLimits {
    /// Maximum number of completion names kept per key.
    pub completion_limit: usize,
    /// Maximum number of exact locations kept per key.
    pub location_limit: usize,
}

impl Default for IndexLimits {
    fn default() -> Self {
        IndexLimits {
            completion_limit: 20,
            location_limit: 100,
        }
    }
}
