use std::path::Path;

use namedex_common::{Result, error::Error};
use namedex_store::{Store, StoreOptions, StoreStats};
use serde_json::Value;

use crate::{
    builder::{META_LOWERCASE_KEYS, META_TRACK_NAMES, NAMES_DIR},
    record::{IndexEntry, NameRecord},
};

/// Answer to a completion query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completions {
    /// Display names starting with the query.
    pub names: Vec<String>,
    /// More names start with the query than the index keeps.
    pub truncated: bool,
}

/// Query side of a finished name index.
pub struct NameIndex {
    store: Store,
    track_names: Vec<String>,
    lowercase_keys: bool,
}

impl NameIndex {
    /// Opens the index store in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<NameIndex> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::configuration(format!(
                "no name index in {}",
                dir.display()
            )));
        }
        let store = Store::open(dir, StoreOptions::default())?;
        let metadata = store.metadata();
        let track_names = match metadata.get(META_TRACK_NAMES) {
            Some(Value::Array(labels)) => labels
                .iter()
                .map(|label| label.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => Vec::new(),
        };
        let lowercase_keys = metadata
            .get(META_LOWERCASE_KEYS)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(NameIndex {
            store,
            track_names,
            lowercase_keys,
        })
    }

    /// Opens the index of a browser data directory.
    pub fn open_data_dir(out_dir: impl AsRef<Path>) -> Result<NameIndex> {
        Self::open(out_dir.as_ref().join(NAMES_DIR))
    }

    /// Labels of the indexed tracks; a record's track id indexes this list.
    pub fn track_names(&self) -> &[String] {
        &self.track_names
    }

    pub fn track_label(&self, track: u32) -> Option<&str> {
        self.track_names.get(track as usize).map(String::as_str)
    }

    pub fn len(&self) -> u64 {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&mut self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// The stored entry for `query`, after key normalization.
    pub fn entry(&mut self, query: &str) -> Result<Option<IndexEntry>> {
        let key = if self.lowercase_keys {
            query.to_lowercase()
        } else {
            query.to_string()
        };
        self.store
            .get(&key)?
            .map(|bytes| IndexEntry::from_bytes(&bytes))
            .transpose()
    }

    /// All locations of features named `name`, ignoring case.
    pub fn lookup_exact(&mut self, name: &str) -> Result<Vec<NameRecord>> {
        Ok(self.entry(name)?.map(|entry| entry.exact).unwrap_or_default())
    }

    /// Names starting with `prefix`: the stored completions, then the display names of
    /// the exact matches.
    pub fn complete(&mut self, prefix: &str) -> Result<Completions> {
        let Some(entry) = self.entry(prefix)? else {
            return Ok(Completions::default());
        };
        let truncated = entry.is_sealed();
        let mut names: Vec<String> = Vec::with_capacity(entry.prefix.len() + 1);
        let candidates = entry
            .prefix
            .into_iter()
            .filter_map(|c| c.as_name().map(str::to_string))
            .chain(entry.exact.into_iter().map(|record| record.name));
        for name in candidates {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(Completions { names, truncated })
    }
}
