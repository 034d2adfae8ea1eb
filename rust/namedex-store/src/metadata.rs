use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use namedex_common::{Result, error::Error};
use serde_json::Value;

/// Name of the metadata file inside the store directory.
pub(crate) const META_FILE_NAME: &str = "meta.json";

/// Small string-keyed dictionary persisted alongside the buckets as `meta.json`.
///
/// The store keeps its own geometry here (`bucket_bits`, `compress`, `format_version`,
/// `key_count`); callers are free to add any other keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    values: BTreeMap<String, Value>,
}

impl Metadata {
    pub(crate) fn path(dir: &Path) -> PathBuf {
        dir.join(META_FILE_NAME)
    }

    /// Reads `meta.json` from the store directory, if present.
    pub(crate) fn load(dir: &Path) -> Result<Option<Metadata>> {
        let path = Self::path(dir);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path.display().to_string(), e)),
        };
        let values = serde_json::from_slice(&data)?;
        Ok(Some(Metadata { values }))
    }

    pub(crate) fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::path(dir);
        let data = serde_json::to_vec_pretty(&self.values)?;
        fs::write(&path, data).map_err(|e| Error::io(path.display().to_string(), e))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub(crate) fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }
}
