use std::path::Path;

use ahash::AHashSet;
use namedex_common::{Result, error::Error};
use namedex_store::{Scan, Store, StoreOptions};
use tempfile::TempDir;

use crate::{
    operations::Operation,
    record::{Completion, IndexEntry, IndexLimits},
};

/// Number of applied operations between two progress log lines.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Disposable on-disk map collecting one [`IndexEntry`] per key while the operation stream
/// is consumed.
///
/// Entries live in a bucket store inside a temporary directory, so memory use is bounded
/// by the store's cache budget. The directory is removed when the accumulator is dropped.
pub struct Accumulator {
    // Declared before `_dir`: the store flushes on drop and must go first.
    store: Store,
    sealed: AHashSet<String>,
    limits: IndexLimits,
    _dir: TempDir,
}

impl Accumulator {
    /// Creates an empty accumulator in a fresh temporary directory under `work_dir`, or
    /// under the system temporary directory.
    pub fn new(
        work_dir: Option<&Path>,
        bucket_bits: u8,
        cache_bytes: usize,
        limits: IndexLimits,
    ) -> Result<Accumulator> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("namedex-");
        let dir = match work_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::io("creating temporary directory", e))?;
        log::debug!("accumulating entries in {}", dir.path().display());

        let store = Store::create(
            dir.path(),
            StoreOptions {
                bucket_bits,
                cache_bytes,
                compress: false,
            },
        )?;
        Ok(Accumulator {
            store,
            sealed: AHashSet::new(),
            limits,
            _dir: dir,
        })
    }

    pub fn limits(&self) -> IndexLimits {
        self.limits
    }

    /// Number of distinct keys accumulated so far.
    pub fn len(&self) -> u64 {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether prefix accumulation has stopped for `key`.
    pub fn is_sealed(&self, key: &str) -> bool {
        self.sealed.contains(key)
    }

    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    /// Applies one operation under the quota and dedup rules.
    pub fn apply(&mut self, operation: Operation) -> Result<()> {
        match operation {
            Operation::AddExact { key, record } => {
                let mut entry = self.load(&key)?;
                if entry.exact.len() >= self.limits.location_limit || entry.has_location(&record)
                {
                    return Ok(());
                }
                entry.exact.push(record);
                self.save(&key, &entry)
            }
            Operation::AddPrefix { key, name } => {
                if self.sealed.contains(&key) {
                    return Ok(());
                }
                let mut entry = self.load(&key)?;
                if entry.prefix.len() < self.limits.completion_limit {
                    if entry.has_completion(&name) {
                        return Ok(());
                    }
                    entry.prefix.push(Completion::Name(name));
                } else {
                    entry.prefix.push(Completion::Overflow);
                    self.sealed.insert(key.clone());
                }
                self.save(&key, &entry)
            }
        }
    }

    /// Drains `operations` into the map. `expected` only scales the progress log.
    ///
    /// Returns the number of operations applied.
    pub fn consume<I>(&mut self, operations: I, expected: u64) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Operation>>,
    {
        let mut applied = 0u64;
        for operation in operations {
            self.apply(operation?)?;
            applied += 1;
            if applied % PROGRESS_INTERVAL == 0 {
                log::info!("indexed {applied} of ~{expected} operations");
            }
        }
        self.store.flush()?;
        Ok(applied)
    }

    /// Cursor over every accumulated key and its serialized entry.
    pub fn entries(&mut self) -> Result<Scan<'_>> {
        self.store.scan()
    }

    /// Current entry for `key`, mainly for inspection in tests.
    pub fn get(&mut self, key: &str) -> Result<Option<IndexEntry>> {
        self.store
            .get(key)?
            .map(|bytes| IndexEntry::from_bytes(&bytes))
            .transpose()
    }

    fn load(&mut self, key: &str) -> Result<IndexEntry> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    fn save(&mut self, key: &str, entry: &IndexEntry) -> Result<()> {
        self.store.set(key, entry.to_bytes()?)
    }
}
