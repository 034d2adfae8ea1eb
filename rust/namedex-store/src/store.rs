use std::{
    collections::btree_map,
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use lru::LruCache;
use namedex_common::{Result, error::Error, verify_arg, verify_data};

use crate::{
    bucket::{BUCKET_SUFFIX, Bucket, COMPRESSED_BUCKET_SUFFIX, bucket_index, bucket_relative_path},
    metadata::{META_FILE_NAME, Metadata},
};

const FORMAT_VERSION: u64 = 1;

const META_BUCKET_BITS: &str = "bucket_bits";
const META_COMPRESS: &str = "compress";
const META_FORMAT_VERSION: &str = "format_version";
const META_KEY_COUNT: &str = "key_count";

/// Number of loaded keys between two progress log lines.
const LOAD_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Merge callback used by [`Store::stream_load`]: receives the stored value and the
/// incoming one, returns the value to store.
pub type MergeFn<'a> = dyn FnMut(Vec<u8>, Vec<u8>) -> Result<Vec<u8>> + 'a;

/// Parameters for opening or creating a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Number of hash bits selecting the bucket of a key; the store has
    /// `2^bucket_bits` buckets. Must be within `1..=32`.
    pub bucket_bits: u8,

    /// Memory budget, in bytes, for buckets held in the cache.
    pub cache_bytes: usize,

    /// Whether bucket files are gzip-compressed.
    pub compress: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            bucket_bits: 12,
            cache_bytes: 256 * 1024 * 1024,
            compress: false,
        }
    }
}

/// Summary of the on-disk state of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub bucket_bits: u8,
    pub compress: bool,
    pub key_count: u64,
    pub bucket_files: u64,
    pub disk_bytes: u64,
}

/// A bucketed, hash-sharded on-disk map from string keys to byte values.
///
/// # Structure
///
/// ```text
/// <dir>/meta.json            metadata dictionary, including the store geometry
/// <dir>/<hex>/.../<hex>.bucket   one file per non-empty bucket
/// ```
///
/// A key lives in bucket `xxh3(key) & (2^bucket_bits - 1)`. Buckets are read on first
/// access and kept in an LRU cache; once the cached buckets exceed `cache_bytes`, the least
/// recently used ones are written back (if modified) and dropped.
///
/// The store is single-writer. Modifications are durable after [`Store::flush`]; dropping
/// the store flushes as well, logging rather than returning any failure.
pub struct Store {
    dir: PathBuf,
    bucket_bits: u8,
    compress: bool,
    cache_bytes: usize,
    cache: LruCache<u32, Bucket>,
    cached_bytes: usize,
    key_count: u64,
    metadata: Metadata,
    meta_dirty: bool,
}

impl Store {
    /// Creates a store in `dir`, discarding whatever store contents the directory held.
    pub fn create(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        let mut store = Self::new(dir.as_ref(), &options)?;
        store.empty()?;
        store.flush()?;
        Ok(store)
    }

    /// Opens the store in `dir`, creating it if necessary.
    ///
    /// If the directory already holds a non-empty store, its recorded bucket bits and
    /// compression take precedence over `options`.
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        let mut store = Self::new(dir.as_ref(), &options)?;
        if let Some(metadata) = Metadata::load(&store.dir)? {
            let key_count = metadata.get_u64(META_KEY_COUNT).unwrap_or(0);
            if key_count > 0 {
                let bits = metadata.get_u64(META_BUCKET_BITS).ok_or_else(|| {
                    Error::invalid_format(META_FILE_NAME, format!("missing {META_BUCKET_BITS}"))
                })?;
                verify_data!(bucket_bits, (1..=32).contains(&bits));
                if bits as u8 != options.bucket_bits {
                    log::debug!(
                        "store {} keeps its existing {bits} bucket bits",
                        store.dir.display()
                    );
                }
                store.bucket_bits = bits as u8;
                store.compress = metadata.get_bool(META_COMPRESS).unwrap_or(false);
                store.key_count = key_count;
            }
            store.meta_dirty = metadata.get_u64(META_BUCKET_BITS) != Some(store.bucket_bits as u64)
                || metadata.get_bool(META_COMPRESS) != Some(store.compress);
            store.metadata = metadata;
        } else {
            store.meta_dirty = true;
        }
        Ok(store)
    }

    fn new(dir: &Path, options: &StoreOptions) -> Result<Store> {
        verify_arg!(bucket_bits, (1..=32).contains(&options.bucket_bits));
        fs::create_dir_all(dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
        Ok(Store {
            dir: dir.to_path_buf(),
            bucket_bits: options.bucket_bits,
            compress: options.compress,
            cache_bytes: options.cache_bytes,
            cache: LruCache::unbounded(),
            cached_bytes: 0,
            key_count: 0,
            metadata: Metadata::default(),
            meta_dirty: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bucket_bits(&self) -> u8 {
        self.bucket_bits
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    /// Number of distinct keys in the store.
    pub fn len(&self) -> u64 {
        self.key_count
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.meta_dirty = true;
        &mut self.metadata
    }

    /// Removes every bucket and every metadata entry.
    pub fn empty(&mut self) -> Result<()> {
        self.cache.clear();
        self.cached_bytes = 0;
        self.key_count = 0;
        self.metadata = Metadata::default();
        self.meta_dirty = true;

        let entries =
            fs::read_dir(&self.dir).map_err(|e| Error::io(self.dir.display().to_string(), e))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.file_type()?.is_dir() {
                if !name.is_empty() && name.chars().all(|c| c.is_ascii_hexdigit()) {
                    fs::remove_dir_all(&path)
                        .map_err(|e| Error::io(path.display().to_string(), e))?;
                }
            } else if is_bucket_file_name(&name) || name == META_FILE_NAME {
                fs::remove_file(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
            }
        }
        Ok(())
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let index = bucket_index(key, self.bucket_bits);
        let bucket = self.bucket_mut(index)?;
        Ok(bucket.get(key).map(<[u8]>::to_vec))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        let index = bucket_index(key, self.bucket_bits);
        let bucket = self.bucket_mut(index)?;
        let before = bucket.size_bytes();
        let is_new = bucket.set(key, value);
        let after = bucket.size_bytes();

        self.cached_bytes = self.cached_bytes + after - before;
        if is_new {
            self.key_count += 1;
        }
        self.evict_over_budget()
    }

    /// Bulk-loads a stream of key/value pairs and flushes the store.
    ///
    /// When `merge` is provided and a key already holds a value, the stored value is
    /// replaced by `merge(existing, incoming)`; otherwise the incoming value is written
    /// as is. `expected_count` only drives progress logging.
    ///
    /// Returns the number of pairs consumed from the stream.
    pub fn stream_load<I>(
        &mut self,
        entries: I,
        expected_count: u64,
        mut merge: Option<&mut MergeFn<'_>>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = Result<(String, Vec<u8>)>>,
    {
        let mut loaded = 0u64;
        for entry in entries {
            let (key, value) = entry?;
            let value = match merge.as_deref_mut() {
                Some(merge) => match self.get(&key)? {
                    Some(existing) => merge(existing, value)?,
                    None => value,
                },
                None => value,
            };
            self.set(&key, value)?;

            loaded += 1;
            if loaded % LOAD_PROGRESS_INTERVAL == 0 {
                log::info!("loaded {loaded} of ~{expected_count} keys");
            }
        }
        self.flush()?;
        Ok(loaded)
    }

    /// Returns a cursor over every key/value pair in the store.
    ///
    /// Pending modifications are flushed first. Buckets are visited in path order, keys in
    /// sorted order within a bucket; only one bucket is held in memory at a time.
    pub fn scan(&mut self) -> Result<Scan<'_>> {
        self.flush()?;
        let mut paths = Vec::new();
        collect_bucket_files(&self.dir, &mut paths)?;
        paths.sort();
        Ok(Scan {
            paths: paths.into_iter(),
            current: Default::default(),
            compress: self.compress,
            _store: PhantomData,
        })
    }

    /// Writes all modified buckets and the metadata to disk.
    pub fn flush(&mut self) -> Result<()> {
        for (&index, bucket) in self.cache.iter_mut() {
            if bucket.is_dirty() {
                let path = self
                    .dir
                    .join(bucket_relative_path(index, self.bucket_bits, self.compress));
                bucket.save(&path, self.compress)?;
            }
        }
        if self.meta_dirty || self.metadata.get_u64(META_KEY_COUNT) != Some(self.key_count) {
            self.metadata.set(META_BUCKET_BITS, self.bucket_bits);
            self.metadata.set(META_COMPRESS, self.compress);
            self.metadata.set(META_FORMAT_VERSION, FORMAT_VERSION);
            self.metadata.set(META_KEY_COUNT, self.key_count);
            self.metadata.save(&self.dir)?;
            self.meta_dirty = false;
        }
        Ok(())
    }

    /// Flushes the store and reports its on-disk footprint.
    pub fn stats(&mut self) -> Result<StoreStats> {
        self.flush()?;
        let mut paths = Vec::new();
        collect_bucket_files(&self.dir, &mut paths)?;
        let mut disk_bytes = 0;
        for path in &paths {
            disk_bytes += fs::metadata(path)
                .map_err(|e| Error::io(path.display().to_string(), e))?
                .len();
        }
        Ok(StoreStats {
            bucket_bits: self.bucket_bits,
            compress: self.compress,
            key_count: self.key_count,
            bucket_files: paths.len() as u64,
            disk_bytes,
        })
    }

    /// Flushes and closes the store.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn bucket_mut(&mut self, index: u32) -> Result<&mut Bucket> {
        if !self.cache.contains(&index) {
            let path = self
                .dir
                .join(bucket_relative_path(index, self.bucket_bits, self.compress));
            let bucket = Bucket::load(&path, self.compress)?;
            self.cached_bytes += bucket.size_bytes();
            self.cache.put(index, bucket);
            self.evict_over_budget()?;
        }
        self.cache
            .get_mut(&index)
            .ok_or_else(|| Error::invalid_operation("bucket cache lookup"))
    }

    /// Writes back and drops least recently used buckets until the cache fits its budget.
    /// The most recently used bucket always stays.
    fn evict_over_budget(&mut self) -> Result<()> {
        while self.cached_bytes > self.cache_bytes && self.cache.len() > 1 {
            let Some((index, mut bucket)) = self.cache.pop_lru() else {
                break;
            };
            if bucket.is_dirty() {
                let path = self
                    .dir
                    .join(bucket_relative_path(index, self.bucket_bits, self.compress));
                bucket.save(&path, self.compress)?;
            }
            self.cached_bytes -= bucket.size_bytes();
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("failed to flush store {}: {e}", self.dir.display());
        }
    }
}

/// Cursor over all key/value pairs of a [`Store`], returned by [`Store::scan`].
pub struct Scan<'a> {
    paths: std::vec::IntoIter<PathBuf>,
    current: btree_map::IntoIter<String, Vec<u8>>,
    compress: bool,
    _store: PhantomData<&'a mut Store>,
}

impl Iterator for Scan<'_> {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }
            let path = self.paths.next()?;
            let bucket = namedex_common::try_or_ret_some_err!(Bucket::load(&path, self.compress));
            self.current = bucket.into_entries().into_iter();
        }
    }
}

fn is_bucket_file_name(name: &str) -> bool {
    name.ends_with(&format!(".{BUCKET_SUFFIX}"))
        || name.ends_with(&format!(".{COMPRESSED_BUCKET_SUFFIX}"))
}

fn collect_bucket_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_bucket_files(&path, paths)?;
        } else if is_bucket_file_name(&entry.file_name().to_string_lossy()) {
            paths.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(bucket_bits: u8, cache_bytes: usize) -> StoreOptions {
        StoreOptions {
            bucket_bits,
            cache_bytes,
            compress: false,
        }
    }

    #[test]
    fn test_set_get() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = Store::create(dir.path(), options(8, 1 << 20)).unwrap();
        assert!(store.is_empty());
        store.set("abc", b"1".to_vec()).unwrap();
        store.set("abd", b"2".to_vec()).unwrap();
        store.set("abc", b"3".to_vec()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("abc").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.get("abd").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("abe").unwrap(), None);
    }

    #[test]
    fn test_eviction_keeps_data() {
        let dir = tempfile::TempDir::new().unwrap();
        // A tiny budget forces nearly every access to evict.
        let mut store = Store::create(dir.path(), options(8, 256)).unwrap();
        for i in 0..2000 {
            store.set(&format!("key{i}"), i.to_string().into_bytes()).unwrap();
        }
        assert!(store.cache.len() <= 2 || store.cached_bytes <= 256);
        for i in (0..2000).rev() {
            assert_eq!(
                store.get(&format!("key{i}")).unwrap(),
                Some(i.to_string().into_bytes())
            );
        }
        assert_eq!(store.len(), 2000);
    }

    #[test]
    fn test_reopen_keeps_geometry() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let mut store = Store::create(
                dir.path(),
                StoreOptions {
                    bucket_bits: 6,
                    cache_bytes: 1 << 20,
                    compress: true,
                },
            )
            .unwrap();
            store.set("chr1", b"x".to_vec()).unwrap();
            store.metadata_mut().set("lowercase_keys", true);
            store.close().unwrap();
        }
        let mut store = Store::open(dir.path(), options(16, 1 << 20)).unwrap();
        assert_eq!(store.bucket_bits(), 6);
        assert!(store.compress());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("chr1").unwrap(), Some(b"x".to_vec()));
        assert_eq!(
            store.metadata().get("lowercase_keys"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn test_open_empty_store_takes_new_geometry() {
        let dir = tempfile::TempDir::new().unwrap();
        Store::create(dir.path(), options(6, 1 << 20))
            .unwrap()
            .close()
            .unwrap();
        let store = Store::open(dir.path(), options(10, 1 << 20)).unwrap();
        assert_eq!(store.bucket_bits(), 10);
    }

    #[test]
    fn test_empty_removes_buckets() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = Store::create(dir.path(), options(16, 1 << 20)).unwrap();
        for i in 0..100 {
            store.set(&format!("k{i}"), vec![1, 2, 3]).unwrap();
        }
        std::fs::write(dir.path().join("README"), "keep me").unwrap();
        store.flush().unwrap();
        assert!(store.stats().unwrap().bucket_files > 0);

        store.empty().unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.get("k1").unwrap(), None);
        let stats = store.stats().unwrap();
        assert_eq!(stats.bucket_files, 0);
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn test_stream_load_with_merge() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = Store::create(dir.path(), options(4, 1 << 20)).unwrap();
        store.set("a", b"x".to_vec()).unwrap();

        let incoming = vec![
            Ok(("a".to_string(), b"y".to_vec())),
            Ok(("b".to_string(), b"z".to_vec())),
        ];
        let mut concat = |mut existing: Vec<u8>, incoming: Vec<u8>| -> Result<Vec<u8>> {
            existing.extend(incoming);
            Ok(existing)
        };
        let loaded = store
            .stream_load(incoming, 2, Some(&mut concat as &mut MergeFn<'_>))
            .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.get("a").unwrap(), Some(b"xy".to_vec()));
        assert_eq!(store.get("b").unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn test_scan_visits_every_key_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = Store::create(dir.path(), options(12, 4096)).unwrap();
        for i in 0..500 {
            store.set(&format!("name{i}"), vec![i as u8]).unwrap();
        }
        let mut keys = store
            .scan()
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect::<Vec<_>>();
        keys.sort();
        let mut expected = (0..500).map(|i| format!("name{i}")).collect::<Vec<_>>();
        expected.sort();
        assert_eq!(keys, expected);
    }
}
