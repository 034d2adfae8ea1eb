use std::{
    collections::BTreeMap,
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use namedex_common::{Result, error::Error};

/// File suffix of an uncompressed bucket.
pub(crate) const BUCKET_SUFFIX: &str = "bucket";
/// File suffix of a gzip-compressed bucket.
pub(crate) const COMPRESSED_BUCKET_SUFFIX: &str = "bucket.gz";

/// Rough per-entry bookkeeping cost, added to key and value lengths when
/// accounting for cached bucket memory.
const ENTRY_OVERHEAD: usize = 48;

/// Calculates the bucket index for a given key.
///
/// Uses the lower `bucket_bits` bits of the xxh3 hash of the key.
///
/// # Parameters
/// * `key` - The store key
/// * `bucket_bits` - The number of hash bits used for bucketing (at most 32)
#[inline]
pub fn bucket_index(key: &str, bucket_bits: u8) -> u32 {
    let hash = xxhash_rust::xxh3::xxh3_64(key.as_bytes());
    (hash & ((1u64 << bucket_bits) - 1)) as u32
}

/// Returns the path of a bucket file relative to the store directory.
///
/// The bucket index is rendered as lowercase hex with one digit per four bucket bits,
/// then split into groups of three digits: every group but the last names a directory,
/// the last one names the file. With 16 bits, bucket `0xa3f2` lives in `a3f/2.bucket`.
pub fn bucket_relative_path(index: u32, bucket_bits: u8, compress: bool) -> PathBuf {
    let width = (bucket_bits as usize).div_ceil(4);
    let hex = format!("{index:0width$x}");
    let digits = hex.as_bytes();

    let mut path = PathBuf::new();
    let mut chunks = digits.chunks(3).peekable();
    while let Some(chunk) = chunks.next() {
        // Hex digits are ASCII.
        let part = std::str::from_utf8(chunk).unwrap_or_default();
        if chunks.peek().is_some() {
            path.push(part);
        } else {
            let suffix = if compress {
                COMPRESSED_BUCKET_SUFFIX
            } else {
                BUCKET_SUFFIX
            };
            path.push(format!("{part}.{suffix}"));
        }
    }
    path
}

/// One loaded bucket: a sorted key/value map plus its memory accounting.
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    entries: BTreeMap<String, Vec<u8>>,
    size_bytes: usize,
    dirty: bool,
}

impl Bucket {
    /// Loads a bucket file. A missing file is an empty bucket.
    pub fn load(path: &Path, compress: bool) -> Result<Bucket> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Bucket::default()),
            Err(e) => return Err(Error::io(path.display().to_string(), e)),
        };
        Self::decode(&data, compress)
            .map_err(|e| Error::invalid_format(path.display().to_string(), e.to_string()))
    }

    fn decode(data: &[u8], compress: bool) -> Result<Bucket> {
        let inflated;
        let data = if compress {
            let mut buf = Vec::with_capacity(data.len() * 4);
            GzDecoder::new(data).read_to_end(&mut buf)?;
            inflated = buf;
            inflated.as_slice()
        } else {
            data
        };
        let (entries, _): (BTreeMap<String, Vec<u8>>, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard())?;
        let size_bytes = entries
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum::<usize>();
        Ok(Bucket {
            entries,
            size_bytes,
            dirty: false,
        })
    }

    fn encode(&self, compress: bool) -> Result<Vec<u8>> {
        let data = bincode::serde::encode_to_vec(&self.entries, bincode::config::standard())?;
        if !compress {
            return Ok(data);
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder.write_all(&data)?;
        Ok(encoder.finish()?)
    }

    /// Writes the bucket to `path` through a sibling `.tmp` file and a rename.
    pub fn save(&mut self, path: &Path, compress: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent.display().to_string(), e))?;
        }
        let data = self.encode(compress)?;
        let mut tmp_path = path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        fs::write(&tmp_path, &data).map_err(|e| Error::io(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, path).map_err(|e| Error::io(path.display().to_string(), e))?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Inserts or replaces a value. Returns `true` if the key is new to this bucket.
    pub fn set(&mut self, key: &str, value: Vec<u8>) -> bool {
        self.dirty = true;
        let new_size = value.len();
        match self.entries.get_mut(key) {
            Some(existing) => {
                self.size_bytes = self.size_bytes - existing.len() + new_size;
                *existing = value;
                false
            }
            None => {
                self.size_bytes += entry_size(key, &value);
                self.entries.insert(key.to_owned(), value);
                true
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn into_entries(self) -> BTreeMap<String, Vec<u8>> {
        self.entries
    }
}

#[inline]
fn entry_size(key: &str, value: &[u8]) -> usize {
    key.len() + value.len() + ENTRY_OVERHEAD
}
