//! Bucketed, hash-sharded on-disk key/value store used for the feature name index.
//!
//! Keys are strings, values are opaque byte blobs. Every key is assigned to one of
//! `2^bucket_bits` buckets by its xxh3 hash; each non-empty bucket is a single file holding
//! the sorted key/value map of that bucket. A small JSON metadata dictionary lives next to
//! the buckets in `meta.json`.
//!
//! Buckets are loaded on demand and kept in an LRU cache bounded by a byte budget, so the
//! store can hold far more data than fits in memory while still supporting random
//! read-modify-write access.

mod bucket;
mod metadata;
mod store;

pub use bucket::{bucket_index, bucket_relative_path};
pub use metadata::Metadata;
pub use store::{MergeFn, Scan, Store, StoreOptions, StoreStats};
