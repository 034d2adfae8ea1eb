//! Builds and queries the feature-name index of a genome browser data directory.
//!
//! The build is a chain of lazy iterators:
//!
//! ```text
//! names files ─► RecordStream ─► Normalizer ─► OperationGenerator ─► Accumulator ─► Store
//!                (raw records)   (one per alias) (exact + prefix ops)  (temporary)   (names/)
//! ```
//!
//! Each stage pulls from the previous one, so memory use does not depend on input size.
//! The head of the operation stream is sampled first to size the final store. See
//! [`NameIndexBuilder`] for the driver and [`NameIndex`] for lookups.

pub mod accumulator;
pub mod builder;
pub mod config;
pub mod estimate;
pub mod loader;
pub mod merge;
pub mod normalizer;
pub mod operations;
pub mod reader;
pub mod record;
pub mod source;

pub use builder::{BuildOptions, BuildSummary, NameIndexBuilder};
pub use config::{BrowserConfig, JsonBrowserConfig, RefSeq, StaticBrowserConfig, TrackConfig};
pub use reader::{Completions, NameIndex};
pub use record::{Completion, IndexEntry, IndexLimits, NameRecord, RawRecord};
