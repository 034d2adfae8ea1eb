use std::{
    fs,
    path::{Path, PathBuf},
};

use namedex_common::{Result, error::Error, verify_arg};
use namedex_store::{Store, StoreOptions};
use serde_json::Value;

use crate::{
    accumulator::Accumulator,
    config::{BrowserConfig, TrackConfig},
    estimate::{DEFAULT_BUCKET_BITS, SAMPLE_OPERATIONS, SampleStats, SizeEstimate},
    loader::load_entries,
    normalizer::{Normalizer, TrackRegistry},
    operations::{Operation, OperationGenerator},
    record::IndexLimits,
    source::{ByteCounter, NamesFile, RecordStream, locate_names_files},
};

/// Directory of the index store, relative to the output directory.
pub const NAMES_DIR: &str = "names";

/// Metadata key listing the labels of the tracks that contributed names, in track id
/// order.
pub const META_TRACK_NAMES: &str = "track_names";

/// Metadata flag telling readers that every key is lowercased.
pub const META_LOWERCASE_KEYS: &str = "lowercase_keys";

/// Parameters of an index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Browser data directory: holds the track outputs and receives the index.
    pub out_dir: PathBuf,
    /// Maximum number of completions stored per prefix.
    pub completion_limit: usize,
    /// Maximum number of locations stored per name.
    pub location_limit: usize,
    /// Memory budget of the bucket caches, shared evenly by the temporary and final stores.
    pub cache_bytes: usize,
    /// Parent directory of the temporary accumulation store.
    pub work_dir: Option<PathBuf>,
    /// Explicit bucket bits, instead of the estimate.
    pub bucket_bits: Option<u8>,
    /// Merge into the existing index instead of rebuilding it.
    pub incremental: bool,
    /// Gzip the bucket files of a new index.
    pub compress: bool,
    /// Only index the tracks with these labels.
    pub track_filter: Option<Vec<String>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            out_dir: PathBuf::from("data"),
            completion_limit: 20,
            location_limit: 100,
            cache_bytes: 256 * 1024 * 1024,
            work_dir: None,
            bucket_bits: None,
            incremental: false,
            compress: false,
            track_filter: None,
        }
    }
}

impl BuildOptions {
    pub fn limits(&self) -> IndexLimits {
        IndexLimits {
            completion_limit: self.completion_limit,
            location_limit: self.location_limit,
        }
    }

    /// Cache budget of each of the two stores open during a build.
    pub fn store_cache_bytes(&self) -> usize {
        self.cache_bytes / 2
    }
}

/// What a finished build did.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub files_read: usize,
    pub records: u64,
    pub operations: u64,
    /// Distinct keys produced by this build.
    pub keys: u64,
    /// Keys in the index after the build.
    pub total_keys: u64,
    pub bucket_bits: u8,
    pub estimate: SizeEstimate,
    pub track_names: Vec<String>,
}

/// Builds the name index of a browser data directory.
pub struct NameIndexBuilder<C> {
    config: C,
    options: BuildOptions,
}

impl<C: BrowserConfig> NameIndexBuilder<C> {
    pub fn new(config: C, options: BuildOptions) -> NameIndexBuilder<C> {
        NameIndexBuilder { config, options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn into_config(self) -> C {
        self.config
    }

    /// Runs the whole build: locate the names files, estimate the index size, accumulate
    /// all operations in a temporary store, load the result into `<out>/names`, write the
    /// index metadata and register the index with the browser configuration.
    pub fn build(&mut self) -> Result<BuildSummary> {
        let options = &self.options;
        if let Some(bits) = options.bucket_bits {
            verify_arg!(bucket_bits, (4..=32).contains(&bits));
        }
        if !options.out_dir.is_dir() {
            return Err(Error::configuration(format!(
                "output directory {} does not exist",
                options.out_dir.display()
            )));
        }
        let names_dir = options.out_dir.join(NAMES_DIR);
        fs::create_dir_all(&names_dir).map_err(|e| {
            Error::configuration(format!("cannot write to {}: {e}", names_dir.display()))
        })?;

        let ref_seqs = self.config.ref_seqs()?;
        if ref_seqs.is_empty() {
            return Err(Error::configuration("no reference sequences configured"));
        }
        let tracks = select_tracks(self.config.tracks()?, options.track_filter.as_deref())?;

        let files = locate_names_files(&options.out_dir, &tracks, &ref_seqs);
        if files.is_empty() {
            log::warn!("no names files found, indexing reference sequence names only");
        }
        let total_bytes = total_input_bytes(&files);

        let existing = if options.incremental {
            open_existing(&names_dir, options)?
        } else {
            None
        };
        let registry = match &existing {
            Some(store) => TrackRegistry::with_labels(track_names(store)),
            None => TrackRegistry::new(),
        };

        let counter = ByteCounter::new();
        let stream = RecordStream::new(files, counter.clone());
        let normalizer = Normalizer::new(&ref_seqs, stream, registry);
        let mut generator = OperationGenerator::new(normalizer, options.completion_limit);

        let sample = generator
            .by_ref()
            .take(SAMPLE_OPERATIONS)
            .collect::<Result<Vec<Operation>>>()?;
        let estimate = SizeEstimate::from_sample(
            SampleStats {
                records: generator.records(),
                operations: generator.operations(),
                bytes_read: counter.get(),
            },
            total_bytes,
            options.compress,
        );
        log::info!(
            "estimated {} records and {} operations",
            estimate.records,
            estimate.operations
        );

        let mut store = match existing {
            Some(store) => {
                if options.bucket_bits.is_some_and(|bits| bits != store.bucket_bits()) {
                    log::warn!(
                        "keeping the {} bucket bits of the existing index",
                        store.bucket_bits()
                    );
                }
                if options.compress != store.compress() {
                    log::warn!(
                        "keeping the existing index's compression setting ({})",
                        store.compress()
                    );
                }
                store
            }
            None => Store::create(
                &names_dir,
                StoreOptions {
                    bucket_bits: options.bucket_bits.unwrap_or(estimate.bucket_bits),
                    cache_bytes: options.store_cache_bytes(),
                    compress: options.compress,
                },
            )?,
        };
        log::info!(
            "using {} bucket bits for {}",
            store.bucket_bits(),
            store.dir().display()
        );

        let mut accumulator = Accumulator::new(
            options.work_dir.as_deref(),
            store.bucket_bits(),
            options.store_cache_bytes(),
            options.limits(),
        )?;
        let operations = sample.into_iter().map(Ok).chain(generator.by_ref());
        accumulator.consume(operations, estimate.operations)?;
        log::info!(
            "accumulated {} keys from {} records, {} prefixes sealed",
            accumulator.len(),
            generator.records(),
            accumulator.sealed_count()
        );

        let keys = load_entries(&mut accumulator, &mut store, options.incremental)?;
        drop(accumulator);

        let records = generator.records();
        let operations = generator.operations();
        let normalizer = generator.into_inner();
        let files_read = normalizer.get_ref().files_read();
        let track_names = normalizer.into_registry().labels().to_vec();

        store
            .metadata_mut()
            .set(META_TRACK_NAMES, track_names.clone());
        store.metadata_mut().set(META_LOWERCASE_KEYS, true);
        let bucket_bits = store.bucket_bits();
        let total_keys = store.len();
        store.close()?;

        self.config.register_names(&format!("{NAMES_DIR}/"))?;

        Ok(BuildSummary {
            files_read,
            records,
            operations,
            keys,
            total_keys,
            bucket_bits,
            estimate,
            track_names,
        })
    }
}

/// Applies the label filter; an empty selection is a configuration error.
fn select_tracks(tracks: Vec<TrackConfig>, filter: Option<&[String]>) -> Result<Vec<TrackConfig>> {
    let tracks = match filter {
        Some(labels) => {
            for label in labels {
                if !tracks.iter().any(|t| &t.label == label) {
                    log::warn!("track '{label}' is not configured");
                }
            }
            tracks
                .into_iter()
                .filter(|t| labels.contains(&t.label))
                .collect()
        }
        None => tracks,
    };
    if tracks.is_empty() {
        return Err(Error::configuration("no tracks selected for indexing"));
    }
    Ok(tracks)
}

fn total_input_bytes(files: &[NamesFile]) -> u64 {
    files
        .iter()
        .filter_map(|f| fs::metadata(&f.path).ok())
        .map(|m| m.len())
        .sum()
}

/// Opens the index of a previous build, if there is one with data.
fn open_existing(dir: &Path, options: &BuildOptions) -> Result<Option<Store>> {
    let store = Store::open(
        dir,
        StoreOptions {
            bucket_bits: options.bucket_bits.unwrap_or(DEFAULT_BUCKET_BITS),
            cache_bytes: options.store_cache_bytes(),
            compress: options.compress,
        },
    )?;
    if store.is_empty() {
        log::info!("no existing index in {}, building a new one", dir.display());
        return Ok(None);
    }
    log::info!(
        "merging into the existing index of {} keys in {}",
        store.len(),
        dir.display()
    );
    Ok(Some(store))
}

fn track_names(store: &Store) -> Vec<String> {
    match store.metadata().get(META_TRACK_NAMES) {
        Some(Value::Array(labels)) => labels
            .iter()
            .filter_map(|label| label.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use namedex_common::error::ErrorKind;

    use super::*;
    use crate::config::{RefSeq, StaticBrowserConfig};

    fn config(tracks: &[&str]) -> StaticBrowserConfig {
        StaticBrowserConfig {
            ref_seqs: vec![RefSeq::new("chr1", 1000)],
            tracks: tracks.iter().map(|label| TrackConfig::new(*label)).collect(),
            names_url: None,
        }
    }

    fn options(out_dir: &Path) -> BuildOptions {
        BuildOptions {
            out_dir: out_dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn is_configuration_error(result: Result<BuildSummary>) -> bool {
        matches!(
            result.map_err(Error::into_kind),
            Err(ErrorKind::Configuration { .. })
        )
    }

    #[test]
    fn test_cache_budget_is_shared() {
        let options = BuildOptions {
            cache_bytes: 64 * 1024 * 1024,
            ..Default::default()
        };
        assert_eq!(options.store_cache_bytes(), 32 * 1024 * 1024);
        assert!(2 * options.store_cache_bytes() <= options.cache_bytes);
    }

    #[test]
    fn test_select_tracks() {
        let tracks = config(&["genes", "snps", "repeats"]).tracks;
        let filter = ["snps".to_string(), "missing".to_string()];
        let selected = select_tracks(tracks.clone(), Some(&filter[..])).unwrap();
        assert_eq!(selected, vec![TrackConfig::new("snps")]);
        assert_eq!(select_tracks(tracks, None).unwrap().len(), 3);
        assert!(select_tracks(vec![], None).is_err());
    }

    #[test]
    fn test_configuration_errors() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = options(&dir.path().join("missing"));
        assert!(is_configuration_error(
            NameIndexBuilder::new(config(&["genes"]), missing).build()
        ));

        let mut no_refs = config(&["genes"]);
        no_refs.ref_seqs.clear();
        assert!(is_configuration_error(
            NameIndexBuilder::new(no_refs, options(dir.path())).build()
        ));

        assert!(is_configuration_error(
            NameIndexBuilder::new(config(&[]), options(dir.path())).build()
        ));

        let mut filtered = options(dir.path());
        filtered.track_filter = Some(vec!["other".to_string()]);
        assert!(is_configuration_error(
            NameIndexBuilder::new(config(&["genes"]), filtered).build()
        ));

        let mut bad_bits = options(dir.path());
        bad_bits.bucket_bits = Some(40);
        assert!(matches!(
            NameIndexBuilder::new(config(&["genes"]), bad_bits)
                .build()
                .map_err(Error::into_kind),
            Err(ErrorKind::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_reference_sequences_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut builder = NameIndexBuilder::new(config(&["genes"]), options(dir.path()));
        let summary = builder.build().unwrap();
        assert_eq!(summary.files_read, 0);
        assert_eq!(summary.records, 1);
        assert!(summary.track_names.is_empty());
        assert_eq!(summary.bucket_bits, DEFAULT_BUCKET_BITS);
        // "chr1" plus "chr", "ch", "c".
        assert_eq!(summary.total_keys, 4);
        assert_eq!(builder.config().names_url.as_deref(), Some("names/"));
    }
}
