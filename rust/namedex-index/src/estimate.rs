//! Projecting the size of the whole build from the head of the operation stream.

/// Maximum number of operations pulled from the stream before the estimate is made.
pub const SAMPLE_OPERATIONS: usize = 50_000;

/// Bucket bits used when there is nothing to estimate from.
pub const DEFAULT_BUCKET_BITS: u8 = 12;

const MIN_BUCKET_BITS: f64 = 4.0;
const MAX_BUCKET_BITS: f64 = 32.0;

/// Counters observed while taking the sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleStats {
    pub records: u64,
    pub operations: u64,
    /// Raw input bytes consumed to produce the sampled records.
    pub bytes_read: u64,
}

/// Projected totals for the build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEstimate {
    pub avg_record_bytes: f64,
    pub records: u64,
    pub operations: u64,
    pub bucket_bits: u8,
}

impl SizeEstimate {
    /// Extrapolates `sample` to `total_bytes` of input.
    ///
    /// Records that cost no input bytes (reference sequences) do not count, so a build
    /// without names files projects zero records and falls back to [`DEFAULT_BUCKET_BITS`].
    pub fn from_sample(sample: SampleStats, total_bytes: u64, compress: bool) -> SizeEstimate {
        let avg_record_bytes = if sample.records == 0 {
            0.0
        } else {
            sample.bytes_read as f64 / sample.records as f64
        };
        let records = if avg_record_bytes > 0.0 {
            (total_bytes as f64 / avg_record_bytes) as u64
        } else {
            0
        };
        let operations = if sample.records == 0 {
            0
        } else {
            (records as f64 * (sample.operations as f64 / sample.records as f64)) as u64
        };
        let estimate = SizeEstimate {
            avg_record_bytes,
            records,
            operations,
            bucket_bits: bucket_bits_for(records, compress),
        };
        log::debug!("{estimate:?} from {sample:?} and {total_bytes} input bytes");
        estimate
    }
}

/// Bucket bits giving roughly 10 records per bucket (40 when compressed), rounded down to
/// a multiple of 4 and kept within `[4, 32]`.
pub fn bucket_bits_for(records: u64, compress: bool) -> u8 {
    if records == 0 {
        return DEFAULT_BUCKET_BITS;
    }
    let per_bucket = if compress { 40.0 } else { 10.0 };
    let bits = 4.0 * ((records as f64 / per_bucket).log2() / 4.0).floor();
    bits.clamp(MIN_BUCKET_BITS, MAX_BUCKET_BITS) as u8
}
