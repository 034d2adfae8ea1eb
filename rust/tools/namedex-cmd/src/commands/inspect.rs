//! Inspect command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use namedex_index::NameIndex;
use serde::Serialize;

use crate::utils::format_size;

#[derive(Serialize)]
struct InspectSummary {
    key_count: u64,
    bucket_bits: u8,
    compress: bool,
    bucket_files: u64,
    disk_bytes: u64,
    disk_size: String,
    track_names: Vec<String>,
}

pub fn run(out: PathBuf) -> Result<()> {
    println!("Inspecting name index: {}", out.display());
    let mut index = NameIndex::open_data_dir(&out)
        .with_context(|| format!("Failed to open the name index in {}", out.display()))?;
    let stats = index.stats().context("Failed to read index statistics")?;
    let summary = InspectSummary {
        key_count: stats.key_count,
        bucket_bits: stats.bucket_bits,
        compress: stats.compress,
        bucket_files: stats.bucket_files,
        disk_bytes: stats.disk_bytes,
        disk_size: format_size(stats.disk_bytes),
        track_names: index.track_names().to_vec(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
