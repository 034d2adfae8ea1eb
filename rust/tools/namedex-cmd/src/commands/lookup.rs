//! Lookup and complete command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use namedex_index::NameIndex;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct LocationInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<String>,
    fields: Vec<Value>,
}

#[derive(Serialize)]
struct CompletionInfo {
    prefix: String,
    names: Vec<String>,
    truncated: bool,
}

fn open_index(out: &Path) -> Result<NameIndex> {
    NameIndex::open_data_dir(out)
        .with_context(|| format!("Failed to open the name index in {}", out.display()))
}

pub fn run_lookup(out: PathBuf, name: String) -> Result<()> {
    let mut index = open_index(&out)?;
    let records = index
        .lookup_exact(&name)
        .with_context(|| format!("Failed to look up '{name}'"))?;
    let locations = records
        .into_iter()
        .map(|record| LocationInfo {
            track: record
                .track
                .map(|id| index.track_label(id).unwrap_or("?").to_string()),
            name: record.name,
            fields: record.fields,
        })
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&locations)?);
    Ok(())
}

pub fn run_complete(out: PathBuf, prefix: String) -> Result<()> {
    let mut index = open_index(&out)?;
    let completions = index
        .complete(&prefix)
        .with_context(|| format!("Failed to complete '{prefix}'"))?;
    let info = CompletionInfo {
        prefix,
        names: completions.names,
        truncated: completions.truncated,
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
