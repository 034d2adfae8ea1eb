//! The browser configuration collaborator: where reference sequences and tracks come
//! from, and where the finished index gets registered.

use std::{
    fs,
    path::{Path, PathBuf},
};

use namedex_common::{Result, error::Error};
use serde::Deserialize;
use serde_json::{Value, json};

/// One reference sequence (chromosome, contig) known to the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct RefSeq {
    pub name: String,
    pub length: u64,
    pub start: u64,
    pub end: u64,
    /// Directory holding the sequence chunks, relative to the data directory.
    pub seq_dir: String,
    pub seq_chunk_size: Option<u64>,
}

impl RefSeq {
    pub fn new(name: impl Into<String>, length: u64) -> RefSeq {
        let name = name.into();
        RefSeq {
            seq_dir: format!("seq/{name}"),
            name,
            length,
            start: 0,
            end: length,
            seq_chunk_size: None,
        }
    }
}

/// One configured track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackConfig {
    pub label: String,
    pub store_class: Option<String>,
    pub url_template: Option<String>,
}

impl TrackConfig {
    pub fn new(label: impl Into<String>) -> TrackConfig {
        TrackConfig {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Tracks backed by a tabix-indexed VCF contribute their variant IDs as names.
    pub fn is_variant_call(&self) -> bool {
        self.store_class
            .as_deref()
            .is_some_and(|class| class.ends_with("VCFTabix"))
    }
}

/// Source of reference sequences and tracks, and sink for the index registration.
pub trait BrowserConfig {
    /// Reference sequences in configuration order.
    fn ref_seqs(&self) -> Result<Vec<RefSeq>>;

    /// All configured tracks, in configuration order.
    fn tracks(&self) -> Result<Vec<TrackConfig>>;

    /// Records that the name index is available at `names_url` (relative to the data
    /// directory).
    fn register_names(&mut self, names_url: &str) -> Result<()>;
}

/// [`BrowserConfig`] backed by the browser's own JSON files in the data directory:
/// `seq/refSeqs.json` and `trackList.json`.
pub struct JsonBrowserConfig {
    ref_seqs_path: PathBuf,
    track_list_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefSeqJson {
    name: String,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    seq_dir: Option<String>,
    #[serde(default)]
    seq_chunk_size: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackJson {
    label: String,
    #[serde(default)]
    store_class: Option<String>,
    #[serde(default)]
    url_template: Option<String>,
}

impl JsonBrowserConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> JsonBrowserConfig {
        let data_dir = data_dir.as_ref();
        JsonBrowserConfig {
            ref_seqs_path: data_dir.join("seq").join("refSeqs.json"),
            track_list_path: data_dir.join("trackList.json"),
        }
    }

    fn read_json(path: &Path) -> Result<Value> {
        let data = fs::read(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn read_track_list(&self) -> Result<Value> {
        if self.track_list_path.exists() {
            Self::read_json(&self.track_list_path)
        } else {
            Ok(json!({ "tracks": [] }))
        }
    }
}

impl BrowserConfig for JsonBrowserConfig {
    fn ref_seqs(&self) -> Result<Vec<RefSeq>> {
        let value = Self::read_json(&self.ref_seqs_path)?;
        let entries: Vec<RefSeqJson> = serde_json::from_value(value)?;
        Ok(entries
            .into_iter()
            .map(|r| {
                let start = r.start.unwrap_or(0);
                let end = r.end.or(r.length.map(|l| start + l)).unwrap_or(start);
                RefSeq {
                    length: r.length.unwrap_or(end.saturating_sub(start)),
                    seq_dir: r.seq_dir.unwrap_or_else(|| format!("seq/{}", r.name)),
                    name: r.name,
                    start,
                    end,
                    seq_chunk_size: r.seq_chunk_size,
                }
            })
            .collect())
    }

    fn tracks(&self) -> Result<Vec<TrackConfig>> {
        let mut track_list = self.read_track_list()?;
        let tracks = match track_list.get_mut("tracks").map(Value::take) {
            Some(tracks) => serde_json::from_value::<Vec<TrackJson>>(tracks)?,
            None => Vec::new(),
        };
        Ok(tracks
            .into_iter()
            .map(|t| TrackConfig {
                label: t.label,
                store_class: t.store_class,
                url_template: t.url_template,
            })
            .collect())
    }

    fn register_names(&mut self, names_url: &str) -> Result<()> {
        let mut track_list = self.read_track_list()?;
        let Some(object) = track_list.as_object_mut() else {
            return Err(Error::configuration(format!(
                "{} is not a JSON object",
                self.track_list_path.display()
            )));
        };
        object.insert("names".to_string(), json!({ "type": "Hash", "url": names_url }));
        let data = serde_json::to_vec_pretty(&track_list)?;
        fs::write(&self.track_list_path, data)
            .map_err(|e| Error::io(self.track_list_path.display().to_string(), e))
    }
}

/// In-memory configuration, handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBrowserConfig {
    pub ref_seqs: Vec<RefSeq>,
    pub tracks: Vec<TrackConfig>,
    pub names_url: Option<String>,
}

impl BrowserConfig for StaticBrowserConfig {
    fn ref_seqs(&self) -> Result<Vec<RefSeq>> {
        Ok(self.ref_seqs.clone())
    }

    fn tracks(&self) -> Result<Vec<TrackConfig>> {
        Ok(self.tracks.clone())
    }

    fn register_names(&mut self, names_url: &str) -> Result<()> {
        self.names_url = Some(names_url.to_string());
        Ok(())
    }
}
