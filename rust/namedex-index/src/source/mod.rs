//! Record sources: locating the names files produced for each track and lazily reading
//! raw name records out of them.

use std::{
    io::{BufRead, Lines, Read},
    path::{Path, PathBuf},
};

use namedex_common::{Result, error::Error};
use serde_json::{Value, json};

use crate::{
    config::{RefSeq, TrackConfig},
    record::RawRecord,
};

mod input;

pub use input::{ByteCounter, is_gzip, open_input};

use input::read_error;

/// Candidate names files inside `<out>/tracks/<label>/<refseq>/`, in order of preference.
const NAMES_FILE_CANDIDATES: [&str; 4] =
    ["names.txt", "names.txt.gz", "names.json", "names.json.gz"];

/// How the records of a names file are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// One JSON record per line (`.txt`).
    LineDelimited,
    /// A single JSON array holding every record (`.json`).
    WholeFile,
    /// Tab-separated variant calls (`.vcf`).
    VariantCall,
    Unsupported,
}

impl RecordFormat {
    /// Picks the format from the file name, looking through a trailing `.gz`.
    pub fn from_path(path: &Path) -> RecordFormat {
        let stem_path;
        let path = if is_gzip(path) {
            stem_path = path.with_extension("");
            stem_path.as_path()
        } else {
            path
        };
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("txt") => RecordFormat::LineDelimited,
            Some("json") => RecordFormat::WholeFile,
            Some("vcf") => RecordFormat::VariantCall,
            _ => RecordFormat::Unsupported,
        }
    }
}

/// A located input file and the track it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct NamesFile {
    pub path: PathBuf,
    pub track_label: String,
    pub format: RecordFormat,
}

impl NamesFile {
    pub fn new(path: PathBuf, track_label: impl Into<String>) -> NamesFile {
        NamesFile {
            format: RecordFormat::from_path(&path),
            path,
            track_label: track_label.into(),
        }
    }
}

/// Finds the names files of `tracks` under `out_dir`.
///
/// Each (track, reference sequence) pair contributes at most one file, line-delimited
/// preferred over whole-file. A variant-call track contributes its backing file once.
pub fn locate_names_files(
    out_dir: &Path,
    tracks: &[TrackConfig],
    ref_seqs: &[RefSeq],
) -> Vec<NamesFile> {
    let mut files = Vec::new();
    for track in tracks {
        let track_dir = out_dir.join("tracks").join(&track.label);
        for ref_seq in ref_seqs {
            let dir = track_dir.join(&ref_seq.name);
            if let Some(path) = NAMES_FILE_CANDIDATES
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())
            {
                files.push(NamesFile::new(path, &track.label));
            }
        }
        if track.is_variant_call() {
            if let Some(template) = &track.url_template {
                files.push(NamesFile::new(out_dir.join(template), &track.label));
            }
        }
    }
    files
}

enum Reader {
    LineDelimited(Lines<Box<dyn BufRead>>),
    WholeFile(std::vec::IntoIter<Value>),
    VariantCall(Lines<Box<dyn BufRead>>),
}

/// Lazily yields the raw records of one names file.
///
/// Lines or elements that do not form a record are logged and skipped; the rest of the
/// file is still read.
pub struct RecordSource {
    path: PathBuf,
    track_label: String,
    reader: Reader,
    position: u64,
}

impl RecordSource {
    /// Opens `file`. An unsupported format is reported as a recoverable error.
    pub fn open(file: &NamesFile, counter: &ByteCounter) -> Result<RecordSource> {
        let reader = match file.format {
            RecordFormat::Unsupported => return Err(Error::unsupported_format(&file.path)),
            RecordFormat::LineDelimited => {
                Reader::LineDelimited(open_input(&file.path, counter)?.lines())
            }
            RecordFormat::VariantCall => {
                Reader::VariantCall(open_input(&file.path, counter)?.lines())
            }
            RecordFormat::WholeFile => {
                let mut data = Vec::new();
                open_input(&file.path, counter)?
                    .read_to_end(&mut data)
                    .map_err(|e| read_error(&file.path, e))?;
                let records: Vec<Value> = serde_json::from_slice(&data).map_err(|e| {
                    Error::malformed_record(&file.path, None, format!("not a JSON array: {e}"))
                })?;
                Reader::WholeFile(records.into_iter())
            }
        };
        Ok(RecordSource {
            path: file.path.clone(),
            track_label: file.track_label.clone(),
            reader,
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_line(
        lines: &mut Lines<Box<dyn BufRead>>,
        path: &Path,
        position: &mut u64,
    ) -> Option<Result<String>> {
        let line = lines.next()?;
        *position += 1;
        Some(line.map_err(|e| read_error(path, e)))
    }

    fn warn_skipped(&self, message: impl std::fmt::Display) {
        log::warn!(
            "skipping malformed record in {} at {}: {message}",
            self.path.display(),
            self.position
        );
    }
}

impl Iterator for RecordSource {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let parsed = match &mut self.reader {
                Reader::WholeFile(records) => {
                    let value = records.next()?;
                    self.position += 1;
                    RawRecord::from_json(value)
                }
                Reader::LineDelimited(lines) => {
                    let line = namedex_common::try_or_ret_some_err!(Self::next_line(
                        lines,
                        &self.path,
                        &mut self.position
                    )?);
                    if line.trim().is_empty() {
                        continue;
                    }
                    serde_json::from_str::<Value>(&line)
                        .map_err(|e| e.to_string())
                        .and_then(RawRecord::from_json)
                }
                Reader::VariantCall(lines) => {
                    let line = namedex_common::try_or_ret_some_err!(Self::next_line(
                        lines,
                        &self.path,
                        &mut self.position
                    )?);
                    if line.starts_with('#') || line.trim().is_empty() {
                        continue;
                    }
                    parse_variant_line(&line, &self.track_label)
                }
            };
            match parsed {
                Ok(record) => return Some(Ok(record)),
                Err(message) => self.warn_skipped(message),
            }
        }
    }
}

/// Turns one VCF data line into `([id], label, id, chrom, start, end)`, with a zero-based
/// start and the span of the reference allele.
fn parse_variant_line(line: &str, track_label: &str) -> std::result::Result<RawRecord, String> {
    let mut columns = line.splitn(5, '\t');
    let (Some(chrom), Some(pos), Some(id), Some(reference)) =
        (columns.next(), columns.next(), columns.next(), columns.next())
    else {
        return Err("expected at least 4 tab-separated columns".to_string());
    };
    let pos: u64 = pos
        .trim()
        .parse()
        .map_err(|_| format!("invalid position '{pos}'"))?;
    let start = pos.saturating_sub(1);
    let end = start + reference.len() as u64;
    Ok(RawRecord {
        aliases: vec![json!(id)],
        track_label: track_label.to_string(),
        fields: vec![json!(id), json!(chrom), json!(start), json!(end)],
    })
}

/// Chains the records of many names files into one stream, opening each file only when the
/// previous one is exhausted. Files of unsupported format are skipped with a warning.
pub struct RecordStream {
    files: std::vec::IntoIter<NamesFile>,
    current: Option<RecordSource>,
    counter: ByteCounter,
    files_read: usize,
}

impl RecordStream {
    pub fn new(files: Vec<NamesFile>, counter: ByteCounter) -> RecordStream {
        RecordStream {
            files: files.into_iter(),
            current: None,
            counter,
            files_read: 0,
        }
    }

    /// Number of files opened so far.
    pub fn files_read(&self) -> usize {
        self.files_read
    }
}

impl Iterator for RecordStream {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(source) = &mut self.current {
                match source.next() {
                    Some(record) => return Some(record),
                    None => self.current = None,
                }
            }
            let file = self.files.next()?;
            match RecordSource::open(&file, &self.counter) {
                Ok(source) => {
                    log::debug!("reading names from {}", file.path.display());
                    self.files_read += 1;
                    self.current = Some(source);
                }
                Err(e) if e.is_recoverable() => log::warn!("{e}, skipping"),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use namedex_common::error::ErrorKind;

    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn read_all(file: NamesFile) -> Vec<RawRecord> {
        RecordStream::new(vec![file], ByteCounter::new())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_format_from_path() {
        let cases = [
            ("names.txt", RecordFormat::LineDelimited),
            ("names.txt.gz", RecordFormat::LineDelimited),
            ("names.json", RecordFormat::WholeFile),
            ("names.JSON.gz", RecordFormat::WholeFile),
            ("calls.vcf.gz", RecordFormat::VariantCall),
            ("calls.bcf", RecordFormat::Unsupported),
            ("names", RecordFormat::Unsupported),
        ];
        for (name, format) in cases {
            assert_eq!(RecordFormat::from_path(Path::new(name)), format, "{name}");
        }
    }

    #[test]
    fn test_locate_prefers_line_delimited() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path();
        write(&out.join("tracks/genes/chr1/names.txt"), "");
        write(&out.join("tracks/genes/chr1/names.json"), "[]");
        write(&out.join("tracks/genes/chr2/names.json.gz"), "");
        write(&out.join("tracks/other/chr1/names.txt"), "");

        let mut snps = TrackConfig::new("snps");
        snps.store_class = Some("JBrowse/Store/SeqFeature/VCFTabix".to_string());
        snps.url_template = Some("vcf/snps.vcf.gz".to_string());
        let tracks = [TrackConfig::new("genes"), snps];
        let ref_seqs = [RefSeq::new("chr1", 1000), RefSeq::new("chr2", 500)];

        let files = locate_names_files(out, &tracks, &ref_seqs);
        let found = files
            .iter()
            .map(|f| (f.path.strip_prefix(out).unwrap().to_path_buf(), f.format))
            .collect::<Vec<_>>();
        assert_eq!(
            found,
            vec![
                (
                    PathBuf::from("tracks/genes/chr1/names.txt"),
                    RecordFormat::LineDelimited
                ),
                (
                    PathBuf::from("tracks/genes/chr2/names.json.gz"),
                    RecordFormat::WholeFile
                ),
                (PathBuf::from("vcf/snps.vcf.gz"), RecordFormat::VariantCall),
            ]
        );
        assert_eq!(files[2].track_label, "snps");
    }

    #[test]
    fn test_line_delimited_skips_malformed_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("names.txt");
        write(
            &path,
            "[[\"ABC1\"],\"genes\",\"ABC1\",\"chr1\",10,20]\n\
             {not json\n\
             \n\
             [[\"abc2\"],\"genes\",\"abc2\",\"chr1\",30,40]\n",
        );
        let records = read_all(NamesFile::new(path, "genes"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].aliases, vec![json!("abc2")]);
        assert_eq!(records[1].fields[3], json!(40));
    }

    #[test]
    fn test_whole_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("names.json");
        write(
            &path,
            r#"[[["foo",["bar","baz"]],"genes","foo","chr1",100,200],
                [["qux"],"genes","qux","chr2",1,2]]"#,
        );
        let records = read_all(NamesFile::new(path.clone(), "genes"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aliases.len(), 2);

        write(&path, "{\"not\": \"an array\"}");
        let err = RecordStream::new(vec![NamesFile::new(path, "genes")], ByteCounter::new())
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedRecord { .. }));
    }

    #[test]
    fn test_variant_call() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snps.vcf");
        write(
            &path,
            "##fileformat=VCFv4.2\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\n\
             chr1\t100\trs123\tAC\tA\t50\tPASS\t.\n\
             chr2\t7\trs456\tG\tT\t50\tPASS\t.\n",
        );
        let records = read_all(NamesFile::new(path, "snps"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].track_label, "snps");
        assert_eq!(records[0].aliases, vec![json!("rs123")]);
        assert_eq!(
            records[0].fields,
            vec![json!("rs123"), json!("chr1"), json!(99), json!(101)]
        );
        assert_eq!(records[1].fields[2], json!(6));
    }

    #[test]
    fn test_stream_skips_unsupported_and_fails_on_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("names.txt");
        write(&good, "[[\"a\"],\"t\",\"a\",\"chr1\",0,1]\n");
        let files = vec![
            NamesFile::new(dir.path().join("names.bin"), "t"),
            NamesFile::new(good, "t"),
        ];
        let mut stream = RecordStream::new(files, ByteCounter::new());
        assert_eq!(stream.by_ref().count(), 1);
        assert_eq!(stream.files_read(), 1);

        let files = vec![NamesFile::new(dir.path().join("missing.txt"), "t")];
        let err = RecordStream::new(files, ByteCounter::new())
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InputAccess { .. }));
    }
}
