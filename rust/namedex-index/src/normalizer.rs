use std::collections::VecDeque;

use ahash::AHashMap;
use namedex_common::Result;
use serde_json::{Value, json};

use crate::{
    config::RefSeq,
    record::{NameRecord, RawRecord},
};

/// Assigns dense track ids in first-seen order.
///
/// The labels, in id order, are the tracks that contributed names to the index.
#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    ids: AHashMap<String, u32>,
    labels: Vec<String>,
}

impl TrackRegistry {
    pub fn new() -> TrackRegistry {
        TrackRegistry::default()
    }

    /// Starts from the labels of a previous build so their ids stay stable.
    pub fn with_labels(labels: impl IntoIterator<Item = String>) -> TrackRegistry {
        let mut registry = TrackRegistry::new();
        for label in labels {
            registry.id_for(&label);
        }
        registry
    }

    pub fn id_for(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.labels.len() as u32;
        self.ids.insert(label.to_string(), id);
        self.labels.push(label.to_string());
        id
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The record describing a reference sequence itself, so that sequence names resolve
/// through the same exact-match path as features.
///
/// Fields: `[name, name, 0, end, seq_dir, chunk_size, length]`.
pub fn ref_seq_record(ref_seq: &RefSeq) -> NameRecord {
    NameRecord {
        name: ref_seq.name.clone(),
        track: None,
        fields: vec![
            json!(ref_seq.name),
            json!(ref_seq.name),
            json!(0),
            json!(ref_seq.end),
            json!(ref_seq.seq_dir),
            json!(ref_seq.seq_chunk_size),
            json!(ref_seq.length),
        ],
    }
}

/// Turns raw records into one [`NameRecord`] per alias.
///
/// Reference sequence records come first, then the records of `source` in order.
pub struct Normalizer<I> {
    ref_seqs: std::vec::IntoIter<NameRecord>,
    source: I,
    registry: TrackRegistry,
    pending: VecDeque<NameRecord>,
}

impl<I> Normalizer<I>
where
    I: Iterator<Item = Result<RawRecord>>,
{
    pub fn new(ref_seqs: &[RefSeq], source: I, registry: TrackRegistry) -> Normalizer<I> {
        Normalizer {
            ref_seqs: ref_seqs
                .iter()
                .map(ref_seq_record)
                .collect::<Vec<_>>()
                .into_iter(),
            source,
            registry,
            pending: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn get_ref(&self) -> &I {
        &self.source
    }

    pub fn into_registry(self) -> TrackRegistry {
        self.registry
    }

    fn expand(&mut self, raw: RawRecord) {
        let track = self.registry.id_for(&raw.track_label);
        let names = flatten_aliases(raw.aliases);
        let count = names.len();
        let mut fields = Some(raw.fields);
        for (i, name) in names.into_iter().enumerate() {
            let fields = if i + 1 == count {
                fields.take().unwrap_or_default()
            } else {
                fields.clone().unwrap_or_default()
            };
            self.pending.push_back(NameRecord {
                name,
                track: Some(track),
                fields,
            });
        }
    }
}

impl<I> Iterator for Normalizer<I>
where
    I: Iterator<Item = Result<RawRecord>>,
{
    type Item = Result<NameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.ref_seqs.next() {
            return Some(Ok(record));
        }
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            let raw = namedex_common::try_or_ret_some_err!(self.source.next()?);
            self.expand(raw);
        }
    }
}

/// Flattens exactly one level of nested alias lists. Scalars other than strings are
/// rendered as text; deeper nesting and nulls are dropped.
fn flatten_aliases(aliases: Vec<Value>) -> Vec<String> {
    let mut names = Vec::with_capacity(aliases.len());
    for alias in aliases {
        match alias {
            Value::Array(inner) => names.extend(inner.into_iter().filter_map(scalar_name)),
            other => names.extend(scalar_name(other)),
        }
    }
    names
}

fn scalar_name(value: Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(aliases: Value, label: &str, fields: Value) -> Result<RawRecord> {
        Ok(RawRecord {
            aliases: serde_json::from_value(aliases).unwrap(),
            track_label: label.to_string(),
            fields: serde_json::from_value(fields).unwrap(),
        })
    }

    #[test]
    fn test_alias_expansion() {
        let source = vec![raw(
            json!(["foo", ["bar", "baz"]]),
            "genes",
            json!(["foo", "chr1", 100, 200]),
        )];
        let records = Normalizer::new(&[], source.into_iter(), TrackRegistry::new())
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let names = records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["foo", "bar", "baz"]);
        for record in &records {
            assert_eq!(record.track, Some(0));
            assert_eq!(record.location(), &[json!("chr1"), json!(100), json!(200)]);
        }
    }

    #[test]
    fn test_ref_seqs_first_and_track_ids() {
        let source = vec![
            raw(json!(["a"]), "genes", json!(["a", "chr1", 1, 2])),
            raw(json!(["b"]), "snps", json!(["b", "chr1", 3, 4])),
            raw(json!(["c"]), "genes", json!(["c", "chr2", 5, 6])),
        ];
        let ref_seqs = [RefSeq::new("chr1", 1000), RefSeq::new("chr2", 500)];
        let mut normalizer = Normalizer::new(
            &ref_seqs,
            source.into_iter(),
            TrackRegistry::with_labels(["old".to_string()]),
        );
        let records = normalizer.by_ref().collect::<Result<Vec<_>>>().unwrap();

        assert_eq!(records[0].name, "chr1");
        assert_eq!(records[0].track, None);
        assert_eq!(records[0].location(), &[json!("chr1"), json!(0), json!(1000)]);
        assert_eq!(records[1].fields[6], json!(500));

        let tracks = records[2..].iter().map(|r| r.track).collect::<Vec<_>>();
        assert_eq!(tracks, [Some(1), Some(2), Some(1)]);
        assert_eq!(normalizer.registry().labels(), ["old", "genes", "snps"]);
    }

    #[test]
    fn test_ref_seq_record_layout() {
        let ref_seq = RefSeq {
            seq_chunk_size: Some(20_000),
            ..RefSeq::new("ctgA", 50_001)
        };
        let record = ref_seq_record(&ref_seq);
        assert_eq!(record.track, None);
        assert_eq!(
            record.fields,
            [
                json!("ctgA"),
                json!("ctgA"),
                json!(0),
                json!(50_001),
                json!("seq/ctgA"),
                json!(20_000),
                json!(50_001),
            ]
        );
        let without_chunks = ref_seq_record(&RefSeq::new("ctgB", 10));
        assert_eq!(without_chunks.fields[5], Value::Null);
    }

    #[test]
    fn test_errors_pass_through() {
        let source = vec![Err(namedex_common::error::Error::configuration("boom"))];
        let mut normalizer = Normalizer::new(&[], source.into_iter(), TrackRegistry::new());
        assert!(normalizer.next().unwrap().is_err());
        assert!(normalizer.next().is_none());
    }

    #[test]
    fn test_flatten_aliases() {
        let names = flatten_aliases(vec![
            json!("x"),
            json!(["y", ["too", "deep"], 7]),
            Value::Null,
            json!(42),
        ]);
        assert_eq!(names, ["x", "y", "7", "42"]);
    }
}
