use std::collections::VecDeque;

use namedex_common::Result;

use crate::record::NameRecord;

/// One key-level mutation of the index.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Record a location under the lowercased full name.
    AddExact { key: String, record: NameRecord },
    /// Offer `name` (display casing) as a completion of the lowercased prefix `key`.
    AddPrefix { key: String, name: String },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::AddExact { key, .. } | Operation::AddPrefix { key, .. } => key,
        }
    }
}

/// Expands each name record into one `AddExact` operation and, when completions are
/// enabled, one `AddPrefix` per proper prefix of the lowercased name.
pub struct OperationGenerator<I> {
    source: I,
    completions: bool,
    pending: VecDeque<Operation>,
    records: u64,
    operations: u64,
    warned_empty: bool,
}

impl<I> OperationGenerator<I>
where
    I: Iterator<Item = Result<NameRecord>>,
{
    pub fn new(source: I, completion_limit: usize) -> OperationGenerator<I> {
        OperationGenerator {
            source,
            completions: completion_limit > 0,
            pending: VecDeque::new(),
            records: 0,
            operations: 0,
            warned_empty: false,
        }
    }

    /// Records pulled from the source so far, including dropped ones.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Operations produced so far.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    pub fn get_ref(&self) -> &I {
        &self.source
    }

    pub fn into_inner(self) -> I {
        self.source
    }

    fn expand(&mut self, record: NameRecord) {
        let key = record.name.to_lowercase();
        if key.is_empty() {
            if !self.warned_empty {
                log::warn!("dropping records with an empty name");
                self.warned_empty = true;
            }
            return;
        }
        if self.completions {
            let mut ends = key.char_indices().map(|(i, _)| i).skip(1).collect::<Vec<_>>();
            ends.reverse();
            for end in ends {
                self.pending.push_back(Operation::AddPrefix {
                    key: key[..end].to_string(),
                    name: record.name.clone(),
                });
            }
        }
        self.pending.push_front(Operation::AddExact { key, record });
    }
}

impl<I> Iterator for OperationGenerator<I>
where
    I: Iterator<Item = Result<NameRecord>>,
{
    type Item = Result<Operation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(operation) = self.pending.pop_front() {
                self.operations += 1;
                return Some(Ok(operation));
            }
            let record = namedex_common::try_or_ret_some_err!(self.source.next()?);
            self.records += 1;
            self.expand(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(name: &str) -> Result<NameRecord> {
        Ok(NameRecord {
            name: name.to_string(),
            track: Some(0),
            fields: vec![json!(name), json!("chr1"), json!(1), json!(2)],
        })
    }

    fn keys(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(Operation::key).collect()
    }

    #[test]
    fn test_exact_then_proper_prefixes() {
        let ops = OperationGenerator::new(vec![record("ABc")].into_iter(), 20)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(keys(&ops), ["abc", "ab", "a"]);
        assert!(matches!(&ops[0], Operation::AddExact { record, .. } if record.name == "ABc"));
        assert!(matches!(&ops[2], Operation::AddPrefix { name, .. } if name == "ABc"));
    }

    #[test]
    fn test_no_prefixes_without_completions() {
        let ops = OperationGenerator::new(vec![record("abc")].into_iter(), 0)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(keys(&ops), ["abc"]);
    }

    #[test]
    fn test_multibyte_prefixes() {
        let ops = OperationGenerator::new(vec![record("Äbß")].into_iter(), 5)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(keys(&ops), ["äbß", "äb", "ä"]);
    }

    #[test]
    fn test_empty_names_dropped_and_counted() {
        let source = vec![record(""), record("x"), record("")];
        let mut generator = OperationGenerator::new(source.into_iter(), 20);
        let ops = generator.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(keys(&ops), ["x"]);
        assert_eq!(generator.records(), 3);
        assert_eq!(generator.operations(), 1);
    }
}
