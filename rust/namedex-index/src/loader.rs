use namedex_common::Result;
use namedex_store::{MergeFn, Store};

use crate::{accumulator::Accumulator, merge::merge_serialized};

/// Streams every accumulated entry into `store`.
///
/// With `incremental`, entries for keys the store already holds are merged into the stored
/// entry; otherwise they are written as is. Returns the number of keys written.
pub fn load_entries(accumulator: &mut Accumulator, store: &mut Store, incremental: bool) -> Result<u64> {
    let expected = accumulator.len();
    let limits = accumulator.limits();
    let entries = accumulator.entries()?;
    let loaded = if incremental {
        let mut merge = |existing: Vec<u8>, incoming: Vec<u8>| {
            merge_serialized(&existing, &incoming, limits)
        };
        store.stream_load(entries, expected, Some(&mut merge as &mut MergeFn<'_>))?
    } else {
        store.stream_load(entries, expected, None)?
    };
    log::info!("loaded {loaded} keys into {}", store.dir().display());
    Ok(loaded)
}
