//! Dedup filter: splits a fetched batch into never-seen items and known ones.

use std::collections::HashSet;

use crawlwatch_core::types::{ContentKey, Work};

/// Result of filtering one fetched batch.
#[derive(Debug, Default)]
pub struct Partition {
    /// Items whose key is neither stored nor seen earlier in the batch.
    pub new_items: Vec<Work>,
    /// Items already present in the store. Reported as `updated_count`.
    pub known_count: u32,
    /// Later copies of any key already met in this batch, known or not.
    pub duplicate_count: u32,
}

/// Keep the first occurrence of each unseen key, in fetch order.
pub fn partition(known: &HashSet<ContentKey>, works: Vec<Work>) -> Partition {
    let mut seen: HashSet<ContentKey> = HashSet::new();
    let mut out = Partition::default();

    for work in works {
        let key = work.key();
        let is_known = known.contains(&key);
        if !seen.insert(key) {
            out.duplicate_count += 1;
        } else if is_known {
            out.known_count += 1;
        } else {
            out.new_items.push(work);
        }
    }

    out
}
