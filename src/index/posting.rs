use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The payload stored for one token. Unigrams may be built either as
/// `Positions` (the default) or as a bare `Set` of PMIDs, per the index's
/// `store_unigram_positions` choice; bigrams are always `Positions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PostingPayload {
    Positions(BTreeMap<u32, Vec<u32>>),
    Set(Vec<u32>),
}

impl PostingPayload {
    pub fn doc_freq(&self) -> usize {
        match self {
            PostingPayload::Positions(map) => map.len(),
            PostingPayload::Set(ids) => ids.len(),
        }
    }

    pub fn pmids(&self) -> Vec<u32> {
        match self {
            PostingPayload::Positions(map) => map.keys().copied().collect(),
            PostingPayload::Set(ids) => ids.clone(),
        }
    }

    pub fn positions_for(&self, pmid: u32) -> Option<Vec<u32>> {
        match self {
            PostingPayload::Positions(map) => map.get(&pmid).cloned(),
            PostingPayload::Set(ids) => {
                if ids.binary_search(&pmid).is_ok() {
                    Some(Vec::new())
                } else {
                    None
                }
            }
        }
    }

    /// Merges another payload's entries into this one, concatenating and
    /// sorting positions for PMIDs present in both (the rule consolidation
    /// uses when two hot-map snapshots disagree).
    pub fn merge(&mut self, other: PostingPayload) {
        match (self, other) {
            (PostingPayload::Positions(a), PostingPayload::Positions(b)) => {
                for (pmid, mut positions) in b {
                    a.entry(pmid).or_default().append(&mut positions);
                    let entry = a.get_mut(&pmid).unwrap();
                    entry.sort_unstable();
                    entry.dedup();
                }
            }
            (PostingPayload::Set(a), PostingPayload::Set(b)) => {
                a.extend(b);
                a.sort_unstable();
                a.dedup();
            }
            _ => unreachable!("a token's payload kind is fixed for the lifetime of an index"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_and_sorts_positions() {
        let mut a = PostingPayload::Positions(BTreeMap::from([(1, vec![3, 7])]));
        let b = PostingPayload::Positions(BTreeMap::from([(1, vec![1, 5])]));
        a.merge(b);
        assert_eq!(a.positions_for(1), Some(vec![1, 3, 5, 7]));
    }
}
