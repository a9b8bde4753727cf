use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::index::builder::ConsolidatedIndex;
use crate::index::posting::PostingPayload;
use crate::tokenize::ngram_n;

const SAMPLE_SIZE: usize = 100;
const RESERVED_YEAR_KEY: &str = "\0ABSTRACT_PUBLICATION_YEARS";

#[derive(Debug, Serialize, Deserialize)]
struct CdbHeader {
    /// token -> (offset, length) into the blob region that follows the
    /// header in the file.
    offsets: BTreeMap<String, (u64, u32)>,
    store_unigram_positions: bool,
}

/// Writes a consolidated index to `path` via the atomic tmp-then-rename
/// discipline: a half-written `index.cdb.tmp` is never observed by a
/// reader holding the previous generation's memory map.
pub fn write_index(index: &ConsolidatedIndex, path: &Path, tmp_path: &Path) -> Result<()> {
    let mut offsets = BTreeMap::new();
    let mut blob = Vec::new();

    for (token, payload) in &index.tokens {
        let data = bincode::serialize(payload)?;
        offsets.insert(token.clone(), (blob.len() as u64, data.len() as u32));
        blob.extend_from_slice(&data);
    }

    let year_payload = PostingPayload::Positions(
        index.year_map.iter().map(|(pmid, year)| (*pmid, vec![*year as u32])).collect(),
    );
    let year_data = bincode::serialize(&year_payload)?;
    offsets.insert(RESERVED_YEAR_KEY.to_string(), (blob.len() as u64, year_data.len() as u32));
    blob.extend_from_slice(&year_data);

    let header = CdbHeader { offsets, store_unigram_positions: index.store_unigram_positions };
    let header_bytes = bincode::serialize(&header)?;

    let mut file = File::create(tmp_path)?;
    file.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
    file.write_all(&header_bytes)?;
    file.write_all(&blob)?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)?;
    Ok(())
}

/// A memory-mapped, read-only view of an on-disk index. Opening samples up
/// to 100 keys to discover the maximum n-gram width actually stored, rather
/// than trusting a caller-supplied assumption.
pub struct OnDiskIndex {
    mmap: Mmap,
    header: CdbHeader,
    blob_start: usize,
    pub max_ngram_width: usize,
}

impl OnDiskIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let header_len = u64::from_le_bytes(mmap[0..8].try_into().unwrap()) as usize;
        let header: CdbHeader = bincode::deserialize(&mmap[8..8 + header_len])?;
        let blob_start = 8 + header_len;

        let max_ngram_width = header
            .offsets
            .keys()
            .filter(|k| k.as_str() != RESERVED_YEAR_KEY)
            .take(SAMPLE_SIZE)
            .map(|k| ngram_n(k))
            .max()
            .unwrap_or(1);

        Ok(OnDiskIndex { mmap, header, blob_start, max_ngram_width })
    }

    pub fn store_unigram_positions(&self) -> bool {
        self.header.store_unigram_positions
    }

    fn slice_for(&self, token: &str) -> Option<&[u8]> {
        let (offset, len) = *self.header.offsets.get(token)?;
        let start = self.blob_start + offset as usize;
        let end = start + len as usize;
        Some(&self.mmap[start..end])
    }

    /// Deserializes one token's posting payload directly out of the memory
    /// map without touching any other token's bytes.
    pub fn posting(&self, token: &str) -> Result<Option<PostingPayload>> {
        match self.slice_for(token) {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.header.offsets.contains_key(token)
    }

    pub fn year_map(&self) -> Result<HashMap<u32, u16>> {
        match self.posting(RESERVED_YEAR_KEY)? {
            Some(PostingPayload::Positions(map)) => {
                Ok(map.into_iter().map(|(pmid, years)| (pmid, years[0] as u16)).collect())
            }
            _ => Ok(HashMap::new()),
        }
    }

    pub fn token_count(&self) -> usize {
        self.header.offsets.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocumentRecord;
    use crate::index::builder::{IndexBuilder, IndexBuilderConfig};
    use crate::progress::CancellationToken;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let mut builder = IndexBuilder::new(IndexBuilderConfig::default());
        builder
            .add_document(
                1,
                2020,
                &DocumentRecord {
                    pmid: 1,
                    title: Some("ion channel blocker".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let consolidated = builder.consolidate(&CancellationToken::new()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.cdb");
        let tmp = dir.path().join("index.cdb.tmp");
        write_index(&consolidated, &path, &tmp).unwrap();
        assert!(!tmp.exists());

        let reader = OnDiskIndex::open(&path).unwrap();
        assert_eq!(reader.max_ngram_width, 2);
        assert!(reader.contains("ion channel"));
        let posting = reader.posting("ion").unwrap().unwrap();
        assert_eq!(posting.positions_for(1), Some(vec![0]));
        assert_eq!(reader.year_map().unwrap().get(&1), Some(&2020));
    }
}
