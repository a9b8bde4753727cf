use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::DocumentRecord;
use crate::index::posting::PostingPayload;
use crate::progress::CancellationToken;
use crate::tokenize::{ngram_n, tokenize};

#[derive(Debug, Clone, Copy)]
pub struct IndexBuilderConfig {
    pub store_unigram_positions: bool,
    /// Number of distinct tokens the hot map may hold before its entries
    /// are flushed into the per-token cold byte streams.
    pub flush_threshold: usize,
}

impl Default for IndexBuilderConfig {
    fn default() -> Self {
        IndexBuilderConfig { store_unigram_positions: true, flush_threshold: 50_000 }
    }
}

/// The fully consolidated, in-memory index produced by one build. `cdb`
/// serializes this to the on-disk constant-database-style format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidatedIndex {
    pub tokens: BTreeMap<String, PostingPayload>,
    pub year_map: HashMap<u32, u16>,
    pub store_unigram_positions: bool,
    pub max_ngram_width: usize,
}

/// Computes the position of every token in a document's title/abstract/body,
/// with a one-token gap inserted at each field boundary so phrase search
/// never matches across fields.
fn token_positions(doc: &DocumentRecord) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let mut pos: u32 = 0;

    if let Some(ref title) = doc.title {
        for tok in tokenize(title, false) {
            out.push((tok, pos));
            pos += 1;
        }
    }
    pos += 2;

    if let Some(ref abs) = doc.abstract_text {
        for tok in tokenize(abs, false) {
            out.push((tok, pos));
            pos += 1;
        }
    }
    pos += 2;

    if let Some(ref body) = doc.body {
        for tok in tokenize(body, false) {
            out.push((tok, pos));
            pos += 1;
        }
    }

    out
}

/// Builds the hot → cold → consolidated index from a stream of documents.
pub struct IndexBuilder {
    config: IndexBuilderConfig,
    hot: HashMap<String, PostingPayload>,
    cold: HashMap<String, Vec<u8>>,
    year_map: HashMap<u32, u16>,
}

impl IndexBuilder {
    pub fn new(config: IndexBuilderConfig) -> Self {
        IndexBuilder { config, hot: HashMap::new(), cold: HashMap::new(), year_map: HashMap::new() }
    }

    /// Feeds one document's text into the hot map, computing unigram and
    /// bigram positions as described in §3.
    pub fn add_document(&mut self, pmid: u32, year: u16, doc: &DocumentRecord) -> Result<()> {
        self.year_map.insert(pmid, year);
        let positions = token_positions(doc);

        let mut unigram_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (tok, p) in &positions {
            unigram_positions.entry(tok.clone()).or_default().push(*p);
        }
        for (tok, mut plist) in unigram_positions {
            plist.sort_unstable();
            self.merge_into_hot(tok, pmid, plist);
        }

        let mut bigram_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for window in positions.windows(2) {
            let (t0, p0) = &window[0];
            let (t1, p1) = &window[1];
            if *p1 == p0 + 1 {
                bigram_positions.entry(format!("{} {}", t0, t1)).or_default().push(*p0);
            }
        }
        for (bigram, mut plist) in bigram_positions {
            plist.sort_unstable();
            self.merge_into_hot(bigram, pmid, plist);
        }

        if self.hot.len() >= self.config.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn merge_into_hot(&mut self, token: String, pmid: u32, positions: Vec<u32>) {
        let is_unigram = ngram_n(&token) == 1;
        let payload = if is_unigram && !self.config.store_unigram_positions {
            PostingPayload::Set(vec![pmid])
        } else {
            PostingPayload::Positions(BTreeMap::from([(pmid, positions)]))
        };

        self.hot
            .entry(token)
            .and_modify(|existing| existing.merge(payload.clone()))
            .or_insert(payload);
    }

    /// Moves every hot-map entry into its token's cold byte stream,
    /// appending a length-prefixed snapshot rather than overwriting, so
    /// later consolidation can merge snapshots written at different times.
    fn flush(&mut self) -> Result<()> {
        for (token, payload) in self.hot.drain() {
            let data = bincode::serialize(&payload)?;
            let stream = self.cold.entry(token).or_default();
            stream.extend_from_slice(&(data.len() as u32).to_le_bytes());
            stream.extend_from_slice(&data);
        }
        Ok(())
    }

    /// Merges every token's cold snapshots (later writes win on conflicting
    /// positions, via `PostingPayload::merge`) into one canonical payload
    /// per token.
    pub fn consolidate(mut self, cancel: &CancellationToken) -> Result<ConsolidatedIndex> {
        self.flush()?;

        let mut tokens = BTreeMap::new();
        for (token, bytes) in self.cold {
            cancel.check()?;
            let mut pos = 0;
            let mut merged: Option<PostingPayload> = None;
            while pos + 4 <= bytes.len() {
                let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
                pos += 4;
                let chunk = &bytes[pos..pos + len];
                pos += len;
                let payload: PostingPayload = bincode::deserialize(chunk)?;
                match &mut merged {
                    Some(existing) => existing.merge(payload),
                    None => merged = Some(payload),
                }
            }
            if let Some(payload) = merged {
                tokens.insert(token, payload);
            }
        }

        let max_ngram_width = tokens.keys().map(|t| ngram_n(t)).max().unwrap_or(1);

        Ok(ConsolidatedIndex {
            tokens,
            year_map: self.year_map,
            store_unigram_positions: self.config.store_unigram_positions,
            max_ngram_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, abs: &str) -> DocumentRecord {
        DocumentRecord {
            pmid: 1,
            title: Some(title.to_string()),
            abstract_text: Some(abs.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn bigram_positions_track_the_first_token() {
        let mut builder = IndexBuilder::new(IndexBuilderConfig::default());
        builder.add_document(1, 2020, &doc("ion channel blocker", "")).unwrap();
        let index = builder.consolidate(&CancellationToken::new()).unwrap();
        let bigram = index.tokens.get("ion channel").unwrap();
        assert_eq!(bigram.positions_for(1), Some(vec![0]));
    }

    #[test]
    fn fields_never_produce_a_straddling_bigram() {
        let mut builder = IndexBuilder::new(IndexBuilderConfig::default());
        builder.add_document(1, 2020, &doc("fox", "brown dog")).unwrap();
        let index = builder.consolidate(&CancellationToken::new()).unwrap();
        assert!(!index.tokens.contains_key("fox brown"));
    }

    #[test]
    fn consolidation_merges_across_flushes() {
        let mut builder = IndexBuilder::new(IndexBuilderConfig { store_unigram_positions: true, flush_threshold: 1 });
        builder.add_document(1, 2020, &doc("cancer", "")).unwrap();
        builder.add_document(2, 2021, &doc("cancer", "")).unwrap();
        let index = builder.consolidate(&CancellationToken::new()).unwrap();
        let posting = index.tokens.get("cancer").unwrap();
        let mut pmids = posting.pmids();
        pmids.sort_unstable();
        assert_eq!(pmids, vec![1, 2]);
    }
}
