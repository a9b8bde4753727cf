use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::UNKNOWN_YEAR;
use crate::index::cache::PostingCache;
use crate::query::cache::{eligible_for_shared_cache, LeafCache, SharedQueryCache};
use crate::tokenize::{get_subterms, sanitize_term, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    Phrase,
    And,
    Or,
}

fn classify(sanitized_with_ops: &str) -> TermKind {
    let amp = sanitized_with_ops.find('&');
    let pipe = sanitized_with_ops.find('|');
    match (amp, pipe) {
        (None, None) => TermKind::Phrase,
        (Some(_), None) => TermKind::And,
        (None, Some(_)) => TermKind::Or,
        (Some(a), Some(p)) => if a < p { TermKind::And } else { TermKind::Or },
    }
}

/// An inclusive publication-year filter, clamped per §4.4.5: `low < 0`
/// clamps to 0, `high < 0` yields an empty range, `high > 2100` is +∞.
#[derive(Debug, Clone, Copy)]
pub struct YearRange {
    pub low: i64,
    pub high: i64,
}

impl YearRange {
    pub fn new(low: i64, high: i64) -> Self {
        if high < 0 {
            return YearRange { low: 0, high: -1 };
        }
        let low = low.max(0);
        let high = if high > 2100 { i64::MAX } else { high };
        YearRange { low, high }
    }

    pub fn unbounded() -> Self {
        YearRange { low: 0, high: i64::MAX }
    }

    pub fn contains(&self, year: u16) -> bool {
        if self.high < self.low {
            return false;
        }
        let year = year as i64;
        year >= self.low && year <= self.high
    }
}

/// Resolves sanitized terms against a memory-mapped positional index,
/// combining leaf results via boolean composition and filtering by
/// publication year.
pub struct QueryEngine {
    postings: Arc<PostingCache>,
    year_map: HashMap<u32, u16>,
    citation_counts: HashMap<u32, u32>,
    leaf_cache: LeafCache,
    shared_cache: Option<Arc<dyn SharedQueryCache>>,
}

impl QueryEngine {
    pub fn new(
        postings: Arc<PostingCache>,
        year_map: HashMap<u32, u16>,
        citation_counts: HashMap<u32, u32>,
        shared_cache: Option<Arc<dyn SharedQueryCache>>,
    ) -> Self {
        QueryEngine { postings, year_map, citation_counts, leaf_cache: LeafCache::new(), shared_cache }
    }

    pub fn corpus_size(&self) -> usize {
        self.year_map.len()
    }

    /// §4.4.5: the set of PMIDs whose year falls in `range`, independent of
    /// any term — the "N" in a contingency table when the query is censored.
    pub fn corpus_size_in_range(&self, range: YearRange) -> usize {
        self.year_map.values().filter(|&&y| range.contains(y)).count()
    }

    /// Full term resolution: sanitize, classify, split, resolve each
    /// subterm as a phrase, recombine, then censor by year.
    pub fn search(&self, raw_term: &str, range: YearRange) -> Result<HashSet<u32>> {
        let with_ops = sanitize_term(raw_term, true);
        let kind = classify(&with_ops);
        let subterms = get_subterms(&with_ops, false);

        let mut result: Option<HashSet<u32>> = None;
        for sub in &subterms {
            let set = self.resolve_phrase(sub)?;
            result = Some(match (result, kind) {
                (None, _) => set,
                (Some(acc), TermKind::And) => acc.intersection(&set).copied().collect(),
                (Some(acc), TermKind::Or) => acc.union(&set).copied().collect(),
                (Some(acc), TermKind::Phrase) => acc,
            });
        }

        Ok(self.censor(&result.unwrap_or_default(), range))
    }

    fn censor(&self, set: &HashSet<u32>, range: YearRange) -> HashSet<u32> {
        set.iter()
            .copied()
            .filter(|pmid| range.contains(*self.year_map.get(pmid).unwrap_or(&UNKNOWN_YEAR)))
            .collect()
    }

    /// Resolves one phrase (1+ tokens), going through the leaf cache and,
    /// for eligible queries, the optional shared cache first.
    fn resolve_phrase(&self, phrase: &str) -> Result<HashSet<u32>> {
        if let Some(cached) = self.leaf_cache.get(phrase) {
            return Ok((*cached).clone());
        }

        let tokens = tokenize(phrase, false);
        let is_multi_token = tokens.len() > 1;

        if let Some(shared) = &self.shared_cache {
            if let Some(pmids) = shared.get(phrase) {
                let set: HashSet<u32> = pmids.into_iter().collect();
                self.leaf_cache.put(phrase.to_string(), Arc::new(set.clone()));
                return Ok(set);
            }
        }

        let set = self.phrase_search(&tokens)?;

        if eligible_for_shared_cache(set.len(), is_multi_token) {
            if let Some(shared) = &self.shared_cache {
                shared.put(phrase, &set.iter().copied().collect::<Vec<_>>());
            }
        }
        self.leaf_cache.put(phrase.to_string(), Arc::new(set.clone()));
        Ok(set)
    }

    fn resolve_token(&self, token: &str) -> Result<HashSet<u32>> {
        match self.postings.get(token)? {
            Some(payload) => Ok(payload.pmids().into_iter().collect()),
            None => Ok(HashSet::new()),
        }
    }

    fn phrase_search(&self, tokens: &[String]) -> Result<HashSet<u32>> {
        if tokens.is_empty() {
            return Ok(HashSet::new());
        }
        if tokens.len() == 1 {
            return self.resolve_token(&tokens[0]);
        }
        if self.postings.max_ngram_width() >= 2 {
            return self.phrase_search_via_bigrams(tokens);
        }
        self.phrase_search_via_positions(tokens)
    }

    /// The general-purpose path: intersect per-token document sets, then
    /// verify that some starting position `p` has token `i` at `p + i` for
    /// every token in the phrase.
    fn phrase_search_via_positions(&self, tokens: &[String]) -> Result<HashSet<u32>> {
        let mut payloads = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.postings.get(token)? {
                Some(p) => payloads.push(p),
                None => return Ok(HashSet::new()),
            }
        }

        let mut candidates: Option<HashSet<u32>> = None;
        for payload in &payloads {
            let ids: HashSet<u32> = payload.pmids().into_iter().collect();
            candidates = Some(match candidates {
                None => ids,
                Some(acc) => acc.intersection(&ids).copied().collect(),
            });
        }
        let candidates = candidates.unwrap_or_default();

        let mut result = HashSet::new();
        'doc: for pmid in candidates {
            let Some(p0) = payloads[0].positions_for(pmid) else { continue };
            for &start in &p0 {
                let mut matched = true;
                for (i, payload) in payloads.iter().enumerate().skip(1) {
                    let positions = payload.positions_for(pmid).unwrap_or_default();
                    if !positions.contains(&(start + i as u32)) {
                        matched = false;
                        break;
                    }
                }
                if matched {
                    result.insert(pmid);
                    continue 'doc;
                }
            }
        }
        Ok(result)
    }

    /// The latency-optimized path when the index's maximum n-gram width is
    /// 2: intersect bigram postings for each adjacent token pair and
    /// reconcile overlapping positions instead of touching unigram
    /// postings at all.
    fn phrase_search_via_bigrams(&self, tokens: &[String]) -> Result<HashSet<u32>> {
        let mut bigram_payloads = Vec::with_capacity(tokens.len() - 1);
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            match self.postings.get(&bigram)? {
                Some(p) => bigram_payloads.push(p),
                None => return Ok(HashSet::new()),
            }
        }
        if bigram_payloads.len() == 1 {
            return Ok(bigram_payloads[0].pmids().into_iter().collect());
        }

        let mut candidates: Option<HashSet<u32>> = None;
        for payload in &bigram_payloads {
            let ids: HashSet<u32> = payload.pmids().into_iter().collect();
            candidates = Some(match candidates {
                None => ids,
                Some(acc) => acc.intersection(&ids).copied().collect(),
            });
        }
        let candidates = candidates.unwrap_or_default();

        let mut result = HashSet::new();
        'doc: for pmid in candidates {
            let starts = bigram_payloads[0].positions_for(pmid).unwrap_or_default();
            for &start in &starts {
                let mut matched = true;
                for (i, payload) in bigram_payloads.iter().enumerate().skip(1) {
                    let positions = payload.positions_for(pmid).unwrap_or_default();
                    if !positions.contains(&(start + i as u32)) {
                        matched = false;
                        break;
                    }
                }
                if matched {
                    result.insert(pmid);
                    continue 'doc;
                }
            }
        }
        Ok(result)
    }

    pub fn year_of(&self, pmid: u32) -> u16 {
        *self.year_map.get(&pmid).unwrap_or(&UNKNOWN_YEAR)
    }

    pub fn citation_count_of(&self, pmid: u32) -> u32 {
        *self.citation_counts.get(&pmid).unwrap_or(&0)
    }
}

/// A §4.4.6 top-N ranking strategy.
pub trait Ranker {
    fn rank(&self, pmids: &HashSet<u32>, n: usize) -> Vec<u32>;
    fn name(&self) -> &str;
}

pub struct ByYear<'a> {
    pub engine: &'a QueryEngine,
}

impl Ranker for ByYear<'_> {
    fn rank(&self, pmids: &HashSet<u32>, n: usize) -> Vec<u32> {
        let mut sorted: Vec<u32> = pmids.iter().copied().collect();
        sorted.sort_by(|a, b| {
            self.engine.year_of(*b).cmp(&self.engine.year_of(*a)).then(b.cmp(a))
        });
        sorted.truncate(n);
        sorted
    }

    fn name(&self) -> &str {
        "by_year"
    }
}

pub struct ByCitationCount<'a> {
    pub engine: &'a QueryEngine,
}

impl Ranker for ByCitationCount<'_> {
    fn rank(&self, pmids: &HashSet<u32>, n: usize) -> Vec<u32> {
        let mut sorted: Vec<u32> = pmids.iter().copied().collect();
        sorted.sort_by(|a, b| {
            self.engine.citation_count_of(*b).cmp(&self.engine.citation_count_of(*a)).then(b.cmp(a))
        });
        sorted.truncate(n);
        sorted
    }

    fn name(&self) -> &str {
        "by_citation_count"
    }
}

pub struct ByImpactFactor<'a> {
    pub engine: &'a QueryEngine,
    pub current_year: u16,
}

impl ByImpactFactor<'_> {
    fn impact_factor(&self, pmid: u32) -> f64 {
        let year = self.engine.year_of(pmid);
        let age = (self.current_year as i64 - year as i64).max(1) as f64;
        self.engine.citation_count_of(pmid) as f64 / age
    }
}

impl Ranker for ByImpactFactor<'_> {
    fn rank(&self, pmids: &HashSet<u32>, n: usize) -> Vec<u32> {
        let mut sorted: Vec<u32> = pmids.iter().copied().collect();
        sorted.sort_by(|a, b| {
            self.impact_factor(*b)
                .partial_cmp(&self.impact_factor(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cmp(a))
        });
        sorted.truncate(n);
        sorted
    }

    fn name(&self) -> &str {
        "by_impact_factor"
    }
}

/// Runs all three rankers and unions their outputs, the "PMIDs to surface"
/// rule from §4.4.6.
pub fn union_top_n(
    engine: &QueryEngine,
    pmids: &HashSet<u32>,
    top_n_recent: usize,
    top_n_cited: usize,
    top_n_impact: usize,
    current_year: u16,
) -> Vec<u32> {
    let mut out: HashSet<u32> = HashSet::new();
    out.extend(ByYear { engine }.rank(pmids, top_n_recent));
    out.extend(ByCitationCount { engine }.rank(pmids, top_n_cited));
    out.extend(ByImpactFactor { engine, current_year }.rank(pmids, top_n_impact));
    let mut result: Vec<u32> = out.into_iter().collect();
    result.sort_unstable();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_clamps_per_spec() {
        let r = YearRange::new(-5, 2025);
        assert_eq!(r.low, 0);
        let r = YearRange::new(2000, -1);
        assert!(!r.contains(2020));
        let r = YearRange::new(2000, 5000);
        assert_eq!(r.high, i64::MAX);
    }

    #[test]
    fn term_classification_picks_first_operator() {
        assert_eq!(classify("cancer&coffee|tea"), TermKind::And);
        assert_eq!(classify("cancer|coffee&tea"), TermKind::Or);
        assert_eq!(classify("cancer coffee"), TermKind::Phrase);
    }
}
