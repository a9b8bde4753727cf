use std::collections::{HashMap, HashSet};

use crate::core::error::Result;
use crate::km::types::{KmParams, KmResult, Scoring, SkimResult};
use crate::progress::{clamp_progress, CancellationToken, ProgressSink};
use crate::query::engine::{union_top_n, QueryEngine, YearRange};
use crate::stats::contingency::ContingencyTable;

fn pvalue(table: &ContingencyTable, scoring: Scoring) -> f64 {
    match scoring {
        Scoring::Fet => table.pvalue_fet(),
        Scoring::ChiSquare => table.pvalue_chi2(),
    }
}

/// A term's resolved PMID set, its size, and the multiplicity (how many
/// more times the driver still expects to touch it) used to decide when a
/// posting can be dropped from memory.
struct TermCache {
    sets: HashMap<String, (HashSet<u32>, usize)>,
}

impl TermCache {
    fn new() -> Self {
        TermCache { sets: HashMap::new() }
    }

    fn prewarm(&mut self, engine: &QueryEngine, range: YearRange, terms: &[String]) -> Result<()> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for term in terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        for term in terms {
            if self.sets.contains_key(term) {
                continue;
            }
            let set = engine.search(term, range)?;
            let multiplicity = counts[term.as_str()];
            self.sets.insert(term.clone(), (set, multiplicity));
        }
        Ok(())
    }

    fn get(&self, term: &str) -> &HashSet<u32> {
        &self.sets.get(term).expect("term pre-warmed before use").0
    }

    /// Records that one more use of `term` has completed; drops the entry
    /// once its multiplicity is exhausted.
    fn release(&mut self, term: &str) {
        if let Some((_, multiplicity)) = self.sets.get_mut(term) {
            *multiplicity -= 1;
            if *multiplicity == 0 {
                self.sets.remove(term);
            }
        }
    }
}

/// Scores one term pair. Used for AB, BC, and AC alike — the fields keep
/// their `ab_*` names regardless of which pair was actually scored, since
/// the formula is identical; callers relabel into `bc_*`/`ac_*` as needed.
fn score_pair(
    engine: &QueryEngine,
    range: YearRange,
    a_term: &str,
    a_set: &HashSet<u32>,
    b_term: &str,
    b_set: &HashSet<u32>,
    scoring: Scoring,
    return_pmids: bool,
) -> KmResult {
    let n = engine.corpus_size_in_range(range) as u64;
    let intersection: HashSet<u32> = a_set.intersection(b_set).copied().collect();
    let table = ContingencyTable::from_counts(a_set.len() as u64, b_set.len() as u64, intersection.len() as u64, n);
    let p = pvalue(&table, scoring);
    let ratio = table.sort_ratio();
    let score = crate::stats::contingency::prediction_score(p, ratio);

    KmResult {
        a_term: a_term.to_string(),
        b_term: b_term.to_string(),
        n_articles: n,
        a_term_set_len: a_set.len(),
        b_term_set_len: b_set.len(),
        a_b_intersect_len: intersection.len(),
        ab_sort_ratio: ratio,
        ab_prediction_score: score,
        ab_pvalue: p,
        ab_pmid_intersection: if return_pmids { Some(intersection.into_iter().collect()) } else { None },
    }
}

/// Standard (cross-product) KM: every (a, b) pair, sorted by prediction
/// score descending.
pub fn run_km_standard(
    engine: &QueryEngine,
    params: &KmParams,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<Vec<KmResult>> {
    params.validate()?;
    let range = YearRange::new(params.censor_year_lower, params.censor_year_upper);

    // `a` is resolved once but reused across every B row, so its multiplicity
    // is how many rows remain; `b` is fully consumed within a single row, so
    // it only ever needs multiplicity 1.
    let mut cache = TermCache::new();
    let mut a_uses = Vec::new();
    for a in &params.a_terms {
        a_uses.extend(std::iter::repeat(a.clone()).take(params.b_terms.len()));
    }
    cache.prewarm(engine, range, &a_uses)?;
    cache.prewarm(engine, range, &params.b_terms)?;

    let mut results = Vec::with_capacity(params.a_terms.len() * params.b_terms.len());
    let total = params.b_terms.len().max(1);
    for (bi, b) in params.b_terms.iter().enumerate() {
        for a in &params.a_terms {
            cancel.check()?;
            let a_set = cache.get(a).clone();
            let b_set = cache.get(b).clone();
            results.push(score_pair(engine, range, a, &a_set, b, &b_set, params.scoring, params.return_pmids));
        }
        cache.release(b);
        progress.report(clamp_progress(bi + 1, total + 1));
    }
    for a in &params.a_terms {
        for _ in &params.b_terms {
            cache.release(a);
        }
    }

    results.sort_by(|x, y| y.ab_prediction_score.partial_cmp(&x.ab_prediction_score).unwrap_or(std::cmp::Ordering::Equal));
    progress.report(1.0);
    Ok(results)
}

/// Paired KM: `a_terms[i]` is scored only against `b_terms[i]`.
pub fn run_km_paired(
    engine: &QueryEngine,
    params: &KmParams,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<Vec<KmResult>> {
    params.validate()?;
    if !params.paired {
        return Err(crate::core::error::Error::validation("run_km_paired requires paired=true"));
    }
    let range = YearRange::new(params.censor_year_lower, params.censor_year_upper);

    let mut results = Vec::with_capacity(params.a_terms.len());
    let total = params.a_terms.len().max(1);
    for (i, (a, b)) in params.a_terms.iter().zip(params.b_terms.iter()).enumerate() {
        cancel.check()?;
        let a_set = engine.search(a, range)?;
        let b_set = engine.search(b, range)?;
        results.push(score_pair(engine, range, a, &a_set, b, &b_set, params.scoring, params.return_pmids));
        progress.report(clamp_progress(i + 1, total));
    }
    progress.report(1.0);
    Ok(results)
}

/// Standard SKiM: a single A term cascades through every B term, keeps the
/// top `top_n_ab` (plus padding when `valid_bc_hit_pval < 1.0`), then scores
/// BC and AC for every C term against the survivors.
pub fn run_skim_standard(
    engine: &QueryEngine,
    params: &KmParams,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<Vec<SkimResult>> {
    params.validate()?;
    if !params.is_skim() {
        return Err(crate::core::error::Error::validation("run_skim_standard requires c_terms"));
    }
    let range = YearRange::new(params.censor_year_lower, params.censor_year_upper);
    let a_term = &params.a_terms[0];
    let a_set = engine.search(a_term, range)?;

    let pad = if params.valid_bc_hit_pval < 1.0 { 20 } else { 0 };

    // Step 2: AB for every b, keep ab_pvalue <= ab_fet_threshold.
    let mut ab: Vec<KmResult> = Vec::with_capacity(params.b_terms.len());
    for b in &params.b_terms {
        cancel.check()?;
        let b_set = engine.search(b, range)?;
        let result = score_pair(engine, range, a_term, &a_set, b, &b_set, params.scoring, params.return_pmids);
        if result.ab_pvalue <= params.ab_fet_threshold {
            ab.push(result);
        }
    }

    // Step 3: sort descending, take top_n_ab + pad.
    ab.sort_by(|x, y| y.ab_prediction_score.partial_cmp(&x.ab_prediction_score).unwrap_or(std::cmp::Ordering::Equal));
    let ranked_bs: Vec<String> = ab.iter().map(|r| r.b_term.clone()).collect();
    ab.truncate(params.top_n_ab + pad);

    // Step 4/5: for each c and each kept ab, compute BC and AC, keep bc_pvalue <= bc_fet_threshold.
    let total = (ab.len() * params.c_terms.len()).max(1);
    let mut done = 0usize;
    let mut records = Vec::with_capacity(total);
    let mut valid_bs: HashSet<String> = HashSet::new();

    for c in &params.c_terms {
        let c_set = engine.search(c, range)?;
        for km in &ab {
            cancel.check()?;
            let b_set = engine.search(&km.b_term, range)?;
            let bc = score_pair(engine, range, &km.b_term, &b_set, c, &c_set, params.scoring, params.return_pmids);
            let ac = score_pair(engine, range, a_term, &a_set, c, &c_set, params.scoring, params.return_pmids);

            if bc.ab_pvalue <= params.bc_fet_threshold {
                if bc.ab_pvalue <= params.valid_bc_hit_pval {
                    valid_bs.insert(km.b_term.clone());
                }

                records.push(SkimResult {
                    km: km.clone(),
                    c_term: c.clone(),
                    bc_sort_ratio: bc.ab_sort_ratio,
                    bc_prediction_score: bc.ab_prediction_score,
                    bc_pvalue: bc.ab_pvalue,
                    bc_pmid_intersection: bc.ab_pmid_intersection,
                    ac_sort_ratio: ac.ab_sort_ratio,
                    ac_prediction_score: ac.ab_prediction_score,
                    ac_pvalue: ac.ab_pvalue,
                    ac_pmid_intersection: ac.ab_pmid_intersection,
                });
            }
            done += 1;
            progress.report(clamp_progress(done, total + 1));
        }
    }

    // Step 6: sort by bc_prediction_score descending.
    records.sort_by(|x, y| y.bc_prediction_score.partial_cmp(&x.bc_prediction_score).unwrap_or(std::cmp::Ordering::Equal));

    // Step 7: padding-based filter.
    if pad > 0 {
        let allowed: HashSet<String> = ranked_bs.iter().filter(|b| valid_bs.contains(*b)).take(params.top_n_ab).cloned().collect();
        records.retain(|r| allowed.contains(&r.km.b_term));
    }

    progress.report(1.0);
    Ok(records)
}

/// Paired SKiM: `(a[i], b[i], c[i])` triples, requiring both AB and BC
/// thresholds to pass.
pub fn run_skim_paired(
    engine: &QueryEngine,
    params: &KmParams,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<Vec<SkimResult>> {
    params.validate()?;
    if !params.paired || !params.is_skim() {
        return Err(crate::core::error::Error::validation("run_skim_paired requires paired=true and c_terms"));
    }
    let range = YearRange::new(params.censor_year_lower, params.censor_year_upper);

    let total = params.a_terms.len().max(1);
    let mut records = Vec::with_capacity(params.a_terms.len());
    for (i, ((a, b), c)) in params.a_terms.iter().zip(params.b_terms.iter()).zip(params.c_terms.iter()).enumerate() {
        cancel.check()?;
        let a_set = engine.search(a, range)?;
        let b_set = engine.search(b, range)?;
        let c_set = engine.search(c, range)?;

        let ab = score_pair(engine, range, a, &a_set, b, &b_set, params.scoring, params.return_pmids);
        if ab.ab_pvalue > params.ab_fet_threshold {
            progress.report(clamp_progress(i + 1, total));
            continue;
        }
        let bc = score_pair(engine, range, b, &b_set, c, &c_set, params.scoring, params.return_pmids);
        if bc.ab_pvalue > params.bc_fet_threshold {
            progress.report(clamp_progress(i + 1, total));
            continue;
        }
        let ac = score_pair(engine, range, a, &a_set, c, &c_set, params.scoring, params.return_pmids);

        records.push(SkimResult {
            km: ab,
            c_term: c.clone(),
            bc_sort_ratio: bc.ab_sort_ratio,
            bc_prediction_score: bc.ab_prediction_score,
            bc_pvalue: bc.ab_pvalue,
            bc_pmid_intersection: bc.ab_pmid_intersection,
            ac_sort_ratio: ac.ab_sort_ratio,
            ac_prediction_score: ac.ab_prediction_score,
            ac_pvalue: ac.ab_pvalue,
            ac_pmid_intersection: ac.ab_pmid_intersection,
        });
        progress.report(clamp_progress(i + 1, total));
    }

    progress.report(1.0);
    Ok(records)
}

/// The PMIDs a caller should surface for a single term, per §4.4.6's
/// union-of-three-rankers rule.
pub fn surface_pmids(engine: &QueryEngine, pmids: &HashSet<u32>, params: &KmParams, current_year: u16) -> Vec<u32> {
    union_top_n(
        engine,
        pmids,
        params.top_n_articles_most_recent,
        params.top_n_articles_most_cited,
        params.top_n_articles_highest_impact_factor,
        current_year,
    )
}
