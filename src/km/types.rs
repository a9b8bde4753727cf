use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    Fet,
    ChiSquare,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring::Fet
    }
}

#[derive(Debug, Clone)]
pub struct KmParams {
    pub a_terms: Vec<String>,
    pub b_terms: Vec<String>,
    pub c_terms: Vec<String>,
    pub censor_year_lower: i64,
    pub censor_year_upper: i64,
    pub scoring: Scoring,
    pub return_pmids: bool,
    pub top_n_articles_most_cited: usize,
    pub top_n_articles_most_recent: usize,
    pub top_n_articles_highest_impact_factor: usize,
    pub top_n_ab: usize,
    pub ab_fet_threshold: f64,
    pub bc_fet_threshold: f64,
    pub valid_bc_hit_pval: f64,
    pub paired: bool,
}

impl Default for KmParams {
    fn default() -> Self {
        KmParams {
            a_terms: Vec::new(),
            b_terms: Vec::new(),
            c_terms: Vec::new(),
            censor_year_lower: 1000,
            censor_year_upper: 2100,
            scoring: Scoring::Fet,
            return_pmids: false,
            top_n_articles_most_cited: 0,
            top_n_articles_most_recent: 10,
            top_n_articles_highest_impact_factor: 0,
            top_n_ab: 50,
            ab_fet_threshold: 1e-5,
            bc_fet_threshold: 0.9999,
            valid_bc_hit_pval: 1.0,
            paired: false,
        }
    }
}

impl KmParams {
    pub fn is_skim(&self) -> bool {
        !self.c_terms.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.a_terms.is_empty() || self.b_terms.is_empty() {
            return Err(Error::validation("a_terms and b_terms must be non-empty"));
        }
        if self.a_terms.len() > 100 {
            return Err(Error::validation("a_terms exceeds the 100-term limit"));
        }
        if self.censor_year_lower > self.censor_year_upper {
            return Err(Error::validation("censor_year_lower must not exceed censor_year_upper"));
        }
        if self.paired {
            if self.a_terms.len() != self.b_terms.len() {
                return Err(Error::validation("paired mode requires |a_terms| == |b_terms|"));
            }
            if self.is_skim() && self.a_terms.len() != self.c_terms.len() {
                return Err(Error::validation("paired SKiM requires |a_terms| == |b_terms| == |c_terms|"));
            }
        }
        if self.is_skim() {
            if self.a_terms.len() != 1 {
                return Err(Error::validation("SKiM requires exactly one a_term"));
            }
            if self.top_n_ab == 0 {
                return Err(Error::validation("SKiM requires top_n_ab > 0"));
            }
        }
        Ok(())
    }
}

/// One AB (or paired AB) scoring result.
#[derive(Debug, Clone)]
pub struct KmResult {
    pub a_term: String,
    pub b_term: String,
    pub n_articles: u64,
    pub a_term_set_len: usize,
    pub b_term_set_len: usize,
    pub a_b_intersect_len: usize,
    pub ab_sort_ratio: f64,
    pub ab_prediction_score: f64,
    pub ab_pvalue: f64,
    pub ab_pmid_intersection: Option<Vec<u32>>,
}

/// A full SKiM record: the AB result plus the BC/AC families for one C term.
#[derive(Debug, Clone)]
pub struct SkimResult {
    pub km: KmResult,
    pub c_term: String,
    pub bc_sort_ratio: f64,
    pub bc_prediction_score: f64,
    pub bc_pvalue: f64,
    pub bc_pmid_intersection: Option<Vec<u32>>,
    pub ac_sort_ratio: f64,
    pub ac_prediction_score: f64,
    pub ac_pvalue: f64,
    pub ac_pmid_intersection: Option<Vec<u32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_term_lists() {
        let params = KmParams { a_terms: vec!["x".into()], ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn skim_requires_single_a_term_and_positive_top_n_ab() {
        let mut params = KmParams {
            a_terms: vec!["a1".into(), "a2".into()],
            b_terms: vec!["b1".into()],
            c_terms: vec!["c1".into()],
            ..Default::default()
        };
        assert!(params.validate().is_err());
        params.a_terms = vec!["a1".into()];
        assert!(params.validate().is_ok());
        params.top_n_ab = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn paired_mode_requires_equal_lengths() {
        let params = KmParams {
            a_terms: vec!["a1".into(), "a2".into()],
            b_terms: vec!["b1".into()],
            paired: true,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
