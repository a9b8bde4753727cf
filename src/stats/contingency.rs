use statrs::distribution::{ChiSquared, ContinuousCDF, DiscreteCDF, Hypergeometric};

/// The 2x2 contingency table from §4.5:
///
/// ```text
///          B        ¬B
///   A  [ a ,  b ]
///  ¬A  [ c ,  d ]
/// ```
///
/// where `a = |A∩B|`, `b = |A| - a`, `c = |B| - a`, `d = N - |A| - |B| + a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    pub fn from_counts(a_size: u64, b_size: u64, intersection: u64, corpus_size: u64) -> Self {
        let a = intersection;
        let b = a_size.saturating_sub(intersection);
        let c = b_size.saturating_sub(intersection);
        let d = corpus_size.saturating_sub(a_size).saturating_sub(b_size).saturating_add(intersection);
        ContingencyTable { a, b, c, d }
    }

    pub fn n(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    /// One-sided (greater) Fisher's exact test. Degenerate tables (a zero
    /// marginal) return 1.0 rather than propagating an error.
    pub fn pvalue_fet(&self) -> f64 {
        let population = self.n();
        let successes_in_population = self.a + self.c;
        let draws = self.a + self.b;

        if population == 0
            || successes_in_population == 0
            || draws == 0
            || successes_in_population > population
            || draws > population
        {
            return 1.0;
        }
        if self.a == 0 {
            return 1.0;
        }

        match Hypergeometric::new(population, successes_in_population, draws) {
            Ok(dist) => (1.0 - dist.cdf(self.a - 1)).clamp(0.0, 1.0),
            Err(_) => 1.0,
        }
    }

    /// One-sided chi-square test (1 degree of freedom) on the same table.
    pub fn pvalue_chi2(&self) -> f64 {
        let n = self.n() as f64;
        if n == 0.0 {
            return 1.0;
        }
        let (a, b, c, d) = (self.a as f64, self.b as f64, self.c as f64, self.d as f64);
        let row1 = a + b;
        let row2 = c + d;
        let col1 = a + c;
        let col2 = b + d;
        if row1 == 0.0 || row2 == 0.0 || col1 == 0.0 || col2 == 0.0 {
            return 1.0;
        }

        let statistic = n * (a * d - b * c).powi(2) / (row1 * row2 * col1 * col2);
        match ChiSquared::new(1.0) {
            Ok(dist) => (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
            Err(_) => 1.0,
        }
    }

    /// `a / (a + c)`, or 0 when the denominator is 0.
    pub fn sort_ratio(&self) -> f64 {
        let denom = self.a + self.c;
        if denom == 0 { 0.0 } else { self.a as f64 / denom as f64 }
    }
}

const PREDICTION_SCORE_MAX: f64 = 323.0;
const PREDICTION_SCORE_M: f64 = 2500.0;

/// The composite prediction score from §4.5, normalized to `[0, 2]`.
pub fn prediction_score(pvalue: f64, sort_ratio: f64) -> f64 {
    let lp = if pvalue == 0.0 { PREDICTION_SCORE_MAX } else { (-pvalue.log10()).min(PREDICTION_SCORE_MAX) };
    let lr = if sort_ratio == 1.0 {
        PREDICTION_SCORE_MAX
    } else {
        (-(1.0 - sort_ratio).log10() * PREDICTION_SCORE_M).min(PREDICTION_SCORE_MAX)
    };
    (lp + lr) / PREDICTION_SCORE_MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_document_perfect_overlap_scores_maximally() {
        let table = ContingencyTable::from_counts(1, 1, 1, 1);
        assert_eq!(table.sort_ratio(), 1.0);
        let score = prediction_score(table.pvalue_fet(), table.sort_ratio());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reference_table_matches_known_p_value() {
        // A = [0,2027), B = [2012,2071), N = 17,012,366 -> [[15,2012],[44,17010295]]
        let table = ContingencyTable { a: 15, b: 2012, c: 44, d: 17_010_295 };
        let p = table.pvalue_fet();
        assert!((p - 5.219e-46).abs() / 5.219e-46 < 0.05, "p = {p}");
        assert!((table.sort_ratio() - 15.0 / 59.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_table_returns_one() {
        let table = ContingencyTable { a: 0, b: 0, c: 10, d: 90 };
        assert_eq!(table.pvalue_fet(), 1.0);
        assert_eq!(table.pvalue_chi2(), 1.0);
    }
}
