//! Fuzzy address similarity on a 0-100 scale.

use clap::ValueEnum;

pub trait AddressScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Similarity of two already-normalized strings, 0.0 to 100.0.
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// Case-insensitive score used to gate the secondary output.
    fn score(&self, candidate_address: &str, tagged_address: &str) -> f64 {
        self.similarity(
            &candidate_address.to_lowercase(),
            &tagged_address.to_lowercase(),
        )
        .clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScorerKind {
    /// Normalized Levenshtein similarity from `strsim`.
    Levenshtein,
    /// Built-in ratio of matching characters, `2 * LCS / (len_a + len_b)`.
    Indel,
}

pub fn build_scorer(kind: ScorerKind) -> Box<dyn AddressScorer> {
    match kind {
        ScorerKind::Levenshtein => Box::new(LevenshteinScorer),
        ScorerKind::Indel => Box::new(IndelRatioScorer),
    }
}

pub struct LevenshteinScorer;

impl AddressScorer for LevenshteinScorer {
    fn name(&self) -> &'static str {
        "levenshtein"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        100.0 * strsim::normalized_levenshtein(a, b)
    }
}

pub struct IndelRatioScorer;

impl AddressScorer for IndelRatioScorer {
    fn name(&self) -> &'static str {
        "indel"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 100.0;
        }
        100.0 * (2 * lcs_len(&a, &b)) as f64 / total as f64
    }
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                above.max(row[j])
            };
            diag = above;
        }
    }
    row[b.len()]
}

pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_full_marks() {
        for kind in [ScorerKind::Levenshtein, ScorerKind::Indel] {
            let scorer = build_scorer(kind);
            assert_eq!(scorer.score("MG Road, Bengaluru", "mg road, BENGALURU"), 100.0);
        }
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(IndelRatioScorer.score("abc", "xyz"), 0.0);
        assert_eq!(LevenshteinScorer.score("abc", "xyz"), 0.0);
    }

    #[test]
    fn indel_ratio_matches_known_values() {
        // LCS("kitten", "sitting") = 4 ("ittn"), 2 * 4 / 13
        let score = IndelRatioScorer.similarity("kitten", "sitting");
        assert!((score - 800.0 / 13.0).abs() < 1e-9);
        assert_eq!(IndelRatioScorer.similarity("", ""), 100.0);
        assert_eq!(IndelRatioScorer.similarity("abc", ""), 0.0);
    }

    #[test]
    fn levenshtein_matches_known_values() {
        // distance 3 over max length 7
        let score = LevenshteinScorer.similarity("kitten", "sitting");
        assert!((score - 100.0 * (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn ratio_and_levenshtein_disagree_near_threshold() {
        // 2 * 2 matching characters over 5, versus one edit over 3
        assert_eq!(IndelRatioScorer.score("ab", "ABC"), 80.0);
        assert!(LevenshteinScorer.score("ab", "ABC") < 75.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_score(89.996), 90.0);
        assert_eq!(round_score(61.538_461), 61.54);
    }
}
