//! # Stage: Competency Model
//!
//! ## Responsibility
//! Names the tracked competency domains and holds a user's per-domain scores.
//! Scores are integers in `[0, 100]`; a domain with no recorded score reads as
//! [`DEFAULT_SCORE`].
//!
//! ## Guarantees
//! - Deterministic iteration: domains always come out in [`CompetencyDomain::ALL`] order
//! - Bounded: every write clamps to `[0, 100]`

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Score assumed for a domain that has never been assessed.
pub const DEFAULT_SCORE: u8 = 50;

/// Upper bound of every competency score.
pub const MAX_SCORE: u8 = 100;

// ---------------------------------------------------------------------------
// CompetencyDomain
// ---------------------------------------------------------------------------

/// A tracked skill category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompetencyDomain {
    CustomerAnalysis,
    ValueCommunication,
    ExecutiveReadiness,
}

impl CompetencyDomain {
    /// Every domain, in canonical order. Code iterates this rather than
    /// assuming a count.
    pub const ALL: &'static [CompetencyDomain] = &[
        CompetencyDomain::CustomerAnalysis,
        CompetencyDomain::ValueCommunication,
        CompetencyDomain::ExecutiveReadiness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompetencyDomain::CustomerAnalysis => "customer-analysis",
            CompetencyDomain::ValueCommunication => "value-communication",
            CompetencyDomain::ExecutiveReadiness => "executive-readiness",
        }
    }

    /// Human-readable label used in recommendation reasons.
    pub fn label(&self) -> &'static str {
        match self {
            CompetencyDomain::CustomerAnalysis => "Customer Analysis",
            CompetencyDomain::ValueCommunication => "Value Communication",
            CompetencyDomain::ExecutiveReadiness => "Executive Readiness",
        }
    }

    /// Lenient parse: accepts kebab-case, snake_case and camelCase spellings.
    /// Returns `None` for unknown domains.
    pub fn parse(s: &str) -> Option<Self> {
        let norm: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        CompetencyDomain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().replace('-', "") == norm)
    }
}

impl fmt::Display for CompetencyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ScoreBucket
// ---------------------------------------------------------------------------

/// Coarse banding of a score, used to pick catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBucket {
    Low,
    Medium,
    High,
}

/// `Low` below 50, `Medium` below 75, `High` otherwise.
pub fn bucket(score: u8) -> ScoreBucket {
    if score < 50 {
        ScoreBucket::Low
    } else if score < 75 {
        ScoreBucket::Medium
    } else {
        ScoreBucket::High
    }
}

// ---------------------------------------------------------------------------
// CompetencyScores
// ---------------------------------------------------------------------------

/// Per-domain scores for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompetencyScores(BTreeMap<CompetencyDomain, u8>);

impl CompetencyScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(domain, score)` pairs, clamping each score.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (CompetencyDomain, u8)>,
    {
        let mut s = Self::new();
        for (d, v) in pairs {
            s.set(d, v);
        }
        s
    }

    /// Score for `domain`, or [`DEFAULT_SCORE`] when absent.
    pub fn get(&self, domain: CompetencyDomain) -> u8 {
        self.0.get(&domain).copied().unwrap_or(DEFAULT_SCORE)
    }

    /// Explicitly recorded score, without defaulting.
    pub fn recorded(&self, domain: CompetencyDomain) -> Option<u8> {
        self.0.get(&domain).copied()
    }

    pub fn set(&mut self, domain: CompetencyDomain, score: u8) {
        self.0.insert(domain, score.min(MAX_SCORE));
    }

    /// Add `by` to the domain's score, capped at [`MAX_SCORE`]. Returns the new score.
    pub fn increment(&mut self, domain: CompetencyDomain, by: u8) -> u8 {
        let next = self.get(domain).saturating_add(by).min(MAX_SCORE);
        self.0.insert(domain, next);
        next
    }

    /// Shortfall against `targets`, floored at zero.
    pub fn gap(&self, domain: CompetencyDomain, targets: &CompetencyScores) -> u8 {
        targets.get(domain).saturating_sub(self.get(domain))
    }

    /// Mean over every domain in [`CompetencyDomain::ALL`], defaults included.
    pub fn mean(&self) -> f64 {
        let n = CompetencyDomain::ALL.len();
        if n == 0 {
            return 0.0;
        }
        let sum: u32 = CompetencyDomain::ALL.iter().map(|d| self.get(*d) as u32).sum();
        sum as f64 / n as f64
    }

    /// Domains whose score meets or exceeds the matching target, in canonical order.
    pub fn domains_meeting(&self, targets: &CompetencyScores) -> Vec<CompetencyDomain> {
        CompetencyDomain::ALL
            .iter()
            .copied()
            .filter(|d| self.get(*d) >= targets.get(*d))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CompetencyDomain, u8)> + '_ {
        CompetencyDomain::ALL.iter().map(move |d| (*d, self.get(*d)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, ScoreBucket::Low)]
    #[case(49, ScoreBucket::Low)]
    #[case(50, ScoreBucket::Medium)]
    #[case(74, ScoreBucket::Medium)]
    #[case(75, ScoreBucket::High)]
    #[case(100, ScoreBucket::High)]
    fn test_bucket_boundaries(#[case] score: u8, #[case] expected: ScoreBucket) {
        assert_eq!(bucket(score), expected);
    }

    #[rstest]
    #[case("customer-analysis", Some(CompetencyDomain::CustomerAnalysis))]
    #[case("customerAnalysis", Some(CompetencyDomain::CustomerAnalysis))]
    #[case("value_communication", Some(CompetencyDomain::ValueCommunication))]
    #[case("EXECUTIVE-READINESS", Some(CompetencyDomain::ExecutiveReadiness))]
    #[case("negotiation", None)]
    #[case("", None)]
    fn test_domain_parse(#[case] input: &str, #[case] expected: Option<CompetencyDomain>) {
        assert_eq!(CompetencyDomain::parse(input), expected);
    }

    #[test]
    fn test_missing_domain_defaults_to_50() {
        let s = CompetencyScores::new();
        assert_eq!(s.get(CompetencyDomain::ExecutiveReadiness), 50);
        assert_eq!(s.recorded(CompetencyDomain::ExecutiveReadiness), None);
    }

    #[test]
    fn test_set_clamps_to_100() {
        let mut s = CompetencyScores::new();
        s.set(CompetencyDomain::CustomerAnalysis, 250);
        assert_eq!(s.get(CompetencyDomain::CustomerAnalysis), 100);
    }

    #[test]
    fn test_increment_caps_at_100() {
        let mut s = CompetencyScores::from_pairs([(CompetencyDomain::CustomerAnalysis, 95)]);
        assert_eq!(s.increment(CompetencyDomain::CustomerAnalysis, 8), 100);
    }

    #[test]
    fn test_gap_floors_at_zero() {
        let s = CompetencyScores::from_pairs([(CompetencyDomain::CustomerAnalysis, 90)]);
        let t = CompetencyScores::from_pairs([(CompetencyDomain::CustomerAnalysis, 70)]);
        assert_eq!(s.gap(CompetencyDomain::CustomerAnalysis, &t), 0);
        assert_eq!(t.gap(CompetencyDomain::CustomerAnalysis, &s), 20);
    }

    #[test]
    fn test_mean_includes_defaults() {
        let s = CompetencyScores::from_pairs([(CompetencyDomain::CustomerAnalysis, 80)]);
        // (80 + 50 + 50) / 3
        assert!((s.mean() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_domains_meeting_in_canonical_order() {
        let s = CompetencyScores::from_pairs([
            (CompetencyDomain::ExecutiveReadiness, 90),
            (CompetencyDomain::CustomerAnalysis, 90),
        ]);
        let t = CompetencyScores::from_pairs([
            (CompetencyDomain::CustomerAnalysis, 60),
            (CompetencyDomain::ValueCommunication, 60),
            (CompetencyDomain::ExecutiveReadiness, 60),
        ]);
        assert_eq!(
            s.domains_meeting(&t),
            vec![CompetencyDomain::CustomerAnalysis, CompetencyDomain::ExecutiveReadiness]
        );
    }

    #[test]
    fn test_serde_uses_kebab_case_keys() {
        let s = CompetencyScores::from_pairs([(CompetencyDomain::ValueCommunication, 61)]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"value-communication":61}"#);
    }
}
