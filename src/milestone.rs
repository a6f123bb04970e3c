//! # Stage: Milestone Model
//!
//! ## Responsibility
//! Classifies a business-metrics bundle into a milestone tier and exposes the
//! static per-tier definitions: competency targets, catalog categories and
//! descriptive metadata.
//!
//! ## Guarantees
//! - Pure: `detect_tier` depends only on its inputs
//! - Total: every tier has targets; unknown tier names fall back to `Foundation`
//! - Highest qualifying tier wins; any single signal qualifies a tier
//!
//! ## NOT Responsible For
//! - Persisting the detected tier (callers recompute on demand)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use clap::ValueEnum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::competency::{CompetencyDomain, CompetencyScores};

// ---------------------------------------------------------------------------
// MilestoneTier
// ---------------------------------------------------------------------------

/// A named stage of user progression, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneTier {
    #[default]
    Foundation,
    Growth,
    Expansion,
    Scale,
}

impl MilestoneTier {
    /// Every tier, lowest first.
    pub const ALL: &'static [MilestoneTier] = &[
        MilestoneTier::Foundation,
        MilestoneTier::Growth,
        MilestoneTier::Expansion,
        MilestoneTier::Scale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneTier::Foundation => "foundation",
            MilestoneTier::Growth => "growth",
            MilestoneTier::Expansion => "expansion",
            MilestoneTier::Scale => "scale",
        }
    }

    /// Case-insensitive parse; anything unrecognised becomes `Foundation`.
    pub fn parse_lossy(s: &str) -> Self {
        let s = s.trim().to_ascii_lowercase();
        MilestoneTier::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .unwrap_or_default()
    }

    /// The tier one step above, or `None` at the top.
    pub fn next(&self) -> Option<MilestoneTier> {
        match self {
            MilestoneTier::Foundation => Some(MilestoneTier::Growth),
            MilestoneTier::Growth => Some(MilestoneTier::Expansion),
            MilestoneTier::Expansion => Some(MilestoneTier::Scale),
            MilestoneTier::Scale => None,
        }
    }
}

impl fmt::Display for MilestoneTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Business metrics
// ---------------------------------------------------------------------------

/// Funding stage, ordered from least to most funded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FundingStage {
    #[default]
    Bootstrapped,
    PreSeed,
    Seed,
    SeriesA,
    SeriesB,
    SeriesC,
}

/// Inputs to tier detection. Any field may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessMetrics {
    pub monthly_recurring_revenue: Option<u64>,
    pub team_size: Option<u32>,
    pub customer_count: Option<u32>,
    pub funding_stage: Option<FundingStage>,
}

/// Minimums that qualify a single tier. Any one met qualifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub min_monthly_revenue: u64,
    pub min_team_size: u32,
    pub min_customers: u32,
    pub min_funding: FundingStage,
}

impl TierThreshold {
    fn qualifies(&self, m: &BusinessMetrics) -> bool {
        m.monthly_recurring_revenue.is_some_and(|v| v >= self.min_monthly_revenue)
            || m.team_size.is_some_and(|v| v >= self.min_team_size)
            || m.customer_count.is_some_and(|v| v >= self.min_customers)
            || m.funding_stage.is_some_and(|v| v >= self.min_funding)
    }
}

/// Threshold table for every tier above `Foundation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneThresholds {
    pub growth: TierThreshold,
    pub expansion: TierThreshold,
    pub scale: TierThreshold,
}

impl Default for MilestoneThresholds {
    fn default() -> Self {
        Self {
            growth: TierThreshold {
                min_monthly_revenue: 25_000,
                min_team_size: 8,
                min_customers: 25,
                min_funding: FundingStage::Seed,
            },
            expansion: TierThreshold {
                min_monthly_revenue: 100_000,
                min_team_size: 20,
                min_customers: 100,
                min_funding: FundingStage::SeriesA,
            },
            scale: TierThreshold {
                min_monthly_revenue: 500_000,
                min_team_size: 75,
                min_customers: 500,
                min_funding: FundingStage::SeriesB,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Milestone
// ---------------------------------------------------------------------------

/// Static definition of a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub tier: MilestoneTier,
    pub targets: CompetencyScores,
    /// Catalog filter tags relevant at this tier.
    pub categories: BTreeSet<String>,
    pub revenue_range: String,
    pub timeframe: String,
}

impl Milestone {
    pub fn for_tier(tier: MilestoneTier) -> Milestone {
        MILESTONES
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| build_milestone(MilestoneTier::Foundation))
    }
}

fn build_milestone(tier: MilestoneTier) -> Milestone {
    use CompetencyDomain::*;
    let ([ca, vc, er], cats, revenue, timeframe): ([u8; 3], &[&str], &str, &str) = match tier {
        MilestoneTier::Foundation => (
            [60, 55, 40],
            &["discovery", "fundamentals", "positioning"],
            "$0 - $25K MRR",
            "0-6 months",
        ),
        MilestoneTier::Growth => (
            [70, 65, 55],
            &["discovery", "positioning", "sales-process", "retention"],
            "$25K - $100K MRR",
            "6-18 months",
        ),
        MilestoneTier::Expansion => (
            [80, 75, 70],
            &["sales-process", "retention", "team-building", "executive"],
            "$100K - $500K MRR",
            "18-36 months",
        ),
        MilestoneTier::Scale => (
            [90, 85, 85],
            &["executive", "team-building", "strategy"],
            "$500K+ MRR",
            "36+ months",
        ),
    };
    Milestone {
        tier,
        targets: CompetencyScores::from_pairs([
            (CustomerAnalysis, ca),
            (ValueCommunication, vc),
            (ExecutiveReadiness, er),
        ]),
        categories: cats.iter().map(|c| c.to_string()).collect(),
        revenue_range: revenue.to_string(),
        timeframe: timeframe.to_string(),
    }
}

static MILESTONES: Lazy<BTreeMap<MilestoneTier, Milestone>> = Lazy::new(|| {
    MilestoneTier::ALL.iter().map(|t| (*t, build_milestone(*t))).collect()
});

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Detect the tier using the default thresholds.
pub fn detect_tier(metrics: &BusinessMetrics) -> Milestone {
    detect_tier_with(metrics, &MilestoneThresholds::default())
}

/// Detect the tier, checking the highest tier first.
pub fn detect_tier_with(metrics: &BusinessMetrics, thresholds: &MilestoneThresholds) -> Milestone {
    let tier = if thresholds.scale.qualifies(metrics) {
        MilestoneTier::Scale
    } else if thresholds.expansion.qualifies(metrics) {
        MilestoneTier::Expansion
    } else if thresholds.growth.qualifies(metrics) {
        MilestoneTier::Growth
    } else {
        MilestoneTier::Foundation
    };
    Milestone::for_tier(tier)
}

/// Competency targets for `tier`.
pub fn targets_for(tier: MilestoneTier) -> CompetencyScores {
    Milestone::for_tier(tier).targets
}

/// Competency targets for a tier given by name; unknown names use `Foundation`.
pub fn targets_for_name(name: &str) -> CompetencyScores {
    targets_for(MilestoneTier::parse_lossy(name))
}

/// The milestone one step above `tier`, or `None` for the terminal tier.
pub fn next_tier(tier: MilestoneTier) -> Option<Milestone> {
    tier.next().map(Milestone::for_tier)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
