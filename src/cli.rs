//! Operator CLI: argument parsing and the command handlers behind `devpath`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::*;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::catalog::{Catalog, Priority, StaticCatalogSource};
use crate::clock;
use crate::competency::{CompetencyDomain, CompetencyScores};
use crate::config::EngineConfig;
use crate::milestone::{
    detect_tier_with, next_tier, BusinessMetrics, FundingStage, Milestone, MilestoneTier,
};
use crate::recommend::{Recommendation, RecommendationEngine, RecommendationRequest, UsageSignals};

#[derive(Parser, Debug)]
#[command(name = "devpath")]
#[command(version)]
#[command(about = "Milestone detection and next-action recommendations for development dashboards")]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the milestone tier for a set of business metrics
    Tier {
        /// Monthly recurring revenue in dollars
        #[arg(long)]
        mrr: Option<u64>,
        /// Team size
        #[arg(long)]
        team: Option<u32>,
        /// Number of paying customers
        #[arg(long)]
        customers: Option<u32>,
        /// Funding stage
        #[arg(long, value_enum)]
        funding: Option<FundingStage>,
    },
    /// Rank next actions for a user profile against a catalog
    Recommend {
        /// Catalog file (TOML, or JSON with a .json extension)
        #[arg(long)]
        catalog: PathBuf,
        /// User profile file (TOML)
        #[arg(long)]
        profile: PathBuf,
        /// Maximum number of recommendations
        #[arg(long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// A user profile as read by `devpath recommend`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub customer_id: String,
    /// Explicit tier; detected from `metrics` when absent.
    pub milestone: Option<MilestoneTier>,
    pub metrics: BusinessMetrics,
    pub scores: CompetencyScores,
    pub completed_activities: Vec<String>,
    pub usage: UsageSignals,
}

impl Profile {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read profile {}: {e}", path.display()))?;
        Ok(Self::from_toml_str(&text)?)
    }

    pub fn into_request(
        self,
        config: &EngineConfig,
        limit: Option<usize>,
    ) -> RecommendationRequest {
        let tier = self
            .milestone
            .unwrap_or_else(|| detect_tier_with(&self.metrics, &config.thresholds).tier);
        RecommendationRequest {
            customer_id: self.customer_id,
            milestone: Some(tier),
            scores: self.scores,
            completed_activities: self.completed_activities,
            usage: self.usage,
            limit,
        }
    }
}

/// Load the configuration named on the command line, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(EngineConfig::load(p)?),
        None => Ok(EngineConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_tier(
    config: &EngineConfig,
    metrics: &BusinessMetrics,
    out: &mut dyn Write,
) -> io::Result<()> {
    let milestone = detect_tier_with(metrics, &config.thresholds);
    writeln!(
        out,
        "{} {} ({}, {})",
        "Tier:".bold(),
        milestone.tier.as_str().green().bold(),
        milestone.revenue_range,
        milestone.timeframe
    )?;
    write_targets(out, &milestone)?;
    match next_tier(milestone.tier) {
        Some(next) => {
            writeln!(
                out,
                "{} {} ({})",
                "Next:".bold(),
                next.tier.as_str().cyan(),
                next.revenue_range,
            )?;
            write_targets(out, &next)?;
        }
        None => writeln!(out, "{} top tier reached", "Next:".bold())?,
    }
    Ok(())
}

fn write_targets(out: &mut dyn Write, milestone: &Milestone) -> io::Result<()> {
    for domain in CompetencyDomain::ALL {
        writeln!(out, "  {:<22} {:>3}", domain.label(), milestone.targets.get(*domain))?;
    }
    Ok(())
}

pub async fn run_recommend(
    config: &EngineConfig,
    catalog: Catalog,
    profile: Profile,
    limit: Option<usize>,
) -> Vec<Recommendation> {
    let request = profile.into_request(config, limit);
    let cache = Arc::new(CacheStore::new(config.cache.clone(), clock::system()));
    let engine = RecommendationEngine::with_source(
        config.recommend.clone(),
        cache,
        Arc::new(StaticCatalogSource::new(catalog)),
    );
    engine.recommend_for(&request).await
}

pub fn write_recommendations(
    out: &mut dyn Write,
    list: &[Recommendation],
    json: bool,
) -> io::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(list).map_err(io::Error::other)?;
        return writeln!(out, "{text}");
    }
    if list.is_empty() {
        return writeln!(out, "{}", "No recommendations.".dimmed());
    }
    for (i, rec) in list.iter().enumerate() {
        writeln!(
            out,
            "{:>2}. {:<8} {} {}",
            i + 1,
            paint_priority(rec.priority),
            rec.title.bold(),
            format!("[{}]", rec.source).dimmed()
        )?;
        writeln!(out, "    {}", rec.reason)?;
    }
    Ok(())
}

fn paint_priority(p: Priority) -> ColoredString {
    let label = p.to_string();
    match p {
        Priority::Critical => label.red().bold(),
        Priority::High => label.red(),
        Priority::Medium => label.yellow(),
        Priority::Low => label.normal(),
    }
}

pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "devpath", out);
}
