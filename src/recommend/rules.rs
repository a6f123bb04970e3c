//! # Stage: Usage-Pattern Rules
//!
//! ## Responsibility
//! A small fixed rule set that spots specific behavioural gaps (tool progress
//! without exports, reading without practice, untouched tools, domains that
//! stay low despite repeated work). Each rule is evaluated on its own; the
//! result of one never influences another.
//!
//! ## Guarantees
//! - Order-independent: rule outcomes do not depend on evaluation order
//! - Deterministic: map inputs are scanned in sorted order

use crate::catalog::{Priority, UsageRuleKind};
use crate::competency::{CompetencyDomain, CompetencyScores};
use crate::config::RecommendConfig;

use super::types::{RecommendationSource, UsageSignals};

/// Inputs every rule may read.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub scores: &'a CompetencyScores,
    pub usage: &'a UsageSignals,
    pub completed_count: usize,
    /// Tool ids known to the catalog, in catalog order.
    pub known_tools: &'a [String],
    pub config: &'a RecommendConfig,
}

/// A rule that fired, before it is attached to a catalog resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFiring {
    pub kind: UsageRuleKind,
    pub source: RecommendationSource,
    pub priority: Priority,
    pub reason: String,
    pub competency: Option<(CompetencyDomain, u8)>,
}

/// Evaluate a single rule.
pub fn evaluate(kind: UsageRuleKind, ctx: &RuleContext<'_>) -> Option<RuleFiring> {
    match kind {
        UsageRuleKind::ExportNeverUsed => export_never_used(ctx),
        UsageRuleKind::ReadingWithoutPractice => reading_without_practice(ctx),
        UsageRuleKind::UnusedTool => unused_tool(ctx),
        UsageRuleKind::StalledDomain => stalled_domain(ctx),
    }
}

/// Evaluate every rule, returning firings in [`UsageRuleKind::ALL`] order.
pub fn evaluate_all(ctx: &RuleContext<'_>) -> Vec<RuleFiring> {
    UsageRuleKind::ALL.iter().filter_map(|k| evaluate(*k, ctx)).collect()
}

fn export_never_used(ctx: &RuleContext<'_>) -> Option<RuleFiring> {
    if ctx.usage.exports > 0 {
        return None;
    }
    let threshold = ctx.config.export_progress_threshold;
    let (tool, progress) = ctx
        .usage
        .sorted_tools()
        .into_iter()
        .find(|(_, p)| *p >= threshold)?;
    Some(RuleFiring {
        kind: UsageRuleKind::ExportNeverUsed,
        source: RecommendationSource::UsagePattern,
        priority: Priority::Medium,
        reason: format!("{progress}% progress in {tool} but nothing exported yet"),
        competency: None,
    })
}

fn reading_without_practice(ctx: &RuleContext<'_>) -> Option<RuleFiring> {
    let accessed = ctx.usage.resources_accessed;
    if accessed <= ctx.config.reading_without_practice_threshold || ctx.completed_count >= 2 {
        return None;
    }
    Some(RuleFiring {
        kind: UsageRuleKind::ReadingWithoutPractice,
        source: RecommendationSource::UsagePattern,
        priority: Priority::High,
        reason: format!(
            "{accessed} resources read but only {} activities completed",
            ctx.completed_count
        ),
        competency: None,
    })
}

fn unused_tool(ctx: &RuleContext<'_>) -> Option<RuleFiring> {
    let any_in_use = ctx.usage.tool_progress.values().any(|p| *p > 0);
    if !any_in_use {
        return None;
    }
    let idle = ctx.known_tools.iter().find(|t| ctx.usage.progress_of(t) == 0)?;
    Some(RuleFiring {
        kind: UsageRuleKind::UnusedTool,
        source: RecommendationSource::UsagePattern,
        priority: Priority::Low,
        reason: format!("{idle} has not been tried yet"),
        competency: None,
    })
}

fn stalled_domain(ctx: &RuleContext<'_>) -> Option<RuleFiring> {
    let min = ctx.config.stalled_domain_min_completions;
    let (domain, score) = CompetencyDomain::ALL.iter().find_map(|d| {
        let score = ctx.scores.get(*d);
        (score < 50 && ctx.usage.completions_in(*d) >= min).then_some((*d, score))
    })?;
    Some(RuleFiring {
        kind: UsageRuleKind::StalledDomain,
        source: RecommendationSource::PerformanceBased,
        priority: Priority::High,
        reason: format!(
            "{} is still at {score}/100 after {} completions",
            domain.label(),
            ctx.usage.completions_in(domain)
        ),
        competency: Some((domain, score)),
    })
}
