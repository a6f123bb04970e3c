//! Request and result types of the recommendation engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Priority, Resource, Task};
use crate::competency::{CompetencyDomain, CompetencyScores};
use crate::milestone::MilestoneTier;

// ---------------------------------------------------------------------------
// RecommendationSource
// ---------------------------------------------------------------------------

/// The pass that produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationSource {
    TaskCompletion,
    CompetencyGap,
    UsagePattern,
    PerformanceBased,
    MilestoneEssential,
    MilestoneRecommended,
    MilestoneAdvanced,
    TaskProgression,
}

impl RecommendationSource {
    /// Tie-break weight within one priority level; lower ranks first.
    pub fn weight(&self) -> u8 {
        match self {
            RecommendationSource::TaskCompletion => 0,
            RecommendationSource::CompetencyGap => 1,
            RecommendationSource::UsagePattern => 2,
            RecommendationSource::PerformanceBased => 3,
            RecommendationSource::MilestoneEssential => 4,
            RecommendationSource::MilestoneRecommended => 5,
            RecommendationSource::TaskProgression => 5,
            RecommendationSource::MilestoneAdvanced => 6,
        }
    }
}

impl fmt::Display for RecommendationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendationSource::TaskCompletion => "task-completion",
            RecommendationSource::CompetencyGap => "competency-gap",
            RecommendationSource::UsagePattern => "usage-pattern",
            RecommendationSource::PerformanceBased => "performance-based",
            RecommendationSource::MilestoneEssential => "milestone-essential",
            RecommendationSource::MilestoneRecommended => "milestone-recommended",
            RecommendationSource::MilestoneAdvanced => "milestone-advanced",
            RecommendationSource::TaskProgression => "task-progression",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// One ranked "next action".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub resource_id: String,
    pub title: String,
    pub category: String,
    pub reason: String,
    pub source: RecommendationSource,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency_area: Option<CompetencyDomain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_tool_id: Option<String>,
}

impl Recommendation {
    pub fn from_resource(
        resource: &Resource,
        source: RecommendationSource,
        priority: Priority,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource.id.clone(),
            title: resource.title.clone(),
            category: resource.category.clone(),
            reason: reason.into(),
            source,
            priority,
            competency_area: None,
            current_score: None,
            estimated_effort: resource.estimated_effort.clone(),
            related_tool_id: resource.related_tool_id.clone(),
        }
    }

    pub fn from_task(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            resource_id: task.id.clone(),
            title: task.name.clone(),
            category: task.category.clone(),
            reason: reason.into(),
            source: RecommendationSource::TaskProgression,
            priority: task.priority,
            competency_area: Some(task.competency_area),
            current_score: None,
            estimated_effort: task.estimated_effort.clone(),
            related_tool_id: task.related_tool_id.clone(),
        }
    }

    pub fn with_competency(mut self, domain: CompetencyDomain, score: u8) -> Self {
        self.competency_area = Some(domain);
        self.current_score = Some(score);
        self
    }

    /// Identity used for deduplication: the title, or the resource id when
    /// the title is blank.
    pub fn dedup_key(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            &self.resource_id
        } else {
            title
        }
    }
}

// ---------------------------------------------------------------------------
// Request inputs
// ---------------------------------------------------------------------------

/// Behavioural signals gathered by the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSignals {
    /// Progress (0-100 per tool, unbounded sum) keyed by tool id.
    pub tool_progress: HashMap<String, u32>,
    pub resources_accessed: u32,
    pub exports: u32,
    /// Completions recorded per domain, e.g. from the completion ledger.
    pub domain_completions: HashMap<CompetencyDomain, u32>,
}

impl UsageSignals {
    pub fn combined_tool_progress(&self) -> u32 {
        self.tool_progress.values().fold(0u32, |acc, v| acc.saturating_add(*v))
    }

    /// Tool ids with their progress, sorted by id for deterministic scans.
    pub fn sorted_tools(&self) -> Vec<(&str, u32)> {
        let mut v: Vec<(&str, u32)> =
            self.tool_progress.iter().map(|(k, p)| (k.as_str(), *p)).collect();
        v.sort_unstable();
        v
    }

    pub fn progress_of(&self, tool: &str) -> u32 {
        self.tool_progress.get(tool).copied().unwrap_or(0)
    }

    pub fn completions_in(&self, domain: CompetencyDomain) -> u32 {
        self.domain_completions.get(&domain).copied().unwrap_or(0)
    }
}

/// Everything the engine needs about one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub customer_id: String,
    /// `None` is treated as `Foundation`.
    pub milestone: Option<MilestoneTier>,
    pub scores: CompetencyScores,
    /// Completed activity names, in completion order.
    pub completed_activities: Vec<String>,
    pub usage: UsageSignals,
    /// Maximum list length; `None` or 0 uses the configured default.
    pub limit: Option<usize>,
}

impl RecommendationRequest {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self { customer_id: customer_id.into(), ..Default::default() }
    }

    pub fn tier(&self) -> MilestoneTier {
        self.milestone.unwrap_or_default()
    }

    /// `true` if `task` was completed, matched by id or name, ignoring case.
    pub fn has_completed(&self, task: &Task) -> bool {
        self.completed_activities
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&task.id) || a.eq_ignore_ascii_case(&task.name))
    }
}
