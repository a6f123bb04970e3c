//! # Stage: Catalog
//!
//! ## Responsibility
//! Typed lookup data consumed by the recommendation engine: the resource
//! list, activity → follow-on resource mapping, per-domain resource buckets,
//! per-tier milestone resource sets, usage-rule targets and the candidate task
//! list. The content is external data; this module only types, loads and
//! validates it, and defines the outbound [`CatalogSource`] seam.
//!
//! ## Guarantees
//! - `validate()` rejects any reference to an unknown resource id
//! - Lookups preserve the declared order of the data
//!
//! ## NOT Responsible For
//! - Fetching catalog data over the network (implementations of `CatalogSource` do)
//! - Scoring or ranking (see [`crate::recommend`])

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::competency::{CompetencyDomain, CompetencyScores, ScoreBucket};
use crate::error::{CatalogError, SourceError};
use crate::milestone::MilestoneTier;

pub type ResourceId = String;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Urgency of a task or recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// A learning resource or tool guide that can be recommended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_tool_id: Option<String>,
}

/// Follow-on resources for one completed activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMapping {
    pub activity: String,
    #[serde(default)]
    pub immediate: Vec<ResourceId>,
    #[serde(default)]
    pub advanced: Vec<ResourceId>,
}

/// Resources for one domain, split by score bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketedResources {
    pub low: Vec<ResourceId>,
    pub medium: Vec<ResourceId>,
    pub high: Vec<ResourceId>,
}

impl BucketedResources {
    pub fn for_bucket(&self, bucket: ScoreBucket) -> &[ResourceId] {
        match bucket {
            ScoreBucket::Low => &self.low,
            ScoreBucket::Medium => &self.medium,
            ScoreBucket::High => &self.high,
        }
    }
}

/// Resources attached to one milestone tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneResources {
    pub essential: Vec<ResourceId>,
    pub recommended: Vec<ResourceId>,
    pub advanced: Vec<ResourceId>,
}

/// The fixed set of behavioural rules evaluated by the usage-pattern pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageRuleKind {
    /// Substantial tool progress but nothing ever exported.
    ExportNeverUsed,
    /// Many resources read, almost nothing completed.
    ReadingWithoutPractice,
    /// A known tool untouched while others are in use.
    UnusedTool,
    /// A low-scoring domain despite repeated completions in it.
    StalledDomain,
}

impl UsageRuleKind {
    pub const ALL: &'static [UsageRuleKind] = &[
        UsageRuleKind::ExportNeverUsed,
        UsageRuleKind::ReadingWithoutPractice,
        UsageRuleKind::UnusedTool,
        UsageRuleKind::StalledDomain,
    ];
}

/// A candidate task the user can work on next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub competency_area: CompetencyDomain,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_tool_id: Option<String>,
}

impl Task {
    /// Target minus current score in this task's area, floored at zero.
    pub fn competency_gap(&self, targets: &CompetencyScores, current: &CompetencyScores) -> u8 {
        current.gap(self.competency_area, targets)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// All lookup data the engine needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub resources: Vec<Resource>,
    pub activity_map: Vec<ActivityMapping>,
    pub competency_buckets: BTreeMap<CompetencyDomain, BucketedResources>,
    pub milestone_sets: BTreeMap<MilestoneTier, MilestoneResources>,
    pub usage_rules: BTreeMap<UsageRuleKind, ResourceId>,
    /// Tool ids known to the dashboard, used by the unused-tool rule.
    pub tools: Vec<String>,
    pub tasks: Vec<Task>,
}

impl Catalog {
    /// Parse and validate a TOML catalog.
    pub fn from_toml_str(s: &str) -> Result<Self, CatalogError> {
        let c: Catalog = toml::from_str(s)?;
        c.validate()?;
        Ok(c)
    }

    /// Parse and validate a JSON catalog value.
    pub fn from_json_value(v: serde_json::Value) -> Result<Self, CatalogError> {
        let c: Catalog = serde_json::from_value(v)?;
        c.validate()?;
        Ok(c)
    }

    /// Load a catalog file; `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "json") {
            let v: serde_json::Value = serde_json::from_str(&text)?;
            Self::from_json_value(v)
        } else {
            Self::from_toml_str(&text)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.tasks.is_empty()
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Find the mapping for a completed activity: exact name first, then a
    /// case-insensitive substring match in either direction.
    pub fn find_activity(&self, activity: &str) -> Option<&ActivityMapping> {
        if let Some(exact) = self.activity_map.iter().find(|m| m.activity == activity) {
            return Some(exact);
        }
        let needle = activity.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.activity_map.iter().find(|m| {
            let name = m.activity.to_lowercase();
            !name.is_empty() && (name.contains(&needle) || needle.contains(&name))
        })
    }

    pub fn bucket_for(&self, domain: CompetencyDomain) -> Option<&BucketedResources> {
        self.competency_buckets.get(&domain)
    }

    pub fn milestone_set(&self, tier: MilestoneTier) -> Option<&MilestoneResources> {
        self.milestone_sets.get(&tier)
    }

    pub fn usage_rule(&self, kind: UsageRuleKind) -> Option<&Resource> {
        self.usage_rules.get(&kind).and_then(|id| self.resource(id))
    }

    /// Check id uniqueness and that every reference resolves.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = HashSet::new();
        for r in &self.resources {
            if !ids.insert(r.id.as_str()) {
                return Err(CatalogError::DuplicateResource(r.id.clone()));
            }
        }
        let check = |context: String, list: &[ResourceId]| -> Result<(), CatalogError> {
            match list.iter().find(|id| !ids.contains(id.as_str())) {
                Some(id) => Err(CatalogError::UnknownResource { context, id: id.clone() }),
                None => Ok(()),
            }
        };
        for m in &self.activity_map {
            check(format!("activity '{}'", m.activity), &m.immediate)?;
            check(format!("activity '{}'", m.activity), &m.advanced)?;
        }
        for (domain, b) in &self.competency_buckets {
            for list in [&b.low, &b.medium, &b.high] {
                check(format!("competency bucket '{domain}'"), list)?;
            }
        }
        for (tier, s) in &self.milestone_sets {
            for list in [&s.essential, &s.recommended, &s.advanced] {
                check(format!("milestone set '{tier}'"), list)?;
            }
        }
        for (kind, id) in &self.usage_rules {
            check(format!("usage rule {kind:?}"), std::slice::from_ref(id))?;
        }
        Ok(())
    }

    /// Copy of this catalog without tasks (the `Resources` payload).
    pub fn without_tasks(&self) -> Catalog {
        Catalog { tasks: Vec::new(), ..self.clone() }
    }
}

// ---------------------------------------------------------------------------
// Outbound seam
// ---------------------------------------------------------------------------

/// Which part of the catalog a fetch asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    /// Everything except tasks; shared by all customers at a tier.
    Resources,
    /// The customer's candidate task list.
    Tasks,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Resources => write!(f, "resources"),
            CatalogKind::Tasks => write!(f, "tasks"),
        }
    }
}

/// Narrowing passed along with a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub customer_id: String,
    pub tier: MilestoneTier,
    pub categories: BTreeSet<String>,
}

/// The external data-fetch collaborator.
///
/// `Resources` payloads deserialize as a [`Catalog`]; `Tasks` payloads as a
/// `Vec<Task>`.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(
        &self,
        kind: CatalogKind,
        filter: &CatalogFilter,
    ) -> Result<serde_json::Value, SourceError>;
}

/// Serves a pre-loaded catalog, e.g. one read from disk at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    catalog: Catalog,
}

impl StaticCatalogSource {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch_catalog(
        &self,
        kind: CatalogKind,
        filter: &CatalogFilter,
    ) -> Result<serde_json::Value, SourceError> {
        let value = match kind {
            CatalogKind::Resources => serde_json::to_value(self.catalog.without_tasks()),
            CatalogKind::Tasks => {
                let tasks: Vec<&Task> = self
                    .catalog
                    .tasks
                    .iter()
                    .filter(|t| {
                        filter.categories.is_empty() || filter.categories.contains(&t.category)
                    })
                    .collect();
                serde_json::to_value(tasks)
            }
        };
        value.map_err(|e| SourceError::InvalidPayload(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
