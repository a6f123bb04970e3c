//! # Stage: Recommendation Engine
//!
//! ## Responsibility
//! Turn one user's scores, completed activities, milestone and usage signals
//! into a deduplicated, ranked list of next actions drawn from a [`Catalog`].
//!
//! ## Guarantees
//! - Deterministic: identical inputs give an identical list in identical order,
//!   whatever the iteration order of the input maps
//! - At most one entry per `(title, resource_id)`; the first emission wins
//! - Sorting is stable: priority first, then source weight, then emission order
//! - Non-failing: `recommend_for` degrades to empty catalog parts when the
//!   source or the cache misbehaves
//!
//! ## NOT Responsible For
//! - Updating scores after a completion (see `tracker`)
//! - Persisting anything beyond the catalog parts it caches

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{self, CacheStore};
use crate::catalog::{Catalog, CatalogFilter, CatalogKind, CatalogSource, Priority, Resource, Task};
use crate::competency::{bucket, CompetencyDomain, CompetencyScores};
use crate::config::RecommendConfig;
use crate::error::CatalogError;
use crate::milestone::{
    detect_tier_with, BusinessMetrics, Milestone, MilestoneThresholds, MilestoneTier,
};

use super::rules::{self, RuleContext};
use super::types::{Recommendation, RecommendationRequest, RecommendationSource, UsageSignals};

// ---------------------------------------------------------------------------
// Emission buffer
// ---------------------------------------------------------------------------

/// Collects candidates in emission order.
struct Candidates<'c> {
    catalog: &'c Catalog,
    items: Vec<Recommendation>,
}

impl<'c> Candidates<'c> {
    fn new(catalog: &'c Catalog) -> Self {
        Self { catalog, items: Vec::new() }
    }

    /// Emit every resource in `ids` that exists in the catalog.
    fn emit_ids(
        &mut self,
        ids: &[String],
        source: RecommendationSource,
        priority: Priority,
        reason: &str,
        competency: Option<(CompetencyDomain, u8)>,
    ) {
        let catalog = self.catalog;
        for id in ids {
            if let Some(resource) = catalog.resource(id) {
                self.emit(resource, source, priority, reason, competency);
            }
        }
    }

    fn emit(
        &mut self,
        resource: &Resource,
        source: RecommendationSource,
        priority: Priority,
        reason: &str,
        competency: Option<(CompetencyDomain, u8)>,
    ) {
        let mut rec = Recommendation::from_resource(resource, source, priority, reason);
        if let Some((domain, score)) = competency {
            rec = rec.with_competency(domain, score);
        }
        self.items.push(rec);
    }

    fn push(&mut self, rec: Recommendation) {
        self.items.push(rec);
    }
}

// ---------------------------------------------------------------------------
// RecommendationEngine
// ---------------------------------------------------------------------------

/// Produces ranked recommendations, optionally reading the catalog through
/// the cache.
pub struct RecommendationEngine {
    config: RecommendConfig,
    cache: Option<Arc<CacheStore>>,
    source: Option<Arc<dyn CatalogSource>>,
}

impl RecommendationEngine {
    /// An engine for the synchronous [`recommend`](Self::recommend) path only.
    pub fn new(config: RecommendConfig) -> Self {
        Self { config, cache: None, source: None }
    }

    /// An engine that can also serve [`recommend_for`](Self::recommend_for).
    pub fn with_source(
        config: RecommendConfig,
        cache: Arc<CacheStore>,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        Self { config, cache: Some(cache), source: Some(source) }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    /// Rank next actions for one user against `catalog`.
    pub fn recommend(&self, req: &RecommendationRequest, catalog: &Catalog) -> Vec<Recommendation> {
        if catalog.is_empty() {
            debug!(target: "devpath::engine", customer = %req.customer_id, "empty catalog");
            return Vec::new();
        }
        let tier = req.tier();
        let milestone = Milestone::for_tier(tier);
        let mut out = Candidates::new(catalog);

        self.task_driven_pass(req, &mut out);
        competency_gap_pass(&req.scores, &mut out);
        milestone_pass(req, tier, &mut out);
        self.usage_pattern_pass(req, &mut out);
        self.task_progression_pass(req, &milestone, &mut out);

        let emitted = out.items.len();
        let list = merge(out.items, self.effective_limit(req.limit));
        debug!(
            target: "devpath::engine",
            customer = %req.customer_id,
            tier = %tier,
            emitted,
            returned = list.len(),
            "recommendations ranked"
        );
        list
    }

    /// Read-through variant: loads the catalog for the request's tier and
    /// customer through the cache, then ranks.
    pub async fn recommend_for(&self, req: &RecommendationRequest) -> Vec<Recommendation> {
        let catalog = self.load_catalog(&req.customer_id, req.tier()).await;
        self.recommend(req, &catalog)
    }

    /// Assemble the catalog parts for `customer_id` at `tier`. Either part is
    /// empty when it cannot be obtained.
    pub async fn load_catalog(&self, customer_id: &str, tier: MilestoneTier) -> Catalog {
        let filter = CatalogFilter {
            customer_id: customer_id.to_string(),
            tier,
            categories: Milestone::for_tier(tier).categories,
        };
        let resources_key = cache::key("resources", &[tier.as_str()]);
        let tasks_key = cache::key("tasks", &[customer_id, tier.as_str()]);

        let mut catalog = self
            .read_through(&resources_key, CatalogKind::Resources, &filter, Catalog::from_json_value)
            .await
            .unwrap_or_default();
        catalog.tasks = self
            .read_through(&tasks_key, CatalogKind::Tasks, &filter, |v| {
                serde_json::from_value::<Vec<Task>>(v).map_err(CatalogError::from)
            })
            .await
            .unwrap_or_default();
        catalog
    }

    /// Milestone for a customer's current metrics.
    ///
    /// Detection always runs on the metrics given; the result is published
    /// under `milestone:<customer>:current` for other readers, never read
    /// back in place of detection.
    pub fn milestone_for(
        &self,
        customer_id: &str,
        metrics: &BusinessMetrics,
        thresholds: &MilestoneThresholds,
    ) -> Milestone {
        let milestone = detect_tier_with(metrics, thresholds);
        if let Some(cache) = &self.cache {
            let key = cache::key("milestone", &[customer_id, "current"]);
            cache.set_as(key, &milestone, cache.config().default_ttl());
        }
        milestone
    }

    /// `true` when the user has clearly moved past the basics.
    pub fn is_advanced_user(&self, scores: &CompetencyScores, usage: &UsageSignals) -> bool {
        let t = &self.config.advanced;
        usage.combined_tool_progress() > t.combined_tool_progress
            || usage.resources_accessed > t.resources_accessed
            || scores.mean() > t.mean_competency
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) if n > 0 => n,
            _ => self.config.default_limit,
        }
    }

    // -- passes -------------------------------------------------------------

    fn task_driven_pass(&self, req: &RecommendationRequest, out: &mut Candidates<'_>) {
        let advanced = self.is_advanced_user(&req.scores, &req.usage);
        let catalog = out.catalog;
        for activity in &req.completed_activities {
            let Some(mapping) = catalog.find_activity(activity) else {
                continue;
            };
            let reason = format!("Next step after completing {activity}");
            out.emit_ids(
                &mapping.immediate,
                RecommendationSource::TaskCompletion,
                Priority::High,
                &reason,
                None,
            );
            if advanced {
                let reason = format!("Go deeper after {activity}");
                out.emit_ids(
                    &mapping.advanced,
                    RecommendationSource::TaskCompletion,
                    Priority::Medium,
                    &reason,
                    None,
                );
            }
        }
    }

    fn usage_pattern_pass(&self, req: &RecommendationRequest, out: &mut Candidates<'_>) {
        let catalog = out.catalog;
        let ctx = RuleContext {
            scores: &req.scores,
            usage: &req.usage,
            completed_count: req.completed_activities.len(),
            known_tools: &catalog.tools,
            config: &self.config,
        };
        for firing in rules::evaluate_all(&ctx) {
            if let Some(resource) = catalog.usage_rule(firing.kind) {
                out.emit(
                    resource,
                    firing.source,
                    firing.priority,
                    &firing.reason,
                    firing.competency,
                );
            }
        }
    }

    fn task_progression_pass(
        &self,
        req: &RecommendationRequest,
        milestone: &Milestone,
        out: &mut Candidates<'_>,
    ) {
        let catalog = out.catalog;
        let mut open: Vec<(u8, &Task)> = catalog
            .tasks
            .iter()
            .filter(|t| {
                milestone.categories.is_empty() || milestone.categories.contains(&t.category)
            })
            .filter(|t| !req.has_completed(t))
            .map(|t| (t.competency_gap(&milestone.targets, &req.scores), t))
            .filter(|(gap, _)| *gap > 0)
            .collect();
        // Stable: equal gaps keep catalog order.
        open.sort_by_key(|(gap, _)| Reverse(*gap));

        for (gap, t) in open.into_iter().take(self.config.task_progression_limit) {
            let reason = format!("Closes a {gap}-point gap in {}", t.competency_area.label());
            let mut rec = Recommendation::from_task(t, reason);
            rec.current_score = Some(req.scores.get(t.competency_area));
            out.push(rec);
        }
    }

    async fn read_through<T, F>(
        &self,
        key: &str,
        kind: CatalogKind,
        filter: &CatalogFilter,
        parse: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(Value) -> Result<T, CatalogError>,
    {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(key) {
                match parse(cached) {
                    Ok(part) => return Some(part),
                    Err(e) => {
                        warn!(
                            target: "devpath::engine",
                            key,
                            error = %e,
                            "dropping unreadable cached catalog part"
                        );
                        cache.delete(key);
                    }
                }
            }
        }

        let source = self.source.as_ref()?;
        let payload = match source.fetch_catalog(kind, filter).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    target: "devpath::engine",
                    %kind,
                    customer = %filter.customer_id,
                    error = %e,
                    "catalog fetch failed"
                );
                return None;
            }
        };
        match parse(payload.clone()) {
            Ok(part) => {
                if let Some(cache) = &self.cache {
                    cache.set_with_ttl(key, payload, self.config.catalog_ttl());
                }
                Some(part)
            }
            Err(e) => {
                warn!(
                    target: "devpath::engine",
                    %kind,
                    customer = %filter.customer_id,
                    error = %e,
                    "catalog payload rejected"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stateless passes
// ---------------------------------------------------------------------------

fn competency_gap_pass(scores: &CompetencyScores, out: &mut Candidates<'_>) {
    let catalog = out.catalog;
    for domain in CompetencyDomain::ALL {
        let Some(buckets) = catalog.bucket_for(*domain) else {
            continue;
        };
        let score = scores.get(*domain);
        let priority = if score < 50 { Priority::High } else { Priority::Medium };
        let reason = format!("{} is at {score}/100", domain.label());
        out.emit_ids(
            buckets.for_bucket(bucket(score)),
            RecommendationSource::CompetencyGap,
            priority,
            &reason,
            Some((*domain, score)),
        );
    }
}

fn milestone_pass(req: &RecommendationRequest, tier: MilestoneTier, out: &mut Candidates<'_>) {
    let catalog = out.catalog;
    let Some(set) = catalog.milestone_set(tier) else {
        return;
    };
    let completed = req.completed_activities.len();
    let reason = format!("Core to the {tier} milestone");
    out.emit_ids(
        &set.essential,
        RecommendationSource::MilestoneEssential,
        Priority::High,
        &reason,
        None,
    );
    if completed > 2 {
        let reason = format!("Recommended at the {tier} milestone");
        out.emit_ids(
            &set.recommended,
            RecommendationSource::MilestoneRecommended,
            Priority::Medium,
            &reason,
            None,
        );
    }
    if completed > 5 {
        let reason = format!("Advanced material for the {tier} milestone");
        out.emit_ids(
            &set.advanced,
            RecommendationSource::MilestoneAdvanced,
            Priority::Low,
            &reason,
            None,
        );
    }
}

/// Dedup by title (resource id for untitled entries) keeping the first,
/// rank, truncate.
pub fn merge(candidates: Vec<Recommendation>, limit: usize) -> Vec<Recommendation> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut list: Vec<Recommendation> = candidates
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key().to_string()))
        .collect();
    list.sort_by_key(|r| (Reverse(r.priority), r.source.weight()));
    list.truncate(limit);
    list
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
