//! Tests for milestone detection and the recommendation engine: tier table,
//! ranking, determinism, dedup and the read-through catalog path.

use std::collections::HashSet;
use std::sync::Arc;

use devpath_engine::cache::CacheStore;
use devpath_engine::catalog::{Catalog, Priority, StaticCatalogSource};
use devpath_engine::clock::ManualClock;
use devpath_engine::competency::{CompetencyDomain, CompetencyScores};
use devpath_engine::config::{CacheConfig, RecommendConfig};
use devpath_engine::milestone::*;
use devpath_engine::recommend::*;
use proptest::prelude::*;
use rstest::rstest;

fn demo_catalog() -> Catalog {
    Catalog::load(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/catalog.toml")).unwrap()
}

fn engine() -> RecommendationEngine {
    RecommendationEngine::new(RecommendConfig::default())
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

fn revenue(mrr: u64) -> BusinessMetrics {
    BusinessMetrics { monthly_recurring_revenue: Some(mrr), ..Default::default() }
}

fn growth_metrics() -> BusinessMetrics {
    BusinessMetrics { team_size: Some(3), ..revenue(30_000) }
}

#[rstest]
#[case(BusinessMetrics::default(), MilestoneTier::Foundation)]
#[case(growth_metrics(), MilestoneTier::Growth)]
#[case(BusinessMetrics { team_size: Some(20), ..Default::default() }, MilestoneTier::Expansion)]
#[case(
    BusinessMetrics { customer_count: Some(24), ..Default::default() },
    MilestoneTier::Foundation
)]
#[case(
    BusinessMetrics { funding_stage: Some(FundingStage::SeriesB), ..Default::default() },
    MilestoneTier::Scale
)]
#[case(revenue(500_000), MilestoneTier::Scale)]
fn test_detect_tier_table(#[case] metrics: BusinessMetrics, #[case] expected: MilestoneTier) {
    assert_eq!(detect_tier(&metrics).tier, expected);
}

#[test]
fn test_revenue_alone_qualifies_for_growth() {
    let milestone = detect_tier(&growth_metrics());
    assert_eq!(milestone.tier.as_str(), "growth");
    assert_eq!(milestone.targets.get(CompetencyDomain::CustomerAnalysis), 70);
}

#[test]
fn test_next_tier_chain_ends_at_scale() {
    assert_eq!(next_tier(MilestoneTier::Expansion).map(|m| m.tier), Some(MilestoneTier::Scale));
    assert!(next_tier(MilestoneTier::Scale).is_none());
    assert_eq!(targets_for_name("no-such-tier"), targets_for(MilestoneTier::Foundation));
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

fn demo_request() -> RecommendationRequest {
    let mut req = RecommendationRequest::new("acme");
    req.milestone = Some(MilestoneTier::Growth);
    req.scores = CompetencyScores::from_pairs([
        (CompetencyDomain::CustomerAnalysis, 42),
        (CompetencyDomain::ValueCommunication, 61),
        (CompetencyDomain::ExecutiveReadiness, 35),
    ]);
    req.completed_activities = vec!["ICP Workshop".into(), "Value Calculator".into()];
    req.usage.resources_accessed = 14;
    req.usage.domain_completions.insert(CompetencyDomain::ExecutiveReadiness, 3);
    req
}

#[test]
fn test_demo_profile_ranks_task_completion_first() {
    let list = engine().recommend(&demo_request(), &demo_catalog());
    assert!(!list.is_empty() && list.len() <= 8);
    assert_eq!(list[0].source, RecommendationSource::TaskCompletion);
    assert_eq!(list[0].priority, Priority::High);
}

#[test]
fn test_identical_inputs_with_reordered_maps_give_identical_lists() {
    let tools = [("icp-builder", 75), ("value-calculator", 20), ("pitch-lab", 0), ("extra", 55)];

    let mut a = demo_request();
    for (t, p) in tools {
        a.usage.tool_progress.insert(t.to_string(), p);
    }
    let mut b = demo_request();
    for (t, p) in tools.iter().rev() {
        b.usage.tool_progress.insert(t.to_string(), *p);
    }
    b.usage.domain_completions.clear();
    b.usage.domain_completions.insert(CompetencyDomain::ExecutiveReadiness, 3);

    let catalog = demo_catalog();
    let first = engine().recommend(&a, &catalog);
    let second = engine().recommend(&b, &catalog);
    assert_eq!(first, second);
    assert_eq!(first, engine().recommend(&a, &catalog));
}

#[test]
fn test_stalled_domain_surfaces_coaching() {
    let mut req = demo_request();
    req.limit = Some(30);
    let list = engine().recommend(&req, &demo_catalog());
    let coaching = list.iter().find(|r| r.resource_id == "domain-coaching").unwrap();
    assert_eq!(coaching.source, RecommendationSource::PerformanceBased);
    assert_eq!(coaching.competency_area, Some(CompetencyDomain::ExecutiveReadiness));
}

#[test]
fn test_unknown_activity_is_ignored() {
    let mut req = RecommendationRequest::new("acme");
    req.completed_activities = vec!["Underwater Basket Weaving".into()];
    let list = engine().recommend(&req, &demo_catalog());
    assert!(list.iter().all(|r| r.source != RecommendationSource::TaskCompletion));
}

fn score_strategy() -> impl Strategy<Value = CompetencyScores> {
    (0u8..=100, 0u8..=100, 0u8..=100).prop_map(|(a, b, c)| {
        CompetencyScores::from_pairs([
            (CompetencyDomain::CustomerAnalysis, a),
            (CompetencyDomain::ValueCommunication, b),
            (CompetencyDomain::ExecutiveReadiness, c),
        ])
    })
}

proptest! {
    #[test]
    fn prop_lists_are_deduplicated_ranked_and_bounded(
        scores in score_strategy(),
        completed in proptest::collection::vec(
            prop_oneof![
                Just("ICP Workshop"),
                Just("Value Calculator"),
                Just("Draft your ICP"),
                Just("misc"),
            ],
            0..8,
        ),
        accessed in 0u32..30,
        limit in 0usize..20,
        tier in prop_oneof![
            Just(MilestoneTier::Foundation),
            Just(MilestoneTier::Growth),
            Just(MilestoneTier::Expansion),
            Just(MilestoneTier::Scale),
        ],
    ) {
        let mut req = RecommendationRequest::new("p");
        req.scores = scores;
        req.completed_activities = completed.into_iter().map(String::from).collect();
        req.usage.resources_accessed = accessed;
        req.milestone = Some(tier);
        req.limit = Some(limit);

        let list = engine().recommend(&req, &demo_catalog());
        let bound = if limit == 0 { 8 } else { limit };
        prop_assert!(list.len() <= bound);

        let titles: HashSet<&str> = list.iter().map(|r| r.dedup_key()).collect();
        prop_assert_eq!(titles.len(), list.len());
        let pairs: HashSet<(&str, &str)> =
            list.iter().map(|r| (r.title.as_str(), r.resource_id.as_str())).collect();
        prop_assert_eq!(pairs.len(), list.len());

        for pair in list.windows(2) {
            let a = (std::cmp::Reverse(pair[0].priority), pair[0].source.weight());
            let b = (std::cmp::Reverse(pair[1].priority), pair[1].source.weight());
            prop_assert!(a <= b);
        }
    }
}

// ---------------------------------------------------------------------------
// Read-through
// ---------------------------------------------------------------------------

#[test]
fn test_recommend_for_matches_direct_ranking() {
    let catalog = demo_catalog();
    let cache = Arc::new(CacheStore::new(CacheConfig::default(), ManualClock::shared(0)));
    let engine = RecommendationEngine::with_source(
        RecommendConfig::default(),
        cache.clone(),
        Arc::new(StaticCatalogSource::new(catalog.clone())),
    );
    let req = demo_request();

    let via_cache = tokio_test::block_on(engine.recommend_for(&req));
    assert_eq!(via_cache, engine.recommend(&req, &catalog));
    assert!(cache.contains("resources:growth"));
    assert!(cache.contains("tasks:acme:growth"));

    assert_eq!(cache.invalidate_by_prefix("acme"), 1);
    assert!(cache.contains("resources:growth"), "tier-wide resources are not customer data");
}
