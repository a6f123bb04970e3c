//! # devpath-engine
//!
//! Adaptive caching and next-action recommendations for a professional
//! development dashboard.
//!
//! - [`cache`]: TTL + capacity-bounded store, durable mirror, expiry sweep
//! - [`competency`]: competency domains and bounded scores
//! - [`milestone`]: tier detection and per-tier competency targets
//! - [`catalog`]: resources, tasks and lookup tables fed to the engine
//! - [`recommend`]: ranked, deduplicated recommendation lists
//! - [`tracker`]: completion events, score updates, achievement signals
//!
//! ```no_run
//! use std::sync::Arc;
//! use devpath_engine::{cache::CacheStore, clock, config::EngineConfig};
//! use devpath_engine::tracker::{CompletionEvent, CompletionTracker};
//! use devpath_engine::catalog::Priority;
//!
//! let config = EngineConfig::default();
//! let clock = clock::system();
//! let cache = Arc::new(CacheStore::new(config.cache.clone(), clock.clone()));
//! let tracker = CompletionTracker::new(config.tracker.clone(), cache, clock.clone());
//! let event =
//!     CompletionEvent::new(clock.as_ref(), "t-1", "acme", "customer-analysis", Priority::High);
//! tracker.record_completion(event).unwrap();
//! ```

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod clock;
pub mod competency;
pub mod config;
pub mod error;
pub mod milestone;
pub mod recommend;
pub mod tracker;

pub use cache::{CacheStatistics, CacheStore};
pub use catalog::{Catalog, Priority};
pub use competency::{CompetencyDomain, CompetencyScores};
pub use config::EngineConfig;
pub use milestone::{detect_tier, next_tier, targets_for, Milestone, MilestoneTier};
pub use recommend::{Recommendation, RecommendationEngine, RecommendationRequest};
pub use tracker::{CompletionEvent, CompletionTracker, MilestoneAchieved};
