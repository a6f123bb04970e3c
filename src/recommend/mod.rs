//! # Module: recommend
//!
//! Ranked "next action" lists built from competency gaps, completed
//! activities, milestone resources, usage-pattern rules and open tasks.
//!
//! ## Sub-modules
//! - [`types`]: request, signal and result types
//! - [`rules`]: the fixed usage-pattern rule set
//! - [`engine`]: the passes, merge/rank step and the read-through loader

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::{merge, RecommendationEngine};
pub use rules::{RuleContext, RuleFiring};
pub use types::{Recommendation, RecommendationRequest, RecommendationSource, UsageSignals};
