//! # Module: tracker
//!
//! Completion events in, updated competency scores, milestone-achievement
//! signals and record-store deliveries out.
//!
//! ## Sub-modules
//! - [`ledger`]: completion events, per-customer ledgers, velocity
//! - [`tracker`]: the stateful completion tracker
//! - [`sender`]: batched, retrying delivery to the record store

pub mod ledger;
pub mod sender;
#[allow(clippy::module_inception)]
pub mod tracker;

pub use ledger::{velocity, CompletionEvent, CompletionLedger};
pub use sender::{BatchSender, BatchSenderHandle, CompletionSink, DeliveryFailure};
pub use tracker::{CompletionTracker, MilestoneAchieved};
