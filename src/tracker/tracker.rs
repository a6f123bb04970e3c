//! # Stage: Completion Tracker
//!
//! ## Responsibility
//! Apply completion events to per-customer state: the completion ledger, the
//! bounded competency score increment, milestone-achievement detection, the
//! hand-off to the batch sender and invalidation of the customer's cached
//! derived data.
//!
//! ## Guarantees
//! - Ledger update, score increment and achievement detection for one event
//!   happen under a single lock; concurrent completions never lose an update
//! - Scores never exceed 100
//! - A customer seen for the first time starts from the cached competency
//!   copy when one exists; the cached copy is rewritten under the same lock
//!   as the increment, so it always equals the in-memory scores
//! - An achievement is announced once per (customer, tier, domain)
//! - `record_completion` fails only for an event without a customer id
//!
//! ## NOT Responsible For
//! - Delivering events to the record store (see [`super::BatchSender`])
//! - Choosing what to recommend next (see `recommend`)

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::ledger::{velocity, CompletionEvent, CompletionLedger};
use super::sender::BatchSenderHandle;
use crate::cache::{self, CacheStore, DurableMirror};
use crate::clock::Clock;
use crate::competency::{CompetencyDomain, CompetencyScores};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::milestone::{targets_for, MilestoneTier};

/// Broadcast when a completion pushes domains over their milestone target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneAchieved {
    pub customer_id: String,
    pub tier: MilestoneTier,
    /// Domains announced for the first time by this event.
    pub newly_achieved: Vec<CompetencyDomain>,
    /// Every domain currently meeting its target.
    pub achieved: Vec<CompetencyDomain>,
    pub all_targets_met: bool,
}

#[derive(Debug, Default)]
struct CustomerState {
    scores: CompetencyScores,
    ledger: CompletionLedger,
    tier: MilestoneTier,
    announced: BTreeSet<(MilestoneTier, CompetencyDomain)>,
}

impl CustomerState {
    /// Domains meeting the current tier's targets that were not announced yet.
    fn detect_achievements(&mut self, customer_id: &str) -> Option<MilestoneAchieved> {
        let targets = targets_for(self.tier);
        let achieved = self.scores.domains_meeting(&targets);
        let tier = self.tier;
        let newly: Vec<CompetencyDomain> = achieved
            .iter()
            .copied()
            .filter(|d| self.announced.insert((tier, *d)))
            .collect();
        if newly.is_empty() {
            return None;
        }
        Some(MilestoneAchieved {
            customer_id: customer_id.to_string(),
            tier,
            newly_achieved: newly,
            all_targets_met: achieved.len() == CompetencyDomain::ALL.len(),
            achieved,
        })
    }
}

/// Owns competency scores and completion ledgers for every customer.
pub struct CompletionTracker {
    config: TrackerConfig,
    cache: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    mirror: Option<Arc<dyn DurableMirror>>,
    sender: Option<BatchSenderHandle>,
    customers: Mutex<HashMap<String, CustomerState>>,
    signals: broadcast::Sender<MilestoneAchieved>,
}

impl CompletionTracker {
    pub fn new(config: TrackerConfig, cache: Arc<CacheStore>, clock: Arc<dyn Clock>) -> Self {
        let (signals, _) = broadcast::channel(config.signal_channel_capacity.max(1));
        Self {
            config,
            cache,
            clock,
            mirror: None,
            sender: None,
            customers: Mutex::new(HashMap::new()),
            signals,
        }
    }

    /// Forward every recorded completion to `sender`.
    pub fn with_sender(mut self, sender: BatchSenderHandle) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Persist ledgers to `mirror` after each completion.
    pub fn with_mirror(mut self, mirror: Arc<dyn DurableMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CustomerState>> {
        self.customers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State for `customer_id`, created on first sight with scores seeded
    /// from the cached competency copy when one exists.
    fn state_mut<'a>(
        &self,
        customers: &'a mut HashMap<String, CustomerState>,
        customer_id: &str,
    ) -> &'a mut CustomerState {
        customers.entry(customer_id.to_string()).or_insert_with(|| {
            let mut state = CustomerState::default();
            let key = cache::competency_key(customer_id);
            if let Some(scores) = self.cache.get_as::<CompetencyScores>(&key) {
                debug!(
                    target: "devpath::tracker",
                    customer = %customer_id,
                    "scores seeded from cache"
                );
                state.scores = scores;
            }
            state
        })
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    /// Apply one completion event.
    ///
    /// Cache and mirror writes happen under the same lock as the score
    /// update, so the cached copy never lags behind a later completion.
    pub fn record_completion(&self, event: CompletionEvent) -> Result<(), TrackerError> {
        let customer_id = event.customer_id.trim().to_string();
        if customer_id.is_empty() {
            error!(
                target: "devpath::tracker",
                task_id = %event.task_id,
                "completion without customer id"
            );
            return Err(TrackerError::MissingCustomerId { task_id: event.task_id });
        }

        {
            let mut customers = self.lock();
            let state = self.state_mut(&mut customers, &customer_id);
            state.ledger.record(&event);

            match event.domain() {
                Some(domain) => {
                    let by = self.config.increments.for_priority(event.priority);
                    let before = state.scores.get(domain);
                    let after = state.scores.increment(domain, by);
                    debug!(
                        target: "devpath::tracker",
                        customer = %customer_id,
                        domain = %domain,
                        before,
                        after,
                        "competency updated"
                    );
                }
                None => warn!(
                    target: "devpath::tracker",
                    customer = %customer_id,
                    area = %event.competency_area,
                    "unknown competency area; ledger only"
                ),
            }

            if let Some(signal) = state.detect_achievements(&customer_id) {
                info!(
                    target: "devpath::tracker",
                    customer = %customer_id,
                    tier = %signal.tier,
                    newly = ?signal.newly_achieved,
                    all_targets_met = signal.all_targets_met,
                    "milestone targets achieved"
                );
                // Nobody listening is fine.
                let _ = self.signals.send(signal);
            }

            self.persist_ledger(&customer_id, &state.ledger);
            self.refresh_cache(&customer_id, &state.scores);
        }

        if let Some(sender) = &self.sender {
            sender.enqueue(event);
        }
        Ok(())
    }

    /// Drop the customer's derived cache entries, keeping a cached score copy
    /// current.
    fn refresh_cache(&self, customer_id: &str, scores: &CompetencyScores) {
        let key = cache::competency_key(customer_id);
        let had_copy = self.cache.contains(&key);
        let removed = self.cache.invalidate_by_prefix(customer_id);
        if had_copy {
            self.cache.set_as(key, scores, self.cache.config().default_ttl());
        }
        debug!(
            target: "devpath::tracker",
            customer = %customer_id,
            removed,
            "customer cache refreshed"
        );
    }

    fn persist_ledger(&self, customer_id: &str, ledger: &CompletionLedger) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.store_ledger(customer_id, ledger) {
                warn!(
                    target: "devpath::tracker",
                    customer = %customer_id,
                    error = %e,
                    "ledger not persisted"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Explicit writes
    // -----------------------------------------------------------------------

    /// Replace a customer's scores with an assessment result and publish the
    /// cached copy.
    pub fn set_assessment(&self, customer_id: &str, scores: CompetencyScores) {
        let mut customers = self.lock();
        let key = cache::competency_key(customer_id);
        self.cache.set_as(key, &scores, self.cache.config().default_ttl());
        customers.entry(customer_id.to_string()).or_default().scores = scores;
    }

    /// Set the tier whose targets achievements are measured against.
    pub fn set_milestone(&self, customer_id: &str, tier: MilestoneTier) {
        let mut customers = self.lock();
        self.state_mut(&mut customers, customer_id).tier = tier;
        debug!(target: "devpath::tracker", customer = %customer_id, tier = %tier, "milestone set");
    }

    /// Reload a ledger from the mirror. Returns `true` if one was found.
    pub fn restore_ledger(&self, customer_id: &str) -> bool {
        let Some(mirror) = &self.mirror else {
            return false;
        };
        match mirror.load_ledger(customer_id) {
            Ok(Some(ledger)) => {
                let mut customers = self.lock();
                self.state_mut(&mut customers, customer_id).ledger = ledger;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(
                    target: "devpath::tracker",
                    customer = %customer_id,
                    error = %e,
                    "ledger restore failed"
                );
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    /// Current scores; unknown customers read as all-default.
    pub fn scores(&self, customer_id: &str) -> CompetencyScores {
        self.lock().get(customer_id).map(|s| s.scores.clone()).unwrap_or_default()
    }

    pub fn ledger(&self, customer_id: &str) -> CompletionLedger {
        self.lock().get(customer_id).map(|s| s.ledger.clone()).unwrap_or_default()
    }

    pub fn milestone(&self, customer_id: &str) -> MilestoneTier {
        self.lock().get(customer_id).map(|s| s.tier).unwrap_or_default()
    }

    /// Completion velocity in `[0, 1]` as of now.
    pub fn velocity(&self, customer_id: &str) -> f64 {
        velocity(&self.ledger(customer_id), self.clock.now_ms())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MilestoneAchieved> {
        self.signals.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
