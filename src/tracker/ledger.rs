//! Completion events and the per-customer completion ledger.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Priority;
use crate::clock::Clock;
use crate::competency::CompetencyDomain;

const MS_PER_DAY: u64 = 86_400_000;

/// A finished task, as reported by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub task_id: String,
    pub customer_id: String,
    /// Domain name as sent by the client; unknown names still count in the ledger.
    pub competency_area: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    pub timestamp_ms: u64,
    pub session_id: String,
}

impl CompletionEvent {
    /// Stamp a new event with the clock's time and a fresh session id.
    pub fn new(
        clock: &dyn Clock,
        task_id: impl Into<String>,
        customer_id: impl Into<String>,
        competency_area: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            customer_id: customer_id.into(),
            competency_area: competency_area.into(),
            priority,
            tool_used: None,
            timestamp_ms: clock.now_ms(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_used = Some(tool.into());
        self
    }

    /// The parsed domain, if the name is known.
    pub fn domain(&self) -> Option<CompetencyDomain> {
        CompetencyDomain::parse(&self.competency_area)
    }
}

/// Running counts of one customer's completions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionLedger {
    pub domain_counts: BTreeMap<String, u32>,
    pub priority_counts: BTreeMap<Priority, u32>,
    pub tool_counts: BTreeMap<String, u32>,
    pub total: u32,
    pub first_completion_at_ms: Option<u64>,
    pub last_completion_at_ms: Option<u64>,
}

impl CompletionLedger {
    pub fn record(&mut self, event: &CompletionEvent) {
        bump(self.domain_counts.entry(event.competency_area.clone()).or_default());
        bump(self.priority_counts.entry(event.priority).or_default());
        if let Some(tool) = &event.tool_used {
            bump(self.tool_counts.entry(tool.clone()).or_default());
        }
        bump(&mut self.total);

        let ts = event.timestamp_ms;
        self.first_completion_at_ms = Some(self.first_completion_at_ms.map_or(ts, |f| f.min(ts)));
        self.last_completion_at_ms = Some(self.last_completion_at_ms.map_or(ts, |l| l.max(ts)));
    }

    pub fn count_in(&self, domain: &str) -> u32 {
        self.domain_counts.get(domain).copied().unwrap_or(0)
    }

    /// Counts for known domains, in the shape the recommendation engine reads.
    pub fn domain_completions(&self) -> HashMap<CompetencyDomain, u32> {
        let mut out = HashMap::new();
        for (name, n) in &self.domain_counts {
            if let Some(d) = CompetencyDomain::parse(name) {
                *out.entry(d).or_insert(0) += *n;
            }
        }
        out
    }
}

fn bump(n: &mut u32) {
    *n = n.saturating_add(1);
}

/// Completions per day since the first one, in `[0, 1]`. Zero with fewer
/// than two completions.
pub fn velocity(ledger: &CompletionLedger, now_ms: u64) -> f64 {
    if ledger.total < 2 {
        return 0.0;
    }
    let Some(first) = ledger.first_completion_at_ms else {
        return 0.0;
    };
    let days = (now_ms.saturating_sub(first) / MS_PER_DAY).max(1);
    (ledger.total as f64 / days as f64).min(1.0)
}
