//! The committed dashboard state and what subscribers see of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::partition::Collections;
use crate::metrics::team::TeamSummary;
use crate::metrics::window::ReportingWindow;
use crate::metrics::{compute_all, MetricsRecord};
use crate::types::{Advisor, Client, Message, Registration, Report};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPhase {
    /// Nothing committed yet.
    #[default]
    Empty,
    /// Phase 1 committed; messages belong to an older cycle or are absent.
    Partial,
    /// Both phases of the same cycle committed.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SourceHealth {
    Ok { records: usize },
    Failed { error: String },
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Cycle of the most recent commit, 0 before the first one.
    pub cycle: u64,
    pub phase: SnapshotPhase,
    /// Cycle whose Phase 1 collections are held.
    pub collections_cycle: Option<u64>,
    /// Cycle whose messages are held.
    pub messages_cycle: Option<u64>,
    /// Cycle whose Phase 2 last wrote the `messages` health entry.
    #[serde(skip)]
    pub(crate) messages_health_cycle: Option<u64>,
    pub window: Option<ReportingWindow>,
    pub updated_at: Option<i64>,

    pub advisors: Vec<Advisor>,
    pub clients: Vec<Client>,
    pub reports: Vec<Report>,
    pub registrations: Vec<Registration>,
    pub messages: Vec<Message>,

    pub metrics: BTreeMap<String, MetricsRecord>,
    pub team: TeamSummary,
    pub source_health: BTreeMap<String, SourceHealth>,
}

impl DashboardSnapshot {
    pub fn collections(&self) -> Collections<'_> {
        Collections {
            advisors: &self.advisors,
            clients: &self.clients,
            reports: &self.reports,
            messages: &self.messages,
            registrations: &self.registrations,
        }
    }

    /// Rebuild metrics and the team roll-up from the held collections.
    pub(crate) fn recompute(&mut self, window: ReportingWindow, now: i64) {
        self.metrics = compute_all(self.collections(), &window, now);
        self.team = TeamSummary::from_records(&self.metrics);
        self.window = Some(window);
        self.updated_at = Some(now);
    }

    pub(crate) fn refresh_phase(&mut self) {
        self.phase = match (self.collections_cycle, self.messages_cycle) {
            (None, _) => SnapshotPhase::Empty,
            (Some(c), Some(m)) if c == m => SnapshotPhase::Complete,
            (Some(_), _) => SnapshotPhase::Partial,
        };
    }
}
