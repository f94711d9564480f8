//! Reload cycles.
//!
//! A cycle fetches the four fast collections (Phase 1) and the message
//! history (Phase 2) concurrently. Phase 1 commits and publishes as soon as
//! its four sources settle; Phase 2 commits whenever it lands. Each cycle
//! carries a token from a monotonically increasing generation counter, and
//! every commit re-checks it under the state write lock: a cycle that has
//! been superseded never writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use super::pagination::PageFetcher;
use super::retry::{with_retry, RetryPolicy};
use super::snapshot::{DashboardSnapshot, SourceHealth};
use crate::config::{Config, SourceConfig};
use crate::error::SyncError;
use crate::latency::{LatencyRecorder, LatencyRollups};
use crate::metrics::window::{PeriodSelection, ReportingWindow};
use crate::source::{decode_records, RecordSource};
use crate::types::{Advisor, Client, Message, Registration, Report};

/// Identifier of a started cycle. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleId(pub u64);

/// Proof of which generation a commit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleToken(u64);

impl CycleToken {
    pub(crate) fn id(&self) -> CycleId {
        CycleId(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A newer cycle started first; nothing was written.
    Discarded,
    /// The phase's fetch failed after retries; nothing was written.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub phase1: CommitOutcome,
    pub phase2: CommitOutcome,
}

struct PhaseOneResults {
    advisors: Result<Vec<Advisor>, SyncError>,
    clients: Result<Vec<Client>, SyncError>,
    reports: Result<Vec<Report>, SyncError>,
    registrations: Result<Vec<Registration>, SyncError>,
}

struct EngineInner {
    source: Arc<dyn RecordSource>,
    config: Config,
    generation: AtomicU64,
    selection: RwLock<PeriodSelection>,
    state: RwLock<DashboardSnapshot>,
    publisher: watch::Sender<Arc<DashboardSnapshot>>,
    latency: LatencyRecorder,
}

/// Owns the committed dashboard state and runs reload cycles against a
/// record source. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn RecordSource>, config: Config) -> Self {
        let (publisher, _) = watch::channel(Arc::new(DashboardSnapshot::default()));
        let selection = config.period;
        Self {
            inner: Arc::new(EngineInner {
                source,
                config,
                generation: AtomicU64::new(0),
                selection: RwLock::new(selection),
                state: RwLock::new(DashboardSnapshot::default()),
                publisher,
                latency: LatencyRecorder::default(),
            }),
        }
    }

    /// Start a new cycle for `selection` in the background. Any cycle still
    /// in flight is superseded.
    pub fn trigger(&self, selection: PeriodSelection) -> CycleId {
        self.set_period(selection);
        self.refresh()
    }

    /// Start a new cycle with the current period selection.
    pub fn refresh(&self) -> CycleId {
        let token = self.begin_cycle();
        let selection = self.period();
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_cycle(token, selection).await;
        });
        token.id()
    }

    /// Change the period used by subsequent cycles.
    pub fn set_period(&self, selection: PeriodSelection) {
        *self.inner.selection.write() = selection;
    }

    pub fn period(&self) -> PeriodSelection {
        *self.inner.selection.read()
    }

    /// Latest committed state.
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.inner.state.read().clone()
    }

    /// Receiver re-published after every commit.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardSnapshot>> {
        self.inner.publisher.subscribe()
    }

    pub fn latency(&self) -> LatencyRollups {
        self.inner.latency.rollups()
    }

    pub(crate) fn begin_cycle(&self) -> CycleToken {
        CycleToken(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn is_current(&self, token: CycleToken) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == token.0
    }

    pub(crate) async fn run_cycle(&self, token: CycleToken, selection: PeriodSelection) -> CycleOutcome {
        let window = selection.resolve(Utc::now().timestamp());
        log::info!(
            "Sync cycle {}: starting ({:?}, window {}..={})",
            token.0,
            selection,
            window.start,
            window.end
        );

        let (phase1, phase2) = tokio::join!(
            self.run_phase_one(token, window),
            self.run_phase_two(token, window)
        );
        log::info!(
            "Sync cycle {}: finished (phase 1 {:?}, phase 2 {:?})",
            token.0,
            phase1,
            phase2
        );
        CycleOutcome { phase1, phase2 }
    }

    async fn run_phase_one(&self, token: CycleToken, window: ReportingWindow) -> CommitOutcome {
        let sources = &self.inner.config.sources;
        let policy = &self.inner.config.phase1_retry;
        let (advisors, clients, reports, registrations) = tokio::join!(
            self.fetch_collection::<Advisor>("advisors", &sources.advisors, policy),
            self.fetch_collection::<Client>("clients", &sources.clients, policy),
            self.fetch_collection::<Report>("reports", &sources.reports, policy),
            self.fetch_collection::<Registration>("registrations", &sources.registrations, policy),
        );
        self.commit_phase_one(
            token,
            window,
            PhaseOneResults {
                advisors,
                clients,
                reports,
                registrations,
            },
        )
    }

    async fn run_phase_two(&self, token: CycleToken, window: ReportingWindow) -> CommitOutcome {
        let messages = self
            .fetch_collection::<Message>(
                "messages",
                &self.inner.config.sources.messages,
                &self.inner.config.phase2_retry,
            )
            .await;
        self.commit_phase_two(token, window, messages)
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        name: &str,
        source: &SourceConfig,
        policy: &RetryPolicy,
    ) -> Result<Vec<T>, SyncError> {
        let fetcher = PageFetcher::new(self.inner.source.as_ref(), &self.inner.config.pagination);
        let fetcher = &fetcher;
        let started = Instant::now();

        let result = with_retry(name, policy, move || {
            fetcher.fetch_all(&source.endpoint, &source.query, source.page_size, source.strategy)
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis();
        self.inner.latency.record(name, elapsed_ms, result.is_ok());
        let rows = result?;
        log::debug!("{}: fetched {} rows in {} ms", name, rows.len(), elapsed_ms);
        Ok(decode_records(&source.endpoint, rows).0)
    }

    fn commit_phase_one(
        &self,
        token: CycleToken,
        window: ReportingWindow,
        results: PhaseOneResults,
    ) -> CommitOutcome {
        let mut guard = self.inner.state.write();
        if !self.is_current(token) {
            log::debug!("Sync cycle {}: phase 1 superseded, discarding", token.0);
            return CommitOutcome::Discarded;
        }
        let state = &mut *guard;

        state.advisors = settle(&mut state.source_health, "advisors", results.advisors);
        state.clients = settle(&mut state.source_health, "clients", results.clients);
        state.reports = settle(&mut state.source_health, "reports", results.reports);
        state.registrations =
            settle(&mut state.source_health, "registrations", results.registrations);

        // Messages from an older cycle don't belong next to fresh collections.
        if state.messages_cycle != Some(token.0) {
            state.messages.clear();
            state.messages_cycle = None;
            // A failure this cycle's Phase 2 already reported stays visible.
            if state.messages_health_cycle != Some(token.0) {
                state
                    .source_health
                    .insert("messages".to_string(), SourceHealth::Pending);
            }
        }

        state.collections_cycle = Some(token.0);
        state.cycle = token.0;
        state.recompute(window, Utc::now().timestamp());
        state.refresh_phase();
        log::info!(
            "Sync cycle {}: phase 1 committed ({} advisors, {} clients, {} reports, {} registrations)",
            token.0,
            state.advisors.len(),
            state.clients.len(),
            state.reports.len(),
            state.registrations.len()
        );
        self.inner.publisher.send_replace(Arc::new(state.clone()));
        CommitOutcome::Committed
    }

    fn commit_phase_two(
        &self,
        token: CycleToken,
        window: ReportingWindow,
        messages: Result<Vec<Message>, SyncError>,
    ) -> CommitOutcome {
        let mut guard = self.inner.state.write();
        if !self.is_current(token) {
            log::debug!("Sync cycle {}: phase 2 superseded, discarding", token.0);
            return CommitOutcome::Discarded;
        }
        let state = &mut *guard;
        state.messages_health_cycle = Some(token.0);

        let messages = match messages {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("Sync cycle {}: messages unavailable: {}", token.0, e);
                let error = e.to_string();
                state.source_health.insert(
                    "messages".to_string(),
                    SourceHealth::Failed {
                        error: error.clone(),
                    },
                );
                self.inner.publisher.send_replace(Arc::new(state.clone()));
                return CommitOutcome::Failed { error };
            }
        };

        state.source_health.insert(
            "messages".to_string(),
            SourceHealth::Ok {
                records: messages.len(),
            },
        );
        state.messages = messages;
        state.messages_cycle = Some(token.0);
        state.cycle = token.0;
        state.recompute(window, Utc::now().timestamp());
        state.refresh_phase();
        log::info!(
            "Sync cycle {}: phase 2 committed ({} messages)",
            token.0,
            state.messages.len()
        );
        self.inner.publisher.send_replace(Arc::new(state.clone()));
        CommitOutcome::Committed
    }
}

/// A failed source becomes an empty collection; its siblings still commit.
fn settle<T>(
    health: &mut BTreeMap<String, SourceHealth>,
    name: &str,
    result: Result<Vec<T>, SyncError>,
) -> Vec<T> {
    match result {
        Ok(records) => {
            health.insert(
                name.to_string(),
                SourceHealth::Ok {
                    records: records.len(),
                },
            );
            records
        }
        Err(e) => {
            log::warn!("{}: fetch failed, committing empty collection: {}", name, e);
            health.insert(name.to_string(), SourceHealth::Failed { error: e.to_string() });
            Vec::new()
        }
    }
}
