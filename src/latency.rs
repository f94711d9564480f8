//! In-memory latency rollups per collection fetch.
//!
//! Keeps a bounded sample window per source (retries included) so slow or
//! flaky collections show up in diagnostics without persistent storage.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

const MAX_SAMPLES_PER_SOURCE: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLatencyRollup {
    pub source: String,
    pub sample_count: usize,
    pub p50_ms: u128,
    pub p95_ms: u128,
    pub max_ms: u128,
    pub failures: u64,
    /// Failed fetches since the last successful one.
    pub consecutive_failures: u64,
    pub last_recorded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyRollups {
    pub generated_at: String,
    pub sources: Vec<SourceLatencyRollup>,
}

#[derive(Debug, Clone, Default)]
struct SourceWindow {
    /// Successful fetch durations, oldest first.
    samples_ms: VecDeque<u128>,
    failures: u64,
    consecutive_failures: u64,
    last_recorded_at: Option<DateTime<Utc>>,
}

impl SourceWindow {
    fn push_success(&mut self, elapsed_ms: u128) {
        if self.samples_ms.len() == MAX_SAMPLES_PER_SOURCE {
            self.samples_ms.pop_front();
        }
        self.samples_ms.push_back(elapsed_ms);
        self.consecutive_failures = 0;
    }

    fn push_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
    }

    fn rollup(&self, source: &str) -> SourceLatencyRollup {
        let mut sorted: Vec<u128> = self.samples_ms.iter().copied().collect();
        sorted.sort_unstable();
        SourceLatencyRollup {
            source: source.to_string(),
            sample_count: sorted.len(),
            p50_ms: nearest_rank(&sorted, 0.50),
            p95_ms: nearest_rank(&sorted, 0.95),
            max_ms: sorted.last().copied().unwrap_or(0),
            failures: self.failures,
            consecutive_failures: self.consecutive_failures,
            last_recorded_at: self.last_recorded_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Nearest-rank percentile of an ascending slice; 0 when empty.
fn nearest_rank(sorted: &[u128], fraction: f64) -> u128 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0;
    };
    let rank = (fraction * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(last)]
}

#[derive(Default)]
pub struct LatencyRecorder {
    windows: Mutex<HashMap<String, SourceWindow>>,
}

impl LatencyRecorder {
    /// Record one finished fetch of `source`. Failed fetches count toward
    /// `failures` but not toward the percentiles.
    pub fn record(&self, source: &str, elapsed_ms: u128, succeeded: bool) {
        let mut windows = self.windows.lock();
        let window = windows.entry(source.to_string()).or_default();
        window.last_recorded_at = Some(Utc::now());
        if succeeded {
            window.push_success(elapsed_ms);
        } else {
            window.push_failure();
        }
    }

    /// Per-source rollups, slowest p95 first.
    pub fn rollups(&self) -> LatencyRollups {
        let mut sources: Vec<SourceLatencyRollup> = self
            .windows
            .lock()
            .iter()
            .map(|(source, window)| window.rollup(source))
            .collect();
        sources.sort_by(|a, b| b.p95_ms.cmp(&a.p95_ms).then(a.source.cmp(&b.source)));

        LatencyRollups {
            generated_at: Utc::now().to_rfc3339(),
            sources,
        }
    }
}
