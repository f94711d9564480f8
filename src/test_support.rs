//! In-memory record store for tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::source::RecordSource;

/// Rows `{"ID": 0} .. {"ID": n-1}`.
pub fn numbered_rows(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({ "ID": i })).collect()
}

#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<HashMap<String, u32>>,
    overrides: Mutex<HashMap<(String, usize), Value>>,
    delays: Mutex<HashMap<String, Duration>>,
    gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<()>>>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table(&self, endpoint: &str, rows: Vec<Value>) {
        self.tables.lock().insert(endpoint.to_string(), rows);
    }

    /// Fail the next `n` page requests for `endpoint` with a network error.
    pub fn fail_next(&self, endpoint: &str, n: u32) {
        self.failures.lock().insert(endpoint.to_string(), n);
    }

    /// Serve `payload` instead of the page at `offset`.
    pub fn override_page(&self, endpoint: &str, offset: usize, payload: Value) {
        self.overrides
            .lock()
            .insert((endpoint.to_string(), offset), payload);
    }

    pub fn set_delay(&self, endpoint: &str, delay: Duration) {
        self.delays.lock().insert(endpoint.to_string(), delay);
    }

    /// Hold the next page request for `endpoint` until the returned sender
    /// fires. The page contents are captured before waiting.
    pub fn gate_next(&self, endpoint: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Offsets requested for `endpoint`, in call order.
    pub fn calls_for(&self, endpoint: &str) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, offset)| *offset)
            .collect()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_page(
        &self,
        endpoint: &str,
        _query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Value, SyncError> {
        self.calls.lock().push((endpoint.to_string(), offset));

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(endpoint) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SyncError::Network(format!("{} unavailable", endpoint)));
                }
            }
        }

        let payload = match self.overrides.lock().get(&(endpoint.to_string(), offset)) {
            Some(payload) => payload.clone(),
            None => {
                let tables = self.tables.lock();
                let rows = tables.get(endpoint).map(Vec::as_slice).unwrap_or(&[]);
                let page: Vec<Value> = rows.iter().skip(offset).take(limit).cloned().collect();
                Value::Array(page)
            }
        };

        let gate = self
            .gates
            .lock()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let delay = self.delays.lock().get(endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(payload)
    }
}
