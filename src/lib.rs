//! Salesboard: keeps a sales-ops dashboard in sync with a paged REST record
//! store and derives per-advisor performance metrics from it.
//!
//! Modules:
//! - config: `~/.salesboard/config.json` loading and validation
//! - error: sync and config error taxonomy
//! - latency: per-source fetch latency rollups
//! - metrics: window resolution, per-advisor aggregation, team roll-up
//! - poller: refresh loop and snapshot file writer
//! - source: record store boundary (trait + HTTP client)
//! - sync: pagination, retry, and the two-phase reload coordinator
//! - types: wire records and closed status vocabularies

pub mod config;
pub mod error;
pub mod latency;
pub mod metrics;
pub mod poller;
pub mod source;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_support;
