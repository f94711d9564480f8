//! Reload pipeline: paged collection fetches, retry, and the two-phase
//! cycle coordinator that owns the committed dashboard state.
//!
//! Modules:
//! - coordinator: cycle tokens, phase scheduling, guarded commits
//! - pagination: conservative and aggressive page strategies
//! - retry: bounded backoff around a whole collection fetch
//! - snapshot: committed state and source health

pub mod coordinator;
pub mod pagination;
pub mod retry;
pub mod snapshot;

pub use coordinator::{CommitOutcome, CycleId, CycleOutcome, SyncEngine};
pub use snapshot::{DashboardSnapshot, SnapshotPhase, SourceHealth};
