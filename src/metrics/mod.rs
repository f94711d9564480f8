//! Per-advisor sales metrics.
//!
//! Pure computation over one committed set of collections. Nothing here
//! touches shared state or fails: empty inputs yield zero counts, zero-guarded
//! ratios and `None` timestamps.
//!
//! Modules:
//! - partition: client-side join into per-advisor slices
//! - team: roll-up across advisors
//! - window: period selector -> reporting window

pub mod partition;
pub mod team;
pub mod window;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{Direction, Product, ReportOutcome};
use partition::{partition_by_advisor, AdvisorSlice, Collections};
use window::{start_of_day, ReportingWindow};

/// Outbound messages sent sooner than this after client creation are
/// automated greetings, not manual contact.
pub const AUTOMATED_GREETING_SECS: i64 = 60;

/// A client still waiting for manual contact after this long raises the
/// "no first contact" alarm.
pub const FIRST_CONTACT_GRACE_SECS: i64 = 20 * 60;

/// Everything the dashboard shows for one advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub advisor_id: String,
    pub advisor_name: String,
    pub priority: i32,

    // Client base (unfiltered)
    pub total_clients: usize,
    pub vip_clients: usize,
    pub non_vip_clients: usize,
    /// Clients created inside the window.
    pub new_clients: usize,
    /// Client count per status tag.
    pub pipeline: BTreeMap<String, usize>,

    // Reporting (ever reported uses every report, not just the window)
    pub reports_in_window: usize,
    pub reported_clients: usize,
    pub unreported_clients: usize,
    pub unreported_vip: usize,
    pub unreported_non_vip: usize,

    // Sales (window)
    pub sales_principal: usize,
    pub sales_downsell: usize,
    pub total_sales: usize,
    pub close_rate: f64,
    pub vip_close_rate: f64,
    pub non_vip_close_rate: f64,

    // Activity
    pub last_report_at: Option<i64>,
    pub last_follow_up_at: Option<i64>,
    pub last_outbound_message_at: Option<i64>,
    pub last_client_created_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub messages_sent: usize,
    pub messages_received: usize,

    // Responsiveness
    pub avg_first_response_minutes: Option<f64>,
    /// Unrounded sum behind `avg_first_response_minutes`.
    pub first_response_secs_total: f64,
    pub first_response_samples: usize,
    pub clients_without_first_contact: usize,

    // Conversion
    pub avg_conversion_hours: Option<f64>,
    pub avg_conversion_days: Option<f64>,

    // Backlog
    pub pending_follow_ups: usize,
    pub overdue_follow_ups: usize,
    pub registrations: usize,
    pub clients_assigned_today: usize,
    pub daily_limit: Option<u32>,
    pub daily_limit_reached: bool,
}

/// Percentage `part / whole * 100`, 0 when `whole` is 0.
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn latest(values: impl Iterator<Item = i64>) -> Option<i64> {
    values.max()
}

/// Derive the metrics of one advisor for `window`, as of `now`.
pub fn aggregate(slice: &AdvisorSlice<'_>, window: &ReportingWindow, now: i64) -> MetricsRecord {
    let advisor = slice.advisor;
    let clients = &slice.clients;

    let client_by_id: HashMap<&str, _> = clients.iter().map(|c| (c.id.as_str(), *c)).collect();
    let is_vip = |client_id: &str| {
        client_by_id
            .get(client_id)
            .map(|c| c.status.is_vip())
            .unwrap_or(false)
    };

    // ── Client base ──────────────────────────────────────────────────
    let total_clients = clients.len();
    let vip_clients = clients.iter().filter(|c| c.status.is_vip()).count();
    let non_vip_clients = total_clients - vip_clients;
    let new_clients = clients
        .iter()
        .filter(|c| window.contains(c.created_at))
        .count();
    let mut pipeline = BTreeMap::new();
    for client in clients {
        *pipeline.entry(client.status.as_str().to_string()).or_insert(0) += 1;
    }

    // ── Reporting ────────────────────────────────────────────────────
    let windowed: Vec<_> = slice
        .reports
        .iter()
        .filter(|r| window.contains(r.reported_at))
        .copied()
        .collect();

    let has_complete_report: HashSet<&str> = slice
        .reports
        .iter()
        .filter(|r| r.outcome.is_definitive())
        .map(|r| r.client_id.as_str())
        .collect();
    let mut reported_clients = 0;
    let mut unreported_vip = 0;
    let mut unreported_non_vip = 0;
    for client in clients {
        if has_complete_report.contains(client.id.as_str()) {
            reported_clients += 1;
        } else if client.status.is_vip() {
            unreported_vip += 1;
        } else {
            unreported_non_vip += 1;
        }
    }

    // ── Sales: distinct clients per product set ──────────────────────
    let mut principal: HashSet<&str> = HashSet::new();
    let mut downsell: HashSet<&str> = HashSet::new();
    for report in windowed.iter().filter(|r| r.outcome == ReportOutcome::Paid) {
        match report.product {
            Product::Principal => {
                principal.insert(report.client_id.as_str());
            }
            Product::Downsell => {
                downsell.insert(report.client_id.as_str());
            }
            Product::Unknown => {}
        }
    }
    let total_sales = principal.len() + downsell.len();
    let vip_sales = principal.iter().chain(downsell.iter()).filter(|id| is_vip(**id)).count();
    let non_vip_sales = total_sales - vip_sales;

    // ── Activity ─────────────────────────────────────────────────────
    let last_report_at = latest(slice.reports.iter().map(|r| r.reported_at));
    let last_follow_up_at = latest(
        slice
            .reports
            .iter()
            .filter(|r| r.follow_up_done)
            .filter_map(|r| r.follow_up_at),
    );
    let last_outbound_message_at = latest(
        slice
            .messages
            .iter()
            .filter(|m| m.direction == Direction::Outbound)
            .map(|m| m.sent_at),
    );
    let last_client_created_at = latest(clients.iter().map(|c| c.created_at));
    let last_activity_at = [
        last_report_at,
        last_follow_up_at,
        last_outbound_message_at,
        last_client_created_at,
    ]
    .into_iter()
    .flatten()
    .max();

    let in_window = slice.messages.iter().filter(|m| window.contains(m.sent_at));
    let (mut messages_sent, mut messages_received) = (0, 0);
    for message in in_window {
        match message.direction {
            Direction::Outbound => messages_sent += 1,
            Direction::Inbound => messages_received += 1,
            Direction::Unknown => {}
        }
    }

    // ── First manual message ─────────────────────────────────────────
    let mut outbound_by_client: HashMap<&str, Vec<i64>> = HashMap::new();
    for message in slice
        .messages
        .iter()
        .filter(|m| m.direction == Direction::Outbound)
    {
        if let Some(client_id) = message.client_id.as_deref() {
            outbound_by_client
                .entry(client_id)
                .or_default()
                .push(message.sent_at);
        }
    }
    for sent in outbound_by_client.values_mut() {
        sent.sort_unstable();
    }

    // Gaps are taken in i128 so arbitrary epoch values can't overflow.
    let mut response_secs_total: i128 = 0;
    let mut first_response_samples = 0usize;
    let mut clients_without_first_contact = 0usize;
    for client in clients {
        let manual = outbound_by_client.get(client.id.as_str()).and_then(|sent| {
            sent.iter()
                .map(|ts| i128::from(*ts) - i128::from(client.created_at))
                .find(|gap| *gap >= i128::from(AUTOMATED_GREETING_SECS))
        });
        match manual {
            Some(gap) => {
                response_secs_total += gap;
                first_response_samples += 1;
            }
            None if now.saturating_sub(client.created_at) > FIRST_CONTACT_GRACE_SECS => {
                clients_without_first_contact += 1;
            }
            None => {}
        }
    }
    let avg_first_response_minutes = (first_response_samples > 0).then(|| {
        round2(response_secs_total as f64 / first_response_samples as f64 / 60.0)
    });

    // ── Conversion time ──────────────────────────────────────────────
    let mut first_paid: HashMap<&str, i64> = HashMap::new();
    for report in slice
        .reports
        .iter()
        .filter(|r| r.outcome == ReportOutcome::Paid)
    {
        first_paid
            .entry(report.client_id.as_str())
            .and_modify(|ts| *ts = (*ts).min(report.reported_at))
            .or_insert(report.reported_at);
    }
    let mut conversion_secs_total: i128 = 0;
    let mut conversions = 0usize;
    for client in clients.iter().filter(|c| c.status.is_sale()) {
        if let Some(paid_at) = first_paid.get(client.id.as_str()) {
            let gap = i128::from(*paid_at) - i128::from(client.created_at);
            if gap >= 0 {
                conversion_secs_total += gap;
                conversions += 1;
            }
        }
    }
    let avg_conversion_hours = (conversions > 0)
        .then(|| conversion_secs_total as f64 / conversions as f64 / 3_600.0);

    // ── Backlog ──────────────────────────────────────────────────────
    let pending: Vec<i64> = slice
        .reports
        .iter()
        .filter(|r| !r.follow_up_done)
        .filter_map(|r| r.follow_up_at)
        .collect();
    let overdue_follow_ups = pending.iter().filter(|due| **due < now).count();
    let registrations = slice
        .registrations
        .iter()
        .filter(|r| window.contains(r.registered_at))
        .count();
    let today = start_of_day(now);
    let clients_assigned_today = clients.iter().filter(|c| c.created_at >= today).count();
    let daily_limit_reached = advisor
        .daily_limit
        .map(|limit| clients_assigned_today >= limit as usize)
        .unwrap_or(false);

    MetricsRecord {
        advisor_id: advisor.id.clone(),
        advisor_name: advisor.name.clone(),
        priority: advisor.priority,
        total_clients,
        vip_clients,
        non_vip_clients,
        new_clients,
        pipeline,
        reports_in_window: windowed.len(),
        reported_clients,
        unreported_clients: unreported_vip + unreported_non_vip,
        unreported_vip,
        unreported_non_vip,
        sales_principal: principal.len(),
        sales_downsell: downsell.len(),
        total_sales,
        close_rate: percent(total_sales, total_clients),
        vip_close_rate: percent(vip_sales, vip_clients),
        non_vip_close_rate: percent(non_vip_sales, non_vip_clients),
        last_report_at,
        last_follow_up_at,
        last_outbound_message_at,
        last_client_created_at,
        last_activity_at,
        messages_sent,
        messages_received,
        avg_first_response_minutes,
        first_response_secs_total: response_secs_total as f64,
        first_response_samples,
        clients_without_first_contact,
        avg_conversion_hours: avg_conversion_hours.map(round2),
        avg_conversion_days: avg_conversion_hours.map(|h| round2(h / 24.0)),
        pending_follow_ups: pending.len(),
        overdue_follow_ups,
        registrations,
        clients_assigned_today,
        daily_limit: advisor.daily_limit,
        daily_limit_reached,
    }
}

/// Metrics for every advisor, keyed by advisor id.
pub fn compute_all(
    data: Collections<'_>,
    window: &ReportingWindow,
    now: i64,
) -> BTreeMap<String, MetricsRecord> {
    partition_by_advisor(data)
        .into_iter()
        .map(|(id, slice)| (id.to_string(), aggregate(&slice, window, now)))
        .collect()
}
