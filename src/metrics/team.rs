//! Team-wide roll-up of per-advisor metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{percent, round2, MetricsRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub advisors: usize,
    pub total_clients: usize,
    pub total_sales: usize,
    pub close_rate: f64,
    pub clients_without_first_contact: usize,
    pub overdue_follow_ups: usize,
    /// Mean first-response time over every advisor's samples.
    pub avg_first_response_minutes: Option<f64>,
    pub advisors_at_daily_limit: usize,
}

impl TeamSummary {
    pub fn from_records(records: &BTreeMap<String, MetricsRecord>) -> Self {
        let mut summary = TeamSummary {
            advisors: records.len(),
            ..Default::default()
        };
        let mut response_secs = 0.0;
        let mut samples = 0usize;

        for record in records.values() {
            summary.total_clients += record.total_clients;
            summary.total_sales += record.total_sales;
            summary.clients_without_first_contact += record.clients_without_first_contact;
            summary.overdue_follow_ups += record.overdue_follow_ups;
            if record.daily_limit_reached {
                summary.advisors_at_daily_limit += 1;
            }
            response_secs += record.first_response_secs_total;
            samples += record.first_response_samples;
        }

        summary.close_rate = percent(summary.total_sales, summary.total_clients);
        summary.avg_first_response_minutes =
            (samples > 0).then(|| round2(response_secs / samples as f64 / 60.0));
        summary
    }
}
