//! Client-side join of the flat collections into per-advisor slices.
//!
//! The record store can't join, so every cycle re-partitions the committed
//! collections. Clients follow their owning advisor; reports and
//! registrations follow their advisor reference, falling back to the owner of
//! the referenced client; messages follow their advisor reference only.
//! Records that resolve to no known advisor are dropped.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Advisor, Client, Message, Registration, Report};

/// One advisor and the records attributed to it, in input order.
#[derive(Debug, Clone)]
pub struct AdvisorSlice<'a> {
    pub advisor: &'a Advisor,
    pub clients: Vec<&'a Client>,
    pub reports: Vec<&'a Report>,
    pub messages: Vec<&'a Message>,
    pub registrations: Vec<&'a Registration>,
}

impl<'a> AdvisorSlice<'a> {
    pub fn new(advisor: &'a Advisor) -> Self {
        Self {
            advisor,
            clients: Vec::new(),
            reports: Vec::new(),
            messages: Vec::new(),
            registrations: Vec::new(),
        }
    }
}

/// Borrowed view over one committed set of collections.
#[derive(Debug, Clone, Copy)]
pub struct Collections<'a> {
    pub advisors: &'a [Advisor],
    pub clients: &'a [Client],
    pub reports: &'a [Report],
    pub messages: &'a [Message],
    pub registrations: &'a [Registration],
}

pub fn partition_by_advisor<'a>(data: Collections<'a>) -> BTreeMap<&'a str, AdvisorSlice<'a>> {
    let mut slices: BTreeMap<&'a str, AdvisorSlice<'a>> = BTreeMap::new();
    for advisor in data.advisors {
        slices
            .entry(advisor.id.as_str())
            .or_insert_with(|| AdvisorSlice::new(advisor));
    }

    let mut owner_of: HashMap<&str, &str> = HashMap::with_capacity(data.clients.len());
    let mut orphans = 0usize;
    for client in data.clients {
        match client.advisor_id.as_deref() {
            Some(advisor_id) => match slices.get_mut(advisor_id) {
                Some(slice) => {
                    slice.clients.push(client);
                    owner_of.insert(client.id.as_str(), advisor_id);
                }
                None => orphans += 1,
            },
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        log::debug!("Partition: {} clients without a known advisor", orphans);
    }

    for report in data.reports {
        let target = report
            .advisor_id
            .as_deref()
            .filter(|id| slices.contains_key(id))
            .or_else(|| owner_of.get(report.client_id.as_str()).copied());
        if let Some(slice) = target.and_then(|id| slices.get_mut(id)) {
            slice.reports.push(report);
        }
    }

    for registration in data.registrations {
        let target = registration
            .advisor_id
            .as_deref()
            .filter(|id| slices.contains_key(id))
            .or_else(|| {
                registration
                    .client_id
                    .as_deref()
                    .and_then(|client_id| owner_of.get(client_id).copied())
            });
        if let Some(slice) = target.and_then(|id| slices.get_mut(id)) {
            slice.registrations.push(registration);
        }
    }

    for message in data.messages {
        if let Some(slice) = slices.get_mut(message.advisor_id.as_str()) {
            slice.messages.push(message);
        }
    }

    slices
}
