use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::sync::registry::SubscriptionRegistry;
use crate::telemetry::{OwnerId, PersistedRecord};

/// What happened to one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Owner groups formed from the batch
    pub groups: usize,
    /// Group messages handed to live channels
    pub deliveries: usize,
    /// Groups dropped because nobody was watching the owner
    pub unwatched_groups: usize,
    /// Channels found closed and removed from the registry
    pub pruned: usize,
    /// Channels whose buffer was full; they miss this group
    pub lagging: usize,
}

/// Fans persisted batches out to the subscribers of each owner
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: SubscriptionRegistry,
}

impl BroadcastDispatcher {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Deliver `records` grouped by owner, one JSON array per group.
    ///
    /// Sends never wait: a closed channel is unregistered and a full one
    /// skips this group, neither affecting other channels.
    pub fn dispatch(&self, records: &[PersistedRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (owner, group) in group_by_owner(records) {
            report.groups += 1;

            let handles = self.registry.lookup(owner);
            if handles.is_empty() {
                report.unwatched_groups += 1;
                continue;
            }

            let payload: Arc<str> = match serde_json::to_string(&group) {
                Ok(json) => json.into(),
                Err(e) => {
                    warn!("Failed to serialize group for owner {}: {}", owner, e);
                    continue;
                }
            };

            for handle in handles {
                match handle.sender.try_send(payload.clone()) {
                    Ok(()) => report.deliveries += 1,
                    Err(TrySendError::Closed(_)) => {
                        if self.registry.unregister(owner, handle.id) {
                            report.pruned += 1;
                        }
                        debug!("Removed closed subscriber {} for owner {}", handle.id, owner);
                    }
                    Err(TrySendError::Full(_)) => {
                        report.lagging += 1;
                        warn!(
                            "Subscriber {} for owner {} is lagging, dropped {} records",
                            handle.id,
                            owner,
                            group.len()
                        );
                    }
                }
            }
        }

        report
    }
}

/// Group records by owner in first-seen order, keeping order within a group
pub fn group_by_owner(records: &[PersistedRecord]) -> Vec<(OwnerId, Vec<&PersistedRecord>)> {
    let mut index: HashMap<OwnerId, usize> = HashMap::new();
    let mut groups: Vec<(OwnerId, Vec<&PersistedRecord>)> = Vec::new();

    for record in records {
        let owner = record.owner();
        let slot = *index.entry(owner).or_insert_with(|| {
            groups.push((owner, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(record);
    }

    groups
}
