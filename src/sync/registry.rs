use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::telemetry::OwnerId;

/// Default maximum live subscribers to prevent DoS
const DEFAULT_MAX_SUBSCRIBERS: usize = 10_000;

/// Identifies one live channel; unique even when an owner reconnects
pub type SubscriberId = Uuid;

/// Registration result
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationResult {
    /// Registered under the returned id
    Registered(SubscriberId),
    /// Registry full, registration rejected
    AtCapacity,
}

/// Sending half of a subscriber's channel.
///
/// Each message is one JSON array of persisted records.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub owner: OwnerId,
    pub sender: mpsc::Sender<Arc<str>>,
}

#[derive(Default)]
struct Subscriptions {
    by_owner: HashMap<OwnerId, HashMap<SubscriberId, SubscriberHandle>>,
    total: usize,
}

/// Owner id -> live subscriber channels.
///
/// `register` and `unregister` are the only mutation points. Lookups return a
/// snapshot, so callers never send while the lock is held.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<Subscriptions>>,
    max_subscribers: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SUBSCRIBERS)
    }

    /// Create registry with a custom subscriber limit
    pub fn with_capacity(max_subscribers: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Subscriptions::default())),
            max_subscribers,
        }
    }

    /// Add a channel for `owner`, creating the owner's set if absent
    pub fn register(&self, owner: OwnerId, sender: mpsc::Sender<Arc<str>>) -> RegistrationResult {
        let mut subs = self.inner.write();

        if subs.total >= self.max_subscribers {
            return RegistrationResult::AtCapacity;
        }

        let id = Uuid::new_v4();
        subs.by_owner.entry(owner).or_default().insert(
            id,
            SubscriberHandle {
                id,
                owner,
                sender,
            },
        );
        subs.total += 1;
        RegistrationResult::Registered(id)
    }

    /// Remove a channel; prunes the owner entry once its set is empty.
    /// Returns false if the channel was already gone.
    pub fn unregister(&self, owner: OwnerId, id: SubscriberId) -> bool {
        let mut subs = self.inner.write();

        let Some(set) = subs.by_owner.get_mut(&owner) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            subs.by_owner.remove(&owner);
        }
        if removed {
            subs.total -= 1;
        }
        removed
    }

    /// Snapshot of the live channels for `owner`
    pub fn lookup(&self, owner: OwnerId) -> Vec<SubscriberHandle> {
        self.inner
            .read()
            .by_owner
            .get(&owner)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watched(&self, owner: OwnerId) -> bool {
        self.inner.read().by_owner.contains_key(&owner)
    }

    /// Total live channels across all owners
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().total
    }

    /// Number of owners with at least one live channel
    pub fn owner_count(&self) -> usize {
        self.inner.read().by_owner.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
