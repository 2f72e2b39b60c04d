//! Store of active subscriptions, keyed by server-issued observer id.
//!
//! The registry is an explicit, constructor-injected object rather than a
//! process-wide singleton, so independent instances can coexist (one per
//! client, any number in tests). Clones share the same underlying table.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;

/// Callback invoked with the full current item list whenever it changes.
pub type UpdateCallback = Arc<dyn Fn(&[JsonValue]) + Send + Sync>;

/// A live, server-tracked view over a collection, cached client-side.
struct Subscription {
    /// Ordered item cache; order is server-assigned, not arrival order.
    items: Vec<JsonValue>,
    /// Exactly one callback per subscription.
    on_update: UpdateCallback,
}

/// Table of active subscriptions.
///
/// Writers are the subscription lifecycle (insert/remove) and the
/// dispatcher (item-list mutation). Consumer callbacks are never invoked
/// while the internal lock is held, so a callback that subscribes, disposes
/// or panics mid-dispatch still observes a consistent registry.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<HashMap<String, Subscription>>>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        // Callbacks run outside this lock, so poisoning could only come
        // from a panic inside the registry itself; recover the map.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a subscription, silently overwriting any entry with the same
    /// observer id. Uniqueness is guaranteed upstream: the id is
    /// server-generated per create-and-subscribe request.
    pub fn register(
        &self,
        observer_id: impl Into<String>,
        items: Vec<JsonValue>,
        on_update: UpdateCallback,
    ) {
        let observer_id = observer_id.into();
        let mut map = self.lock();
        if map
            .insert(observer_id.clone(), Subscription { items, on_update })
            .is_some()
        {
            log::warn!("Observer '{}' re-registered; previous entry replaced", observer_id);
        }
    }

    /// Remove a subscription. Idempotent: removing an absent id is a no-op.
    /// Returns whether an entry was actually removed.
    pub fn remove(&self, observer_id: &str) -> bool {
        self.lock().remove(observer_id).is_some()
    }

    /// Whether a subscription exists for `observer_id`.
    pub fn contains(&self, observer_id: &str) -> bool {
        self.lock().contains_key(observer_id)
    }

    /// Snapshot of the cached items for `observer_id`.
    pub fn items(&self, observer_id: &str) -> Option<Vec<JsonValue>> {
        self.lock().get(observer_id).map(|sub| sub.items.clone())
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every subscription and return the observer ids that were
    /// active. Used at identity boundaries (login/logout) so stale
    /// subscriptions cannot leak across sessions.
    pub fn drain(&self) -> Vec<String> {
        self.lock().drain().map(|(id, _)| id).collect()
    }

    /// Apply `f` to the cached items of `observer_id` under the lock.
    ///
    /// On success the new list is stored back and the subscription's
    /// callback plus a snapshot of the list are returned, for invocation
    /// after the lock is released. `None` means no such observer.
    pub(crate) fn update_with<F>(
        &self,
        observer_id: &str,
        f: F,
    ) -> Option<Result<(UpdateCallback, Vec<JsonValue>)>>
    where
        F: FnOnce(&[JsonValue]) -> Result<Vec<JsonValue>>,
    {
        let mut map = self.lock();
        let subscription = map.get_mut(observer_id)?;
        match f(&subscription.items) {
            Ok(new_items) => {
                subscription.items = new_items.clone();
                Some(Ok((Arc::clone(&subscription.on_update), new_items)))
            },
            Err(e) => Some(Err(e)),
        }
    }
}
