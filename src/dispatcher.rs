//! Routes decoded change messages to their registered subscriptions.

use std::panic::{self, AssertUnwindSafe};

use crate::diff::apply_change;
use crate::event_handlers::{ConnectionError, EventHandlers};
use crate::models::ChangeMessage;
use crate::registry::ObserverRegistry;

/// Bridge between the broadcast transport and the observer registry.
///
/// For each inbound message: look up the target subscription, apply the
/// diff, store the new item list, then invoke the subscription's callback
/// with it.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ObserverRegistry,
    event_handlers: EventHandlers,
}

impl Dispatcher {
    /// Build a dispatcher over `registry`, reporting protocol errors
    /// through `event_handlers`.
    pub fn new(registry: ObserverRegistry, event_handlers: EventHandlers) -> Self {
        Self {
            registry,
            event_handlers,
        }
    }

    /// Route one change message to its subscription.
    ///
    /// Messages for unknown observers are dropped silently: disposal races
    /// with in-flight frames under normal operation, so this is expected,
    /// not an error. Protocol violations are logged and reported per
    /// message; they never affect other subscriptions.
    ///
    /// The callback runs after the registry lock is released, so a callback
    /// that subscribes, disposes or panics mid-dispatch observes a
    /// consistent registry. Callback panics are caught and logged.
    pub fn route(&self, message: &ChangeMessage) {
        let outcome = self
            .registry
            .update_with(&message.observer, |items| apply_change(message, items));

        match outcome {
            None => {
                log::debug!(
                    "No subscription for observer '{}'; dropping message",
                    message.observer
                );
            },
            Some(Err(e)) => {
                log::warn!(
                    "Failed to apply change for observer '{}': {}",
                    message.observer,
                    e
                );
                self.event_handlers
                    .emit_error(ConnectionError::new(e.to_string(), true));
            },
            Some(Ok((on_update, items))) => {
                if panic::catch_unwind(AssertUnwindSafe(|| on_update(&items))).is_err() {
                    log::warn!(
                        "Update callback for observer '{}' panicked",
                        message.observer
                    );
                }
            },
        }
    }
}
