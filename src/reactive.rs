//! Subscription lifecycle: binds an HTTP create-and-subscribe request to
//! its WebSocket-delivered updates.
//!
//! A consumer issues a request through [`SubscriptionLifecycle::open_reactive`];
//! the decoded response carries the server-issued observer id and the
//! initial item snapshot, which are recorded in the [`ObserverRegistry`].
//! The returned [`ReactiveHandle`] owns disposal: idempotent local removal
//! plus a best-effort unsubscribe notification to the server.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture};
use serde_json::Value as JsonValue;

use crate::error::{ResolinkError, Result};
use crate::models::{CreateSubscriptionResult, ReactiveResponse};
use crate::registry::{ObserverRegistry, UpdateCallback};

/// Server-side unsubscribe notification.
///
/// A trait seam so disposal semantics can be exercised without a live
/// server; the production implementation is [`HttpUnsubscriber`].
pub trait ObserverUnsubscriber: Send + Sync {
    /// Notify the server that `observer_id` is no longer wanted by
    /// `subscriber_id`. Callers treat failures as best-effort: they log
    /// and swallow the error.
    fn unsubscribe<'a>(
        &'a self,
        observer_id: &'a str,
        subscriber_id: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Unsubscribes through `POST /queryobserver/unsubscribe`.
pub struct HttpUnsubscriber {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpUnsubscriber {
    /// Build an unsubscriber against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }
}

impl ObserverUnsubscriber for HttpUnsubscriber {
    fn unsubscribe<'a>(
        &'a self,
        observer_id: &'a str,
        subscriber_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = format!("{}/queryobserver/unsubscribe", self.base_url);
            let response = self
                .http_client
                .post(&url)
                .query(&[("observer", observer_id), ("subscriber", subscriber_id)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(ResolinkError::ServerError {
                    status_code: status.as_u16(),
                    message,
                });
            }
            Ok(())
        })
    }
}

/// Orchestrates subscription creation and disposal against one registry.
#[derive(Clone)]
pub struct SubscriptionLifecycle {
    registry: ObserverRegistry,
    unsubscriber: Arc<dyn ObserverUnsubscriber>,
    subscriber_id: String,
}

impl SubscriptionLifecycle {
    /// Build a lifecycle over `registry`. `subscriber_id` is the
    /// session-scoped id sent with every unsubscribe call.
    pub fn new(
        registry: ObserverRegistry,
        unsubscriber: Arc<dyn ObserverUnsubscriber>,
        subscriber_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            unsubscriber,
            subscriber_id: subscriber_id.into(),
        }
    }

    /// Issue a create-and-subscribe request and register the resulting
    /// subscription.
    ///
    /// `issue_request` performs the HTTP call and decodes the response; the
    /// lifecycle itself only sees the explicit observer-id/snapshot
    /// contract. `on_update` is invoked with the full current item list on
    /// every subsequent change.
    ///
    /// Callers starting a replacement subscription for the same logical
    /// query must dispose the old handle themselves; deduplication happens
    /// by observer id only.
    pub async fn open_reactive<F, Fut>(
        &self,
        issue_request: F,
        on_update: UpdateCallback,
    ) -> Result<ReactiveHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ReactiveResponse>>,
    {
        let response = issue_request().await?;
        let CreateSubscriptionResult {
            observer_id,
            initial_items,
        } = response.into();

        log::debug!(
            "Registering observer '{}' with {} initial item(s)",
            observer_id,
            initial_items.len()
        );
        self.registry
            .register(observer_id.clone(), initial_items.clone(), on_update);

        Ok(ReactiveHandle {
            observer_id,
            items: initial_items,
            registry: self.registry.clone(),
            unsubscriber: Arc::clone(&self.unsubscriber),
            subscriber_id: self.subscriber_id.clone(),
            disposed: AtomicBool::new(false),
        })
    }

    /// Dispose every active subscription, notifying the server
    /// concurrently.
    ///
    /// Individual failures are logged and do not abort the batch. Used at
    /// identity boundaries (login/logout) so stale subscriptions cannot
    /// leak across sessions.
    pub async fn clear_all(&self) {
        let observer_ids = self.registry.drain();
        if observer_ids.is_empty() {
            return;
        }
        log::info!("Clearing {} active subscription(s)", observer_ids.len());

        let calls = observer_ids.iter().map(|observer_id| {
            let unsubscriber = Arc::clone(&self.unsubscriber);
            let subscriber_id = self.subscriber_id.clone();
            async move {
                if let Err(e) = unsubscriber.unsubscribe(observer_id, &subscriber_id).await {
                    log::warn!("Unsubscribe for observer '{}' failed: {}", observer_id, e);
                }
            }
        });
        join_all(calls).await;
    }

    /// The session-scoped subscriber id.
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }
}

/// Handle to one live subscription: the initial snapshot plus disposal.
pub struct ReactiveHandle {
    observer_id: String,
    items: Vec<JsonValue>,
    registry: ObserverRegistry,
    unsubscriber: Arc<dyn ObserverUnsubscriber>,
    subscriber_id: String,
    disposed: AtomicBool,
}

impl ReactiveHandle {
    /// Server-issued observer id for this subscription.
    pub fn observer_id(&self) -> &str {
        &self.observer_id
    }

    /// Initial snapshot returned by the create-and-subscribe request.
    /// Later updates arrive through the registered callback.
    pub fn items(&self) -> &[JsonValue] {
        &self.items
    }

    /// Dispose the subscription. Idempotent and infallible from the
    /// caller's perspective.
    ///
    /// Removes the registry entry first, so in-flight change messages for
    /// this observer are dropped from that point on, then notifies the
    /// server best-effort: network failures and non-success responses are
    /// logged, never surfaced. A second call does nothing and sends
    /// nothing.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.remove(&self.observer_id);
        if let Err(e) = self
            .unsubscriber
            .unsubscribe(&self.observer_id, &self.subscriber_id)
            .await
        {
            log::warn!(
                "Unsubscribe for observer '{}' failed: {}",
                self.observer_id,
                e
            );
        }
    }

    /// Whether `dispose` has already run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.remove(&self.observer_id);

        // Fire-and-forget server notification when a runtime is available;
        // outside a runtime the local removal above is all we can do.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let unsubscriber = Arc::clone(&self.unsubscriber);
            let observer_id = std::mem::take(&mut self.observer_id);
            let subscriber_id = std::mem::take(&mut self.subscriber_id);
            handle.spawn(async move {
                if let Err(e) = unsubscriber.unsubscribe(&observer_id, &subscriber_id).await {
                    log::debug!(
                        "Unsubscribe for observer '{}' failed during drop: {}",
                        observer_id,
                        e
                    );
                }
            });
        }
    }
}
