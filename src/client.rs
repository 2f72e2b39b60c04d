//! Client façade: HTTP requests, the shared registry and the broadcast
//! channel behind one handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::error::{ResolinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::{ConnectionOptions, ReactiveResponse};
use crate::reactive::{HttpUnsubscriber, ReactiveHandle, SubscriptionLifecycle};
use crate::registry::{ObserverRegistry, UpdateCallback};
use crate::transport::BroadcastClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a reactive query server.
///
/// One client owns one session: a session-scoped subscriber id, one
/// observer registry and at most one broadcast WebSocket connection.
/// Subscriptions are opened over HTTP and kept live by change messages
/// arriving on the broadcast channel.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use resolink::ResolinkClient;
///
/// # async fn example() -> resolink::Result<()> {
/// let client = ResolinkClient::builder()
///     .base_url("http://localhost:8000")
///     .build()?;
///
/// client.start_broadcast()?;
/// let handle = client
///     .open_reactive(
///         "/tasks/open",
///         Arc::new(|items| println!("now {} task(s)", items.len())),
///     )
///     .await?;
///
/// // ... later
/// handle.dispose().await;
/// client.shutdown_broadcast().await;
/// # Ok(())
/// # }
/// ```
pub struct ResolinkClient {
    base_url: String,
    http_client: reqwest::Client,
    session_id: String,
    registry: ObserverRegistry,
    lifecycle: SubscriptionLifecycle,
    event_handlers: EventHandlers,
    connection_options: ConnectionOptions,
    broadcast: Mutex<Option<BroadcastClient>>,
}

impl ResolinkClient {
    /// Start building a client.
    pub fn builder() -> ResolinkClientBuilder {
        ResolinkClientBuilder::default()
    }

    fn broadcast_slot(&self) -> MutexGuard<'_, Option<BroadcastClient>> {
        // The guard is never held across an await, so poisoning could only
        // come from a panic inside BroadcastClient construction.
        self.broadcast.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the broadcast channel for this session.
    ///
    /// Idempotent: a second call while the channel is running is a no-op.
    /// The connection is maintained in the background with the configured
    /// reconnect policy; connection events surface through the registered
    /// [`EventHandlers`].
    pub fn start_broadcast(&self) -> Result<()> {
        let mut slot = self.broadcast_slot();
        if slot.is_some() {
            log::debug!("Broadcast channel already running");
            return Ok(());
        }
        let dispatcher = Dispatcher::new(self.registry.clone(), self.event_handlers.clone());
        let client = BroadcastClient::start(
            &self.base_url,
            &self.session_id,
            dispatcher,
            self.connection_options.clone(),
            self.event_handlers.clone(),
        )?;
        *slot = Some(client);
        Ok(())
    }

    /// Tear the broadcast channel down, cancelling any scheduled reconnect.
    /// Safe to call when no channel is running.
    pub async fn shutdown_broadcast(&self) {
        let client = self.broadcast_slot().take();
        if let Some(client) = client {
            client.shutdown().await;
        }
    }

    /// Whether the broadcast channel is currently open.
    pub fn is_broadcast_connected(&self) -> bool {
        self.broadcast_slot()
            .as_ref()
            .is_some_and(BroadcastClient::is_connected)
    }

    /// Issue a create-and-subscribe `GET` request against `path` and
    /// register the resulting subscription.
    ///
    /// The response must carry the server-issued observer id and the
    /// initial item snapshot. `on_update` receives the full current item
    /// list on every subsequent change. The returned handle owns disposal.
    pub async fn open_reactive(
        &self,
        path: &str,
        on_update: UpdateCallback,
    ) -> Result<ReactiveHandle> {
        let url = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };

        let http_client = self.http_client.clone();
        let session_id = self.session_id.clone();
        self.lifecycle
            .open_reactive(
                move || async move {
                    log::debug!("Opening reactive query at {}", url);
                    let response = http_client
                        .get(&url)
                        .query(&[("subscriber", session_id.as_str())])
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

                    let body = response.json().await?;
                    ReactiveResponse::from_body(body)
                },
                on_update,
            )
            .await
    }

    /// Register a subscription from a caller-issued request.
    ///
    /// For endpoints [`open_reactive`](Self::open_reactive) cannot express,
    /// e.g. `POST` bodies. The future must resolve to the decoded
    /// create-and-subscribe response.
    pub async fn open_reactive_with<F, Fut>(
        &self,
        issue_request: F,
        on_update: UpdateCallback,
    ) -> Result<ReactiveHandle>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<ReactiveResponse>>,
    {
        self.lifecycle.open_reactive(issue_request, on_update).await
    }

    /// Dispose every active subscription, notifying the server for each.
    /// Called at identity boundaries (login/logout).
    pub async fn clear_subscriptions(&self) {
        self.lifecycle.clear_all().await;
    }

    /// The session id, generated at build time. Doubles as the subscriber
    /// id on unsubscribe calls and as the broadcast channel path component.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The observer registry backing this client.
    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    /// The subscription lifecycle backing this client.
    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Builder for [`ResolinkClient`].
#[derive(Default)]
pub struct ResolinkClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connection_options: Option<ConnectionOptions>,
    event_handlers: Option<EventHandlers>,
}

impl ResolinkClientBuilder {
    /// Server base URL, e.g. `http://localhost:8000`. Required.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Timeout applied to every HTTP request. Default: 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reconnect and keepalive settings for the broadcast channel.
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = Some(options);
        self
    }

    /// Lifecycle callbacks for the broadcast channel.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = Some(handlers);
        self
    }

    /// Build the client. Fails when `base_url` is missing or empty, or the
    /// HTTP client cannot be constructed.
    pub fn build(self) -> Result<ResolinkClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| {
                ResolinkError::ConfigurationError("base_url is required".to_string())
            })?
            .trim()
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(ResolinkError::ConfigurationError(
                "base_url must not be empty".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .pool_max_idle_per_host(4)
            .build()?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let registry = ObserverRegistry::new();
        let unsubscriber = Arc::new(HttpUnsubscriber::new(
            base_url.clone(),
            http_client.clone(),
        ));
        let lifecycle =
            SubscriptionLifecycle::new(registry.clone(), unsubscriber, session_id.clone());

        Ok(ResolinkClient {
            base_url,
            http_client,
            session_id,
            registry,
            lifecycle,
            event_handlers: self.event_handlers.unwrap_or_default(),
            connection_options: self.connection_options.unwrap_or_default(),
            broadcast: Mutex::new(None),
        })
    }
}
