use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ResolinkError, Result};

/// Body of a create-and-subscribe HTTP response.
///
/// Any REST endpoint invoked with subscribe semantics answers with this
/// shape: the server-issued observer id plus the initial item snapshot.
/// List endpoints may wrap it in an envelope whose `results` field holds
/// the same shape; [`ReactiveResponse::from_body`] accepts both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactiveResponse {
    /// Server-issued observer id, unique per active subscription.
    pub observer: String,

    /// Initial ordered item snapshot for the subscribed collection.
    #[serde(default)]
    pub items: Vec<JsonValue>,
}

impl ReactiveResponse {
    /// Decode either the bare response shape or an envelope carrying it
    /// under `results`.
    pub fn from_body(body: JsonValue) -> Result<Self> {
        let candidate = if body.get("observer").is_some() {
            body
        } else if let Some(results) = body.get("results") {
            results.clone()
        } else {
            return Err(ResolinkError::SerializationError(
                "Response carries neither an observer id nor a results envelope".to_string(),
            ));
        };

        serde_json::from_value(candidate).map_err(|e| {
            ResolinkError::SerializationError(format!(
                "Failed to decode create-and-subscribe response: {}",
                e
            ))
        })
    }
}

/// Explicit two-step contract handed to the subscription lifecycle.
///
/// Decouples the lifecycle from incidental HTTP response deserialization:
/// the lifecycle only ever sees an observer id and an initial snapshot.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    /// Server-issued observer id used as the registry key.
    pub observer_id: String,
    /// Initial ordered item snapshot.
    pub initial_items: Vec<JsonValue>,
}

impl From<ReactiveResponse> for CreateSubscriptionResult {
    fn from(response: ReactiveResponse) -> Self {
        Self {
            observer_id: response.observer,
            initial_items: response.items,
        }
    }
}
