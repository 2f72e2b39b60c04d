use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::change_kind::ChangeKind;
use crate::error::Result;

/// Incremental change pushed by the server over the broadcast channel.
///
/// One message describes one mutation of the collection cached for a single
/// observer. The operation kind travels as a raw string so an unrecognised
/// value can be surfaced as a protocol violation instead of a generic decode
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Server-issued id of the target observer.
    pub observer: String,

    /// Raw operation kind: `"added"`, `"changed"` or `"removed"`.
    pub msg: String,

    /// The affected record. For removals it carries at least the
    /// primary-key field.
    pub item: JsonValue,

    /// Target insertion index, meaningful for `added` and `changed`.
    #[serde(default)]
    pub order: usize,

    /// Name of the field on `item` that uniquely identifies a record
    /// within the cached list. Supplied per message, not per subscription.
    pub primary_key: String,
}

impl ChangeMessage {
    /// Parse the raw operation into a typed [`ChangeKind`].
    ///
    /// Unknown values fail with [`ResolinkError::ProtocolError`]
    /// (client/server version skew must not be masked).
    ///
    /// [`ResolinkError::ProtocolError`]: crate::error::ResolinkError::ProtocolError
    pub fn kind(&self) -> Result<ChangeKind> {
        self.msg.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_shape() {
        let raw = r#"{
            "observer": "obs-1",
            "msg": "added",
            "item": {"id": 2, "name": "y"},
            "order": 1,
            "primary_key": "id"
        }"#;
        let message: ChangeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.observer, "obs-1");
        assert_eq!(message.kind().unwrap(), ChangeKind::Added);
        assert_eq!(message.order, 1);
        assert_eq!(message.primary_key, "id");
        assert_eq!(message.item, json!({"id": 2, "name": "y"}));
    }

    #[test]
    fn order_defaults_to_zero_when_absent() {
        let raw = r#"{
            "observer": "obs-1",
            "msg": "removed",
            "item": {"id": 2},
            "primary_key": "id"
        }"#;
        let message: ChangeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.order, 0);
    }

    #[test]
    fn unknown_operation_is_a_protocol_error() {
        let message = ChangeMessage {
            observer: "obs-1".to_string(),
            msg: "unknown".to_string(),
            item: json!({}),
            order: 0,
            primary_key: "id".to_string(),
        };
        assert!(message.kind().is_err());
    }
}
