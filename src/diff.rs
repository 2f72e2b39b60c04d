//! Pure application of one change message to a cached item list.

use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::{ChangeKind, ChangeMessage};

/// Compute the new ordered item list after applying `message`.
///
/// Fully deterministic: the output depends only on the message and the
/// starting list.
///
/// - `added`: insert the item at the message's target index, appending when
///   the index is past the end.
/// - `removed`: drop the element whose primary-key field matches the
///   message item's. No match is a no-op; the server may redundantly
///   notify removal of an already-absent item, e.g. after a reconnect
///   replay.
/// - `changed`: remove-then-insert. The element may move, since ordering
///   is server-authoritative. When no existing element matches, the insert
///   still proceeds at the target index.
///
/// An unrecognised operation fails with a protocol error rather than being
/// silently ignored.
pub fn apply_change(message: &ChangeMessage, items: &[JsonValue]) -> Result<Vec<JsonValue>> {
    let kind = message.kind()?;
    let mut next = items.to_vec();
    match kind {
        ChangeKind::Added => {
            insert_at(&mut next, message.item.clone(), message.order);
        },
        ChangeKind::Removed => {
            remove_matching(&mut next, &message.item, &message.primary_key);
        },
        ChangeKind::Changed => {
            remove_matching(&mut next, &message.item, &message.primary_key);
            insert_at(&mut next, message.item.clone(), message.order);
        },
    }
    Ok(next)
}

/// Insert at `index`, clamped to an append when past the end.
fn insert_at(items: &mut Vec<JsonValue>, item: JsonValue, index: usize) {
    let index = index.min(items.len());
    items.insert(index, item);
}

/// Remove the element whose `key_field` value equals the same field on
/// `needle`. The comparison is an explicit field lookup plus value
/// equality; an absent key on `needle` matches nothing.
fn remove_matching(items: &mut Vec<JsonValue>, needle: &JsonValue, key_field: &str) -> bool {
    let Some(key) = needle.get(key_field) else {
        log::warn!(
            "Change item lacks primary-key field '{}'; treating as no-op",
            key_field
        );
        return false;
    };
    match items.iter().position(|item| item.get(key_field) == Some(key)) {
        Some(position) => {
            items.remove(position);
            true
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolinkError;
    use serde_json::json;

    fn message(msg: &str, item: JsonValue, order: usize) -> ChangeMessage {
        ChangeMessage {
            observer: "obs-1".to_string(),
            msg: msg.to_string(),
            item,
            order,
            primary_key: "id".to_string(),
        }
    }

    #[test]
    fn added_messages_with_increasing_order_preserve_arrival_order() {
        let mut items: Vec<JsonValue> = Vec::new();
        let payloads = [json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];
        for (order, payload) in payloads.iter().enumerate() {
            items = apply_change(&message("added", payload.clone(), order), &items).unwrap();
        }
        assert_eq!(items, payloads.to_vec());
    }

    #[test]
    fn added_inserts_at_target_index() {
        let items = vec![json!({"id": 1}), json!({"id": 3})];
        let next = apply_change(&message("added", json!({"id": 2}), 1), &items).unwrap();
        assert_eq!(next, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    }

    #[test]
    fn added_past_the_end_appends() {
        let items = vec![json!({"id": 1})];
        let next = apply_change(&message("added", json!({"id": 2}), 99), &items).unwrap();
        assert_eq!(next, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn removed_drops_the_matching_element() {
        let items = vec![json!({"id": 1}), json!({"id": 2})];
        let next = apply_change(&message("removed", json!({"id": 1}), 0), &items).unwrap();
        assert_eq!(next, vec![json!({"id": 2})]);
    }

    #[test]
    fn removed_without_match_is_a_noop() {
        let items = vec![json!({"id": 1}), json!({"id": 2})];
        let next = apply_change(&message("removed", json!({"id": 42}), 0), &items).unwrap();
        assert_eq!(next, items);
    }

    #[test]
    fn removed_with_missing_key_field_is_a_noop() {
        let items = vec![json!({"id": 1})];
        let next = apply_change(&message("removed", json!({"name": "x"}), 0), &items).unwrap();
        assert_eq!(next, items);
    }

    #[test]
    fn changed_moves_the_element_to_the_target_index() {
        let items = vec![json!({"id": 1, "pos": "a"}), json!({"id": 2, "pos": "b"})];
        let updated = json!({"id": 2, "pos": "b2"});
        let next = apply_change(&message("changed", updated.clone(), 0), &items).unwrap();
        assert_eq!(next, vec![updated, json!({"id": 1, "pos": "a"})]);
    }

    #[test]
    fn changed_without_match_still_inserts_at_order() {
        let items = vec![json!({"id": 1})];
        let next = apply_change(&message("changed", json!({"id": 9}), 1), &items).unwrap();
        assert_eq!(next, vec![json!({"id": 1}), json!({"id": 9})]);
    }

    #[test]
    fn unknown_operation_fails_loudly() {
        let items = vec![json!({"id": 1})];
        let err = apply_change(&message("unknown", json!({"id": 2}), 0), &items).unwrap_err();
        assert!(matches!(err, ResolinkError::ProtocolError(_)));
    }

    #[test]
    fn application_is_deterministic() {
        let items = vec![json!({"id": 1}), json!({"id": 2})];
        let msg = message("changed", json!({"id": 2, "v": 7}), 0);
        let first = apply_change(&msg, &items).unwrap();
        let second = apply_change(&msg, &items).unwrap();
        assert_eq!(first, second);
    }
}
