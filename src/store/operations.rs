use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::value::{document_from_json, DocumentData, FieldValue, ValueKind};

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Options accepted by `set_document`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOptions {
    #[serde(default)]
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn overwrite() -> Self {
        Self { merge: false }
    }
}

/// Converts a write payload, rejecting non-object values and blank field names.
pub(crate) fn parse_payload(value: &JsonValue) -> StoreResult<DocumentData> {
    let data = document_from_json(value)?;
    for field in data.keys() {
        validate_field_path(field)?;
    }
    Ok(data)
}

pub(crate) fn validate_field_path(path: &str) -> StoreResult<()> {
    if path.trim().is_empty() {
        return Err(invalid_argument("Field names must not be empty"));
    }
    if path.split('.').any(|segment| segment.is_empty()) {
        return Err(invalid_argument(format!(
            "Field path '{path}' contains an empty segment"
        )));
    }
    Ok(())
}

/// Stamps both lifecycle timestamps with the server time.
pub(crate) fn stamp_created(data: &mut DocumentData) {
    data.insert(CREATED_AT_FIELD.to_string(), FieldValue::server_timestamp());
    data.insert(UPDATED_AT_FIELD.to_string(), FieldValue::server_timestamp());
}

pub(crate) fn stamp_updated(data: &mut DocumentData) {
    data.insert(UPDATED_AT_FIELD.to_string(), FieldValue::server_timestamp());
}

/// Writes `value` at a dotted field path, creating intermediate maps.
pub(crate) fn set_value_at_path(data: &mut DocumentData, path: &str, value: FieldValue) {
    match path.split_once('.') {
        None => {
            data.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let mut child = match data.get(head).map(FieldValue::kind) {
                Some(ValueKind::Map(map)) => map.clone(),
                _ => DocumentData::new(),
            };
            set_value_at_path(&mut child, rest, value);
            data.insert(head.to_string(), FieldValue::from_map(child));
        }
    }
}

/// Deep merge used by `set` with `merge`: nested maps merge, other values replace.
pub(crate) fn merge_into(target: &mut DocumentData, source: DocumentData) {
    for (field, value) in source {
        let merged = match (target.get(&field).map(FieldValue::kind), value.kind()) {
            (Some(ValueKind::Map(existing)), ValueKind::Map(incoming)) => {
                let mut nested = existing.clone();
                merge_into(&mut nested, incoming.clone());
                FieldValue::from_map(nested)
            }
            _ => value,
        };
        target.insert(field, merged);
    }
}

/// Leaf field paths written by a merge of `data`; used as the update mask.
pub(crate) fn field_mask(data: &DocumentData) -> Vec<String> {
    let mut paths = Vec::new();
    collect_leaf_paths(data, None, &mut paths);
    paths
}

fn collect_leaf_paths(data: &DocumentData, prefix: Option<&str>, paths: &mut Vec<String>) {
    for (field, value) in data {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.clone(),
        };
        match value.kind() {
            ValueKind::Map(child) if !child.is_empty() => {
                collect_leaf_paths(child, Some(&path), paths)
            }
            _ => paths.push(path),
        }
    }
}

/// Replaces every server timestamp placeholder with `now`.
pub(crate) fn resolve_server_timestamps(data: &mut DocumentData, now: chrono::DateTime<chrono::Utc>) {
    for value in data.values_mut() {
        resolve_value(value, now);
    }
}

fn resolve_value(value: &mut FieldValue, now: chrono::DateTime<chrono::Utc>) {
    match value.kind() {
        ValueKind::Sentinel(_) => *value = FieldValue::from_timestamp(now),
        ValueKind::Map(map) => {
            let mut map = map.clone();
            resolve_server_timestamps(&mut map, now);
            *value = FieldValue::from_map(map);
        }
        ValueKind::Array(items) => {
            let mut items = items.clone();
            for item in items.iter_mut() {
                resolve_value(item, now);
            }
            *value = FieldValue::from_array(items);
        }
        _ => {}
    }
}

/// Splits server timestamp placeholders out of `data`, returning the field
/// paths that carried one. The REST encoding sends them as field transforms.
pub(crate) fn extract_server_timestamps(data: &mut DocumentData) -> Vec<String> {
    let mut paths = Vec::new();
    extract_from(data, None, &mut paths);
    paths
}

fn extract_from(data: &mut DocumentData, prefix: Option<&str>, paths: &mut Vec<String>) {
    let fields: Vec<String> = data.keys().cloned().collect();
    for field in fields {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.clone(),
        };
        let Some(value) = data.get(&field) else {
            continue;
        };
        match value.kind() {
            ValueKind::Sentinel(_) => {
                data.remove(&field);
                paths.push(path);
            }
            ValueKind::Map(child) => {
                let mut child = child.clone();
                extract_from(&mut child, Some(&path), paths);
                data.insert(field, FieldValue::from_map(child));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_must_be_an_object() {
        let err = parse_payload(&json!(["a"])).unwrap_err();
        assert_eq!(err.message(), "Document data must be an object, got an array");
        assert!(parse_payload(&json!({"": 1})).is_err());
        assert!(parse_payload(&json!({"firstName": "Awa"})).is_ok());
    }

    #[test]
    fn dotted_paths_create_nested_maps() {
        let mut data = DocumentData::new();
        set_value_at_path(&mut data, "notifications.email", FieldValue::from_bool(false));
        set_value_at_path(&mut data, "notifications.sms", FieldValue::from_bool(true));
        let nested = data.get("notifications").unwrap();
        match nested.kind() {
            ValueKind::Map(map) => assert_eq!(map.len(), 2),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn merge_keeps_untouched_nested_fields() {
        let mut target = parse_payload(&json!({
            "city": "Dakar",
            "notifications": {"email": true, "sms": false}
        }))
        .unwrap();
        let source = parse_payload(&json!({"notifications": {"sms": true}})).unwrap();
        assert_eq!(field_mask(&source), vec!["notifications.sms".to_string()]);
        merge_into(&mut target, source);
        let json = crate::store::value::document_to_json(&target);
        assert_eq!(
            json,
            json!({"city": "Dakar", "notifications": {"email": true, "sms": true}})
        );
    }

    #[test]
    fn server_timestamps_split_and_resolve() {
        let mut data = parse_payload(&json!({"title": "Villa"})).unwrap();
        stamp_created(&mut data);
        let mut resolved = data.clone();
        let now = chrono::Utc::now();
        resolve_server_timestamps(&mut resolved, now);
        assert_eq!(resolved.get(CREATED_AT_FIELD).unwrap().as_timestamp(), Some(now));

        let paths = extract_server_timestamps(&mut data);
        assert_eq!(paths, vec![CREATED_AT_FIELD.to_string(), UPDATED_AT_FIELD.to_string()]);
        assert_eq!(data.len(), 1);
    }
}
