use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as JsonValue};

use crate::store::error::{internal_error, invalid_argument, StoreResult};
use crate::store::model::{Document, DocumentKey};
use crate::store::operations::{extract_server_timestamps, field_mask, set_value_at_path};
use crate::store::query::{FieldFilter, FilterOperator, QueryDefinition, DOCUMENT_ID_FIELD};
use crate::store::value::{DocumentData, FieldValue, GeoPoint, ValueKind};

use super::datastore::WriteOperation;

/// Encodes documents, writes and queries in the Firestore REST JSON mapping.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    project_id: String,
    database: String,
}

impl JsonProtoSerializer {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn database_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }

    pub fn document_name(&self, key: &DocumentKey) -> String {
        format!("{}/documents/{}", self.database_name(), key.path())
    }

    pub fn parse_document_name(&self, name: &str) -> StoreResult<DocumentKey> {
        let prefix = format!("{}/documents/", self.database_name());
        let relative = name.strip_prefix(&prefix).ok_or_else(|| {
            internal_error(format!("Unexpected document name '{name}' returned by Firestore"))
        })?;
        DocumentKey::from_path(relative)
    }

    pub fn encode_write(&self, write: &WriteOperation) -> JsonValue {
        match write {
            WriteOperation::Set { key, data, merge } => {
                let mut data = data.clone();
                let transforms = extract_server_timestamps(&mut data);
                let mask = merge.then(|| field_mask(&data));
                self.encode_update_write(key, &data, mask, &transforms, false)
            }
            WriteOperation::Update { key, data } => {
                let mut paths = data.clone();
                let transforms = extract_server_timestamps(&mut paths);
                let mask: Vec<String> = paths.keys().cloned().collect();
                let mut nested = DocumentData::new();
                for (path, value) in paths {
                    set_value_at_path(&mut nested, &path, value);
                }
                self.encode_update_write(key, &nested, Some(mask), &transforms, true)
            }
            WriteOperation::Delete { key } => json!({ "delete": self.document_name(key) }),
        }
    }

    fn encode_update_write(
        &self,
        key: &DocumentKey,
        data: &DocumentData,
        mask: Option<Vec<String>>,
        transforms: &[String],
        must_exist: bool,
    ) -> JsonValue {
        let mut write = Map::new();
        write.insert(
            "update".to_string(),
            json!({
                "name": self.document_name(key),
                "fields": encode_map_fields(data)
            }),
        );
        if let Some(mask) = mask {
            write.insert("updateMask".to_string(), json!({ "fieldPaths": mask }));
        }
        if !transforms.is_empty() {
            let transforms: Vec<JsonValue> = transforms
                .iter()
                .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
                .collect();
            write.insert("updateTransforms".to_string(), JsonValue::Array(transforms));
        }
        if must_exist {
            write.insert("currentDocument".to_string(), json!({ "exists": true }));
        }
        JsonValue::Object(write)
    }

    pub fn decode_document(&self, value: &JsonValue) -> StoreResult<Document> {
        let name = value
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| internal_error("Firestore document missing 'name' field"))?;
        let key = self.parse_document_name(name)?;
        let data = decode_map_value(value)?;
        let create_time = value
            .get("createTime")
            .and_then(JsonValue::as_str)
            .map(parse_timestamp)
            .transpose()?;
        let update_time = value
            .get("updateTime")
            .and_then(JsonValue::as_str)
            .map(parse_timestamp)
            .transpose()?;
        Ok(Document::new(key, data).with_times(create_time, update_time))
    }

    pub fn encode_value(&self, value: &FieldValue) -> JsonValue {
        encode_value(value)
    }

    pub fn encode_structured_query(&self, query: &QueryDefinition) -> JsonValue {
        let mut structured = Map::new();
        structured.insert(
            "from".to_string(),
            json!([{ "collectionId": query.collection(), "allDescendants": false }]),
        );

        match query.filters() {
            [] => {}
            [single] => {
                structured.insert("where".to_string(), self.encode_filter(query, single));
            }
            filters => {
                let nested: Vec<JsonValue> = filters
                    .iter()
                    .map(|filter| self.encode_filter(query, filter))
                    .collect();
                structured.insert(
                    "where".to_string(),
                    json!({ "compositeFilter": { "op": "AND", "filters": nested } }),
                );
            }
        }

        let orders = query.effective_order_by();
        let encoded_orders: Vec<JsonValue> = orders
            .iter()
            .map(|order| {
                json!({
                    "field": { "fieldPath": order.field() },
                    "direction": order.direction().as_rest(),
                })
            })
            .collect();
        structured.insert("orderBy".to_string(), JsonValue::Array(encoded_orders));

        if let Some(cursor) = query.start_after() {
            let reference = self.reference_value(cursor.key());
            let values: Vec<JsonValue> = orders
                .iter()
                .enumerate()
                .map(|(index, order)| {
                    if order.field() == DOCUMENT_ID_FIELD {
                        return reference.clone();
                    }
                    cursor
                        .values()
                        .get(index)
                        .map(encode_value)
                        .unwrap_or_else(|| json!({ "nullValue": JsonValue::Null }))
                })
                .collect();
            structured.insert(
                "startAt".to_string(),
                json!({ "values": values, "before": false }),
            );
        }

        if let Some(limit) = query.limit() {
            structured.insert("limit".to_string(), json!(limit));
        }

        JsonValue::Object(structured)
    }

    fn encode_filter(&self, query: &QueryDefinition, filter: &FieldFilter) -> JsonValue {
        let field = json!({ "fieldPath": filter.field() });
        if filter.value().is_null() {
            match filter.operator() {
                FilterOperator::Equal => {
                    return json!({ "unaryFilter": { "field": field, "op": "IS_NULL" } })
                }
                FilterOperator::NotEqual => {
                    return json!({ "unaryFilter": { "field": field, "op": "IS_NOT_NULL" } })
                }
                _ => {}
            }
        }
        let value = if filter.field() == DOCUMENT_ID_FIELD {
            self.encode_id_operand(query.collection(), filter.value())
        } else {
            encode_value(filter.value())
        };
        json!({
            "fieldFilter": {
                "field": field,
                "op": filter.operator().as_rest_op(),
                "value": value,
            }
        })
    }

    fn encode_id_operand(&self, collection: &str, value: &FieldValue) -> JsonValue {
        match value.kind() {
            ValueKind::String(id) => match DocumentKey::new(collection, id) {
                Ok(key) => self.reference_value(&key),
                Err(_) => encode_value(value),
            },
            ValueKind::Array(items) => {
                let values: Vec<JsonValue> = items
                    .iter()
                    .map(|item| self.encode_id_operand(collection, item))
                    .collect();
                json!({ "arrayValue": { "values": values } })
            }
            _ => encode_value(value),
        }
    }

    fn reference_value(&self, key: &DocumentKey) -> JsonValue {
        json!({ "referenceValue": self.document_name(key) })
    }
}

fn encode_map_fields(map: &DocumentData) -> JsonValue {
    let fields: Map<String, JsonValue> = map
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect();
    JsonValue::Object(fields)
}

fn encode_value(value: &FieldValue) -> JsonValue {
    match value.kind() {
        ValueKind::Null | ValueKind::Sentinel(_) => json!({ "nullValue": JsonValue::Null }),
        ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
        ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
        ValueKind::Double(double) => json!({ "doubleValue": double }),
        ValueKind::Timestamp(timestamp) => json!({
            "timestampValue": timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
        }),
        ValueKind::String(string) => json!({ "stringValue": string }),
        ValueKind::GeoPoint(point) => json!({
            "geoPointValue": {
                "latitude": point.latitude(),
                "longitude": point.longitude(),
            }
        }),
        ValueKind::Array(values) => {
            let values: Vec<JsonValue> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        ValueKind::Map(map) => json!({ "mapValue": { "fields": encode_map_fields(map) } }),
    }
}

fn decode_map_value(value: &JsonValue) -> StoreResult<DocumentData> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected object for map value"))?;
    let fields = match map.get("fields") {
        Some(fields) => fields
            .as_object()
            .ok_or_else(|| invalid_argument("Expected 'fields' to be an object"))?,
        None => return Ok(BTreeMap::new()),
    };
    fields
        .iter()
        .map(|(key, value)| -> StoreResult<(String, FieldValue)> {
            Ok((key.clone(), decode_value(value)?))
        })
        .collect()
}

fn decode_value(value: &JsonValue) -> StoreResult<FieldValue> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected Firestore value object"))?;
    if object.contains_key("nullValue") {
        return Ok(FieldValue::null());
    }
    if let Some(bool_value) = object.get("booleanValue") {
        let value = bool_value
            .as_bool()
            .ok_or_else(|| invalid_argument("booleanValue must be bool"))?;
        return Ok(FieldValue::from_bool(value));
    }
    if let Some(integer_value) = object.get("integerValue") {
        let parsed = match integer_value {
            JsonValue::String(value) => i64::from_str(value)
                .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
            JsonValue::Number(number) => number
                .as_i64()
                .ok_or_else(|| invalid_argument("Integer out of range"))?,
            _ => return Err(invalid_argument("integerValue must be a string or number")),
        };
        return Ok(FieldValue::from_integer(parsed));
    }
    if let Some(double_value) = object.get("doubleValue") {
        let parsed = match double_value {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| invalid_argument("Invalid doubleValue"))?,
            JsonValue::String(value) => match value.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other
                    .parse::<f64>()
                    .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}")))?,
            },
            _ => return Err(invalid_argument("doubleValue must be a number or string")),
        };
        return Ok(FieldValue::from_double(parsed));
    }
    if let Some(timestamp_value) = object.get("timestampValue") {
        let timestamp = timestamp_value
            .as_str()
            .ok_or_else(|| invalid_argument("timestampValue must be string"))?;
        return Ok(FieldValue::from_timestamp(parse_timestamp(timestamp)?));
    }
    for string_key in ["stringValue", "referenceValue", "bytesValue"] {
        if let Some(string_value) = object.get(string_key) {
            let value = string_value
                .as_str()
                .ok_or_else(|| invalid_argument(format!("{string_key} must be string")))?;
            return Ok(FieldValue::from_string(value));
        }
    }
    if let Some(geo_point) = object.get("geoPointValue") {
        let latitude = geo_point
            .get("latitude")
            .and_then(JsonValue::as_f64)
            .unwrap_or_default();
        let longitude = geo_point
            .get("longitude")
            .and_then(JsonValue::as_f64)
            .unwrap_or_default();
        return Ok(FieldValue::from_geo_point(GeoPoint::new(latitude, longitude)?));
    }
    if let Some(array_value) = object.get("arrayValue") {
        let decoded = match array_value.get("values").and_then(JsonValue::as_array) {
            Some(entries) => entries
                .iter()
                .map(decode_value)
                .collect::<StoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        return Ok(FieldValue::from_array(decoded));
    }
    if let Some(map_value) = object.get("mapValue") {
        return Ok(FieldValue::from_map(decode_map_value(map_value)?));
    }

    Err(invalid_argument("Unknown Firestore value type"))
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.with_timezone(&Utc))
        .map_err(|err| invalid_argument(format!("Invalid timestamp: {err}")))
}
