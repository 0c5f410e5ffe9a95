use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as JsonValue};

use crate::store::error::{invalid_argument, StoreResult};

/// Field map of a stored document.
pub type DocumentData = BTreeMap<String, FieldValue>;

/// A single typed field of a document.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue {
    kind: ValueKind,
}

/// Write-time placeholders resolved by the backend when the write commits.
#[derive(Clone, Debug, PartialEq)]
pub enum SentinelValue {
    ServerTimestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    GeoPoint(GeoPoint),
    Array(Vec<FieldValue>),
    Map(DocumentData),
    Sentinel(SentinelValue),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> StoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid_argument(format!(
                "Latitude must be within [-90, 90], got {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid_argument(format!(
                "Longitude must be within [-180, 180], got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl FieldValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: DateTime<Utc>) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_geo_point(value: GeoPoint) -> Self {
        Self {
            kind: ValueKind::GeoPoint(value),
        }
    }

    pub fn from_array(values: Vec<FieldValue>) -> Self {
        Self {
            kind: ValueKind::Array(values),
        }
    }

    pub fn from_map(map: DocumentData) -> Self {
        Self {
            kind: ValueKind::Map(map),
        }
    }

    /// Placeholder the backend replaces with its commit time.
    pub fn server_timestamp() -> Self {
        Self {
            kind: ValueKind::Sentinel(SentinelValue::ServerTimestamp),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.kind {
            ValueKind::Integer(value) => Some(*value as f64),
            ValueKind::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            ValueKind::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match &self.kind {
            ValueKind::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Converts an arbitrary JSON value. Integers that fit `i64` stay integers.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::null(),
            JsonValue::Bool(value) => Self::from_bool(*value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(integer) => Self::from_integer(integer),
                None => Self::from_double(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(value) => Self::from_string(value.clone()),
            JsonValue::Array(values) => {
                Self::from_array(values.iter().map(Self::from_json).collect())
            }
            JsonValue::Object(map) => Self::from_map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Renders the value as plain JSON. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> JsonValue {
        match &self.kind {
            ValueKind::Null | ValueKind::Sentinel(_) => JsonValue::Null,
            ValueKind::Boolean(value) => JsonValue::Bool(*value),
            ValueKind::Integer(value) => JsonValue::Number((*value).into()),
            ValueKind::Double(value) => Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ValueKind::Timestamp(value) => {
                JsonValue::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            ValueKind::String(value) => JsonValue::String(value.clone()),
            ValueKind::GeoPoint(point) => {
                let mut map = Map::new();
                map.insert("latitude".into(), FieldValue::from_double(point.latitude).to_json());
                map.insert(
                    "longitude".into(),
                    FieldValue::from_double(point.longitude).to_json(),
                );
                JsonValue::Object(map)
            }
            ValueKind::Array(values) => {
                JsonValue::Array(values.iter().map(FieldValue::to_json).collect())
            }
            ValueKind::Map(map) => JsonValue::Object(data_to_json_map(map)),
        }
    }

    /// Ordering used for query filters: `None` when the two values belong to
    /// different type classes and therefore never compare.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        if self.type_order() != other.type_order() {
            return None;
        }
        Some(self.total_cmp(other))
    }

    /// Total ordering used for sorting: type class first, then value.
    pub fn total_cmp(&self, other: &FieldValue) -> Ordering {
        let by_type = self.type_order().cmp(&other.type_order());
        if by_type != Ordering::Equal {
            return by_type;
        }
        match (&self.kind, &other.kind) {
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a.cmp(b),
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a.cmp(b),
            (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => a.cmp(b),
            (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
            (ValueKind::GeoPoint(a), ValueKind::GeoPoint(b)) => a
                .latitude
                .total_cmp(&b.latitude)
                .then(a.longitude.total_cmp(&b.longitude)),
            (ValueKind::Array(a), ValueKind::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ordering = left.total_cmp(right);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (ValueKind::Map(a), ValueKind::Map(b)) => {
                for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
                    let ordering = left_key.cmp(right_key).then_with(|| left.total_cmp(right));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
        }
    }

    fn type_order(&self) -> u8 {
        match self.kind {
            ValueKind::Null => 0,
            ValueKind::Boolean(_) => 1,
            ValueKind::Integer(_) | ValueKind::Double(_) => 2,
            ValueKind::Timestamp(_) | ValueKind::Sentinel(_) => 3,
            ValueKind::String(_) => 4,
            ValueKind::GeoPoint(_) => 5,
            ValueKind::Array(_) => 6,
            ValueKind::Map(_) => 7,
        }
    }

    /// Equality with integer/double unification (`1 == 1.0`).
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

/// Converts a JSON payload into document data, rejecting anything that is
/// not a keyed structure.
pub fn document_from_json(value: &JsonValue) -> StoreResult<DocumentData> {
    match value {
        JsonValue::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
            .collect()),
        other => Err(invalid_argument(format!(
            "Document data must be an object, got {}",
            json_type_name(other)
        ))),
    }
}

pub fn document_to_json(data: &DocumentData) -> JsonValue {
    JsonValue::Object(data_to_json_map(data))
}

fn data_to_json_map(data: &DocumentData) -> Map<String, JsonValue> {
    data.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Resolves a dotted field path (`notifications.email`) inside `data`.
pub(crate) fn value_at_path<'a>(data: &'a DocumentData, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        match current.kind() {
            ValueKind::Map(child) => current = child.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
