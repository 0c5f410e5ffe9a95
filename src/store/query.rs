use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::model::{validate_collection, Document, DocumentKey};
use crate::store::value::{value_at_path, FieldValue, ValueKind};

/// Page size applied when the caller does not declare one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Pseudo field addressing the document id in filters and orderings.
pub const DOCUMENT_ID_FIELD: &str = "__name__";
const MAX_DISJUNCTION_VALUES: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn parse(operator: &str) -> StoreResult<Self> {
        match operator.trim() {
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "array-contains" => Ok(Self::ArrayContains),
            "array-contains-any" => Ok(Self::ArrayContainsAny),
            "in" => Ok(Self::In),
            "not-in" => Ok(Self::NotIn),
            "" => Err(invalid_argument("Query condition is missing an operator")),
            other => Err(invalid_argument(format!(
                "Unsupported query operator '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }

    /// Operator name used by the REST structured query encoding.
    pub fn as_rest_op(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::GreaterThan => "GREATER_THAN",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Self::ArrayContains => "ARRAY_CONTAINS",
            Self::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
        }
    }

    fn requires_array_operand(&self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::ArrayContainsAny)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn parse(direction: &str) -> StoreResult<Self> {
        match direction {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            other => Err(invalid_argument(format!(
                "Sort direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn as_rest(&self) -> &'static str {
        match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// One declarative `field operator value` condition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    #[serde(default, alias = "op")]
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrder {
    #[serde(default)]
    pub field: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    OrderDirection::Ascending.as_str().to_string()
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Declarative query description: conditions, sort orders, page size and an
/// optional cursor returned by a previous page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default, alias = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order_by: Vec<SortOrder>,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(skip)]
    pub start_after: Option<Cursor>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order_by: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            start_after: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the camelCase option object used by the dashboard screens.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| invalid_argument(format!("Invalid query options: {err}")))
    }

    pub fn where_field(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            operator: operator.as_str().to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(SortOrder {
            field: field.into(),
            direction: direction.as_str().to_string(),
        });
        self
    }

    pub fn limit(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    /// Validates the options and resolves them against `collection`.
    pub(crate) fn build(&self, collection: &str) -> StoreResult<QueryDefinition> {
        validate_collection(collection)?;
        if self.page_size <= 0 {
            return Err(invalid_argument(format!(
                "Page size must be a positive integer, got {}",
                self.page_size
            )));
        }
        let limit = u32::try_from(self.page_size).map_err(|_| {
            invalid_argument(format!("Page size {} is too large", self.page_size))
        })?;

        let filters = self
            .conditions
            .iter()
            .map(FieldFilter::from_condition)
            .collect::<StoreResult<Vec<_>>>()?;
        let order_by = self
            .order_by
            .iter()
            .map(OrderBy::from_sort_order)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(QueryDefinition {
            collection: collection.to_string(),
            filters,
            order_by,
            limit: Some(limit),
            start_after: self.start_after.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    operator: FilterOperator,
    value: FieldValue,
}

impl FieldFilter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: FieldValue,
    ) -> StoreResult<Self> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(invalid_argument("Query condition is missing a field"));
        }
        if operator.requires_array_operand() {
            match value.as_array() {
                Some(values) if !values.is_empty() && values.len() <= MAX_DISJUNCTION_VALUES => {}
                Some(_) => {
                    return Err(invalid_argument(format!(
                        "'{}' requires between 1 and {MAX_DISJUNCTION_VALUES} values",
                        operator.as_str()
                    )))
                }
                None => {
                    return Err(invalid_argument(format!(
                        "'{}' requires an array value",
                        operator.as_str()
                    )))
                }
            }
        }
        Ok(Self {
            field,
            operator,
            value,
        })
    }

    fn from_condition(condition: &Condition) -> StoreResult<Self> {
        if condition.field.trim().is_empty() {
            return Err(invalid_argument("Query condition is missing a field"));
        }
        let operator = FilterOperator::parse(&condition.operator)?;
        Self::new(
            condition.field.clone(),
            operator,
            FieldValue::from_json(&condition.value),
        )
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn matches(&self, document: &Document) -> bool {
        match field_value(document, &self.field) {
            Some(value) => self.evaluate(&value),
            None => false,
        }
    }

    fn evaluate(&self, value: &FieldValue) -> bool {
        let expected = &self.value;
        match self.operator {
            FilterOperator::Equal => value.loosely_equals(expected),
            FilterOperator::NotEqual => !value.is_null() && !value.loosely_equals(expected),
            FilterOperator::LessThan => value.compare(expected) == Some(Ordering::Less),
            FilterOperator::LessThanOrEqual => matches!(
                value.compare(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::GreaterThan => value.compare(expected) == Some(Ordering::Greater),
            FilterOperator::GreaterThanOrEqual => matches!(
                value.compare(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::ArrayContains => match value.kind() {
                ValueKind::Array(items) => items.iter().any(|item| item.loosely_equals(expected)),
                _ => false,
            },
            FilterOperator::ArrayContainsAny => match (value.kind(), expected.kind()) {
                (ValueKind::Array(items), ValueKind::Array(needles)) => needles
                    .iter()
                    .any(|needle| items.iter().any(|item| item.loosely_equals(needle))),
                _ => false,
            },
            FilterOperator::In => match expected.kind() {
                ValueKind::Array(candidates) => {
                    candidates.iter().any(|candidate| value.loosely_equals(candidate))
                }
                _ => false,
            },
            FilterOperator::NotIn => match expected.kind() {
                ValueKind::Array(candidates) => {
                    !value.is_null()
                        && candidates.iter().all(|candidate| !value.loosely_equals(candidate))
                }
                _ => false,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> StoreResult<Self> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(invalid_argument("Sort order is missing a field"));
        }
        Ok(Self { field, direction })
    }

    fn from_sort_order(order: &SortOrder) -> StoreResult<Self> {
        let direction = OrderDirection::parse(&order.direction)?;
        Self::new(order.field.clone(), direction)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// Opaque pagination token: the position of the last document of a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Cursor {
    key: DocumentKey,
    values: Vec<FieldValue>,
}

impl Cursor {
    pub(crate) fn from_document(document: &Document, order_by: &[OrderBy]) -> Self {
        let values = order_by
            .iter()
            .map(|order| field_value(document, order.field()).unwrap_or_else(FieldValue::null))
            .collect();
        Self {
            key: document.key().clone(),
            values,
        }
    }

    /// Id of the document the next page starts after.
    pub fn document_id(&self) -> &str {
        self.key.id()
    }

    pub(crate) fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub(crate) fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

/// A validated query against a single collection.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    collection: String,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
    start_after: Option<Cursor>,
}

impl QueryDefinition {
    /// Every document of `collection`, ordered by id.
    pub fn collection_scan(collection: &str) -> StoreResult<Self> {
        validate_collection(collection)?;
        Ok(Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            start_after: None,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    /// Orderings declared by the caller.
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Orderings actually applied: declared ones plus the document id tie-breaker.
    pub fn effective_order_by(&self) -> Vec<OrderBy> {
        let mut orders = self.order_by.clone();
        if !orders.iter().any(|order| order.field == DOCUMENT_ID_FIELD) {
            let direction = orders
                .last()
                .map(|order| order.direction)
                .unwrap_or_default();
            orders.push(OrderBy {
                field: DOCUMENT_ID_FIELD.to_string(),
                direction,
            });
        }
        orders
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn start_after(&self) -> Option<&Cursor> {
        self.start_after.as_ref()
    }

    pub fn matches(&self, document: &Document) -> bool {
        document.collection() == self.collection
            && self.filters.iter().all(|filter| filter.matches(document))
    }

    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        for order in self.effective_order_by() {
            let left_value = field_value(left, order.field()).unwrap_or_else(FieldValue::null);
            let right_value = field_value(right, order.field()).unwrap_or_else(FieldValue::null);
            let ordering = order.direction.apply(left_value.total_cmp(&right_value));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn is_after_cursor(&self, document: &Document, cursor: &Cursor) -> bool {
        for (index, order) in self.order_by.iter().enumerate() {
            if order.field == DOCUMENT_ID_FIELD {
                break;
            }
            let Some(bound) = cursor.values.get(index) else {
                break;
            };
            let value = field_value(document, order.field()).unwrap_or_else(FieldValue::null);
            let ordering = order.direction.apply(value.total_cmp(bound));
            if ordering != Ordering::Equal {
                return ordering == Ordering::Greater;
            }
        }
        let id_direction = self
            .effective_order_by()
            .into_iter()
            .find(|order| order.field == DOCUMENT_ID_FIELD)
            .map(|order| order.direction)
            .unwrap_or_default();
        id_direction.apply(document.id().cmp(cursor.key.id())) == Ordering::Greater
    }

    /// Filters, sorts, applies the cursor and truncates `documents` in place.
    pub fn apply(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();
        matched.sort_by(|left, right| self.compare(left, right));
        if let Some(cursor) = &self.start_after {
            matched.retain(|document| self.is_after_cursor(document, cursor));
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit as usize);
        }
        matched
    }

    /// Cursor for the page `documents` produced by this query.
    pub(crate) fn next_cursor(&self, documents: &[Document]) -> Option<Cursor> {
        let last = documents.last()?;
        if let Some(limit) = self.limit {
            if documents.len() < limit as usize {
                return None;
            }
        }
        Some(Cursor::from_document(last, &self.order_by))
    }
}

/// One page of query results.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPage {
    pub documents: Vec<Document>,
    /// Position to pass as `start_after` for the next page; `None` when no
    /// further page exists.
    pub cursor: Option<Cursor>,
}

impl QueryPage {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

fn field_value(document: &Document, field: &str) -> Option<FieldValue> {
    if field == DOCUMENT_ID_FIELD {
        return Some(FieldValue::from_string(document.id()));
    }
    value_at_path(document.data(), field).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::value::document_from_json;
    use serde_json::json;

    fn doc(id: &str, data: JsonValue) -> Document {
        Document::new(
            DocumentKey::new("properties", id).unwrap(),
            document_from_json(&data).unwrap(),
        )
    }

    #[test]
    fn options_parse_from_dashboard_json() {
        let options = QueryOptions::from_json(&json!({
            "conditions": [{"field": "city", "operator": "==", "value": "Dakar"}],
            "orderBy": [{"field": "price", "direction": "desc"}],
            "pageSize": 5
        }))
        .unwrap();
        let definition = options.build("properties").unwrap();
        assert_eq!(definition.filters()[0].operator(), FilterOperator::Equal);
        assert_eq!(definition.order_by()[0].direction(), OrderDirection::Descending);
        assert_eq!(definition.limit(), Some(5));
    }

    #[test]
    fn rejects_invalid_page_sizes() {
        for size in [0, -3] {
            let err = QueryOptions::new().limit(size).build("users").unwrap_err();
            assert_eq!(err.code_str(), "store/invalid-argument");
        }
        assert!(QueryOptions::from_json(&json!({"pageSize": 2.5})).is_err());
    }

    #[test]
    fn rejects_incomplete_conditions_and_directions() {
        let missing_field = QueryOptions::from_json(&json!({
            "conditions": [{"operator": "==", "value": 1}]
        }))
        .unwrap();
        assert!(missing_field.build("users").is_err());

        let missing_operator = QueryOptions::from_json(&json!({
            "conditions": [{"field": "statut", "value": 1}]
        }))
        .unwrap();
        assert!(missing_operator.build("users").is_err());

        let bad_direction = QueryOptions::from_json(&json!({
            "orderBy": [{"field": "email", "direction": "up"}]
        }))
        .unwrap();
        assert!(bad_direction.build("users").is_err());
    }

    #[test]
    fn in_requires_non_empty_array() {
        let options = QueryOptions::new().where_field("status", FilterOperator::In, json!("rented"));
        assert!(options.build("properties").is_err());
        let options = QueryOptions::new().where_field("status", FilterOperator::In, json!([]));
        assert!(options.build("properties").is_err());
    }

    #[test]
    fn apply_filters_sorts_and_limits() {
        let definition = QueryOptions::new()
            .where_field("price", FilterOperator::GreaterThanOrEqual, 100)
            .order_by("price", OrderDirection::Descending)
            .limit(2)
            .build("properties")
            .unwrap();
        let results = definition.apply(vec![
            doc("a", json!({"price": 90})),
            doc("b", json!({"price": 150})),
            doc("c", json!({"price": 300.5})),
            doc("d", json!({"price": 120})),
            doc("e", json!({"city": "Thiès"})),
        ]);
        let ids: Vec<_> = results.iter().map(Document::id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn cursor_resumes_after_last_document() {
        let all = vec![
            doc("a", json!({"rooms": 2})),
            doc("b", json!({"rooms": 2})),
            doc("c", json!({"rooms": 3})),
        ];
        let first = QueryOptions::new()
            .order_by("rooms", OrderDirection::Ascending)
            .limit(2)
            .build("properties")
            .unwrap();
        let page = first.apply(all.clone());
        let cursor = first.next_cursor(&page).expect("full page has a cursor");
        assert_eq!(cursor.document_id(), "b");

        let second = QueryOptions::new()
            .order_by("rooms", OrderDirection::Ascending)
            .limit(2)
            .start_after(cursor)
            .build("properties")
            .unwrap();
        let page = second.apply(all);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id(), "c");
        assert!(second.next_cursor(&page).is_none());
    }

    #[test]
    fn array_operators() {
        let document = doc("a", json!({"images": ["front.jpg", "kitchen.jpg"], "status": "available"}));
        let contains =
            FieldFilter::new("images", FilterOperator::ArrayContains, FieldValue::from_string("kitchen.jpg"))
                .unwrap();
        assert!(contains.matches(&document));
        let not_in = FieldFilter::new(
            "status",
            FilterOperator::NotIn,
            FieldValue::from_json(&json!(["sold", "rented"])),
        )
        .unwrap();
        assert!(not_in.matches(&document));
    }
}
