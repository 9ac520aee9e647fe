use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ChunkRecord;

/// A required field value. Text and integers never compare equal to each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

/// Exact-match constraints keyed by record field name.
///
/// Named fields (`company`, `fiscal_year`, `report_type`, `chunk_id`) are read
/// from the record; any other key is looked up in the record's inherited
/// document metadata. A key the record does not carry never matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    constraints: BTreeMap<String, FilterValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.constraints.insert(field.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.constraints.get(field)
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        self.constraints
            .iter()
            .all(|(field, want)| field_value(record, field).as_ref() == Some(want))
    }

    /// Order-preserving subsequence of `records` matching every constraint.
    pub fn apply(&self, records: Vec<ChunkRecord>) -> Vec<ChunkRecord> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

fn field_value(record: &ChunkRecord, field: &str) -> Option<FilterValue> {
    match field {
        "chunk_id" => Some(FilterValue::Text(record.id.clone())),
        "company" => Some(FilterValue::Text(record.company.clone())),
        "fiscal_year" => Some(FilterValue::Int(record.fiscal_year)),
        "report_type" => Some(FilterValue::Text(record.report_type.clone())),
        other => match record.extra.get(other)? {
            serde_json::Value::String(s) => Some(FilterValue::Text(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(FilterValue::Int),
            _ => None,
        },
    }
}
