//! Backend documents and list queries
//!
//! Documents travel as JSON objects: system fields (`$id`, `$createdAt`,
//! `$updatedAt`, ...) next to the collection's own attributes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Attributes, plus any other system fields the backend sent
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Decode into a typed model
    ///
    /// System fields are visible to the model under their `$` names.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    /// Attribute value by name (`$createdAt` and `$updatedAt` included)
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "$id" => Some(Value::String(self.id.clone())),
            "$createdAt" => Some(Value::String(self.created_at.to_rfc3339())),
            "$updatedAt" => Some(Value::String(self.updated_at.to_rfc3339())),
            _ => self.data.get(name).cloned(),
        }
    }
}

/// One page of a collection listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    /// Matching documents before `limit` was applied
    pub total: u64,
    pub documents: Vec<Document>,
}

/// Attribute filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Attribute equals the value, or an array attribute contains it
    Equal { field: String, value: String },
    /// Full-text match on the attribute
    Search { field: String, term: String },
}

/// Filters, ordering, and cursor window of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub filters: Vec<Filter>,
    /// Attribute to sort by, highest first
    pub order_desc: Option<String>,
    pub limit: Option<usize>,
    /// Only documents after this ID in the ordered result
    pub cursor_after: Option<String>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal(mut self, field: &str, value: &str) -> Self {
        self.filters.push(Filter::Equal {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn search(mut self, field: &str, term: &str) -> Self {
        self.filters.push(Filter::Search {
            field: field.to_string(),
            term: term.to_string(),
        });
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_desc = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor_after(mut self, cursor: Option<&str>) -> Self {
        self.cursor_after = cursor.map(str::to_string);
        self
    }

    /// Encode as `queries[]` strings of the REST API
    ///
    /// e.g. `equal("creator", ["u1"])`, `orderDesc("$createdAt")`, `limit(9)`
    pub fn to_query_strings(&self) -> Vec<String> {
        let mut queries: Vec<String> = self
            .filters
            .iter()
            .map(|filter| match filter {
                Filter::Equal { field, value } => {
                    format!("equal({}, [{}])", quote(field), quote(value))
                }
                Filter::Search { field, term } => {
                    format!("search({}, [{}])", quote(field), quote(term))
                }
            })
            .collect();

        if let Some(field) = &self.order_desc {
            queries.push(format!("orderDesc({})", quote(field)));
        }
        if let Some(limit) = self.limit {
            queries.push(format!("limit({limit})"));
        }
        if let Some(cursor) = &self.cursor_after {
            queries.push(format!("cursorAfter({})", quote(cursor)));
        }
        queries
    }
}

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
