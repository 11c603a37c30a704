//! Response shaping for SELECT/INSERT/UPDATE/DELETE/RPC results

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use pgrest_common::config::CorsConfig;
use pgrest_common::types::PostgrestError;

use crate::count::CountResult;
use crate::error_mapper::{map_error, MappedError, RaisedError};
use crate::headers::ReturnPreference;
use crate::query::{EmbeddedResource, ParsedQuery};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const ERROR_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Kind of statement the rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Rpc,
}

/// HTTP response ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResponse {
    /// `None` means no body
    pub data: Option<Value>,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl FormattedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Shapes rows into PostgREST responses
#[derive(Debug, Clone, Default)]
pub struct ResponseFormatter {
    cors: CorsConfig,
}

impl ResponseFormatter {
    pub fn new(cors: CorsConfig) -> Self {
        Self { cors }
    }

    pub fn format(
        &self,
        operation: Operation,
        query: &ParsedQuery,
        rows: Vec<Value>,
        count: Option<CountResult>,
    ) -> FormattedResponse {
        match operation {
            Operation::Select => self.format_select(query, rows, count),
            Operation::Insert => self.format_insert(query, rows),
            Operation::Update => self.format_update(query, rows),
            Operation::Delete => self.format_delete(query, rows),
            Operation::Rpc => self.format_rpc(Value::Array(rows)),
        }
    }

    pub fn format_select(
        &self,
        query: &ParsedQuery,
        rows: Vec<Value>,
        count: Option<CountResult>,
    ) -> FormattedResponse {
        let mut headers = self.base_headers();
        if query.prefer_return == Some(ReturnPreference::Minimal) {
            return FormattedResponse {
                data: None,
                status: 204,
                headers,
            };
        }

        let start = query.offset.unwrap_or(0);
        if let Some(count) = count {
            let total = if count.estimated {
                format!("{}~", count.count)
            } else {
                count.count.to_string()
            };
            headers.insert("Content-Range".to_string(), content_range(start, rows.len(), &total));
        } else if query.is_paginated() {
            headers.insert("Content-Range".to_string(), content_range(start, rows.len(), "*"));
        }

        let rows = unflatten_rows(rows, &query.embedded);
        self.representation(query, rows, 200, headers)
    }

    pub fn format_insert(&self, query: &ParsedQuery, rows: Vec<Value>) -> FormattedResponse {
        let mut headers = self.base_headers();
        let status = if query.prefer_resolution.is_some() { 200 } else { 201 };

        match query.prefer_return {
            Some(ReturnPreference::Minimal) => FormattedResponse {
                data: Some(Value::Array(Vec::new())),
                status,
                headers,
            },
            Some(ReturnPreference::HeadersOnly) => {
                if let [row] = rows.as_slice() {
                    if let Some(id) = row.get("id").and_then(location_id) {
                        headers.insert("Location".to_string(), format!("/{}", id));
                    }
                }
                FormattedResponse {
                    data: Some(Value::Array(Vec::new())),
                    status,
                    headers,
                }
            }
            Some(ReturnPreference::Representation) | None => {
                self.representation(query, rows, status, headers)
            }
        }
    }

    pub fn format_update(&self, query: &ParsedQuery, rows: Vec<Value>) -> FormattedResponse {
        self.format_mutation(query, rows)
    }

    pub fn format_delete(&self, query: &ParsedQuery, rows: Vec<Value>) -> FormattedResponse {
        self.format_mutation(query, rows)
    }

    /// RPC results pass through untouched
    pub fn format_rpc(&self, result: Value) -> FormattedResponse {
        FormattedResponse {
            data: Some(result),
            status: 200,
            headers: self.base_headers(),
        }
    }

    /// Error response through the error mapper. `status_override` wins over
    /// the mapped status.
    pub fn format_error(&self, raised: &RaisedError, status_override: Option<u16>) -> FormattedResponse {
        let MappedError { error, status } = map_error(raised);
        self.error_response(&error, status_override.unwrap_or(status))
    }

    fn format_mutation(&self, query: &ParsedQuery, rows: Vec<Value>) -> FormattedResponse {
        if query.prefer_return == Some(ReturnPreference::Minimal) {
            return FormattedResponse {
                data: Some(Value::Array(Vec::new())),
                status: 204,
                headers: self.base_headers(),
            };
        }
        self.representation(query, rows, 200, self.base_headers())
    }

    /// Rows as the body, or the single row when the client asked for an
    /// object
    fn representation(
        &self,
        query: &ParsedQuery,
        mut rows: Vec<Value>,
        status: u16,
        headers: BTreeMap<String, String>,
    ) -> FormattedResponse {
        if !query.return_single {
            return FormattedResponse {
                data: Some(Value::Array(rows)),
                status,
                headers,
            };
        }

        if rows.len() != 1 {
            debug!(rows = rows.len(), "Single object requested");
            let mut error = PostgrestError::new(
                "PGRST116",
                "JSON object requested, multiple (or no) rows returned",
            );
            error.details = Some(format!("The result contains {} rows", rows.len()));
            return self.error_response(&error, 406);
        }

        FormattedResponse {
            data: rows.pop(),
            status,
            headers,
        }
    }

    fn error_response(&self, error: &PostgrestError, status: u16) -> FormattedResponse {
        let mut headers: BTreeMap<String, String> = self
            .cors
            .headers()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        headers.insert("Content-Type".to_string(), ERROR_CONTENT_TYPE.to_string());

        FormattedResponse {
            data: Some(json!({
                "code": error.code,
                "message": error.message,
                "details": error.details,
                "hint": error.hint,
            })),
            status,
            headers,
        }
    }

    fn base_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
            (
                "Access-Control-Expose-Headers".to_string(),
                self.cors.expose_header_value(),
            ),
        ])
    }
}

/// `start-end/total`, or `*/total` for an empty window
fn content_range(start: usize, len: usize, total: &str) -> String {
    if len == 0 {
        format!("*/{}", total)
    } else {
        format!("{}-{}/{}", start, start.saturating_add(len - 1), total)
    }
}

fn location_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Move `<key>_<column>` entries of each row into an object under the
/// resource's table name, where `<key>` is the resource alias or table name.
pub fn unflatten_rows(rows: Vec<Value>, embedded: &[EmbeddedResource]) -> Vec<Value> {
    if embedded.is_empty() {
        return rows;
    }

    rows.into_iter()
        .map(|row| match row {
            Value::Object(mut map) => {
                unflatten_object(&mut map, embedded);
                Value::Object(map)
            }
            other => other,
        })
        .collect()
}

fn unflatten_object(row: &mut Map<String, Value>, embedded: &[EmbeddedResource]) {
    // longest key first so `order_items_*` is not claimed by `order`
    let mut resources: Vec<&EmbeddedResource> = embedded.iter().collect();
    resources.sort_by_key(|r| std::cmp::Reverse(r.response_key().len()));

    for resource in resources {
        let prefix = format!("{}_", resource.response_key());
        let columns: Vec<String> = row
            .keys()
            .filter(|k| k.len() > prefix.len() && k.starts_with(&prefix))
            .cloned()
            .collect();
        if columns.is_empty() {
            continue;
        }

        let mut nested = Map::new();
        for column in columns {
            if let Some(value) = row.remove(&column) {
                nested.insert(column[prefix.len()..].to_string(), value);
            }
        }
        unflatten_object(&mut nested, &resource.embedded);

        let value = if nested.values().all(Value::is_null) {
            Value::Null
        } else {
            Value::Object(nested)
        };
        row.insert(resource.table.clone(), value);
    }
}
