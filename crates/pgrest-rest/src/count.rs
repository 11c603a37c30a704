//! Total-count support for `Prefer: count=...`

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use pgrest_common::error::Result;

use crate::headers::CountMode;

static ORDER_BY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bORDER\s+BY\b.*?(\bLIMIT\b|\bOFFSET\b|$)").expect("valid ORDER BY regex")
});
static LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(\d+|ALL|\$\d+)\s*").expect("valid LIMIT regex")
});
static OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bOFFSET\s+(\d+|\$\d+)\s*").expect("valid OFFSET regex"));
static SELECT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*SELECT\s+.*?\s+FROM\s+").expect("valid SELECT regex"));

/// Rows returned by the execution engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub rows: Vec<Value>,
}

/// SQL execution engine boundary
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `sql` and return its rows.
    ///
    /// # Errors
    /// `Error::Database` for structured engine errors, `Error::Query`
    /// otherwise.
    async fn execute_query(&self, sql: &str) -> Result<QueryRows>;
}

/// Total row count for `Content-Range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountResult {
    pub count: u64,
    /// Rendered with a `~` suffix
    pub estimated: bool,
}

impl CountResult {
    pub fn exact(count: u64) -> Self {
        Self {
            count,
            estimated: false,
        }
    }

    fn degraded() -> Self {
        Self {
            count: 0,
            estimated: true,
        }
    }
}

/// Turn a row-returning SELECT into its `COUNT(*)` form.
///
/// `ORDER BY`, `LIMIT` and `OFFSET` are removed and the projection replaced.
/// Statements whose `SELECT ... FROM` head cannot be found are wrapped as a
/// subquery instead.
pub fn build_count_query(sql: &str) -> String {
    let cleaned = ORDER_BY.replace_all(sql, "${1}");
    let cleaned = LIMIT.replace_all(&cleaned, "");
    let cleaned = OFFSET.replace_all(&cleaned, "").into_owned();

    if SELECT_FROM.is_match(&cleaned) {
        SELECT_FROM
            .replace(&cleaned, "SELECT COUNT(*) FROM ")
            .into_owned()
    } else {
        format!("SELECT COUNT(*) FROM ({}) AS count_query", cleaned.trim())
    }
}

/// Run the count query for `sql`.
///
/// Never fails: an executor error or an unreadable result degrades to
/// `{count: 0, estimated: true}` so the main response is still served.
pub async fn compute_count(executor: &dyn QueryExecutor, sql: &str, mode: CountMode) -> CountResult {
    let count_sql = build_count_query(sql);

    match executor.execute_query(&count_sql).await {
        Ok(result) => match result.rows.first().and_then(read_count) {
            Some(count) => CountResult {
                count,
                estimated: mode.is_estimate(),
            },
            None => {
                warn!(sql = %count_sql, "Count query returned no readable count");
                CountResult::degraded()
            }
        },
        Err(e) => {
            warn!(sql = %count_sql, error = %e, "Count query failed");
            CountResult::degraded()
        }
    }
}

/// `count` column, or the only column of the row. Engines report it as a
/// number or as a numeric string.
fn read_count(row: &Value) -> Option<u64> {
    let object = row.as_object()?;
    let value = match object.get("count") {
        Some(value) => value,
        None if object.len() == 1 => object.values().next()?,
        None => return None,
    };

    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
