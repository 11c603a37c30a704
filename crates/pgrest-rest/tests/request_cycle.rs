//! Integration tests for the parse -> execute -> format cycle
//!
//! The execution engine is replaced by an in-memory executor that records
//! the statements it receives.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use pgrest_common::error::{Error, Result};
use pgrest_common::types::DatabaseError;
use pgrest_rest::{
    compute_count, CountMode, FilterValue, MemoryLogger, Operation, Operator, QueryExecutor,
    QueryParser, QueryRows, RaisedError, RequestHeaders, ResponseFormatter, LOGICAL_COLUMN,
};

/// Executor returning canned rows for the data query and a canned count
struct MockExecutor {
    rows: Vec<Value>,
    count: Result<Value>,
    statements: Mutex<Vec<String>>,
}

impl MockExecutor {
    fn new(rows: Vec<Value>, count: Result<Value>) -> Self {
        Self {
            rows,
            count,
            statements: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        self.statements.lock().push(sql.to_string());

        if sql.starts_with("SELECT COUNT(*)") {
            return match &self.count {
                Ok(row) => Ok(QueryRows {
                    rows: vec![row.clone()],
                }),
                Err(Error::Database(db)) => Err(Error::Database(db.clone())),
                Err(e) => Err(Error::query(e.to_string())),
            };
        }

        Ok(QueryRows {
            rows: self.rows.clone(),
        })
    }
}

fn order_rows() -> Vec<Value> {
    vec![
        json!({"id": 3, "total": 10, "customer_name": "Ada", "customer_email": "ada@example.com"}),
        json!({"id": 4, "total": 25, "customer_name": null, "customer_email": null}),
    ]
}

// ============================================================================
// SELECT
// ============================================================================

#[tokio::test]
async fn test_select_with_exact_count() {
    let parser = QueryParser::new();
    let headers = RequestHeaders::new().with("Prefer", "count=exact");
    let query = parser
        .parse(
            "/orders?select=id,total,customer(name,email)&total=gte.10&order=id.asc&limit=2&offset=2",
            &headers,
        )
        .unwrap();

    assert_eq!(query.count, Some(CountMode::Exact));
    assert_eq!(query.select, vec!["id", "total"]);
    assert_eq!(query.filters[0].operator, Operator::Gte);

    let executor = MockExecutor::new(order_rows(), Ok(json!({"count": 9})));
    let sql = "SELECT id, total FROM orders WHERE total >= 10 ORDER BY id ASC LIMIT 2 OFFSET 2";
    let result = executor.execute_query(sql).await.unwrap();
    let count = compute_count(&executor, sql, CountMode::Exact).await;

    let response = ResponseFormatter::default().format(Operation::Select, &query, result.rows, Some(count));
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Range"), Some("2-3/9"));
    assert_eq!(
        response.data,
        Some(json!([
            {"id": 3, "total": 10, "customer": {"name": "Ada", "email": "ada@example.com"}},
            {"id": 4, "total": 25, "customer": null},
        ]))
    );

    let statements = executor.statements.lock().clone();
    assert_eq!(statements[1], "SELECT COUNT(*) FROM orders WHERE total >= 10 ");
}

#[tokio::test]
async fn test_planned_count_is_marked_estimated() {
    let executor = MockExecutor::new(Vec::new(), Ok(json!({"count": "120"})));
    let count = compute_count(&executor, "SELECT * FROM t", CountMode::Planned).await;
    assert_eq!(count.count, 120);
    assert!(count.estimated);

    let response = ResponseFormatter::default().format_select(
        &Default::default(),
        vec![json!({"id": 1})],
        Some(count),
    );
    assert_eq!(response.header("Content-Range"), Some("0-0/120~"));
}

#[tokio::test]
async fn test_count_failure_degrades() {
    let executor = MockExecutor::new(
        order_rows(),
        Err(Error::Database(DatabaseError::new("57014", "canceling statement due to statement timeout"))),
    );
    let count = compute_count(&executor, "SELECT * FROM orders", CountMode::Exact).await;
    assert_eq!(count.count, 0);
    assert!(count.estimated);

    // the data response is still served
    let response =
        ResponseFormatter::default().format_select(&Default::default(), order_rows(), Some(count));
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Range"), Some("0-1/0~"));
}

#[tokio::test]
async fn test_unreadable_count_degrades() {
    let executor = MockExecutor::new(Vec::new(), Ok(json!({"a": 1, "b": 2})));
    let count = compute_count(&executor, "SELECT * FROM t", CountMode::Exact).await;
    assert_eq!((count.count, count.estimated), (0, true));
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_insert_and_update_minimal_asymmetry() {
    let headers = RequestHeaders::new().with("prefer", "return=minimal");
    let query = QueryParser::new().parse("/users", &headers).unwrap();
    let formatter = ResponseFormatter::default();

    let rows = vec![json!({"id": 1})];
    assert_eq!(formatter.format(Operation::Insert, &query, rows.clone(), None).status, 201);
    assert_eq!(formatter.format(Operation::Update, &query, rows.clone(), None).status, 204);
    assert_eq!(formatter.format(Operation::Delete, &query, rows, None).status, 204);
}

#[test]
fn test_upsert_status() {
    let headers = RequestHeaders::new().with("Prefer", "resolution=merge-duplicates,return=headers-only");
    let query = QueryParser::new()
        .parse("/users?on_conflict=email", &headers)
        .unwrap();
    assert_eq!(query.on_conflict, Some(vec!["email".to_string()]));

    let response = ResponseFormatter::default().format_insert(&query, vec![json!({"id": "x"})]);
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Location"), Some("/x"));
    assert_eq!(response.data, Some(json!([])));
}

#[test]
fn test_single_object_update() {
    let headers = RequestHeaders::new().with("Accept", "application/vnd.pgrst.object+json");
    let query = QueryParser::new().parse("/users?id=eq.1", &headers).unwrap();
    let response = ResponseFormatter::default().format_update(&query, vec![json!({"id": 1, "name": "b"})]);
    assert_eq!(response.status, 200);
    assert_eq!(response.data, Some(json!({"id": 1, "name": "b"})));

    let response = ResponseFormatter::default().format_update(&query, Vec::new());
    assert_eq!(response.status, 406);
}

// ============================================================================
// Parse diagnostics and failures
// ============================================================================

#[test]
fn test_dropped_filters_reach_injected_logger() {
    let logger = Arc::new(MemoryLogger::new());
    let parser = QueryParser::with_logger(logger.clone());

    let report = parser
        .parse_report(
            "/users?status=in.active&deleted=is.maybe&age=gt.18&or=(id.eq.1,flag.is.perhaps)",
            &RequestHeaders::new(),
        )
        .unwrap();

    assert_eq!(report.query.filters.len(), 2);
    assert_eq!(report.query.filters[0].column, "age");
    assert_eq!(report.query.filters[1].column, LOGICAL_COLUMN);
    assert_eq!(report.query.filters[1].conditions().unwrap().len(), 1);

    let logged = logger.skipped();
    assert_eq!(logged, report.skipped);
    let keys: Vec<&str> = logged.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["status", "deleted", "flag"]);
}

#[test]
fn test_parse_errors_become_400_responses() {
    let formatter = ResponseFormatter::default();
    for url in ["/t?limit=-1", "/t?offset=abc", "/t?column=zz.5"] {
        let err = QueryParser::new().parse(url, &RequestHeaders::new()).unwrap_err();
        assert!(err.is_parse_error(), "{}", url);
        let response = formatter.format_error(&RaisedError::from(&err), None);
        assert_eq!(response.status, 400, "{}", url);
        assert_eq!(response.data.as_ref().unwrap()["code"], "PGRST100");
    }
}

#[test]
fn test_database_error_response() {
    let err = Error::Database(
        DatabaseError::new("23505", "duplicate key value violates unique constraint")
            .with_detail("Key (email)=(a@b.c) already exists."),
    );
    let response = ResponseFormatter::default().format_error(&RaisedError::from(&err), None);
    assert_eq!(response.status, 409);
    let body = response.data.unwrap();
    assert_eq!(body["code"], "23505");
    assert_eq!(body["details"], "Key (email)=(a@b.c) already exists.");
    assert_eq!(body["hint"], Value::Null);
}

#[test]
fn test_filter_values_are_coerced() {
    let query = QueryParser::new()
        .parse(
            "/t?a=eq.true&b=is.null&c=in.(1,2)&d=cs.{x,y}&e=sl.[1,5)&f=fts(english).cat&g=like.*ab*",
            &RequestHeaders::new(),
        )
        .unwrap();
    let values: Vec<&FilterValue> = query.filters.iter().map(|f| &f.value).collect();
    assert_eq!(values[0], &FilterValue::Bool(true));
    assert_eq!(values[1], &FilterValue::Null);
    assert_eq!(values[2], &FilterValue::List(vec!["1".to_string(), "2".to_string()]));
    assert_eq!(values[6], &FilterValue::Text("*ab*".to_string()));
    assert!(matches!(values[4], FilterValue::Range { .. }));
    assert!(matches!(values[5], FilterValue::Search { .. }));
}
