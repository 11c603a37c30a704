//! Classification of raised errors into PostgREST error bodies
//!
//! Precedence:
//! 1. structured database errors keep their SQLSTATE, status from
//!    [`status_for_sqlstate`]
//! 2. exceptions are matched against [`MESSAGE_RULES`] in order
//! 3. plain strings are `PGRST100` / 400
//! 4. anything else is `PGRST000` / 500

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use pgrest_common::error::Error;
use pgrest_common::types::{DatabaseError, PostgrestError};

/// Whatever the execution path raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaisedError {
    Database(DatabaseError),
    Exception {
        message: String,
        stack: Option<String>,
    },
    Message(String),
    Opaque,
}

impl RaisedError {
    /// Classify a JSON error payload by shape
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) if map.get("code").is_some_and(Value::is_string) => {
                let field = |name: &str| map.get(name).and_then(Value::as_str).map(ToString::to_string);
                Self::Database(DatabaseError {
                    code: field("code").unwrap_or_default(),
                    message: field("message").unwrap_or_default(),
                    detail: field("detail").or_else(|| field("details")),
                    hint: field("hint"),
                    severity: field("severity"),
                })
            }
            Value::Object(map) => match map.get("message").and_then(Value::as_str) {
                Some(message) => Self::Exception {
                    message: message.to_string(),
                    stack: map.get("stack").and_then(Value::as_str).map(ToString::to_string),
                },
                None => Self::Opaque,
            },
            Value::String(message) => Self::Message(message.clone()),
            _ => Self::Opaque,
        }
    }
}

impl From<&Error> for RaisedError {
    fn from(error: &Error) -> Self {
        match error {
            Error::Database(db) => Self::Database(db.clone()),
            Error::Query { message, stack } => Self::Exception {
                message: message.clone(),
                stack: stack.clone(),
            },
            other => Self::Exception {
                message: other.to_string(),
                stack: None,
            },
        }
    }
}

impl From<DatabaseError> for RaisedError {
    fn from(error: DatabaseError) -> Self {
        Self::Database(error)
    }
}

/// Error body plus the HTTP status it is served with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedError {
    pub error: PostgrestError,
    pub status: u16,
}

struct MessageRule {
    pattern: Regex,
    code: &'static str,
    status: u16,
}

fn rule(pattern: &str, code: &'static str, status: u16) -> MessageRule {
    MessageRule {
        pattern: Regex::new(pattern).expect("valid error rule regex"),
        code,
        status,
    }
}

const MISSING_RELATION: &str = "42P01";

/// First match wins
static MESSAGE_RULES: Lazy<Vec<MessageRule>> = Lazy::new(|| {
    vec![
        rule(r"(?i)relation .*does not exist", MISSING_RELATION, 404),
        rule(r"(?i)column .*does not exist", "42703", 400),
        rule(r"(?i)duplicate key", "23505", 409),
        rule(r"(?i)foreign key", "23503", 409),
        rule(r"(?i)not[ -]null", "23502", 400),
        rule(r"(?i)permission denied|insufficient privilege", "42501", 403),
        rule(r"(?i)function .*does not exist", "PGRST202", 404),
        rule(r"Invalid (limit|offset) parameter", "PGRST100", 400),
        rule(r"JWT", "PGRST301", 401),
        rule(r"Authentication required", "PGRST302", 401),
    ]
});

/// HTTP status for a SQLSTATE reported by the database
pub fn status_for_sqlstate(code: &str) -> u16 {
    match code {
        "42P01" | "42P02" => 404,
        "42703" | "42883" | "42P18" | "42601" | "23502" => 400,
        "42501" => 403,
        "23505" | "23503" | "23514" => 409,
        "08000" | "08003" | "08006" | "53300" => 503,
        "57014" => 408,
        _ => 400,
    }
}

/// Map a raised error to its PostgREST body and status
pub fn map_error(raised: &RaisedError) -> MappedError {
    match raised {
        RaisedError::Database(db) => MappedError {
            error: PostgrestError {
                code: db.code.clone(),
                message: db.message.clone(),
                details: db.detail.clone(),
                hint: db.hint.clone(),
            },
            status: status_for_sqlstate(&db.code),
        },
        RaisedError::Exception { message, stack } => map_exception(message, stack.as_deref()),
        RaisedError::Message(message) => MappedError {
            error: PostgrestError::new("PGRST100", message.clone()),
            status: 400,
        },
        RaisedError::Opaque => MappedError {
            error: PostgrestError::new("PGRST000", "An unexpected error occurred"),
            status: 500,
        },
    }
}

fn map_exception(message: &str, stack: Option<&str>) -> MappedError {
    let (code, status) = if lost_missing_relation(message, stack) {
        (MISSING_RELATION, 404)
    } else {
        MESSAGE_RULES
            .iter()
            .find(|rule| rule.pattern.is_match(message))
            .map_or(("PGRST100", 400), |rule| (rule.code, rule.status))
    };

    MappedError {
        error: PostgrestError::new(code, message),
        status,
    }
}

/// Known heuristic: some engines replace a missing-relation error with a
/// generic failure, leaving only the stack to tell. Checked before the
/// ordered rules so it ranks with the relation rule.
fn lost_missing_relation(message: &str, stack: Option<&str>) -> bool {
    message.contains("Database query failed") && stack.is_some_and(|s| s.contains("relation"))
}
