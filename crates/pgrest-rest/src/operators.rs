//! Filter operator table
//!
//! Single source of truth mapping PostgREST operator tokens to the rule used
//! to coerce the raw value that follows them.

use serde_json::{Number, Value};

use once_cell::sync::Lazy;
use regex::Regex;

use pgrest_common::error::{Error, Result};

use crate::filter::ParsedFilter;
use crate::scan::{split_top_level, strip_enclosing_parens, unquote};

/// Filter operators matching PostgREST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,     // equals
    Neq,    // not equals
    Gt,     // greater than
    Gte,    // greater than or equal
    Lt,     // less than
    Lte,    // less than or equal
    Like,   // LIKE
    Ilike,  // ILIKE (case-insensitive)
    Match,  // ~ (regex)
    Imatch, // ~* (case-insensitive regex)
    In,     // IN
    Is,     // IS (for NULL, TRUE, FALSE, UNKNOWN)
    Cs,     // contains (@>)
    Cd,     // contained by (<@)
    Ov,     // overlaps (&&)
    Sl,     // strictly left (<<)
    Sr,     // strictly right (>>)
    Nxl,    // not extends right (&<)
    Nxr,    // not extends left (&>)
    Adj,    // adjacent (-|-)
    Fts,    // full-text search (@@ to_tsquery)
    Plfts,  // plain full-text search
    Phfts,  // phrase full-text search
    Wfts,   // websearch full-text search
    And,    // logical AND group
    Or,     // logical OR group
}

/// How the raw text after `operator.` is turned into a [`FilterValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// null / boolean / number / string
    Scalar,
    /// LIKE and regex patterns, kept verbatim (`*` stays `*`)
    Pattern,
    /// `(a,b,c)` list
    List,
    /// `null`, `true`, `false`, `unknown`
    Is,
    /// `{a,b}` array literal, JSON document or range
    Containment,
    /// `[lower,upper)` range literal
    Range,
    /// Text-search query, optionally with a `(config)` on the operator
    TextSearch,
    /// Nested condition list, only produced by `and=`/`or=`
    Logical,
}

/// Static description of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorSpec {
    pub operator: Operator,
    pub token: &'static str,
    pub sql: &'static str,
    pub kind: ValueKind,
}

/// Coerced filter value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<String>),
    Json(Value),
    Range {
        lower: String,
        upper: String,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
    Search {
        config: Option<String>,
        query: String,
    },
    Conditions(Vec<ParsedFilter>),
}

impl Operator {
    /// Every operator a filter value may name
    pub const FILTERS: [Operator; 24] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Like,
        Operator::Ilike,
        Operator::Match,
        Operator::Imatch,
        Operator::In,
        Operator::Is,
        Operator::Cs,
        Operator::Cd,
        Operator::Ov,
        Operator::Sl,
        Operator::Sr,
        Operator::Nxl,
        Operator::Nxr,
        Operator::Adj,
        Operator::Fts,
        Operator::Plfts,
        Operator::Phfts,
        Operator::Wfts,
    ];

    /// Look up a filter operator token. Logical group names are not filter
    /// operators and are never returned.
    pub fn lookup(token: &str) -> Option<OperatorSpec> {
        let operator = match token {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "like" => Operator::Like,
            "ilike" => Operator::Ilike,
            "match" => Operator::Match,
            "imatch" => Operator::Imatch,
            "in" => Operator::In,
            "is" => Operator::Is,
            "cs" => Operator::Cs,
            "cd" => Operator::Cd,
            "ov" => Operator::Ov,
            "sl" => Operator::Sl,
            "sr" => Operator::Sr,
            "nxl" => Operator::Nxl,
            "nxr" => Operator::Nxr,
            "adj" => Operator::Adj,
            "fts" => Operator::Fts,
            "plfts" => Operator::Plfts,
            "phfts" => Operator::Phfts,
            "wfts" => Operator::Wfts,
            _ => return None,
        };
        Some(operator.spec())
    }

    pub fn spec(self) -> OperatorSpec {
        let (token, sql, kind) = match self {
            Operator::Eq => ("eq", "=", ValueKind::Scalar),
            Operator::Neq => ("neq", "<>", ValueKind::Scalar),
            Operator::Gt => ("gt", ">", ValueKind::Scalar),
            Operator::Gte => ("gte", ">=", ValueKind::Scalar),
            Operator::Lt => ("lt", "<", ValueKind::Scalar),
            Operator::Lte => ("lte", "<=", ValueKind::Scalar),
            Operator::Like => ("like", "LIKE", ValueKind::Pattern),
            Operator::Ilike => ("ilike", "ILIKE", ValueKind::Pattern),
            Operator::Match => ("match", "~", ValueKind::Pattern),
            Operator::Imatch => ("imatch", "~*", ValueKind::Pattern),
            Operator::In => ("in", "IN", ValueKind::List),
            Operator::Is => ("is", "IS", ValueKind::Is),
            Operator::Cs => ("cs", "@>", ValueKind::Containment),
            Operator::Cd => ("cd", "<@", ValueKind::Containment),
            Operator::Ov => ("ov", "&&", ValueKind::Containment),
            Operator::Sl => ("sl", "<<", ValueKind::Range),
            Operator::Sr => ("sr", ">>", ValueKind::Range),
            Operator::Nxl => ("nxl", "&<", ValueKind::Range),
            Operator::Nxr => ("nxr", "&>", ValueKind::Range),
            Operator::Adj => ("adj", "-|-", ValueKind::Range),
            Operator::Fts => ("fts", "@@", ValueKind::TextSearch),
            Operator::Plfts => ("plfts", "@@", ValueKind::TextSearch),
            Operator::Phfts => ("phfts", "@@", ValueKind::TextSearch),
            Operator::Wfts => ("wfts", "@@", ValueKind::TextSearch),
            Operator::And => ("and", "AND", ValueKind::Logical),
            Operator::Or => ("or", "OR", ValueKind::Logical),
        };
        OperatorSpec {
            operator: self,
            token,
            sql,
            kind,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().token
    }
}

static SEARCH_CONFIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]+)\(([A-Za-z0-9_]+)\)$").expect("valid search config regex"));

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$").expect("valid number regex")
});

/// Coerce `raw` according to the rule of `token`.
///
/// `token` may carry a text-search configuration (`fts(english)`).
///
/// # Errors
/// `Error::UnknownOperator` when the token is not in the table,
/// `Error::InvalidFilter` when the value does not fit the operator.
pub fn parse_operator_value(token: &str, raw: &str) -> Result<(Operator, FilterValue)> {
    let (name, config) = match SEARCH_CONFIG.captures(token) {
        Some(caps) => (caps.get(1).map_or("", |m| m.as_str()), caps.get(2).map(|m| m.as_str().to_string())),
        None => (token, None),
    };

    let spec = Operator::lookup(name).ok_or_else(|| Error::UnknownOperator(token.to_string()))?;
    if config.is_some() && spec.kind != ValueKind::TextSearch {
        return Err(Error::UnknownOperator(token.to_string()));
    }

    let value = match spec.kind {
        ValueKind::Scalar => coerce_scalar(raw),
        ValueKind::Pattern => FilterValue::Text(raw.to_string()),
        ValueKind::List => FilterValue::List(parse_list(spec.token, raw)?),
        ValueKind::Is => parse_is(raw)?,
        ValueKind::Containment => parse_containment(spec.token, raw)?,
        ValueKind::Range => parse_range(spec.token, raw)?,
        ValueKind::TextSearch => FilterValue::Search {
            config,
            query: raw.to_string(),
        },
        ValueKind::Logical => {
            return Err(Error::UnknownOperator(token.to_string()));
        }
    };

    Ok((spec.operator, value))
}

/// Bare values: `null`, booleans and canonical numbers are typed, anything
/// else is text. Leading zeros (`007`) stay text.
pub fn coerce_scalar(raw: &str) -> FilterValue {
    match raw {
        "null" => return FilterValue::Null,
        "true" => return FilterValue::Bool(true),
        "false" => return FilterValue::Bool(false),
        _ => {}
    }

    if NUMBER.is_match(raw) {
        if let Ok(n) = raw.parse::<i64>() {
            return FilterValue::Number(n.into());
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return FilterValue::Number(n);
        }
    }

    FilterValue::Text(raw.to_string())
}

fn parse_list(token: &str, raw: &str) -> Result<Vec<String>> {
    let raw = raw.trim();
    if !(raw.starts_with('(') && raw.ends_with(')')) {
        return Err(Error::InvalidFilter(format!(
            "{} expects a parenthesized list, got '{}'",
            token, raw
        )));
    }
    Ok(split_items(&raw[1..raw.len() - 1]))
}

fn split_items(inner: &str) -> Vec<String> {
    split_top_level(inner)
        .iter()
        .map(|item| unquote(item))
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_is(raw: &str) -> Result<FilterValue> {
    match raw.to_lowercase().as_str() {
        "null" => Ok(FilterValue::Null),
        "true" => Ok(FilterValue::Bool(true)),
        "false" => Ok(FilterValue::Bool(false)),
        "unknown" => Ok(FilterValue::Text("unknown".to_string())),
        _ => Err(Error::InvalidFilter(format!("Invalid IS value: {}", raw))),
    }
}

fn parse_containment(token: &str, raw: &str) -> Result<FilterValue> {
    let raw = raw.trim();

    if raw.starts_with('{') && raw.ends_with('}') {
        if let Ok(json @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
            return Ok(FilterValue::Json(json));
        }
        return Ok(FilterValue::List(split_items(&raw[1..raw.len() - 1])));
    }

    if raw.starts_with('[') {
        if let Ok(json @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
            return Ok(FilterValue::Json(json));
        }
    }

    if raw.starts_with('(') && raw.ends_with(')') && token != "ov" {
        return Ok(FilterValue::List(split_items(&raw[1..raw.len() - 1])));
    }

    parse_range(token, raw)
}

fn parse_range(token: &str, raw: &str) -> Result<FilterValue> {
    let raw = raw.trim();
    let lower_inclusive = match raw.chars().next() {
        Some('[') => true,
        Some('(') => false,
        _ => return Err(invalid_range(token, raw)),
    };
    let upper_inclusive = match raw.chars().last() {
        Some(']') => true,
        Some(')') if raw.len() > 1 => false,
        _ => return Err(invalid_range(token, raw)),
    };

    let bounds: Vec<String> = split_top_level(strip_enclosing_parens(&raw[1..raw.len() - 1]))
        .iter()
        .map(|b| unquote(b))
        .collect();
    match bounds.as_slice() {
        [lower, upper] => Ok(FilterValue::Range {
            lower: lower.clone(),
            upper: upper.clone(),
            lower_inclusive,
            upper_inclusive,
        }),
        _ => Err(invalid_range(token, raw)),
    }
}

fn invalid_range(token: &str, raw: &str) -> Error {
    Error::InvalidFilter(format!("{} expects a two-bound range, got '{}'", token, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_covers_every_filter_operator() {
        for op in Operator::FILTERS {
            let spec = Operator::lookup(op.as_str()).unwrap();
            assert_eq!(spec.operator, op);
        }
        assert!(Operator::lookup("and").is_none());
        assert!(Operator::lookup("zz").is_none());
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse_operator_value("zz", "5").unwrap_err();
        assert_eq!(err.to_string(), "Unknown operator: zz");
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(parse_operator_value("gt", "18").unwrap().1, FilterValue::Number(18.into()));
        assert_eq!(
            parse_operator_value("eq", "1.5").unwrap().1,
            FilterValue::Number(Number::from_f64(1.5).unwrap())
        );
        assert_eq!(parse_operator_value("eq", "true").unwrap().1, FilterValue::Bool(true));
        assert_eq!(parse_operator_value("eq", "null").unwrap().1, FilterValue::Null);
        assert_eq!(
            parse_operator_value("eq", "007").unwrap().1,
            FilterValue::Text("007".to_string())
        );
    }

    #[test]
    fn test_like_keeps_wildcard() {
        let (op, value) = parse_operator_value("ilike", "*son").unwrap();
        assert_eq!(op, Operator::Ilike);
        assert_eq!(value, FilterValue::Text("*son".to_string()));
    }

    #[test]
    fn test_in_list() {
        let (_, value) = parse_operator_value("in", r#"(a,"b,c",d)"#).unwrap();
        assert_eq!(
            value,
            FilterValue::List(vec!["a".to_string(), "b,c".to_string(), "d".to_string()])
        );
        assert!(matches!(
            parse_operator_value("in", "a,b"),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_is_values() {
        assert_eq!(parse_operator_value("is", "NULL").unwrap().1, FilterValue::Null);
        assert_eq!(parse_operator_value("is", "false").unwrap().1, FilterValue::Bool(false));
        assert!(matches!(
            parse_operator_value("is", "maybe"),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_containment() {
        assert_eq!(
            parse_operator_value("cs", "{a,b}").unwrap().1,
            FilterValue::List(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_operator_value("cd", r#"{"tier":"gold"}"#).unwrap().1,
            FilterValue::Json(json!({"tier": "gold"}))
        );
        assert!(matches!(
            parse_operator_value("ov", "[1,5)").unwrap().1,
            FilterValue::Range { lower_inclusive: true, upper_inclusive: false, .. }
        ));
    }

    #[test]
    fn test_range_operators() {
        let (_, value) = parse_operator_value("sl", "(1,10]").unwrap();
        assert_eq!(
            value,
            FilterValue::Range {
                lower: "1".to_string(),
                upper: "10".to_string(),
                lower_inclusive: false,
                upper_inclusive: true,
            }
        );
        assert!(parse_operator_value("adj", "5").is_err());
        assert!(parse_operator_value("sr", "[1,2,3]").is_err());
    }

    #[test]
    fn test_text_search_config() {
        let (op, value) = parse_operator_value("fts(english)", "fat & cat").unwrap();
        assert_eq!(op, Operator::Fts);
        assert_eq!(
            value,
            FilterValue::Search {
                config: Some("english".to_string()),
                query: "fat & cat".to_string(),
            }
        );
        assert!(matches!(
            parse_operator_value("eq(english)", "x"),
            Err(Error::UnknownOperator(_))
        ));
    }
}
