//! Filter parsing: `column=op.value` parameters, logical groups
//! (`or=`, `and=`, `not=`) and the `not(column,op,value)` key form.

use once_cell::sync::Lazy;
use regex::Regex;

use pgrest_common::error::{Error, Result};

use crate::json_path::JsonPath;
use crate::operators::{coerce_scalar, parse_operator_value, FilterValue, Operator};
use crate::scan::{split_top_level, strip_enclosing_parens};

/// Synthetic column carried by logical `and`/`or` groups
pub const LOGICAL_COLUMN: &str = "__logical__";

/// An alphabetic operator token, optionally with a `(config)` suffix,
/// followed by a dot.
static OPERATOR_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([a-z]+(?:\([A-Za-z0-9_]+\))?)\.(.*)$").expect("valid operator prefix regex")
});

/// One predicate
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
    pub negated: bool,
    pub json_path: Option<JsonPath>,
}

impl ParsedFilter {
    pub fn is_logical(&self) -> bool {
        self.column == LOGICAL_COLUMN
    }

    /// Nested conditions of a logical group
    pub fn conditions(&self) -> Option<&[ParsedFilter]> {
        match &self.value {
            FilterValue::Conditions(conditions) => Some(conditions),
            _ => None,
        }
    }

    fn logical(operator: Operator, conditions: Vec<ParsedFilter>, negated: bool) -> Self {
        Self {
            column: LOGICAL_COLUMN.to_string(),
            operator,
            value: FilterValue::Conditions(conditions),
            negated,
            json_path: None,
        }
    }
}

/// A filter dropped because its value could not be coerced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFilter {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Result of parsing one filter under the partial-tolerance policy
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Parsed(ParsedFilter),
    Skipped(SkippedFilter),
}

/// Parse `column=value`, where `value` is `[not.]op.rest` or a bare value
/// (implicit `eq`).
///
/// # Errors
/// `Error::UnknownOperator` for an unrecognised operator token and
/// `Error::InvalidFilter` when the value does not fit the operator.
pub fn parse_filter(column: &str, raw: &str) -> Result<ParsedFilter> {
    let (negated, rest) = match raw.strip_prefix("not.") {
        Some(stripped) => (true, stripped),
        None => (false, raw),
    };

    let (operator, value) = match OPERATOR_PREFIX.captures(rest) {
        Some(caps) => {
            let token = caps.get(1).map_or("", |m| m.as_str());
            let value = caps.get(2).map_or("", |m| m.as_str());
            parse_operator_value(token, value)?
        }
        None => (Operator::Eq, coerce_scalar(rest)),
    };

    Ok(ParsedFilter {
        column: column.to_string(),
        operator,
        value,
        negated,
        json_path: JsonPath::parse(column),
    })
}

/// [`parse_filter`] with coercion failures turned into a skipped outcome.
/// Unknown operators still fail the whole request.
///
/// # Errors
/// Every error other than `Error::InvalidFilter`.
pub fn parse_filter_tolerant(column: &str, raw: &str) -> Result<FilterOutcome> {
    match parse_filter(column, raw) {
        Ok(filter) => Ok(FilterOutcome::Parsed(filter)),
        Err(Error::InvalidFilter(reason)) => Ok(FilterOutcome::Skipped(SkippedFilter {
            key: column.to_string(),
            value: raw.to_string(),
            reason,
        })),
        Err(e) => Err(e),
    }
}

/// Parse the value of an `and=`/`or=` parameter into one logical entry.
/// Conditions whose value cannot be coerced are pushed to `skipped`.
///
/// # Errors
/// Unknown operators and malformed condition syntax.
pub fn parse_logical(
    operator: Operator,
    raw: &str,
    negated: bool,
    skipped: &mut Vec<SkippedFilter>,
) -> Result<ParsedFilter> {
    let already_skipped = skipped.len();
    let conditions = parse_conditions(strip_enclosing_parens(raw), skipped)?;
    if conditions.is_empty() && skipped.len() == already_skipped {
        return Err(Error::InvalidLogicalTree(format!(
            "{} requires at least one condition",
            operator.as_str()
        )));
    }
    Ok(ParsedFilter::logical(operator, conditions, negated))
}

/// Parse the value of a `not=` parameter: exactly one `column.op.value`
/// condition, returned negated.
///
/// # Errors
/// Unknown operators, malformed syntax and uncoercible values.
pub fn parse_not_param(raw: &str) -> Result<ParsedFilter> {
    let inner = strip_enclosing_parens(raw);
    let mut filter = parse_condition_leaf(inner)?;
    filter.negated = !filter.negated;
    Ok(filter)
}

/// Parse a `not(column,op,value)` parameter key into a negated filter.
/// Returns `Ok(None)` when `key` is not of that form.
///
/// # Errors
/// Unknown operators, a call with fewer than three arguments and
/// uncoercible values.
pub fn parse_not_call(key: &str) -> Result<Option<ParsedFilter>> {
    let Some(inner) = key
        .strip_prefix("not(")
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return Ok(None);
    };

    let parts: Vec<&str> = inner.splitn(3, ',').map(str::trim).collect();
    let [column, token, value] = parts.as_slice() else {
        return Err(Error::InvalidLogicalTree(format!(
            "not() expects column,operator,value, got '{}'",
            inner
        )));
    };
    if column.is_empty() {
        return Err(Error::InvalidLogicalTree(format!("not() is missing a column: '{}'", inner)));
    }

    let (operator, value) = parse_operator_value(token, value)?;
    Ok(Some(ParsedFilter {
        column: (*column).to_string(),
        operator,
        value,
        negated: true,
        json_path: JsonPath::parse(column),
    }))
}

fn parse_conditions(list: &str, skipped: &mut Vec<SkippedFilter>) -> Result<Vec<ParsedFilter>> {
    let mut conditions = Vec::new();

    for part in split_top_level(list) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some(group) = parse_nested_group(part, skipped)? {
            conditions.push(group);
            continue;
        }

        match parse_condition_leaf(part) {
            Ok(filter) => conditions.push(filter),
            Err(Error::InvalidFilter(reason)) => {
                let (key, value) = part.split_once('.').unwrap_or((part, ""));
                skipped.push(SkippedFilter {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(conditions)
}

/// `and(...)`, `or(...)`, `not.and(...)`, `not.or(...)` inside a list
fn parse_nested_group(part: &str, skipped: &mut Vec<SkippedFilter>) -> Result<Option<ParsedFilter>> {
    let (negated, rest) = match part.strip_prefix("not.") {
        Some(stripped) => (true, stripped),
        None => (false, part),
    };

    for (name, operator) in [("and", Operator::And), ("or", Operator::Or)] {
        if let Some(body) = rest.strip_prefix(name) {
            if body.starts_with('(') && strip_enclosing_parens(body) != body.trim() {
                return parse_logical(operator, body, negated, skipped).map(Some);
            }
        }
    }

    Ok(None)
}

/// `column.[not.]op.value`
fn parse_condition_leaf(condition: &str) -> Result<ParsedFilter> {
    let Some((column, rest)) = condition.split_once('.') else {
        return Err(Error::InvalidLogicalTree(format!(
            "expected column.operator.value, got '{}'",
            condition
        )));
    };
    if column.trim().is_empty() || rest.is_empty() {
        return Err(Error::InvalidLogicalTree(format!(
            "expected column.operator.value, got '{}'",
            condition
        )));
    }

    parse_filter(column.trim(), rest)
}
