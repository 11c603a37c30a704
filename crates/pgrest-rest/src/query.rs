//! Query string parsing for PostgREST-compatible requests

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use pgrest_common::error::{Error, Result};

use crate::filter::{
    parse_filter_tolerant, parse_logical, parse_not_call, parse_not_param, FilterOutcome,
    ParsedFilter, SkippedFilter,
};
use crate::headers::{
    CountMode, Preferences, RequestHeaders, Resolution, ReturnPreference, SINGLE_OBJECT_MEDIA_TYPE,
};
use crate::logging::{ParseLogger, TracingLogger};
use crate::operators::Operator;
use crate::scan::split_top_level;
use crate::select::parse_select;

static ORDER_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+)\.(asc|desc)\.(nullsfirst|nullslast)$").expect("valid order regex")
});
static ORDER_DIRECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\.(asc|desc)$").expect("valid order regex"));
static ORDER_NULLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\.(nullsfirst|nullslast)$").expect("valid order regex"));
static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:items=)?(\d+)-(\d*)$").expect("valid range regex"));

/// Order clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOrder {
    pub column: String,
    pub ascending: bool,
    /// `None` keeps the database default placement
    pub nulls_first: Option<bool>,
}

/// Embedded/nested resource for foreign key expansion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedResource {
    pub table: String,
    pub alias: Option<String>,
    pub fk_hint: Option<String>,
    pub select: Vec<String>,
    pub column_aliases: BTreeMap<String, String>,
    pub embedded: Vec<EmbeddedResource>,
    pub filters: Vec<ParsedFilter>,
    pub order: Vec<ParsedOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EmbeddedResource {
    /// Prefix of the resource's flattened columns in result rows
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn answers_to(&self, name: &str) -> bool {
        self.response_key() == name || self.table == name
    }
}

/// Parsed request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Top-level columns; empty when the request names none
    pub select: Vec<String>,
    pub column_aliases: BTreeMap<String, String>,
    pub filters: Vec<ParsedFilter>,
    pub order: Vec<ParsedOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub embedded: Vec<EmbeddedResource>,
    pub count: Option<CountMode>,
    pub prefer_return: Option<ReturnPreference>,
    pub prefer_resolution: Option<Resolution>,
    pub return_single: bool,
    pub on_conflict: Option<Vec<String>>,
    pub schema: Option<String>,
}

impl ParsedQuery {
    /// True when the request asked for a row window
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }
}

/// Parse result plus the filters dropped on the way
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport {
    pub query: ParsedQuery,
    pub skipped: Vec<SkippedFilter>,
}

/// Turns `(url, headers)` into a [`ParsedQuery`]
#[derive(Clone)]
pub struct QueryParser {
    logger: Arc<dyn ParseLogger>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryParser").finish_non_exhaustive()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger))
    }

    pub fn with_logger(logger: Arc<dyn ParseLogger>) -> Self {
        Self { logger }
    }

    /// Parse a request URL (absolute, or path with query string).
    ///
    /// # Errors
    /// Unknown operators, invalid `limit`/`offset`, malformed select or
    /// logic trees. Filters with uncoercible values are dropped and logged.
    pub fn parse(&self, url: &str, headers: &RequestHeaders) -> Result<ParsedQuery> {
        self.parse_report(url, headers).map(|report| report.query)
    }

    /// [`parse`](Self::parse) on a bare query string (no `?`).
    ///
    /// # Errors
    /// See [`parse`](Self::parse).
    pub fn parse_query_string(&self, query: &str, headers: &RequestHeaders) -> Result<ParsedQuery> {
        self.parse_pairs(query, headers).map(|report| report.query)
    }

    /// Like [`parse`](Self::parse) but also returns the dropped filters.
    ///
    /// # Errors
    /// See [`parse`](Self::parse).
    pub fn parse_report(&self, url: &str, headers: &RequestHeaders) -> Result<ParseReport> {
        let query = url.split_once('?').map_or("", |(_, query)| query);
        self.parse_pairs(query, headers)
    }

    fn parse_pairs(&self, query: &str, headers: &RequestHeaders) -> Result<ParseReport> {
        let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let mut parsed = ParsedQuery::default();
        let mut skipped = Vec::new();

        // select first: scoped parameters refer to its embedded resources
        if let Some((_, select)) = params.iter().rev().find(|(key, _)| key == "select") {
            let clause = parse_select(select)?;
            parsed.select = clause.columns;
            parsed.column_aliases = clause.column_aliases;
            parsed.embedded = clause.embedded;
        }

        let mut limit = None;
        let mut offset = None;

        for (key, value) in &params {
            match key.as_str() {
                "select" => {}
                "order" => parsed.order = parse_order(value),
                "limit" => limit = Some(value.as_str()),
                "offset" => offset = Some(value.as_str()),
                "on_conflict" => {
                    parsed.on_conflict = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|column| !column.is_empty())
                            .map(ToString::to_string)
                            .collect(),
                    );
                }
                _ => {
                    if let Some((path, name)) = scoped_target(&parsed.embedded, key) {
                        if let Some(resource) = find_embedded_mut(&mut parsed.embedded, &path) {
                            apply_scoped(resource, name, value, &mut skipped)?;
                            continue;
                        }
                    }
                    if let Some(filter) = parse_filter_param(key, value, &mut skipped)? {
                        parsed.filters.push(filter);
                    }
                }
            }
        }

        if limit.is_some() || offset.is_some() {
            parsed.limit = limit.map(parse_limit).transpose()?;
            parsed.offset = offset.map(parse_offset).transpose()?;
        } else if let Some(range) = headers.get("range") {
            let (range_offset, range_limit) = parse_range_header(range)?;
            parsed.offset = range_offset;
            parsed.limit = range_limit;
        }

        apply_headers(&mut parsed, headers);

        for filter in &skipped {
            self.logger.filter_skipped(filter);
        }

        Ok(ParseReport {
            query: parsed,
            skipped,
        })
    }
}

/// Filter-position parameter: logical groups, `not=`, `not(...)` keys and
/// ordinary `column=op.value` pairs. `Ok(None)` means the filter was dropped.
fn parse_filter_param(
    key: &str,
    value: &str,
    skipped: &mut Vec<SkippedFilter>,
) -> Result<Option<ParsedFilter>> {
    match key {
        "or" => return parse_logical(Operator::Or, value, false, skipped).map(Some),
        "and" => return parse_logical(Operator::And, value, false, skipped).map(Some),
        "not.or" => return parse_logical(Operator::Or, value, true, skipped).map(Some),
        "not.and" => return parse_logical(Operator::And, value, true, skipped).map(Some),
        "not" => {
            return match parse_not_param(value) {
                Ok(filter) => Ok(Some(filter)),
                Err(Error::InvalidFilter(reason)) => {
                    skipped.push(SkippedFilter {
                        key: key.to_string(),
                        value: value.to_string(),
                        reason,
                    });
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        }
        _ => {}
    }

    if key.starts_with("not(") {
        match parse_not_call(key) {
            Ok(Some(filter)) => return Ok(Some(filter)),
            Ok(None) => {}
            Err(Error::InvalidFilter(reason)) => {
                skipped.push(SkippedFilter {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason,
                });
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }

    match parse_filter_tolerant(key, value)? {
        FilterOutcome::Parsed(filter) => Ok(Some(filter)),
        FilterOutcome::Skipped(skip) => {
            skipped.push(skip);
            Ok(None)
        }
    }
}

/// `<resource>[.<resource>...].<name>` where the prefix names an embedded
/// resource. Longest matching prefix wins.
fn scoped_target<'k>(
    embedded: &[EmbeddedResource],
    key: &'k str,
) -> Option<(Vec<&'k str>, &'k str)> {
    if embedded.is_empty() || !key.contains('.') {
        return None;
    }

    let segments: Vec<&str> = key.split('.').collect();
    for split in (1..segments.len()).rev() {
        let path = &segments[..split];
        if find_embedded(embedded, path).is_some() {
            let prefix_len: usize = path.iter().map(|s| s.len() + 1).sum();
            return Some((path.to_vec(), &key[prefix_len..]));
        }
    }
    None
}

fn find_embedded<'a>(resources: &'a [EmbeddedResource], path: &[&str]) -> Option<&'a EmbeddedResource> {
    let (first, rest) = path.split_first()?;
    let resource = resources.iter().find(|r| r.answers_to(first))?;
    if rest.is_empty() {
        Some(resource)
    } else {
        find_embedded(&resource.embedded, rest)
    }
}

fn find_embedded_mut<'a>(
    resources: &'a mut [EmbeddedResource],
    path: &[&str],
) -> Option<&'a mut EmbeddedResource> {
    let (first, rest) = path.split_first()?;
    let resource = resources.iter_mut().find(|r| r.answers_to(first))?;
    if rest.is_empty() {
        Some(resource)
    } else {
        find_embedded_mut(&mut resource.embedded, rest)
    }
}

fn apply_scoped(
    resource: &mut EmbeddedResource,
    name: &str,
    value: &str,
    skipped: &mut Vec<SkippedFilter>,
) -> Result<()> {
    match name {
        "limit" => resource.limit = Some(parse_limit(value)?),
        "offset" => resource.offset = Some(parse_offset(value)?),
        "order" => resource.order = parse_order(value),
        _ => {
            if let Some(filter) = parse_filter_param(name, value, skipped)? {
                resource.filters.push(filter);
            }
        }
    }
    Ok(())
}

/// Parse an `order` value: `column[.asc|.desc][.nullsfirst|.nullslast]`,
/// comma separated.
pub fn parse_order(value: &str) -> Vec<ParsedOrder> {
    split_top_level(value)
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(parse_order_item)
        .collect()
}

fn parse_order_item(item: &str) -> ParsedOrder {
    let order = |column: &str, direction: Option<&str>, nulls: Option<&str>| ParsedOrder {
        column: column.to_string(),
        ascending: direction != Some("desc"),
        nulls_first: nulls.map(|n| n == "nullsfirst"),
    };

    if let Some(caps) = ORDER_FULL.captures(item) {
        return order(&caps[1], Some(&caps[2]), Some(&caps[3]));
    }
    if let Some(caps) = ORDER_DIRECTION.captures(item) {
        return order(&caps[1], Some(&caps[2]), None);
    }
    if let Some(caps) = ORDER_NULLS.captures(item) {
        return order(&caps[1], None, Some(&caps[2]));
    }
    order(item, None, None)
}

/// # Errors
/// `Error::InvalidLimit` unless `value` is a non-negative integer.
pub fn parse_limit(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidLimit(value.to_string()))
}

/// # Errors
/// `Error::InvalidOffset` unless `value` is a non-negative integer.
pub fn parse_offset(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidOffset(value.to_string()))
}

/// `Range: start-end` to `(offset, limit)`. Malformed headers and inverted
/// ranges are ignored.
fn parse_range_header(range: &str) -> Result<(Option<usize>, Option<usize>)> {
    let Some(caps) = RANGE.captures(range.trim()) else {
        debug!(range = %range, "Ignoring malformed Range header");
        return Ok((None, None));
    };

    let start = parse_offset(&caps[1])?;
    if caps[2].is_empty() {
        return Ok((Some(start), None));
    }

    let end: usize = caps[2]
        .parse()
        .map_err(|_| Error::InvalidLimit(caps[2].to_string()))?;
    if end < start {
        debug!(range = %range, "Ignoring inverted Range header");
        return Ok((None, None));
    }

    let limit = (end - start)
        .checked_add(1)
        .ok_or_else(|| Error::InvalidLimit(range.to_string()))?;
    Ok((Some(start), Some(limit)))
}

fn apply_headers(parsed: &mut ParsedQuery, headers: &RequestHeaders) {
    if let Some(prefer) = headers.get("prefer") {
        let prefs = Preferences::parse(prefer);
        parsed.prefer_return = prefs.return_preference;
        parsed.prefer_resolution = prefs.resolution;
        parsed.count = prefs.count;
    }

    if let Some(accept) = headers.get("accept") {
        parsed.return_single = accept.to_ascii_lowercase().contains(SINGLE_OBJECT_MEDIA_TYPE);
    }

    parsed.schema = ["accept-profile", "content-profile"]
        .iter()
        .filter_map(|name| headers.get(name))
        .map(str::trim)
        .find(|schema| !schema.is_empty())
        .map(ToString::to_string);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::FilterValue;

    fn parse(query: &str) -> Result<ParsedQuery> {
        QueryParser::new().parse_query_string(query, &RequestHeaders::new())
    }

    #[test]
    fn test_parse_url_with_path() {
        let query = QueryParser::new()
            .parse("http://localhost/rest/v1/users?select=id,name&limit=5", &RequestHeaders::new())
            .unwrap();
        assert_eq!(query.select, vec!["id", "name"]);
        assert_eq!(query.limit, Some(5));

        let query = QueryParser::new().parse("/users", &RequestHeaders::new()).unwrap();
        assert_eq!(query, ParsedQuery::default());
    }

    #[test]
    fn test_parse_order() {
        let query = parse("order=name.asc,created_at.desc.nullslast").unwrap();
        assert_eq!(
            query.order,
            vec![
                ParsedOrder {
                    column: "name".to_string(),
                    ascending: true,
                    nulls_first: None,
                },
                ParsedOrder {
                    column: "created_at".to_string(),
                    ascending: false,
                    nulls_first: Some(false),
                },
            ]
        );
    }

    #[test]
    fn test_order_defaults() {
        let orders = parse_order("name, rank.nullsfirst");
        assert!(orders[0].ascending);
        assert_eq!(orders[0].nulls_first, None);
        assert_eq!(orders[1].column, "rank");
        assert!(orders[1].ascending);
        assert_eq!(orders[1].nulls_first, Some(true));
    }

    #[test]
    fn test_parse_limit_offset() {
        let query = parse("limit=10&offset=5").unwrap();
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
    }

    #[test]
    fn test_invalid_limit_names_parameter() {
        let err = parse("limit=-1").unwrap_err();
        assert!(matches!(err, Error::InvalidLimit(_)));
        assert_eq!(err.to_string(), "Invalid limit parameter: -1");

        let err = parse("limit=abc").unwrap_err();
        assert_eq!(err.to_string(), "Invalid limit parameter: abc");

        let err = parse("offset=1.5").unwrap_err();
        assert_eq!(err.to_string(), "Invalid offset parameter: 1.5");
    }

    #[test]
    fn test_range_header() {
        let headers = RequestHeaders::new().with("Range", "0-9");
        let query = QueryParser::new().parse_query_string("", &headers).unwrap();
        assert_eq!(query.offset, Some(0));
        assert_eq!(query.limit, Some(10));

        let headers = RequestHeaders::new().with("range", "items=20-");
        let query = QueryParser::new().parse_query_string("", &headers).unwrap();
        assert_eq!(query.offset, Some(20));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_query_params_win_over_range() {
        let headers = RequestHeaders::new().with("Range", "0-9");
        let query = QueryParser::new().parse_query_string("limit=3", &headers).unwrap();
        assert_eq!(query.limit, Some(3));
        assert_eq!(query.offset, None);
    }

    #[test]
    fn test_range_overflow_is_a_parse_error() {
        let headers = RequestHeaders::new().with("Range", "0-18446744073709551615");
        let err = QueryParser::new().parse_query_string("", &headers).unwrap_err();
        assert!(matches!(err, Error::InvalidLimit(_)));
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_malformed_range_is_ignored() {
        for range in ["bytes=0-9", "9-0", "abc"] {
            let headers = RequestHeaders::new().with("Range", range);
            let query = QueryParser::new().parse_query_string("", &headers).unwrap();
            assert_eq!(query.limit, None, "{}", range);
            assert_eq!(query.offset, None, "{}", range);
        }
    }

    #[test]
    fn test_filters_in_order() {
        let query = parse("age=gte.18&status=in.(active,pending)&name=John").unwrap();
        assert_eq!(query.filters.len(), 3);
        assert_eq!(query.filters[0].operator, Operator::Gte);
        assert_eq!(query.filters[1].operator, Operator::In);
        assert_eq!(query.filters[2].operator, Operator::Eq);
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse("column=zz.5").unwrap_err();
        assert_eq!(err.to_string(), "Unknown operator: zz");
    }

    #[test]
    fn test_not_call_key() {
        let query = parse("not(age,gt,18)").unwrap();
        assert_eq!(query.filters.len(), 1);
        let filter = &query.filters[0];
        assert_eq!(filter.column, "age");
        assert_eq!(filter.operator, Operator::Gt);
        assert_eq!(filter.value, FilterValue::Number(18.into()));
        assert!(filter.negated);
    }

    #[test]
    fn test_logical_params() {
        let query = parse("or=(id.eq.1,name.eq.foo)&not=age.lt.18").unwrap();
        assert_eq!(query.filters.len(), 2);
        assert!(query.filters[0].is_logical());
        assert_eq!(query.filters[0].conditions().unwrap().len(), 2);
        assert!(!query.filters[1].is_logical());
        assert!(query.filters[1].negated);

        let query = parse("not.and=(a.eq.1,b.eq.2)").unwrap();
        assert!(query.filters[0].negated);
        assert_eq!(query.filters[0].operator, Operator::And);
    }

    #[test]
    fn test_on_conflict() {
        let query = parse("on_conflict=id,%20email").unwrap();
        assert_eq!(query.on_conflict, Some(vec!["id".to_string(), "email".to_string()]));
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_scoped_embedded_parameters() {
        let query = parse(
            "select=id,o:orders(id,items(sku))&o.limit=5&orders.order=id.desc&o.status=eq.shipped&o.items.offset=2&order.total=gt.1",
        )
        .unwrap();
        let orders = &query.embedded[0];
        assert_eq!(orders.limit, Some(5));
        assert_eq!(orders.order[0].column, "id");
        assert!(!orders.order[0].ascending);
        assert_eq!(orders.filters.len(), 1);
        assert_eq!(orders.filters[0].column, "status");
        assert_eq!(orders.embedded[0].offset, Some(2));

        // `order` is not an embedded resource: ordinary filter on a dotted column
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].column, "order.total");
    }

    #[test]
    fn test_invalid_scoped_limit() {
        let err = parse("select=orders(id)&orders.limit=x").unwrap_err();
        assert_eq!(err.to_string(), "Invalid limit parameter: x");
    }

    #[test]
    fn test_headers() {
        let headers = RequestHeaders::new()
            .with("prefer", "return=representation, count=exact, resolution=ignore-duplicates")
            .with("Accept", "application/vnd.pgrst.object+json")
            .with("Accept-Profile", "  api ");
        let query = QueryParser::new().parse_query_string("", &headers).unwrap();
        assert_eq!(query.prefer_return, Some(ReturnPreference::Representation));
        assert_eq!(query.prefer_resolution, Some(Resolution::IgnoreDuplicates));
        assert_eq!(query.count, Some(CountMode::Exact));
        assert!(query.return_single);
        assert_eq!(query.schema.as_deref(), Some("api"));
    }

    #[test]
    fn test_content_profile_fallback() {
        let headers = RequestHeaders::new().with("Content-Profile", "audit");
        let query = QueryParser::new().parse_query_string("", &headers).unwrap();
        assert_eq!(query.schema.as_deref(), Some("audit"));
        assert!(!query.return_single);
    }
}
