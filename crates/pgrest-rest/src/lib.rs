//! PostgREST-compatible request translation
//!
//! Turns a request URL and headers into a [`ParsedQuery`] and turns result
//! rows back into the response PostgREST clients expect:
//! - Operator table and value coercion
//! - `select` grammar with embedded resources, aliases and JSON paths
//! - Flat and logical filter trees, ordering, pagination
//! - `Prefer`, `Range`, `Accept` and profile headers
//! - Error classification into PostgREST error codes
//! - Response formatting with `Content-Range` and embedded un-flattening

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod count;
pub mod error_mapper;
pub mod filter;
pub mod headers;
pub mod http;
pub mod json_path;
pub mod logging;
pub mod operators;
pub mod query;
pub mod response;
mod scan;
pub mod select;

pub use count::{build_count_query, compute_count, CountResult, QueryExecutor, QueryRows};
pub use error_mapper::{map_error, status_for_sqlstate, MappedError, RaisedError};
pub use filter::{FilterOutcome, ParsedFilter, SkippedFilter, LOGICAL_COLUMN};
pub use headers::{CountMode, Preferences, RequestHeaders, Resolution, ReturnPreference};
pub use http::{parse_http_request, PostgrestAdapter};
pub use json_path::{JsonOperator, JsonPath};
pub use logging::{init_tracing, MemoryLogger, ParseLogger, TracingLogger};
pub use operators::{FilterValue, Operator, OperatorSpec, ValueKind};
pub use query::{EmbeddedResource, ParseReport, ParsedOrder, ParsedQuery, QueryParser};
pub use response::{FormattedResponse, Operation, ResponseFormatter};
pub use select::{parse_select, SelectClause};
