//! actix-web adapter

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};

use pgrest_common::config::RestConfig;
use pgrest_common::error::{Error, Result};

use crate::error_mapper::RaisedError;
use crate::headers::RequestHeaders;
use crate::query::{ParsedQuery, QueryParser};
use crate::response::{FormattedResponse, ResponseFormatter};

impl RequestHeaders {
    /// Collect the headers of an actix request. Values that are not visible
    /// ASCII are skipped.
    pub fn from_http_request(req: &HttpRequest) -> Self {
        req.headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect()
    }
}

impl FormattedResponse {
    /// Build the actix response. 204 responses carry no body.
    pub fn into_http_response(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = HttpResponse::build(status);
        for (name, value) in &self.headers {
            builder.insert_header((name.as_str(), value.as_str()));
        }

        match self.data {
            Some(data) if status != StatusCode::NO_CONTENT => builder.body(data.to_string()),
            _ => builder.finish(),
        }
    }
}

/// Run the parser on an actix request's query string and headers.
///
/// # Errors
/// Parse errors from [`QueryParser::parse_query_string`].
pub fn parse_http_request(parser: &QueryParser, req: &HttpRequest) -> Result<ParsedQuery> {
    parser.parse_query_string(req.query_string(), &RequestHeaders::from_http_request(req))
}

/// Parser and formatter configured from a [`RestConfig`]
#[derive(Debug, Clone)]
pub struct PostgrestAdapter {
    parser: QueryParser,
    formatter: ResponseFormatter,
    default_schema: String,
}

impl PostgrestAdapter {
    pub fn new(config: &RestConfig) -> Self {
        Self {
            parser: QueryParser::new(),
            formatter: ResponseFormatter::new(config.cors.clone()),
            default_schema: config.default_schema.clone(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: QueryParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn formatter(&self) -> &ResponseFormatter {
        &self.formatter
    }

    /// Parse the request, falling back to the configured schema when no
    /// profile header names one.
    ///
    /// # Errors
    /// Parse errors; map them with [`error_response`](Self::error_response).
    pub fn parse(&self, req: &HttpRequest) -> Result<ParsedQuery> {
        let mut query = parse_http_request(&self.parser, req)?;
        if query.schema.is_none() {
            query.schema = Some(self.default_schema.clone());
        }
        Ok(query)
    }

    /// PostgREST error response for `error`
    pub fn error_response(&self, error: &Error) -> HttpResponse {
        self.formatter
            .format_error(&RaisedError::from(error), None)
            .into_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use serde_json::json;

    #[test]
    fn test_headers_from_request() {
        let req = TestRequest::default()
            .insert_header(("Prefer", "count=exact"))
            .insert_header(("Accept-Profile", "api"))
            .to_http_request();
        let headers = RequestHeaders::from_http_request(&req);
        assert_eq!(headers.get("prefer"), Some("count=exact"));
        assert_eq!(headers.get("ACCEPT-PROFILE"), Some("api"));
    }

    #[test]
    fn test_default_schema() {
        let adapter = PostgrestAdapter::new(&RestConfig::default());

        let req = TestRequest::with_uri("/users?select=id").to_http_request();
        let query = adapter.parse(&req).unwrap();
        assert_eq!(query.schema.as_deref(), Some("public"));
        assert_eq!(query.select, vec!["id"]);

        let req = TestRequest::with_uri("/users")
            .insert_header(("Accept-Profile", "api"))
            .to_http_request();
        assert_eq!(adapter.parse(&req).unwrap().schema.as_deref(), Some("api"));
    }

    #[test]
    fn test_no_content_has_no_body() {
        let response = FormattedResponse {
            data: Some(json!([])),
            status: 204,
            headers: std::collections::BTreeMap::new(),
        };
        let http = response.into_http_response();
        assert_eq!(http.status(), StatusCode::NO_CONTENT);
    }
}
