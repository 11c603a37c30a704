//! JSON path column expressions (`data->key`, `data->>key`, `data#>{a,b}`,
//! `data#>>{a,b}`)

use once_cell::sync::Lazy;
use regex::Regex;

static JSON_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)(->>|->|#>>|#>)(.+)$").expect("valid json path regex"));

/// JSON access operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonOperator {
    /// `->` json value by key/index
    Arrow,
    /// `->>` text value by key/index
    DoubleArrow,
    /// `#>` json value at path
    HashArrow,
    /// `#>>` text value at path
    HashDoubleArrow,
}

impl JsonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            JsonOperator::Arrow => "->",
            JsonOperator::DoubleArrow => "->>",
            JsonOperator::HashArrow => "#>",
            JsonOperator::HashDoubleArrow => "#>>",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "->" => Some(JsonOperator::Arrow),
            "->>" => Some(JsonOperator::DoubleArrow),
            "#>" => Some(JsonOperator::HashArrow),
            "#>>" => Some(JsonOperator::HashDoubleArrow),
            _ => None,
        }
    }

    /// `#>`/`#>>` take a `{a,b}` path literal
    pub fn is_path_literal(self) -> bool {
        matches!(self, JsonOperator::HashArrow | JsonOperator::HashDoubleArrow)
    }
}

/// Decomposed JSON path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    pub column_name: String,
    pub json_operator: JsonOperator,
    pub path: String,
}

impl JsonPath {
    /// Recognise `column<op>path`; `None` for ordinary column names.
    pub fn parse(expression: &str) -> Option<Self> {
        let caps = JSON_PATH.captures(expression.trim())?;
        Some(Self {
            column_name: caps.get(1)?.as_str().to_string(),
            json_operator: JsonOperator::from_token(caps.get(2)?.as_str())?,
            path: caps.get(3)?.as_str().to_string(),
        })
    }

    /// Response key used when the select item carries no explicit alias:
    /// the last key of an arrow chain, or the last element of a `{...}`
    /// path literal.
    pub fn default_alias(&self) -> String {
        let path = self.path.split("::").next().unwrap_or(&self.path);

        let last = if self.json_operator.is_path_literal() {
            let inner = path.trim().trim_start_matches('{').trim_end_matches('}');
            inner.rsplit(',').next().unwrap_or(inner)
        } else {
            path.rsplit("->").next().unwrap_or(path).trim_start_matches('>')
        };

        last.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
    }
}
