//! Configuration types for the pgrest translation layer

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// REST (PostgREST-compatible) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Schema used when the request carries no profile header
    pub default_schema: String,
    /// CORS headers attached to every response
    pub cors: CorsConfig,
    /// Logging setup
    pub logging: LoggingConfig,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            default_schema: "public".to_string(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RestConfig {
    /// Parse a TOML document into a configuration
    ///
    /// # Errors
    /// Returns `Error::Config` if the document is not valid TOML or does not
    /// match the configuration shape.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

/// CORS policy for REST responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: Vec<String>,
    pub allow_headers: String,
    pub expose_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: ["GET", "POST", "PATCH", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            allow_headers: "*".to_string(),
            expose_headers: vec!["Content-Range".to_string()],
        }
    }
}

impl CorsConfig {
    /// `Access-Control-Expose-Headers` value
    pub fn expose_header_value(&self) -> String {
        self.expose_headers.join(", ")
    }

    /// Full CORS header set, as attached to error responses
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Access-Control-Allow-Origin", self.allow_origin.clone()),
            ("Access-Control-Allow-Methods", self.allow_methods.join(", ")),
            ("Access-Control-Allow-Headers", self.allow_headers.clone()),
            ("Access-Control-Expose-Headers", self.expose_header_value()),
        ]
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
