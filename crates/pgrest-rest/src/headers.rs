//! Request header access and `Prefer` directive parsing

use std::collections::BTreeMap;

use tracing::debug;

/// Media type requesting a single JSON object instead of an array
pub const SINGLE_OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Case-insensitive view over the request headers the parser consumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: BTreeMap<String, String>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. Repeated names are joined with `", "` as HTTP allows.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let value = value.into();
        self.entries
            .entry(name.as_ref().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// `Prefer: count=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

impl CountMode {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "exact" => Some(Self::Exact),
            "planned" => Some(Self::Planned),
            "estimated" => Some(Self::Estimated),
            _ => None,
        }
    }

    /// Planned and estimated counts come from the planner, not a scan
    pub fn is_estimate(self) -> bool {
        !matches!(self, Self::Exact)
    }
}

/// `Prefer: return=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPreference {
    Representation,
    Minimal,
    HeadersOnly,
}

impl ReturnPreference {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "representation" => Some(Self::Representation),
            "minimal" => Some(Self::Minimal),
            "headers-only" => Some(Self::HeadersOnly),
            _ => None,
        }
    }
}

/// `Prefer: resolution=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MergeDuplicates,
    IgnoreDuplicates,
}

impl Resolution {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "merge-duplicates" => Some(Self::MergeDuplicates),
            "ignore-duplicates" => Some(Self::IgnoreDuplicates),
            _ => None,
        }
    }
}

/// Recognised `Prefer` directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    pub return_preference: Option<ReturnPreference>,
    pub resolution: Option<Resolution>,
    pub count: Option<CountMode>,
}

impl Preferences {
    /// Parse a `Prefer` header value. Unrecognised directives are ignored.
    pub fn parse(header: &str) -> Self {
        let mut prefs = Self::default();

        for directive in header.split(',') {
            let directive = directive.trim().to_lowercase();
            let Some((name, value)) = directive.split_once('=') else {
                continue;
            };
            let value = value.trim();

            let recognised = match name.trim() {
                "return" => {
                    prefs.return_preference = ReturnPreference::from_token(value);
                    prefs.return_preference.is_some()
                }
                "resolution" => {
                    prefs.resolution = Resolution::from_token(value);
                    prefs.resolution.is_some()
                }
                "count" => {
                    prefs.count = CountMode::from_token(value);
                    prefs.count.is_some()
                }
                _ => false,
            };

            if !recognised {
                debug!(directive = %directive, "Ignoring Prefer directive");
            }
        }

        prefs
    }
}
