use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Key under which analyzers report the URLs a document imports.
pub const IMPORTED_URLS: &str = "imported_urls";

/// Key under which compiling analyzers report generated CSS.
pub const CSS: &str = "css";

/// Why a single analyzer call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AnalyzerFailure {
    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
}

impl AnalyzerFailure {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }
}

/// Parses a document and reports references plus any compiled artifact.
///
/// Implementations must not keep per-call state: the coordinator calls them
/// repeatedly with the same input.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        source: &str,
        base_url: &str,
    ) -> std::result::Result<AnalysisResult, AnalyzerFailure>;
}

/// Merged output of every analyzer that ran over one document revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    fields: Map<String, Value>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_imported_urls<I, S>(self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<Value> = urls.into_iter().map(|url| Value::String(url.into())).collect();
        self.with(IMPORTED_URLS, Value::Array(urls))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Shallow overlay: keys present in `other` replace ours.
    pub fn overlay(&mut self, other: AnalysisResult) {
        for (key, value) in other.fields {
            self.fields.insert(key, value);
        }
    }

    /// Imported URLs in source order; empty when no analyzer reported any.
    pub fn imported_urls(&self) -> Vec<String> {
        match self.fields.get(IMPORTED_URLS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn css(&self) -> Option<&str> {
        self.fields.get(CSS).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overlay_is_last_writer_wins_per_key() {
        let mut merged = AnalysisResult::new()
            .with(CSS, "a {}")
            .with_imported_urls(["http://x/a.less"]);
        merged.overlay(AnalysisResult::new().with(CSS, "b {}"));

        assert_eq!(merged.css(), Some("b {}"));
        assert_eq!(merged.imported_urls(), vec!["http://x/a.less".to_string()]);
    }

    #[test]
    fn malformed_imported_urls_read_as_empty() {
        let result = AnalysisResult::new().with(IMPORTED_URLS, "not a list");
        assert!(result.imported_urls().is_empty());
    }

    #[test]
    fn timeout_and_parse_failures_render_distinctly() {
        let timeout = AnalyzerFailure::Timeout {
            after: Duration::from_millis(1000),
        };
        assert_eq!(timeout.to_string(), "timed out after 1000ms");
        assert_eq!(
            AnalyzerFailure::parse("unexpected }").to_string(),
            "parse error: unexpected }"
        );
    }
}
