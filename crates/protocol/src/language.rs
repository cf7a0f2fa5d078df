use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier of a document language, e.g. `less` or `css`.
///
/// Analyzers and updaters are registered per language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageId(String);

impl LanguageId {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Guesses the language from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return Self::new(Self::UNKNOWN);
        };
        let ext = ext.to_lowercase();
        let id = match ext.as_str() {
            "htm" | "html" | "xhtml" => "html",
            "js" | "mjs" | "cjs" => "javascript",
            "scss" => "scss",
            other => other,
        };
        Self::new(id)
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
