use serde::{Deserialize, Serialize};
use std::path::Path;

/// Selects which project files enter the tracked set.
///
/// Paths are matched project-relative with `/` separators. An empty filter
/// accepts every file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFilter {
    /// Accepted file extensions without the leading dot (case-insensitive).
    pub extensions: Vec<String>,
    /// Directory prefixes a file must live under (any of them).
    pub include_paths: Vec<String>,
    /// Directory prefixes that exclude a file, even when included.
    pub exclude_paths: Vec<String>,
    /// Substring, or glob when it contains `*` / `?`.
    pub file_pattern: Option<String>,
}

impl FileFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(&ext.into()))
                .filter(|ext| !ext.is_empty())
                .collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exclude(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_paths.push(prefix.into());
        self
    }

    #[must_use]
    pub fn with_include(mut self, prefix: impl Into<String>) -> Self {
        self.include_paths.push(prefix.into());
        self
    }

    pub fn is_active(&self) -> bool {
        !self.extensions.is_empty()
            || self
                .include_paths
                .iter()
                .any(|p| !normalize_filter_path(p).is_empty())
            || self
                .exclude_paths
                .iter()
                .any(|p| !normalize_filter_path(p).is_empty())
            || self
                .file_pattern
                .as_deref()
                .map(str::trim)
                .is_some_and(|p| !p.is_empty())
    }

    /// Matches a path relative to `root`; paths outside `root` are matched as given.
    pub fn allows_path(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.allows(&relative.to_string_lossy())
    }

    pub fn allows(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.replace('\\', "/");
        let rel_path = rel_path.trim_start_matches('/');

        if !self.extensions.is_empty() {
            let extension = Path::new(rel_path)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase);
            let Some(extension) = extension else {
                return false;
            };
            if !self.extensions.iter().any(|ext| ext == &extension) {
                return false;
            }
        }

        path_allowed(
            rel_path,
            &self.include_paths,
            &self.exclude_paths,
            self.file_pattern.as_deref(),
        )
    }
}

fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

fn path_allowed(
    rel_path: &str,
    include_paths: &[String],
    exclude_paths: &[String],
    file_pattern: Option<&str>,
) -> bool {
    if !include_paths.is_empty() {
        let mut has_valid_include = false;
        let mut matched = false;
        for include in include_paths {
            let normalized = normalize_filter_path(include);
            if normalized.is_empty() {
                continue;
            }
            has_valid_include = true;
            if path_prefix_matches_normalized(&normalized, rel_path) {
                matched = true;
                break;
            }
        }
        if has_valid_include && !matched {
            return false;
        }
    }

    for exclude in exclude_paths {
        let normalized = normalize_filter_path(exclude);
        if normalized.is_empty() {
            continue;
        }
        if path_prefix_matches_normalized(&normalized, rel_path) {
            return false;
        }
    }

    matches_file_pattern(
        rel_path,
        file_pattern.map(str::trim).filter(|p| !p.is_empty()),
    )
}

fn normalize_filter_path(raw: &str) -> String {
    let mut value = raw.trim().replace('\\', "/");
    while value.starts_with("./") {
        value = value[2..].to_string();
    }
    let value = value.trim_matches('/');
    if value == "." {
        return String::new();
    }
    value.to_string()
}

fn path_prefix_matches_normalized(prefix: &str, path: &str) -> bool {
    if path == prefix {
        return true;
    }

    if !path.starts_with(prefix) {
        return false;
    }

    path.as_bytes().get(prefix.len()) == Some(&b'/')
}

fn matches_file_pattern(path: &str, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    if !pattern.contains('*') && !pattern.contains('?') {
        return path.contains(pattern);
    }

    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(path),
        Err(err) => {
            log::warn!("invalid file pattern {pattern:?}: {err}");
            false
        }
    }
}
