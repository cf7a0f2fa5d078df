use crate::error::{LessError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static IMPORT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#"@import\s*(?:\(\s*([A-Za-z,\s]*)\)\s*)?(?:url\(\s*(?:"([^"]*)"|'([^']*)'|([^)\s]*))\s*\)|"([^"]*)"|'([^']*)')"#,
    )
    .ok()
});

/// An `@import` at the top level of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRule {
    pub target: String,
    /// Lower-cased import options, e.g. `reference` in `@import (reference) "a";`.
    pub options: Vec<String>,
    pub line: usize,
}

impl ImportRule {
    /// Whether LESS compiles the target into this stylesheet. Plain CSS and
    /// inline imports are passed through untouched and create no reference.
    pub fn is_parsed(&self) -> bool {
        let passthrough = self
            .options
            .iter()
            .any(|option| option == "css" || option == "inline");
        !passthrough && !is_css_target(&self.target)
    }
}

/// Lists the top-level imports of `source` in source order.
///
/// Comments and nested blocks are skipped. Unterminated comments and
/// strings are errors.
pub fn find_imports(source: &str) -> Result<Vec<ImportRule>> {
    let text = top_level_text(source)?;
    let Some(import) = IMPORT.as_ref() else {
        return Ok(Vec::new());
    };

    let rules = import
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let target = (2..=6).find_map(|group| caps.get(group))?.as_str().trim();
            if target.is_empty() {
                return None;
            }
            let options = caps
                .get(1)
                .map(|list| {
                    list.as_str()
                        .split(',')
                        .map(|option| option.trim().to_lowercase())
                        .filter(|option| !option.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            Some(ImportRule {
                target: target.to_string(),
                options,
                line: text[..whole.start()].matches('\n').count() + 1,
            })
        })
        .collect();
    Ok(rules)
}

/// Absolute URL of an import, relative to the importing document.
/// Targets without an extension get `.less`, as the LESS compiler does.
pub fn resolve_import(target: &str, base_url: &str) -> Result<String> {
    let base = Url::parse(base_url).map_err(|e| LessError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let target = with_less_extension(target);
    base.join(&target)
        .map(String::from)
        .map_err(|e| LessError::InvalidUrl {
            url: target,
            reason: e.to_string(),
        })
}

/// Resolved URLs of every compiled import, first occurrence only.
pub fn imported_urls(source: &str, base_url: &str) -> Result<Vec<String>> {
    let mut urls: Vec<String> = Vec::new();
    for rule in find_imports(source)? {
        if !rule.is_parsed() {
            continue;
        }
        let url = resolve_import(&rule.target, base_url)?;
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

fn split_suffix(target: &str) -> (&str, &str) {
    match target.find(['?', '#']) {
        Some(at) => target.split_at(at),
        None => (target, ""),
    }
}

fn has_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

fn with_less_extension(target: &str) -> String {
    let (path, suffix) = split_suffix(target);
    if has_extension(path) {
        target.to_string()
    } else {
        format!("{path}.less{suffix}")
    }
}

fn is_css_target(target: &str) -> bool {
    let (path, _) = split_suffix(target);
    path.to_ascii_lowercase().ends_with(".css")
}

/// `source` with comments and the contents of `{}` blocks blanked out.
/// Newlines are kept so offsets still map to lines.
fn top_level_text(source: &str) -> Result<String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut depth = 0usize;
    let mut line = 1usize;
    let mut i = 0usize;

    let keep = |out: &mut String, c: char, depth: usize| {
        if depth == 0 || c == '\n' {
            out.push(c);
        } else {
            out.push(' ');
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '/' && next == Some('*') {
            let start = line;
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err(LessError::UnterminatedComment { line: start }),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => {
                        line += 1;
                        out.push('\n');
                        i += 1;
                    }
                    Some(_) => i += 1,
                }
            }
            out.push(' ');
            continue;
        }

        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '"' || c == '\'' {
            let mut end = i + 1;
            loop {
                match chars.get(end) {
                    None | Some('\n') => return Err(LessError::UnterminatedString { line }),
                    Some('\\') => end += 2,
                    Some(&quote) if quote == c => break,
                    Some(_) => end += 1,
                }
            }
            for &ch in &chars[i..=end] {
                keep(&mut out, ch, depth);
            }
            i = end + 1;
            continue;
        }

        // Unquoted url(...) may contain `//`, which is not a comment there.
        if is_unquoted_url(&chars[i..]) {
            while i < chars.len() && chars[i] != ')' && chars[i] != '\n' {
                keep(&mut out, chars[i], depth);
                i += 1;
            }
            continue;
        }

        match c {
            '{' => {
                depth += 1;
                out.push(' ');
            }
            '}' => {
                if depth == 0 {
                    return Err(LessError::UnbalancedBrace { line });
                }
                depth -= 1;
                out.push(' ');
            }
            '\n' => {
                line += 1;
                out.push('\n');
            }
            _ => keep(&mut out, c, depth),
        }
        i += 1;
    }

    Ok(out)
}

fn is_unquoted_url(chars: &[char]) -> bool {
    let prefix: String = chars.iter().take(4).collect();
    if !prefix.eq_ignore_ascii_case("url(") {
        return false;
    }
    chars[4..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| *c != '"' && *c != '\'')
}
