use once_cell::sync::Lazy;
use regex::Regex;

static PROTOCOL_AND_HOST: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z]+://?[^/]+").ok());
static SIMPLE_EXTENSION: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.[a-zA-Z]+$").ok());
static ILLEGAL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^.\w-]+").ok());

/// Id the LESS browser runtime gives the `<style>` element it generates for
/// a stylesheet link without a title.
pub fn extract_id(href: &str) -> String {
    let mut id = href.to_string();
    if let Some(re) = PROTOCOL_AND_HOST.as_ref() {
        id = re.replace(&id, "").into_owned();
    }
    if let Some(stripped) = id.strip_prefix('/') {
        id = stripped.to_string();
    }
    if let Some(re) = SIMPLE_EXTENSION.as_ref() {
        id = re.replace(&id, "").into_owned();
    }
    if let Some(re) = ILLEGAL.as_ref() {
        id = re.replace_all(&id, "-").into_owned();
    }
    id.replace('.', ":")
}

/// Value of the generated style element's `id` attribute.
pub fn style_id(title: Option<&str>, href: &str) -> String {
    match title.filter(|title| !title.is_empty()) {
        Some(title) => format!("less:{title}"),
        None => format!("less:{}", extract_id(href)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matches_less_runtime_ids() {
        assert_eq!(
            extract_id("http://localhost:8080/styles/main.less"),
            "styles-main"
        );
        assert_eq!(
            extract_id("file:///Users/me/site/a.b.less"),
            "file-Users-me-site-a:b"
        );
        assert_eq!(extract_id("/theme v2.less"), "theme-v2");
    }

    #[test]
    fn title_wins_over_href() {
        assert_eq!(style_id(Some("print"), "http://h/a.less"), "less:print");
        assert_eq!(style_id(Some(""), "http://h/a.less"), "less:a");
        assert_eq!(style_id(None, "http://h/dir/a.less"), "less:dir-a");
    }
}
