use crate::DocumentProvider;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use url::Url;

/// The static file server that serves the project to the remote target.
pub trait StaticServer: Send + Sync {
    fn base_url(&self) -> String;

    fn url_for_path(&self, path: &Path) -> String;

    /// `None` for URLs the server does not serve (external resources).
    fn path_for_url(&self, url: &str) -> Option<PathBuf>;

    /// Declares the full set of files that must be served from in-memory
    /// document content instead of disk.
    fn register_filter_for_files(&self, paths: &[PathBuf]);
}

/// URL mapping for a project served under a single base URL.
#[derive(Debug)]
pub struct ProjectUrls {
    base_url: String,
    base: Option<Url>,
    project_root: PathBuf,
    filter_paths: Mutex<BTreeSet<String>>,
}

impl ProjectUrls {
    pub fn new(base_url: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base = match Url::parse(&base_url) {
            Ok(base) => Some(base),
            Err(err) => {
                log::warn!("base url {base_url} is not a valid url: {err}");
                None
            }
        };
        if let Some(base) = &base {
            base_url = base.to_string();
        }
        Self {
            base_url,
            base,
            project_root: project_root.into(),
            filter_paths: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Request paths (`/`-prefixed, project-relative) currently served from memory.
    pub fn filter_paths(&self) -> Vec<String> {
        self.filter_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_filtered(&self, request_path: &str) -> bool {
        self.filter_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(request_path)
    }

    /// Body for a request that should be answered from the editor's memory.
    ///
    /// HTML documents are left to the server so its own instrumentation applies.
    pub async fn serve_from_memory(
        &self,
        request_path: &str,
        documents: &dyn DocumentProvider,
    ) -> Option<String> {
        let request_path = urlencoding::decode(request_path).ok()?;
        if !self.is_filtered(&request_path) {
            return None;
        }
        let path = self.project_root.join(request_path.trim_start_matches('/'));
        match documents.document_for_path(&path).await {
            Ok(doc) if doc.language().as_str() != "html" => Some(doc.text()),
            Ok(_) => None,
            Err(err) => {
                log::debug!("not serving {request_path} from memory: {err}");
                None
            }
        }
    }

    fn project_relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        relative
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches('/')
            .to_string()
    }
}

impl StaticServer for ProjectUrls {
    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Percent-encoded, the same way browsers and `Url::join` spell it.
    fn url_for_path(&self, path: &Path) -> String {
        let relative = self.project_relative(path);
        let Some(mut url) = self.base.clone() else {
            return format!("{}{}", self.base_url, relative);
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(relative.split('/'));
        }
        url.to_string()
    }

    fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let base = self.base.as_ref()?;
        let mut url = Url::parse(url).ok()?;
        url.set_query(None);
        url.set_fragment(None);

        let rest = url.as_str().strip_prefix(base.as_str())?;
        if rest.is_empty() {
            return None;
        }
        let mut path = self.project_root.clone();
        for segment in rest.split('/') {
            let segment = urlencoding::decode(segment).ok()?;
            if segment == ".." || segment.contains(['/', '\\']) {
                return None;
            }
            path.push(segment.as_ref());
        }
        Some(path)
    }

    fn register_filter_for_files(&self, paths: &[PathBuf]) {
        let relative: BTreeSet<String> = paths
            .iter()
            .map(|path| format!("/{}", self.project_relative(path)))
            .collect();
        log::debug!("serving {} files from memory", relative.len());
        *self
            .filter_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = relative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls() -> ProjectUrls {
        ProjectUrls::new("http://127.0.0.1:8000", "/work/site")
    }

    #[test]
    fn url_and_path_mapping_are_inverse_inside_the_project() {
        let urls = urls();
        let path = PathBuf::from("/work/site/styles/main.less");
        let url = urls.url_for_path(&path);
        assert_eq!(url, "http://127.0.0.1:8000/styles/main.less");
        assert_eq!(urls.path_for_url(&url), Some(path));
    }

    #[test]
    fn foreign_urls_do_not_map_to_paths() {
        let urls = urls();
        assert_eq!(urls.path_for_url("http://cdn.example.com/x.less"), None);
        assert_eq!(urls.path_for_url("http://127.0.0.1:8000/"), None);
    }

    #[test]
    fn query_strings_are_ignored_when_mapping_back() {
        let urls = urls();
        assert_eq!(
            urls.path_for_url("http://127.0.0.1:8000/a.less?v=2"),
            Some(PathBuf::from("/work/site/a.less"))
        );
    }

    #[test]
    fn names_needing_escapes_round_trip() {
        let urls = urls();
        let path = PathBuf::from("/work/site/styles/my theme #2.less");
        let url = urls.url_for_path(&path);
        assert_eq!(url, "http://127.0.0.1:8000/styles/my%20theme%20%232.less");
        assert_eq!(urls.path_for_url(&url), Some(path));

        let joined = Url::parse("http://127.0.0.1:8000/styles/main.less")
            .unwrap()
            .join("héllo wörld.less")
            .unwrap();
        assert_eq!(
            urls.path_for_url(joined.as_str()),
            Some(PathBuf::from("/work/site/styles/héllo wörld.less"))
        );
    }

    #[test]
    fn encoded_separators_do_not_escape_the_project() {
        let urls = urls();
        assert_eq!(urls.path_for_url("http://127.0.0.1:8000/a%2F..%2F..%2Fetc"), None);
    }

    #[tokio::test]
    async fn encoded_request_paths_are_served_from_memory() {
        let urls = urls();
        let documents = crate::MemoryDocuments::new();
        documents.insert("/work/site/my theme.less", "a {}");
        urls.register_filter_for_files(&[PathBuf::from("/work/site/my theme.less")]);

        assert_eq!(
            urls.serve_from_memory("/my%20theme.less", &documents).await,
            Some("a {}".to_string())
        );
    }

    #[test]
    fn registering_filters_replaces_the_previous_set() {
        let urls = urls();
        urls.register_filter_for_files(&[PathBuf::from("/work/site/a.less")]);
        urls.register_filter_for_files(&[
            PathBuf::from("/work/site/b.less"),
            PathBuf::from("/work/site/styles/c.less"),
        ]);
        assert_eq!(urls.filter_paths(), vec!["/b.less", "/styles/c.less"]);
        assert!(!urls.is_filtered("/a.less"));
    }
}
