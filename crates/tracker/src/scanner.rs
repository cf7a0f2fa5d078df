use ignore::WalkBuilder;
use livedev_protocol::FileFilter;
use std::path::{Component, Path, PathBuf};

const MAX_FILE_SIZE_BYTES: u64 = 4 * 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub include_hidden: bool,
    pub max_file_size: u64,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_hidden: false,
            max_file_size: MAX_FILE_SIZE_BYTES,
        }
    }
}

/// Lists project files (.gitignore aware), skipping VCS and build scopes.
pub struct FileScanner {
    options: ScanOptions,
}

impl FileScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn root(&self) -> &Path {
        &self.options.root
    }

    pub fn include_hidden(&self) -> bool {
        self.options.include_hidden
    }

    pub fn scan(&self, filter: &FileFilter) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.options.root.clone();
        let mut builder = WalkBuilder::new(&self.options.root);
        builder
            .hidden(!self.options.include_hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > self.options.max_file_size {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                self.options.max_file_size
                            );
                            continue;
                        }
                    }

                    if !filter.allows_path(&self.options.root, path) {
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::debug!("Found {} project files", files.len());
        files
    }
}

pub(crate) fn is_ignored_scope(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| match component {
        Component::Normal(name) => {
            let lowered = name.to_string_lossy().to_lowercase();
            IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered)
        }
        _ => false,
    })
}

pub(crate) fn is_hidden(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

pub(crate) const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    ".cache",
    "node_modules",
    "bower_components",
    ".parcel-cache",
    ".next",
    ".turbo",
    "coverage",
    "target",
    "__pycache__",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn skips_ignored_directories() {
        let temp = tempdir().unwrap();
        let vendored = temp.path().join("node_modules").join("bootstrap");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(vendored.join("variables.less"), b"@x: 1;").unwrap();
        fs::write(temp.path().join("main.less"), b"a {}").unwrap();

        let scanner = FileScanner::new(ScanOptions::new(temp.path()));
        let files = scanner.scan(&FileFilter::all());

        assert_eq!(files, vec![temp.path().join("main.less")]);
    }

    #[test]
    fn respects_gitignore_and_filter() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::create_dir_all(temp.path().join("styles").join("generated")).unwrap();
        fs::write(temp.path().join(".gitignore"), b"/styles/generated\n").unwrap();
        fs::write(temp.path().join("styles/main.less"), b"a {}").unwrap();
        fs::write(temp.path().join("styles/print.css"), b"a {}").unwrap();
        fs::write(temp.path().join("styles/generated/out.less"), b"a {}").unwrap();

        let scanner = FileScanner::new(ScanOptions::new(temp.path()));
        let files = scanner.scan(&FileFilter::extensions(["less"]));

        assert_eq!(files, vec![temp.path().join("styles/main.less")]);
    }

    #[test]
    fn oversized_files_are_skipped() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.less"), vec![b' '; 64]).unwrap();
        fs::write(temp.path().join("small.less"), b"a {}").unwrap();

        let mut options = ScanOptions::new(temp.path());
        options.max_file_size = 16;
        let files = FileScanner::new(options).scan(&FileFilter::all());

        assert_eq!(files, vec![temp.path().join("small.less")]);
    }

    #[test]
    fn hidden_and_ignored_detection_is_root_relative() {
        let root = Path::new("/work/.site");
        assert!(!is_hidden(&root.join("a.less"), root));
        assert!(is_hidden(&root.join(".cache/a.less"), root));
        assert!(is_ignored_scope(&root.join("Node_Modules/x.less"), root));
        assert!(!is_ignored_scope(&root.join("styles/x.less"), root));
    }
}
