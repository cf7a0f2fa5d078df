use anyhow::{Context as AnyhowContext, Result};
use livedev_clients::{ClientRegistry, Updater};
use livedev_less::{LessImportAnalyzer, StyleUpdater, LANGUAGE};
use livedev_protocol::{Document, FileFilter, MemoryDocuments, ProjectUrls};
use livedev_tracker::{FsProject, ScanOptions, Tracker, TrackerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct SiteOptions {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    pub base_url: String,
    pub config: Option<PathBuf>,
    pub include_hidden: bool,
    pub watch: bool,
    /// Analyse newly tracked documents while reconciling.
    pub initial_analysis: bool,
}

/// A project directory wired to a tracker: disk-backed documents, a
/// filesystem lister and LESS support.
pub struct Site {
    pub root: PathBuf,
    pub tracker: Tracker,
    pub documents: Arc<MemoryDocuments>,
    pub project: Arc<FsProject>,
    pub server: Arc<ProjectUrls>,
}

impl Site {
    pub fn open(options: SiteOptions) -> Result<Self> {
        let root = options
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve project root {}", options.root.display()))?;

        let mut config = match &options.config {
            Some(path) => TrackerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TrackerConfig::default(),
        };
        if !options.extensions.is_empty() {
            config = config.with_file_filter(FileFilter::extensions(options.extensions.clone()));
        }
        config.initial_analysis = options.initial_analysis;

        let mut scan = ScanOptions::new(&root);
        scan.include_hidden = options.include_hidden;
        let project = if options.watch {
            FsProject::watch(scan).context("Failed to watch project")?
        } else {
            FsProject::new(scan)
        };
        let project = Arc::new(project);

        let documents = Arc::new(MemoryDocuments::with_disk_fallback());
        let server = Arc::new(ProjectUrls::new(options.base_url.clone(), &root));

        let clients = Arc::new(ClientRegistry::new());
        let style_updater: Arc<dyn Updater> = Arc::new(StyleUpdater::new());
        let definitions = clients
            .define_default_clients(|descriptor| {
                descriptor.with_updater(LANGUAGE, Arc::clone(&style_updater))
            })
            .context("Failed to define clients")?;
        for (id, err) in &definitions.failed {
            log::warn!("client {id} unavailable: {err}");
        }

        let tracker = Tracker::builder(documents.clone(), project.clone(), server.clone(), clients)
            .config(config)
            .analyzer(LANGUAGE, Arc::new(LessImportAnalyzer::new()))
            .build()
            .context("Failed to build tracker")?;

        Ok(Self {
            root,
            tracker,
            documents,
            project,
            server,
        })
    }

    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Reloads an open document from disk. Returns `true` when its text changed.
    pub async fn refresh(&self, path: &Path) -> Result<bool> {
        let Some(document) = self.documents.get(path) else {
            return Ok(false);
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if document.text() == text {
            return Ok(false);
        }
        document.set_text(text);
        Ok(true)
    }
}
