use crate::Session;
use async_trait::async_trait;
use livedev_protocol::{AnalysisResult, Document, LanguageId, RemoteTransport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why one updater call on one session failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UpdateError {
    #[error("{message}")]
    Failed { message: String },

    #[error("updater timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("updater panicked: {message}")]
    Panicked { message: String },
}

impl UpdateError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Everything an updater may need about the document being pushed.
#[derive(Clone)]
pub struct DocumentUpdate {
    pub document: Arc<dyn Document>,
    /// URL the live page loads the document from.
    pub url: String,
    pub language: LanguageId,
    /// Last committed analysis, if any analysis ever succeeded.
    pub analysis: Option<Arc<AnalysisResult>>,
}

impl fmt::Debug for DocumentUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentUpdate")
            .field("path", &self.document.path())
            .field("url", &self.url)
            .field("language", &self.language)
            .field("has_analysis", &self.analysis.is_some())
            .finish()
    }
}

/// Pushes a document's latest output into one live session.
#[async_trait]
pub trait Updater: Send + Sync {
    async fn update(&self, update: &DocumentUpdate, session: &Session) -> Result<(), UpdateError>;
}

/// Prepares a transport before a session is created over it
/// (enabling agents, injecting helpers).
#[async_trait]
pub trait SessionInitializer: Send + Sync {
    async fn initialize(
        &self,
        client: &ClientDescriptor,
        transport: &dyn RemoteTransport,
    ) -> livedev_protocol::Result<()>;
}

/// Static description of a kind of remote client, e.g. Google Chrome.
#[derive(Clone)]
pub struct ClientDescriptor {
    id: String,
    name: String,
    updaters_by_language: HashMap<LanguageId, Vec<Arc<dyn Updater>>>,
    session_initializers: Vec<Arc<dyn SessionInitializer>>,
}

impl ClientDescriptor {
    /// Not validated here; the registry validates on registration.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            updaters_by_language: HashMap::new(),
            session_initializers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_updater(mut self, language: impl Into<LanguageId>, updater: Arc<dyn Updater>) -> Self {
        self.add_updater(language, updater);
        self
    }

    #[must_use]
    pub fn with_initializer(mut self, initializer: Arc<dyn SessionInitializer>) -> Self {
        self.session_initializers.push(initializer);
        self
    }

    pub fn add_updater(&mut self, language: impl Into<LanguageId>, updater: Arc<dyn Updater>) {
        self.updaters_by_language
            .entry(language.into())
            .or_default()
            .push(updater);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Updaters for `language` in registration order.
    pub fn updaters_for(&self, language: &LanguageId) -> &[Arc<dyn Updater>] {
        self.updaters_by_language
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn languages(&self) -> Vec<LanguageId> {
        let mut languages: Vec<LanguageId> = self.updaters_by_language.keys().cloned().collect();
        languages.sort();
        languages
    }

    pub fn session_initializers(&self) -> &[Arc<dyn SessionInitializer>] {
        &self.session_initializers
    }
}

impl fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("languages", &self.languages())
            .field("session_initializers", &self.session_initializers.len())
            .finish()
    }
}
