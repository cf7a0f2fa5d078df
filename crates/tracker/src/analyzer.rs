use crate::error::panic_message;
use crate::AnalysisError;
use futures::future::try_join_all;
use futures::FutureExt;
use livedev_protocol::{AnalysisResult, Analyzer, LanguageId};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Analyzers keyed by language, kept in registration order.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    by_language: HashMap<LanguageId, Vec<Arc<dyn Analyzer>>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, language: impl Into<LanguageId>, analyzer: Arc<dyn Analyzer>) {
        self.by_language
            .entry(language.into())
            .or_default()
            .push(analyzer);
    }

    pub fn analyzers_for(&self, language: &LanguageId) -> &[Arc<dyn Analyzer>] {
        self.by_language
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Runs every analyzer for `language` concurrently and overlays their
    /// results in registration order. Any failure fails the whole pass.
    pub async fn run(
        &self,
        language: &LanguageId,
        source: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<AnalysisResult, AnalysisError> {
        let partials = try_join_all(
            self.analyzers_for(language)
                .iter()
                .map(|analyzer| run_one(analyzer.as_ref(), source, base_url, timeout)),
        )
        .await?;

        let mut merged = AnalysisResult::new();
        for partial in partials {
            merged.overlay(partial);
        }
        Ok(merged)
    }
}

async fn run_one(
    analyzer: &dyn Analyzer,
    source: &str,
    base_url: &str,
    timeout: Duration,
) -> Result<AnalysisResult, AnalysisError> {
    let call = AssertUnwindSafe(analyzer.analyze(source, base_url)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(AnalysisError::Timeout { after: timeout }),
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            log::error!("analyzer panicked on {base_url}: {message}");
            Err(AnalysisError::Panicked { message })
        }
        Ok(Ok(result)) => result.map_err(AnalysisError::from),
    }
}
