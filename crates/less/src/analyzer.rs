use crate::imports::imported_urls;
use async_trait::async_trait;
use livedev_protocol::{AnalysisResult, Analyzer, AnalyzerFailure, CSS};

/// Finds the documents a LESS stylesheet imports without compiling it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LessImportAnalyzer;

impl LessImportAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for LessImportAnalyzer {
    async fn analyze(
        &self,
        source: &str,
        base_url: &str,
    ) -> Result<AnalysisResult, AnalyzerFailure> {
        let urls = imported_urls(source, base_url)?;
        log::debug!("{base_url}: {} import(s)", urls.len());
        Ok(AnalysisResult::new().with_imported_urls(urls))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledStyle {
    pub css: String,
    /// Absolute URLs of every stylesheet pulled in while compiling.
    pub imported_urls: Vec<String>,
}

/// An external LESS compiler.
#[async_trait]
pub trait LessCompiler: Send + Sync {
    async fn compile(&self, source: &str, base_url: &str) -> Result<CompiledStyle, AnalyzerFailure>;
}

/// Analyzer that compiles the stylesheet, so updaters can push its CSS.
pub struct CompilingAnalyzer<C> {
    compiler: C,
}

impl<C: LessCompiler> CompilingAnalyzer<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }
}

#[async_trait]
impl<C: LessCompiler> Analyzer for CompilingAnalyzer<C> {
    async fn analyze(
        &self,
        source: &str,
        base_url: &str,
    ) -> Result<AnalysisResult, AnalyzerFailure> {
        let compiled = self.compiler.compile(source, base_url).await.map_err(|err| {
            log::warn!("Error when compiling {base_url}: {err}");
            err
        })?;
        Ok(AnalysisResult::new()
            .with(CSS, compiled.css)
            .with_imported_urls(compiled.imported_urls))
    }
}
