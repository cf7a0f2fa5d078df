//! # Livedev LESS
//!
//! LESS stylesheet support for the live development tracker.
//!
//! - [`LessImportAnalyzer`] finds the stylesheets a document imports, so
//!   editing a partial re-analyses and updates everything that includes it.
//! - [`CompilingAnalyzer`] wraps an external [`LessCompiler`] and keeps the
//!   generated CSS in the analysis.
//! - [`StyleUpdater`] swaps that CSS into the `<style>` element the LESS
//!   browser runtime generated for the stylesheet, without a page reload.

mod analyzer;
mod error;
mod imports;
mod style_id;
mod updater;

pub use analyzer::{CompiledStyle, CompilingAnalyzer, LessCompiler, LessImportAnalyzer};
pub use error::{LessError, Result};
pub use imports::{find_imports, imported_urls, resolve_import, ImportRule};
pub use style_id::{extract_id, style_id};
pub use updater::{StyleUpdater, LESS_LINK_SELECTOR};

/// Language id LESS documents are registered under.
pub const LANGUAGE: &str = "less";
