use crate::site::Site;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GraphReport {
    pub root: PathBuf,
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<FailureReport>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DocumentReport {
    pub path: String,
    pub references_to: Vec<String>,
    pub referenced_by: Vec<String>,
    /// Documents re-analysed when this one changes, itself first.
    pub affected: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FailureReport {
    pub path: String,
    pub error: String,
}

impl GraphReport {
    pub fn collect(site: &Site, failures: Vec<FailureReport>) -> Self {
        let tracker = &site.tracker;
        let rel = |paths: Vec<PathBuf>| -> Vec<String> {
            paths.iter().map(|path| site.relative(path)).collect()
        };

        let documents = tracker
            .tracked_paths()
            .into_iter()
            .map(|path| DocumentReport {
                path: site.relative(&path),
                references_to: rel(tracker.references_to(&path)),
                referenced_by: rel(tracker.referenced_by(&path)),
                affected: rel(tracker.affected_closure(&path)),
            })
            .collect();

        Self {
            root: site.root.clone(),
            documents,
            failures,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({} documents)", self.root.display(), self.documents.len());
        for doc in &self.documents {
            let _ = writeln!(out, "\n{}", doc.path);
            if !doc.references_to.is_empty() {
                let _ = writeln!(out, "  imports:  {}", doc.references_to.join(", "));
            }
            if !doc.referenced_by.is_empty() {
                let _ = writeln!(out, "  imported by: {}", doc.referenced_by.join(", "));
            }
            if doc.affected.len() > 1 {
                let _ = writeln!(out, "  affects:  {}", doc.affected[1..].join(", "));
            }
        }
        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nfailed to analyse:");
            for failure in &self.failures {
                let _ = writeln!(out, "  {}: {}", failure.path, failure.error);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_lists_imports_and_dependents() {
        let report = GraphReport {
            root: PathBuf::from("/site"),
            documents: vec![
                DocumentReport {
                    path: "main.less".to_string(),
                    references_to: vec!["shared.less".to_string()],
                    referenced_by: Vec::new(),
                    affected: vec!["main.less".to_string()],
                },
                DocumentReport {
                    path: "shared.less".to_string(),
                    references_to: Vec::new(),
                    referenced_by: vec!["main.less".to_string()],
                    affected: vec!["shared.less".to_string(), "main.less".to_string()],
                },
            ],
            failures: vec![FailureReport {
                path: "broken.less".to_string(),
                error: "parse error: unterminated string starting on line 1".to_string(),
            }],
        };

        assert_eq!(
            report.render_text(),
            "/site (2 documents)\n\
             \nmain.less\n  imports:  shared.less\n\
             \nshared.less\n  imported by: main.less\n  affects:  main.less\n\
             \nfailed to analyse:\n  broken.less: parse error: unterminated string starting on line 1\n"
        );
    }
}
