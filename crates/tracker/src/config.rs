use crate::error::{Result, TrackerError};
use livedev_protocol::FileFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tracker settings, usually read from a `livedev.toml`.
///
/// ```toml
/// analyzer_timeout_ms = 1000
/// updater_timeout_ms = 5000
///
/// [file_filter]
/// extensions = ["less"]
/// exclude_paths = ["vendor"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Per-analyzer budget; exceeding it fails the analysis as a timeout.
    pub analyzer_timeout_ms: u64,
    /// Per-updater budget so a hung updater cannot wedge a document.
    pub updater_timeout_ms: u64,
    pub file_filter: FileFilter,
    /// Analyse documents as soon as they are tracked so their references
    /// are known before the first edit.
    pub initial_analysis: bool,
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            analyzer_timeout_ms: 1000,
            updater_timeout_ms: 5000,
            file_filter: FileFilter::all(),
            initial_analysis: true,
            event_capacity: 256,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.analyzer_timeout_ms == 0 {
            return Err(TrackerError::Config(
                "analyzer_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.updater_timeout_ms == 0 {
            return Err(TrackerError::Config(
                "updater_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(TrackerError::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_file_filter(mut self, filter: FileFilter) -> Self {
        self.file_filter = filter;
        self
    }

    #[must_use]
    pub fn with_analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout_ms = duration_to_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_updater_timeout(mut self, timeout: Duration) -> Self {
        self.updater_timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer_timeout_ms)
    }

    pub fn updater_timeout(&self) -> Duration {
        Duration::from_millis(self.updater_timeout_ms)
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.analyzer_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn filter_section_is_parsed() {
        let config = TrackerConfig::from_toml_str(
            r#"
            updater_timeout_ms = 250

            [file_filter]
            extensions = ["less"]
            exclude_paths = ["vendor"]
            "#,
        )
        .unwrap();

        assert_eq!(config.updater_timeout_ms, 250);
        assert!(config.file_filter.allows("styles/main.less"));
        assert!(!config.file_filter.allows("vendor/x.less"));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let err = TrackerConfig::from_toml_str("analyzer_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("analyzer_timeout_ms"));
    }

    #[test]
    fn unknown_value_types_are_config_errors() {
        let err = TrackerConfig::from_toml_str("initial_analysis = \"yes\"").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livedev.toml");
        std::fs::write(&path, "event_capacity = 8\n").unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.event_capacity, 8);
    }
}
