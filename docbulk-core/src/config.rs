// docbulk-core/src/config.rs
use crate::error::{BulkError, Result};
use crate::service::MAX_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Bulk run settings
///
/// ```toml
/// page_size = 100
/// progress_log_interval = 250
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkConfig {
    /// Documents requested per listing call (1..=100)
    pub page_size: usize,

    /// Log an info line every N processed documents; 0 disables
    pub progress_log_interval: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        BulkConfig {
            page_size: MAX_PAGE_SIZE,
            progress_log_interval: 100,
        }
    }
}

impl BulkConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BulkConfig = toml::from_str(content)
            .map_err(|e| BulkError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(BulkError::Config(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        Ok(())
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_progress_log_interval(mut self, interval: usize) -> Self {
        self.progress_log_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BulkConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.progress_log_interval, 100);
        assert!(config.validate().is_ok());
        assert_eq!(BulkConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BulkConfig::from_toml_str("page_size = 25").unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.progress_log_interval, 100);
    }

    #[test]
    fn test_rejects_out_of_range_page_size() {
        assert!(matches!(
            BulkConfig::from_toml_str("page_size = 0"),
            Err(BulkError::Config(_))
        ));
        assert!(matches!(
            BulkConfig::from_toml_str("page_size = 500"),
            Err(BulkError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(BulkConfig::from_toml_str("parallel = true").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "progress_log_interval = 0").unwrap();
        let config = BulkConfig::load(file.path()).unwrap();
        assert_eq!(config.progress_log_interval, 0);
    }
}
