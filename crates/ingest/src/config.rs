use auszug_core::Currency;
use auszug_fx::FxConfig;
use auszug_import::AiConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything an import run needs to know. Every field has a default, so an
/// empty TOML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_file_bytes: usize,
    /// Currency of the bank account when a statement leaves it implicit.
    pub home_currency: Currency,
    pub default_report_currency: Currency,
    pub extraction_timeout_secs: u64,
    /// Replacement keyword table for the rules categorizer.
    pub keyword_rules_file: Option<PathBuf>,
    pub fx: FxConfig,
    pub ai: AiConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            home_currency: Currency::EUR,
            default_report_currency: Currency::EUR,
            extraction_timeout_secs: 30,
            keyword_rules_file: None,
            fx: FxConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        let config = IngestConfig::from_toml("").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.fx.lookback_days, 7);
        assert_eq!(config.ai.chunk_size, 50);
    }

    #[test]
    fn nested_sections_override() {
        let config = IngestConfig::from_toml(
            r#"
home_currency = "chf"
default_report_currency = "USD"

[fx]
fan_out = 2
fetch_on_miss = false

[ai]
model = "gpt-4o"
"#,
        )
        .unwrap();
        assert_eq!(config.home_currency, Currency::CHF);
        assert_eq!(config.default_report_currency, Currency::USD);
        assert_eq!(config.fx.fan_out, 2);
        assert!(!config.fx.fetch_on_miss);
        assert_eq!(config.fx.lookback_days, 7);
        assert_eq!(config.ai.model, "gpt-4o");
    }

    #[test]
    fn invalid_currency_is_rejected() {
        assert!(IngestConfig::from_toml("home_currency = \"EURO\"").is_err());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = IngestConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, IngestConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_file_bytes = 1024\n").unwrap();
        assert_eq!(IngestConfig::load(&path).unwrap().max_file_bytes, 1024);
    }
}
