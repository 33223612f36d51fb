//! Layered configuration for the runner

use serde::{Deserialize, Serialize};
use std::path::Path;

use crewplan_core::settings::PipelineSettings;
use crewplan_prompts::ProviderConfig;
use crewplan_storage::DatabaseConfig;

/// Environment variables override everything else: `CREWPLAN__DATABASE__URL`, ...
pub const ENV_PREFIX: &str = "CREWPLAN";

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineSettings,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    pub level: String,
    /// `plain` or `json`
    pub format: String,
    /// Daily rolling log files are written here when set
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load `config/default`, `config/local`, an optional explicit file, then the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::builder(explicit)?.build()?.try_deserialize()
    }

    /// Source stack before environment overrides are resolved
    pub fn builder(
        explicit: Option<&Path>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("database.url", "sqlite://crewplan.db")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "plain")?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));
        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        Ok(builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        ))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crewplan_core::Result<()> {
        self.pipeline.validate()?;
        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "plain" | "json") {
            return Err(crewplan_core::Error::configuration(format!(
                "Unknown logging format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("default config validates");
        assert!(config.database.url.starts_with("sqlite:"));
        assert!(config.provider.endpoint.is_none());
        assert_eq!(config.pipeline.learning.max_iterations, 3);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite:///tmp/explicit.db"

[provider]
endpoint = "http://localhost:9000/proposals"
model = "planner-small"

[pipeline.learning]
min_samples = 8

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.database.url, "sqlite:///tmp/explicit.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.provider.endpoint.as_deref(), Some("http://localhost:9000/proposals"));
        assert_eq!(config.provider.model, "planner-small");
        assert_eq!(config.pipeline.learning.min_samples, 8);
        assert_eq!(config.pipeline.learning.max_delta, 0.05);
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/crewplan.toml"))).is_err());
    }

    #[test]
    fn test_unknown_logging_format_is_rejected() {
        let config = Config {
            logging: LoggingConfig {
                format: "xml".into(),
                ..LoggingConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
