//! Configuration management for TraceSink
//!
//! Values are layered: built-in defaults, then an optional file (TOML, YAML or
//! JSON, picked by extension), then `TRACESINK__*` environment variables using
//! `__` as the nesting separator, e.g. `TRACESINK__PROCESSOR__MAX_BATCH_SIZE=64`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TRACESINK";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Drop every event at the registry instead of dispatching it
    pub tracing_disabled: bool,

    /// Batch processor configuration
    pub processor: ProcessorConfig,

    /// Console exporter configuration
    pub console: ConsoleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from defaults, an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading overrides from `env` instead of the process
    /// environment when it is given
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.processor.validate()
    }
}

/// Batch processor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum number of queued events before new ones are dropped
    pub max_queue_size: usize,
    /// Maximum number of events handed to exporters in one batch
    pub max_batch_size: usize,
    /// Time between periodic flushes
    #[serde(with = "humantime_serde")]
    pub schedule_delay: Duration,
    /// Upper bound on a single exporter call
    #[serde(with = "humantime_serde")]
    pub export_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 8192,
            max_batch_size: 128,
            schedule_delay: Duration::from_secs(5),
            export_timeout: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::config("processor.max_batch_size must be greater than 0"));
        }
        if self.max_queue_size < self.max_batch_size {
            return Err(Error::config(
                "processor.max_queue_size must be at least processor.max_batch_size",
            ));
        }
        if self.schedule_delay.is_zero() {
            return Err(Error::config("processor.schedule_delay must be non-zero"));
        }
        Ok(())
    }
}

/// What the console exporter does with span types it has no renderer for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledSpanPolicy {
    /// Print a one-line summary of the span
    #[default]
    Summary,
    /// Drop the span (logged at debug level)
    Skip,
}

/// When the console exporter emits ANSI styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorChoice {
    /// Style only when stdout is a terminal
    #[default]
    Auto,
    /// Always style
    Always,
    /// Never style
    Never,
}

/// Console exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Handling of span payload types other than `generation`
    pub unhandled_spans: UnhandledSpanPolicy,
    /// ANSI styling
    pub color: ColorChoice,
    /// Print an extra line for spans that carry an error
    pub show_errors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            unhandled_spans: UnhandledSpanPolicy::Summary,
            color: ColorChoice::Auto,
            show_errors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.processor.max_batch_size, 128);
        assert_eq!(config.processor.max_queue_size, 8192);
    }

    #[test]
    fn test_load_without_sources_matches_defaults() {
        let config = Config::load_with_env(None, Some(HashMap::new())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[processor]
max_batch_size = 16
schedule_delay = "250ms"

[console]
unhandled_spans = "skip"
"#
        )
        .unwrap();

        let config = Config::load_with_env(Some(file.path()), Some(HashMap::new())).unwrap();
        assert_eq!(config.processor.max_batch_size, 16);
        assert_eq!(config.processor.schedule_delay, Duration::from_millis(250));
        assert_eq!(config.processor.max_queue_size, 8192);
        assert_eq!(config.console.unhandled_spans, UnhandledSpanPolicy::Skip);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let mut env = HashMap::new();
        env.insert(
            "TRACESINK__PROCESSOR__MAX_BATCH_SIZE".to_string(),
            "7".to_string(),
        );
        env.insert("TRACESINK__TRACING_DISABLED".to_string(), "true".to_string());

        let config = Config::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.processor.max_batch_size, 7);
        assert!(config.tracing_disabled);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load_with_env(
            Some(Path::new("/definitely/not/here.toml")),
            Some(HashMap::new()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_schedule_delay() {
        let mut config = Config::default();
        config.processor.schedule_delay = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_queue_smaller_than_batch() {
        let mut config = Config::default();
        config.processor.max_queue_size = 4;
        config.processor.max_batch_size = 8;
        assert!(config.validate().is_err());
    }
}
