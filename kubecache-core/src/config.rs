use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Namespace file mounted into every pod by the service account admission controller
pub const DEFAULT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace used when the target omits one and the namespace file is unreadable
pub const DEFAULT_NAMESPACE: &str = "default";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub selector: SelectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Discovery target in `service[.namespace]:port` form
    pub target: String,
    /// Delay between watch attempts after a failure or a closed stream
    pub retry_interval_ms: u64,
    pub namespace_file: String,
    pub default_namespace: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            retry_interval_ms: 1000,
            namespace_file: DEFAULT_NAMESPACE_FILE.to_string(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// `KUBECACHE_` prefix, `__` between nested keys
fn environment() -> Environment {
    Environment::with_prefix("KUBECACHE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from an optional file, then environment overrides
    /// (`KUBECACHE_SELECTOR__TARGET`, `KUBECACHE_LOGGING__LEVEL`, ...).
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(environment());

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check the configuration for values that would make startup fail.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.selector.target.trim().is_empty() {
            errors.push("selector.target is required".to_string());
        }
        if self.selector.retry_interval_ms == 0 {
            errors.push("selector.retry_interval_ms must be greater than zero".to_string());
        }
        if self.selector.default_namespace.trim().is_empty() {
            errors.push("selector.default_namespace must not be empty".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
