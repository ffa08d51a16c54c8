//! Configuration management for ratelimit.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RatelimitError, Result};
use crate::limiter::{Clock, KeyedRateLimiter, RateLimiter};

/// Prefix for environment variable overrides, e.g. `RATELIMIT__LIMITER__RATE`.
const ENV_PREFIX: &str = "RATELIMIT";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatelimitConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate and unit for a limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Events allowed per unit
    #[serde(default = "default_rate")]
    pub rate: u64,

    /// Unit length, e.g. `1s`, `10ms`, `1m`
    #[serde(default = "default_per", with = "humantime_serde")]
    pub per: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            per: default_per(),
        }
    }
}

fn default_rate() -> u64 {
    10
}

fn default_per() -> Duration {
    Duration::from_secs(1)
}

impl LimiterConfig {
    /// Build a limiter from this configuration.
    pub fn build(&self) -> RateLimiter {
        RateLimiter::new(self.rate, self.per)
    }

    /// Build a limiter that reads time from `clock`.
    pub fn build_with_clock<C: Clock>(&self, clock: C) -> RateLimiter<C> {
        RateLimiter::with_clock(self.rate, self.per, clock)
    }

    /// Build a per-key limiter from this configuration.
    pub fn build_keyed<K: Eq + std::hash::Hash + Clone>(&self) -> KeyedRateLimiter<K> {
        KeyedRateLimiter::new(self.rate, self.per)
    }
}

/// Logging configuration, consumed by binaries that install a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RatelimitConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatelimitError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from defaults, an optional file, then
    /// `RATELIMIT__*` environment variables, later sources winning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Durations as humantime strings (`250ms`, `1m`), or bare integers read as
/// milliseconds since environment overrides like `RATELIMIT__LIMITER__PER=250`
/// arrive as numbers.
mod humantime_serde {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(text) => humantime::parse_duration(text.trim())
                .map_err(|e| de::Error::custom(format!("invalid duration {:?}: {}", text, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::ManualClock;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::path::PathBuf;
    use tokio_test::assert_ok;

    /// `load` reads every `RATELIMIT__*` variable, so tests touching the
    /// environment or calling `load` run one at a time.
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "ratelimit-{}-{}.yaml",
            name,
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = RatelimitConfig::default();
        assert_eq!(config.limiter.rate, 10);
        assert_eq!(config.limiter.per, Duration::from_secs(1));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
limiter:
  rate: 5
  per: 10ms
logging:
  level: debug
  json: true
"#;
        let config = RatelimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.rate, 5);
        assert_eq!(config.limiter.per, Duration::from_millis(10));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let config = RatelimitConfig::from_yaml("limiter:\n  per: 1m\n").unwrap();
        assert_eq!(config.limiter.rate, 10);
        assert_eq!(config.limiter.per, Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_yaml_rejects_bad_duration() {
        let err = RatelimitConfig::from_yaml("limiter:\n  per: soon\n").unwrap_err();
        assert!(matches!(err, RatelimitError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = RatelimitConfig::from_file("/nonexistent/ratelimit.yaml").unwrap_err();
        assert!(matches!(err, RatelimitError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let _guard = ENV_LOCK.lock();
        let path = write_temp_config("file", "limiter:\n  rate: 3\n  per: 2s");

        let config = RatelimitConfig::load(Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();

        let config = assert_ok!(config);
        assert_eq!(config.limiter.rate, 3);
        assert_eq!(config.limiter.per, Duration::from_secs(2));
    }

    #[test]
    fn test_load_env_overrides_file() {
        let _guard = ENV_LOCK.lock();
        let path = write_temp_config(
            "env",
            "limiter:\n  rate: 3\n  per: 2s\nlogging:\n  level: warn",
        );

        std::env::set_var("RATELIMIT__LIMITER__RATE", "7");
        std::env::set_var("RATELIMIT__LIMITER__PER", "250ms");
        let config = RatelimitConfig::load(Some(path.as_path()));
        std::env::remove_var("RATELIMIT__LIMITER__RATE");
        std::env::remove_var("RATELIMIT__LIMITER__PER");
        std::fs::remove_file(&path).unwrap();

        let config = assert_ok!(config);
        assert_eq!(config.limiter.rate, 7);
        assert_eq!(config.limiter.per, Duration::from_millis(250));
        // Values the environment does not set still come from the file
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_env_without_file() {
        let _guard = ENV_LOCK.lock();

        std::env::set_var("RATELIMIT__LIMITER__PER", "1500");
        let config = RatelimitConfig::load(None);
        std::env::remove_var("RATELIMIT__LIMITER__PER");

        let config = assert_ok!(config);
        assert_eq!(config.limiter.rate, 10);
        assert_eq!(config.limiter.per, Duration::from_millis(1500));
    }

    #[test]
    fn test_from_yaml_integer_duration_is_millis() {
        let config = RatelimitConfig::from_yaml("limiter:\n  per: 250\n").unwrap();
        assert_eq!(config.limiter.per, Duration::from_millis(250));
    }

    #[test]
    fn test_serialize_formats_duration() {
        let config = LimiterConfig {
            rate: 7,
            per: Duration::from_millis(1500),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("1s 500ms"));
    }

    #[test]
    fn test_build_limiter() {
        let config = LimiterConfig {
            rate: 2,
            per: Duration::from_secs(60),
        };
        let rl = config.build_with_clock(ManualClock::new());
        assert_eq!(rl.rate(), 2);
        assert_eq!(rl.per(), Duration::from_secs(60));
        assert!(!rl.limit());
        assert!(!rl.limit());
        assert!(rl.limit());

        let keyed = config.build_keyed::<&str>();
        assert!(!keyed.limit(&"a"));
        assert_eq!(keyed.len(), 1);
    }
}
