//! Logging configuration in the log4js layout:
//!
//! ```json
//! {
//!   "appenders": { "out": { "type": "console" } },
//!   "categories": { "default": { "appenders": ["out"], "level": "DEBUG" } }
//! }
//! ```
//!
//! Categories give every named logger its threshold. A logger whose name has
//! no category of its own uses `default`.

use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::Path,
    str::FromStr,
    sync::{Arc, OnceLock},
};

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::error::ConfigError;

/// Env var holding the path of the configuration file.
pub const CONFIG_ENV: &str = "LOG_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./properties/log4js.json";
pub const DEFAULT_CATEGORY: &str = "default";

static ACTIVE: OnceLock<ArcSwap<LogConfig>> = OnceLock::new();

/// Severity of a message, or threshold of a category.
///
/// `All` and `Off` only make sense as thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Level {
    All,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Off,
}

impl Level {
    /// Whether a message of this severity passes `threshold`.
    pub fn passes(self, threshold: Level) -> bool {
        !matches!(self, Level::All | Level::Off) && self >= threshold
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(level: &str) -> Result<Self, Self::Err> {
        match level.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Level::All),
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "FATAL" | "MARK" => Ok(Level::Fatal),
            "OFF" => Ok(Level::Off),
            _ => Err(format!("unknown log level '{level}'")),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(level: String) -> Result<Self, String> {
        level.parse()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::All => "ALL",
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Off => "OFF",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppenderConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: Option<String>,
    pub target: Option<String>,
    pub pattern: Option<String>,
    pub layout: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub appenders: Vec<String>,
    pub level: Level,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub appenders: BTreeMap<String, AppenderConfig>,
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl LogConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: LogConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads the file named by `LOG_CONFIG`, or [`DEFAULT_CONFIG_PATH`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    /// Threshold of `category`, falling back to the `default` category.
    pub fn threshold(&self, category: &str) -> Level {
        self.categories
            .get(category)
            .or_else(|| self.categories.get(DEFAULT_CATEGORY))
            .map_or(Level::All, |category| category.level)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.categories.contains_key(DEFAULT_CATEGORY) {
            return Err(ConfigError::MissingDefaultCategory);
        }
        for (name, category) in &self.categories {
            if category.appenders.is_empty() {
                return Err(ConfigError::EmptyAppenders(name.clone()));
            }
            if let Some(unknown) = category
                .appenders
                .iter()
                .find(|appender| !self.appenders.contains_key(*appender))
            {
                return Err(ConfigError::UnknownAppender {
                    category: name.clone(),
                    appender: unknown.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for LogConfig {
    /// Console only, everything enabled.
    fn default() -> Self {
        let console = AppenderConfig {
            kind: "console".to_string(),
            filename: None,
            target: None,
            pattern: None,
            layout: None,
        };
        let category = CategoryConfig {
            appenders: vec!["out".to_string()],
            level: Level::All,
        };
        LogConfig {
            appenders: BTreeMap::from([("out".to_string(), console)]),
            categories: BTreeMap::from([(DEFAULT_CATEGORY.to_string(), category)]),
        }
    }
}

fn slot() -> &'static ArcSwap<LogConfig> {
    ACTIVE.get_or_init(|| ArcSwap::from_pointee(LogConfig::default()))
}

/// Makes `config` the active configuration, replacing the previous one.
///
/// Existing loggers pick up the new thresholds with their next message.
pub fn install(config: LogConfig) {
    slot().store(Arc::new(config));
}

/// The active configuration; the default one if none was installed.
pub fn active() -> Arc<LogConfig> {
    slot().load_full()
}

/// Threshold of `category` in the active configuration.
pub fn threshold(category: &str) -> Level {
    slot().load().threshold(category)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONF: &str = r#"{
        "appenders": {
            "out": { "type": "console", "layout": { "type": "colored" } },
            "node_server": {
                "category": "node_server",
                "type": "dateFile",
                "filename": "./logs/node.log",
                "pattern": "-yyyyMMdd",
                "layout": { "type": "basic" }
            }
        },
        "categories": {
            "default": { "appenders": ["out"], "level": "debug" },
            "node_queue": { "appenders": ["out", "node_server"], "level": "WARN" }
        }
    }"#;

    #[test]
    fn parses_log4js_layout() {
        let config = LogConfig::from_json(CONF).unwrap();

        assert_eq!(config.appenders["node_server"].kind, "dateFile");
        assert_eq!(
            config.appenders["node_server"].filename.as_deref(),
            Some("./logs/node.log")
        );
        assert_eq!(config.threshold("node_queue"), Level::Warn);
        assert_eq!(config.threshold("node_server"), Level::Debug);
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
        assert_eq!("Mark".parse::<Level>(), Ok(Level::Fatal));
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn thresholds_gate_messages() {
        assert!(Level::Warn.passes(Level::Info));
        assert!(!Level::Debug.passes(Level::Info));
        assert!(Level::Trace.passes(Level::All));
        assert!(!Level::Fatal.passes(Level::Off));
        assert!(!Level::Off.passes(Level::All));
    }

    #[test]
    fn rejects_missing_default_category() {
        let err = LogConfig::from_json(
            r#"{"appenders": {"out": {"type": "console"}},
                "categories": {"server": {"appenders": ["out"], "level": "INFO"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefaultCategory));
    }

    #[test]
    fn rejects_unknown_appender() {
        let err = LogConfig::from_json(
            r#"{"appenders": {},
                "categories": {"default": {"appenders": ["file"], "level": "INFO"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownAppender { ref category, ref appender }
                if category == "default" && appender == "file"
        ));
    }

    #[test]
    fn rejects_bad_level() {
        let err = LogConfig::from_json(
            r#"{"appenders": {"out": {"type": "console"}},
                "categories": {"default": {"appenders": ["out"], "level": "LOUD"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONF.as_bytes()).unwrap();

        let config = LogConfig::from_file(file.path()).unwrap();
        assert_eq!(config.categories.len(), 2);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LogConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn default_config_enables_everything() {
        let config = LogConfig::default();
        assert_eq!(config.threshold("anything"), Level::All);
        assert!(config.validate().is_ok());
    }
}
