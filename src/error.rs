use std::{io, path::PathBuf};

/// Errors raised while establishing or binding a tracking context.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// The input does not carry enough information to identify a request.
    #[error("invalid tracking input: {0}")]
    InvalidInput(String),

    /// A call that needs an active context cell was made outside of one.
    #[error("no tracking context is active at this call site")]
    NoActiveContext,
}

/// Errors raised while loading the logging configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read log configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed log configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("log configuration must define a 'default' category")]
    MissingDefaultCategory,

    #[error("category '{category}' references unknown appender '{appender}'")]
    UnknownAppender { category: String, appender: String },

    #[error("category '{0}' has no appenders")]
    EmptyAppenders(String),
}
