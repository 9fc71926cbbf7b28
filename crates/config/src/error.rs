use std::{error::Error as StdError, fmt::Display, path::PathBuf};

/// Boxed error returned by validators and custom collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A validator rejected the value supplied for `key`.
#[derive(Debug, thiserror::Error)]
#[error("validation error on key '{key}': {source}")]
pub struct ValidationError {
    pub key: String,
    #[source]
    pub source: BoxError,
}

impl ValidationError {
    #[must_use]
    pub fn new(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },
    #[error("values requested before parse() completed successfully")]
    ParseNotCalled,
    #[error("no registered keys to generate a blank config from")]
    NoRegisteredValues,
    #[error("unable to determine encoding '{format}', set the format explicitly")]
    UnknownEncoding { format: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("missing required configuration values: [{}]", keys.join(", "))]
    RequiredKeysMissing { keys: Vec<String> },
    #[error("cannot convert '{key}' to {expected}: found {found}")]
    Coercion {
        key: String,
        expected: &'static str,
        found: String,
    },
    #[error("unsupported {kind} value in configuration data")]
    UnsupportedValue { kind: &'static str },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {format}: {message}")]
    Decode { format: String, message: String },
    #[error("failed to encode {format}: {message}")]
    Encode { format: String, message: String },
    #[error("{0}")]
    Deserialize(String),
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    #[must_use]
    pub fn unknown_encoding(format: impl Into<String>) -> Self {
        Self::UnknownEncoding {
            format: format.into(),
        }
    }

    #[must_use]
    pub fn decode(format: impl Into<String>, message: impl Display) -> Self {
        Self::Decode {
            format: format.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn encode(format: impl Into<String>, message: impl Display) -> Self {
        Self::Encode {
            format: format.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::External {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Keys reported by a [`Error::RequiredKeysMissing`] failure, empty otherwise.
    #[must_use]
    pub fn missing_keys(&self) -> &[String] {
        match self {
            Self::RequiredKeysMissing { keys } => keys,
            _ => &[],
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Deserialize(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
